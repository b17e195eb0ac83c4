use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use serenity::model::id::{RoleId, UserId};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// A role that should fall off a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub user_id: UserId,
    pub role_id: RoleId,
}

struct Job {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Delayed role revocations that can be cancelled
#[derive(Clone, Default)]
pub struct RoleTimers {
    jobs: Arc<Mutex<HashMap<TimerKey, Job>>>,
    generation: Arc<AtomicU64>,
}

impl RoleTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`; replaces any job pending for the same key
    pub async fn schedule<F>(&self, key: TimerKey, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let jobs = self.jobs.clone();
        // hold the table until the job is registered so a zero delay can't finish first
        let mut table = self.jobs.lock().await;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            task.await;
            let mut jobs = jobs.lock().await;
            if jobs.get(&key).map(|job| job.generation) == Some(generation) {
                jobs.remove(&key);
            }
        });
        if let Some(previous) = table.insert(key, Job { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drops a pending job; `false` if nothing was scheduled
    pub async fn cancel(&self, key: &TimerKey) -> bool {
        match self.jobs.lock().await.remove(key) {
            Some(job) => {
                job.handle.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn is_pending(&self, key: &TimerKey) -> bool {
        self.jobs.lock().await.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn key(user: u64) -> TimerKey {
        TimerKey {
            user_id: UserId(user),
            role_id: RoleId(10),
        }
    }

    #[tokio::test]
    async fn runs_after_delay_and_forgets_itself() {
        let timers = RoleTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timers
            .schedule(key(1), Duration::from_millis(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(timers.is_pending(&key(1)).await);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&key(1)).await);
    }

    #[tokio::test]
    async fn cancelled_job_never_runs() {
        let timers = RoleTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        timers
            .schedule(key(1), Duration::from_millis(50), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(timers.cancel(&key(1)).await);
        assert!(!timers.cancel(&key(1)).await);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_job() {
        let timers = RoleTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = fired.clone();
        timers
            .schedule(key(1), Duration::from_millis(50), async move {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let second = fired.clone();
        timers
            .schedule(key(1), Duration::from_millis(50), async move {
                second.fetch_add(10, Ordering::SeqCst);
            })
            .await;
        let other = fired.clone();
        timers
            .schedule(key(2), Duration::from_millis(50), async move {
                other.fetch_add(100, Ordering::SeqCst);
            })
            .await;

        sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 110);
    }
}
