use anyhow::Result;
use regex::{Captures, Regex};
use std::time::Duration;

/// Longest call sign a member may claim
pub const MAX_CALL_SIGN_CHARS: usize = 64;

/// Unit letters a duration is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationStyle {
    /// `1d2h30m`
    Latin,
    /// `1д2ч30м`
    Cyrillic,
}

/// Validation of free-form command arguments
pub struct Formats {
    latin_duration: Regex,
    cyrillic_duration: Regex,
    steam_id: Regex,
}

impl Formats {
    pub fn new() -> Result<Self> {
        Ok(Self {
            latin_duration: Regex::new(r"^(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?$")?,
            cyrillic_duration: Regex::new(r"^(?:(\d+)д)?(?:(\d+)ч)?(?:(\d+)м)?$")?,
            steam_id: Regex::new(r"^STEAM_[0-5]:[01]:\d+$")?,
        })
    }

    /// Parses a day/hour/minute duration; zero and malformed input give `None`
    pub fn duration(&self, text: &str, style: DurationStyle) -> Option<Duration> {
        let regex = match style {
            DurationStyle::Latin => &self.latin_duration,
            DurationStyle::Cyrillic => &self.cyrillic_duration,
        };
        let caps = regex.captures(text.trim())?;
        let days = Self::group(&caps, 1)?;
        let hours = Self::group(&caps, 2)?;
        let minutes = Self::group(&caps, 3)?;
        let seconds = days
            .checked_mul(86400)?
            .checked_add(hours.checked_mul(3600)?)?
            .checked_add(minutes.checked_mul(60)?)?;
        if seconds == 0 {
            return None;
        }
        Some(Duration::from_secs(seconds))
    }

    /// Missing groups count as zero, unparsable ones fail
    fn group(caps: &Captures<'_>, index: usize) -> Option<u64> {
        match caps.get(index) {
            Some(value) => value.as_str().parse().ok(),
            None => Some(0),
        }
    }

    /// `STEAM_X:Y:Z` with X in 0..=5 and Y in 0..=1
    pub fn is_steam_id(&self, text: &str) -> bool {
        self.steam_id.is_match(text)
    }

    /// Trimmed call sign if it is 1..=64 characters long
    pub fn call_sign(&self, text: &str) -> Option<String> {
        let call_sign = text.trim();
        let chars = call_sign.chars().count();
        if chars == 0 || chars > MAX_CALL_SIGN_CHARS {
            return None;
        }
        Some(call_sign.to_owned())
    }
}
