use anyhow::Result;
use chrono::NaiveDate;
use regex::Regex;

/// Section holding the reporter's call sign
pub const CALL_SIGN_MARKER: &str = "[Ваш позывной]";
/// Section holding the number of duties of the week
pub const DUTIES_MARKER: &str = "[Количество Активных Дежурств в течении Недели]";
/// Date section of an activity report
pub const ACTIVITY_DATE_MARKER: &str = "[Дата заполнения]";
/// Date section of an interrogation report
pub const INTERROGATION_DATE_MARKER: &str = "[Дата]";

/// Placeholder left in the call sign section by the report template
const ID_PLACEHOLDER: &str = "Идентификационный номер";

/// Which template a channel expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Activity,
    Interrogation,
}

/// A successfully parsed report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReport {
    Activity {
        call_sign: String,
        duties: u32,
        date: NaiveDate,
    },
    Interrogation {
        call_sign: String,
        date: NaiveDate,
    },
}

impl ParsedReport {
    pub fn call_sign(&self) -> &str {
        match self {
            ParsedReport::Activity { call_sign, .. } => call_sign,
            ParsedReport::Interrogation { call_sign, .. } => call_sign,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            ParsedReport::Activity { date, .. } => *date,
            ParsedReport::Interrogation { date, .. } => *date,
        }
    }
}

/// The field that could not be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    MissingCallSign,
    MissingDuties,
    MissingDate,
}

/// Extracts reports from the labeled-section template
pub struct ReportParser {
    date_regex: Regex,
}

impl ReportParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date_regex: Regex::new(r"^\d{4}-\d{2}-\d{2}$")?,
        })
    }

    /// Parses the text of a message (body plus embed description and fields)
    pub fn parse(&self, raw: &str, kind: ReportKind) -> Result<ParsedReport, ParseFailure> {
        let call_sign = Self::call_sign(raw).ok_or(ParseFailure::MissingCallSign)?;
        match kind {
            ReportKind::Activity => {
                let duties = Self::duties(raw).ok_or(ParseFailure::MissingDuties)?;
                let date = self
                    .date(raw, ACTIVITY_DATE_MARKER)
                    .ok_or(ParseFailure::MissingDate)?;
                Ok(ParsedReport::Activity {
                    call_sign,
                    duties,
                    date,
                })
            }
            ReportKind::Interrogation => {
                let date = self
                    .date(raw, INTERROGATION_DATE_MARKER)
                    .ok_or(ParseFailure::MissingDate)?;
                Ok(ParsedReport::Interrogation { call_sign, date })
            }
        }
    }

    /// Text between the first occurrence of the marker and the next one (or the end)
    fn section<'t>(raw: &'t str, marker: &str) -> Option<&'t str> {
        raw.split(marker).nth(1)
    }

    fn call_sign(raw: &str) -> Option<String> {
        Self::section(raw, CALL_SIGN_MARKER)?
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != "*" && !line.starts_with(ID_PLACEHOLDER))
            .map(str::to_owned)
    }

    fn duties(raw: &str) -> Option<u32> {
        Self::section(raw, DUTIES_MARKER)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
            .find_map(|line| line.parse::<u32>().ok())
    }

    fn date(&self, raw: &str, marker: &str) -> Option<NaiveDate> {
        Self::section(raw, marker)?
            .lines()
            .map(str::trim)
            .filter(|line| self.date_regex.is_match(line))
            .find_map(|line| NaiveDate::parse_from_str(line, "%Y-%m-%d").ok())
    }
}
