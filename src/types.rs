use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;

// ============================================================================
// Language Support
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "uk")]
    Ukrainian,
    #[serde(rename = "de")]
    German,
}

impl Language {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "uk" | "uk-ua" => Self::Ukrainian,
            "de" | "de-de" => Self::German,
            _ => Self::English,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Ukrainian => "uk",
            Self::German => "de",
        }
    }

    fn datetime_pattern(&self) -> &'static str {
        match self {
            Self::English => "%Y-%m-%d %H:%M:%S",
            Self::Ukrainian => "%d.%m.%Y %H:%M:%S",
            Self::German => "%d.%m.%Y, %H:%M:%S",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Timestamp Helper
// ============================================================================

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`, never negative.
    pub fn seconds_since(&self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0).max(0) as f64 / 1000.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    pub fn format_in<Tz: TimeZone>(&self, language: Language, tz: &Tz) -> String
    where
        Tz::Offset: fmt::Display,
    {
        match self.to_datetime() {
            Some(dt) => dt
                .with_timezone(tz)
                .format(language.datetime_pattern())
                .to_string(),
            None => String::new(),
        }
    }

    pub fn format_local(&self, language: Language) -> String {
        self.format_in(language, &Local)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
