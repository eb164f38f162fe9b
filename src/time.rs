use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::interval::Ms;

/// Offset applied to naive timestamps when no deployment override is given.
pub const DEFAULT_UTC_OFFSET: &str = "-03:00";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// A zoned instant that remembers the exact text it was stored as.
///
/// Equality and ordering follow the text, so two renderings of the same
/// instant in different offsets are distinct values. Use [`Timestamp::millis`]
/// to compare instants.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    raw: String,
    at: DateTime<FixedOffset>,
}

impl Timestamp {
    /// Parse an explicitly zoned timestamp (`Z` or `±HH:MM`). Seconds are
    /// optional and the text is kept as given.
    pub fn parse_zoned(raw: &str) -> Result<Self, ValidationError> {
        let at = DateTime::parse_from_rfc3339(raw)
            .ok()
            .or_else(|| {
                ZONED_FORMATS
                    .iter()
                    .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
            })
            .or_else(|| {
                let naive = raw.strip_suffix(['Z', 'z'])?;
                NAIVE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
                    .map(|n| n.and_utc().fixed_offset())
            })
            .ok_or_else(|| ValidationError::MalformedTimestamp(raw.to_string()))?;
        Ok(Self { raw: raw.to_string(), at })
    }

    /// Render `at` in `offset` with sub-second precision kept.
    pub fn from_utc(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        let at = at.with_timezone(&offset);
        Self {
            raw: at.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            at,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.at
    }

    pub fn millis(&self) -> Ms {
        self.at.timestamp_millis()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.raw)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse_zoned(&raw)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.raw
    }
}

/// Normalize a caller-supplied timestamp.
///
/// Input carrying an offset (including `Z`) is kept verbatim. Naive input is
/// interpreted in `offset` and stored as `YYYY-MM-DDTHH:MM:SS±HH:MM`.
/// Normalizing an already normalized value returns it unchanged.
pub fn normalize(raw: &str, offset: FixedOffset) -> Result<Timestamp, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MalformedTimestamp(String::new()));
    }
    if let Ok(ts) = Timestamp::parse_zoned(raw) {
        return Ok(ts);
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ValidationError::MalformedTimestamp(raw.to_string()))?;
    let at = naive
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| ValidationError::MalformedTimestamp(raw.to_string()))?;
    let rendered = format!("{}{}", naive.format("%Y-%m-%dT%H:%M:%S%.f"), offset);
    Ok(Timestamp { raw: rendered, at })
}

/// Parse a `±HH:MM` offset such as `-03:00`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    raw.trim().parse::<FixedOffset>().ok()
}

/// [`DEFAULT_UTC_OFFSET`] as an offset.
pub fn default_offset() -> FixedOffset {
    parse_offset(DEFAULT_UTC_OFFSET).unwrap_or_else(|| Utc.fix())
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brt() -> FixedOffset {
        parse_offset(DEFAULT_UTC_OFFSET).unwrap()
    }

    #[test]
    fn naive_timestamp_gets_deployment_offset() {
        let ts = normalize("2024-06-01T10:00", brt()).unwrap();
        assert_eq!(ts.as_str(), "2024-06-01T10:00:00-03:00");
        assert_eq!(ts.instant().to_rfc3339(), "2024-06-01T10:00:00-03:00");
    }

    #[test]
    fn naive_with_seconds_and_fraction() {
        let ts = normalize("2024-06-01T10:00:30.250", brt()).unwrap();
        assert_eq!(ts.as_str(), "2024-06-01T10:00:30.250-03:00");
        let spaced = normalize("2024-06-01 08:15", brt()).unwrap();
        assert_eq!(spaced.as_str(), "2024-06-01T08:15:00-03:00");
    }

    #[test]
    fn zoned_timestamps_are_kept_verbatim() {
        for raw in ["2024-06-01T10:00:00Z", "2024-06-01T10:00:00+05:00", "2024-06-01T10:00:00.5-03:00"] {
            assert_eq!(normalize(raw, brt()).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn zoned_minute_precision_is_kept_verbatim() {
        let utc = normalize("2024-06-01T10:00Z", brt()).unwrap();
        assert_eq!(utc.as_str(), "2024-06-01T10:00Z");
        assert_eq!(utc.instant().to_rfc3339(), "2024-06-01T10:00:00+00:00");

        let local = normalize("2024-06-01T10:00-03:00", brt()).unwrap();
        assert_eq!(local.as_str(), "2024-06-01T10:00-03:00");
        assert_eq!(local.millis(), normalize("2024-06-01T10:00", brt()).unwrap().millis());

        let spaced = normalize("2024-06-01 10:00+05:00", brt()).unwrap();
        assert_eq!(spaced.as_str(), "2024-06-01 10:00+05:00");
        assert_eq!(spaced.millis(), normalize("2024-06-01T05:00Z", brt()).unwrap().millis());
    }

    #[test]
    fn zoned_text_survives_serde() {
        let ts = normalize("2024-06-01T00:00-03:00", brt()).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<Timestamp>("\"2024-06-01T10:00-3\"").is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("2024-06-01T10:00", brt()).unwrap();
        let twice = normalize(once.as_str(), brt()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_input_is_rejected() {
        for raw in ["", "   ", "tomorrow", "2024-13-01T10:00", "2024-06-01"] {
            assert!(
                matches!(normalize(raw, brt()), Err(ValidationError::MalformedTimestamp(_))),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn same_instant_in_different_offsets() {
        let local = normalize("2024-06-01T10:00", brt()).unwrap();
        let utc = normalize("2024-06-01T13:00:00Z", brt()).unwrap();
        assert_eq!(local.millis(), utc.millis());
        assert_ne!(local, utc);
    }

    #[test]
    fn from_utc_renders_in_offset() {
        let at = DateTime::parse_from_rfc3339("2024-06-01T13:00:00Z").unwrap().with_timezone(&Utc);
        let ts = Timestamp::from_utc(at, brt());
        assert_eq!(ts.as_str(), "2024-06-01T10:00:00-03:00");
    }

    #[test]
    fn timestamp_serde_uses_text() {
        let ts = normalize("2024-06-01T10:00", brt()).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-06-01T10:00:00-03:00\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<Timestamp>("\"2024-06-01T10:00\"").is_err());
    }
}
