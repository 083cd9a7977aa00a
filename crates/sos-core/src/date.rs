use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Errors raised when building, rendering or parsing a [`PeerDate`].
#[derive(Debug, Error)]
pub enum DateError {
    #[error("timestamp {0} ms is outside the representable date range")]
    OutOfRange(i64),
    #[error("failed to render date: {0}")]
    Format(#[from] time::error::Format),
    #[error("failed to parse date: {0}")]
    Parse(#[from] time::error::Parse),
}

/// A UTC instant with millisecond precision, as stamped into application and
/// retirement records.
///
/// The fixed text form is `YYYY-MM-DDTHH:MM:SS.mmmZ`. That exact byte string
/// is what the application hash covers, so two dates compare equal exactly
/// when their encodings do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerDate(OffsetDateTime);

impl PeerDate {
    pub fn from_unix_millis(millis: i64) -> Result<Self, DateError> {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .map_err(|_| DateError::OutOfRange(millis))
    }

    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        // Construction truncates to whole milliseconds inside the `time`
        // range, which always fits an i64.
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Renders the fixed text form.
    pub fn encode(&self) -> Result<String, DateError> {
        Ok(self.0.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))?)
    }

    /// Parses the fixed text form produced by [`PeerDate::encode`].
    pub fn parse(input: &str) -> Result<Self, DateError> {
        let parsed = PrimitiveDateTime::parse(
            input,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
            ),
        )?;
        Ok(Self(parsed.assume_utc()))
    }

    #[must_use]
    pub fn checked_add_millis(&self, millis: i64) -> Option<Self> {
        self.unix_millis()
            .checked_add(millis)
            .and_then(|sum| Self::from_unix_millis(sum).ok())
    }
}

impl fmt::Display for PeerDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}ms", self.unix_millis()),
        }
    }
}

/// Source of "now" for dates stamped by the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> PeerDate;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PeerDate {
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
        };
        PeerDate::from_unix_millis(millis).unwrap_or(PeerDate(OffsetDateTime::UNIX_EPOCH))
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub PeerDate);

impl Clock for FixedClock {
    fn now(&self) -> PeerDate {
        self.0
    }
}
