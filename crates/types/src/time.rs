use std::fmt::{self, Display};
use std::time::Duration;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A point in time, in milliseconds since the Unix epoch.
///
/// Both event-time attributes and processing time are represented with
/// millisecond precision, matching the canonical unit of the JSON plan.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn millis(&self) -> i64 {
        self.0
    }

    pub const fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add_unsigned(millis))
    }

    pub const fn saturating_sub_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_sub_unsigned(millis))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Converts `duration` to whole milliseconds.
///
/// Returns `None` if the duration has a sub-millisecond component or does
/// not fit in an `i64`.
pub fn whole_millis(duration: Duration) -> Option<i64> {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return None;
    }
    i64::try_from(duration.as_millis()).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            Timestamp::from_millis(5_000).to_string(),
            "1970-01-01 00:00:05.000"
        );
        assert_eq!(
            Timestamp::from_millis(-1).to_string(),
            "1969-12-31 23:59:59.999"
        );
    }

    #[test]
    fn saturating_arithmetic() {
        let t = Timestamp::from_millis(5_000);
        assert_eq!(t.saturating_sub_millis(1), Timestamp::from_millis(4_999));
        assert_eq!(t.saturating_add_millis(1_000), Timestamp::from_millis(6_000));
        assert_eq!(Timestamp::MIN.saturating_sub_millis(1), Timestamp::MIN);
        assert_eq!(
            Timestamp::from_millis(i64::MAX - 1).saturating_add_millis(u64::MAX),
            Timestamp::from_millis(i64::MAX)
        );
    }

    #[test]
    fn millis_conversion() {
        assert_eq!(whole_millis(Duration::from_secs(5)), Some(5_000));
        assert_eq!(whole_millis(Duration::from_micros(1_500)), None);
        assert_eq!(whole_millis(Duration::MAX), None);
    }
}
