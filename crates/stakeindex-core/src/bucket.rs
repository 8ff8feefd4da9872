//! Fixed-width time buckets for aggregate statistics.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Width of an aggregate stats window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    /// Every bucket kind, in the order stats are finalized.
    pub const ALL: [Bucket; 2] = [Bucket::Hour, Bucket::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    pub fn width(&self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
        }
    }

    /// Start of the bucket containing `time`.
    pub fn floor(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        // Both widths divide the epoch evenly, so truncation cannot fail.
        time.duration_trunc(self.width()).unwrap_or(time)
    }

    /// Half-open `[start, end)` range of the bucket containing `time`.
    pub fn range(&self, time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.floor(time);
        (start, start + self.width())
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            other => Err(IndexerError::Validation(format!("unknown bucket: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn floor_hour_and_day() {
        let t = Utc.with_ymd_and_hms(2021, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            Bucket::Hour.floor(t),
            Utc.with_ymd_and_hms(2021, 3, 14, 15, 0, 0).unwrap()
        );
        assert_eq!(
            Bucket::Day.floor(t),
            Utc.with_ymd_and_hms(2021, 3, 14, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn boundary_belongs_to_next_bucket() {
        let t = Utc.with_ymd_and_hms(2021, 3, 14, 16, 0, 0).unwrap();
        let (start, end) = Bucket::Hour.range(t);
        assert_eq!(start, t);
        assert_eq!(end, Utc.with_ymd_and_hms(2021, 3, 14, 17, 0, 0).unwrap());
    }

    #[test]
    fn parse_bucket() {
        assert_eq!("day".parse::<Bucket>().unwrap(), Bucket::Day);
        assert!("week".parse::<Bucket>().is_err());
    }
}
