//! Rewards query parameters and their validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;
use crate::error::IndexerError;
use crate::types::RewardOwnerType;

/// Grouping interval of a rewards summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardInterval {
    Hourly,
    Daily,
    Monthly,
}

impl RewardInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    /// Start of the interval containing `time`.
    pub fn floor(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hourly => Bucket::Hour.floor(time),
            Self::Daily => Bucket::Day.floor(time),
            Self::Monthly => Utc
                .with_ymd_and_hms(time.year(), time.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(time),
        }
    }
}

impl fmt::Display for RewardInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardInterval {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => Err(IndexerError::InvalidRequest(format!(
                "time interval type is wrong: {other}"
            ))),
        }
    }
}

/// Raw rewards request as received at the service boundary.
///
/// Dates are calendar days (`YYYY-MM-DD`); `to` is inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardsParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub account_id: Option<String>,
    #[serde(default)]
    pub owner_type: String,
    #[serde(default)]
    pub interval: String,
}

/// A validated rewards request. The time range is half-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
    pub owner_type: RewardOwnerType,
    pub interval: RewardInterval,
}

impl RewardsQuery {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| time >= from) && self.to.map_or(true, |to| time < to)
    }
}

impl RewardsParams {
    pub fn validate(&self) -> Result<RewardsQuery, IndexerError> {
        if self.from.is_none() && self.to.is_none() {
            return Err(IndexerError::InvalidRequest("invalid time range".into()));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(IndexerError::InvalidRequest(format!(
                    "invalid time range: {from} is after {to}"
                )));
            }
        }
        let interval: RewardInterval = self.interval.parse()?;
        let owner_type: RewardOwnerType = self.owner_type.parse()?;

        let to = match self.to {
            Some(day) => Some(
                day.checked_add_days(Days::new(1))
                    .ok_or_else(|| IndexerError::InvalidRequest(format!("invalid date: {day}")))?,
            ),
            None => None,
        };

        Ok(RewardsQuery {
            from: self.from.map(start_of_day),
            to: to.map(start_of_day),
            account_id: self.account_id.clone().filter(|a| !a.is_empty()),
            owner_type,
            interval,
        })
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(from: Option<&str>, to: Option<&str>, owner: &str, interval: &str) -> RewardsParams {
        RewardsParams {
            from: from.map(|d| d.parse().unwrap()),
            to: to.map(|d| d.parse().unwrap()),
            account_id: None,
            owner_type: owner.into(),
            interval: interval.into(),
        }
    }

    #[test]
    fn valid_params() {
        let q = params(Some("2021-03-01"), Some("2021-03-31"), "delegator", "daily")
            .validate()
            .unwrap();
        assert_eq!(q.interval, RewardInterval::Daily);
        assert_eq!(q.owner_type, RewardOwnerType::Delegator);
        assert_eq!(q.to, Some(Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn rejects_both_dates_unset() {
        let err = params(None, None, "validator", "daily").validate().unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_unknown_interval() {
        let err = params(Some("2021-03-01"), None, "validator", "fortnight")
            .validate()
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRequest(m) if m.contains("interval")));
    }

    #[test]
    fn rejects_unknown_owner_type() {
        let err = params(Some("2021-03-01"), None, "staker", "daily")
            .validate()
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRequest(m) if m.contains("owner type")));
    }

    #[test]
    fn rejects_reversed_range() {
        let err = params(Some("2021-03-02"), Some("2021-03-01"), "validator", "daily")
            .validate()
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidRequest(_)));
    }

    #[test]
    fn monthly_floor() {
        let t = Utc.with_ymd_and_hms(2021, 3, 17, 12, 30, 0).unwrap();
        assert_eq!(
            RewardInterval::Monthly.floor(t),
            Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
