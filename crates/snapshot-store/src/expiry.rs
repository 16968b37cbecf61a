//! Expiry requests and human-readable remaining time.
//!
//! A user either keeps a photo *for* some amount of time ("3 days") or
//! *until* a picked instant. Months and years use calendar arithmetic, so
//! "1 month" from January 31st lands on the last day of February.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::timestamp;

/// Unit for a relative expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Months => "months",
            Self::Years => "years",
        }
    }

    fn singular(&self) -> &'static str {
        let plural = self.as_str();
        &plural[..plural.len() - 1]
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(Self::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(Self::Hours),
            "d" | "day" | "days" => Ok(Self::Days),
            "mo" | "month" | "months" => Ok(Self::Months),
            "y" | "yr" | "yrs" | "year" | "years" => Ok(Self::Years),
            other => Err(StoreError::Parse {
                value: other.to_string(),
                reason: "expected minutes, hours, days, months or years".into(),
            }),
        }
    }
}

/// How long a saved image should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryRequest {
    /// Keep for `amount` units counted from the moment of saving.
    For { amount: u32, unit: TimeUnit },
    /// Keep until an absolute instant.
    Until(DateTime<Utc>),
}

impl ExpiryRequest {
    /// Parse an absolute instant for [`ExpiryRequest::Until`].
    pub fn parse_until(input: &str) -> StoreResult<Self> {
        timestamp::parse_user_input(input).map(Self::Until)
    }

    /// Turn the request into an absolute expiry instant.
    pub fn resolve(&self, now: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
        match *self {
            Self::For { amount: 0, .. } => Err(StoreError::InvalidArgument(
                "expiry amount must be at least 1".into(),
            )),
            Self::For { amount, unit } => add_units(now, amount, unit).ok_or_else(|| {
                StoreError::InvalidArgument(format!("{amount} {unit} from now is out of range"))
            }),
            Self::Until(at) => {
                if at <= now {
                    warn!(
                        expire_at = %timestamp::display(at),
                        "requested expiry is already in the past"
                    );
                }
                Ok(at)
            }
        }
    }
}

fn add_units(now: DateTime<Utc>, amount: u32, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let amount_i = i64::from(amount);
    match unit {
        TimeUnit::Minutes => now.checked_add_signed(TimeDelta::try_minutes(amount_i)?),
        TimeUnit::Hours => now.checked_add_signed(TimeDelta::try_hours(amount_i)?),
        TimeUnit::Days => now.checked_add_days(Days::new(u64::from(amount))),
        TimeUnit::Months => now.checked_add_months(Months::new(amount)),
        TimeUnit::Years => now.checked_add_months(Months::new(amount.checked_mul(12)?)),
    }
}

/// Whole calendar months from `from` to `to`, never negative.
fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    if to <= from {
        return 0;
    }
    let estimate = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    let mut months = u32::try_from(estimate).unwrap_or(0);
    while months > 0 {
        match from.checked_add_months(Months::new(months)) {
            Some(candidate) if candidate <= to => break,
            _ => months -= 1,
        }
    }
    months
}

/// Describe the time left before `expire_at`, e.g. `Expires in 3 days`.
///
/// Picks the largest unit with a non-zero count, falling back to minutes.
pub fn remaining_text(expire_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if expire_at < now {
        return "Expired".to_string();
    }

    let months = whole_months_between(now, expire_at);
    let left = expire_at - now;

    let (count, unit) = if months >= 12 {
        (i64::from(months / 12), TimeUnit::Years)
    } else if months > 0 {
        (i64::from(months), TimeUnit::Months)
    } else if left.num_days() > 0 {
        (left.num_days(), TimeUnit::Days)
    } else if left.num_hours() > 0 {
        (left.num_hours(), TimeUnit::Hours)
    } else {
        (left.num_minutes(), TimeUnit::Minutes)
    };

    let label = if count == 1 { unit.singular() } else { unit.as_str() };
    format!("Expires in {count} {label}")
}
