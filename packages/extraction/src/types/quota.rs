//! Daily extraction quota: records, entitlements and admission decisions.

use std::fmt;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::OwnerId;

/// Daily allowance for one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum QuotaLimit {
    Finite(u32),
    Unlimited,
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaLimit::Finite(n) => write!(f, "{n}"),
            QuotaLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Billing-derived capabilities of a caller. Computed upstream, consumed as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlements {
    pub daily_extraction_limit: u32,
    pub can_use_csv_upload: bool,
    pub is_unlimited: bool,
}

impl Entitlements {
    pub fn limit(&self) -> QuotaLimit {
        if self.is_unlimited {
            QuotaLimit::Unlimited
        } else {
            QuotaLimit::Finite(self.daily_extraction_limit)
        }
    }
}

impl Default for Entitlements {
    fn default() -> Self {
        Self {
            daily_extraction_limit: 10,
            can_use_csv_upload: false,
            is_unlimited: false,
        }
    }
}

/// Authenticated caller: identity plus entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub owner_id: OwnerId,
    pub entitlements: Entitlements,
}

impl Caller {
    pub fn new(owner_id: impl Into<String>, entitlements: Entitlements) -> Self {
        Self {
            owner_id: OwnerId::new(owner_id),
            entitlements,
        }
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DenialReason {
    /// No allowance left today.
    Exhausted,
    /// Batch is larger than what is left today. Batches are admitted whole or not at all.
    BatchTooLarge { requested: u32, remaining: u32 },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Exhausted => f.write_str("daily extraction limit reached"),
            DenialReason::BatchTooLarge {
                requested,
                remaining,
            } => write!(
                f,
                "batch of {requested} URLs exceeds remaining daily allowance of {remaining}"
            ),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    Allowed { used: u32, remaining: Option<u32> },
    Denied(DenialReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Usage counter for one owner and one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub used: u32,
    pub limit: QuotaLimit,
    /// Next UTC midnight, when `used` goes back to zero.
    pub reset_time: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn new(limit: QuotaLimit, now: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            limit,
            reset_time: next_reset(now),
        }
    }

    /// `None` for unlimited owners.
    pub fn remaining(&self) -> Option<u32> {
        match self.limit {
            QuotaLimit::Finite(limit) => Some(limit.saturating_sub(self.used)),
            QuotaLimit::Unlimited => None,
        }
    }

    /// Reset the counter if the reset time has passed.
    pub fn roll_over(&mut self, now: DateTime<Utc>) {
        if now >= self.reset_time {
            self.used = 0;
            self.reset_time = next_reset(now);
        }
    }

    /// Decide whether `requested` URLs fit, without charging.
    pub fn check(&self, requested: u32) -> Result<(), DenialReason> {
        match self.remaining() {
            None => Ok(()),
            Some(0) => Err(DenialReason::Exhausted),
            Some(remaining) if requested > remaining => Err(DenialReason::BatchTooLarge {
                requested,
                remaining,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Check and charge in one step. The caller must hold exclusive access.
    pub fn try_admit(&mut self, requested: u32, now: DateTime<Utc>) -> Admission {
        self.roll_over(now);
        match self.check(requested) {
            Ok(()) => {
                self.used = self.used.saturating_add(requested);
                Admission::Allowed {
                    used: self.used,
                    remaining: self.remaining(),
                }
            }
            Err(reason) => Admission::Denied(reason),
        }
    }
}

/// Start of the next UTC day after `now`.
pub fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}
