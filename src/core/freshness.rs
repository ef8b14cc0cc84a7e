//! Per-period cache freshness rules
//!
//! Short windows move every trading day and refresh daily; the long windows
//! barely change shape, so they refresh weekly ("5y") or monthly ("max").
//! Ages are whole calendar days because the ledger stores dates.

use chrono::NaiveDate;

use crate::core::series::Period;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCadence {
    Daily,
    Weekly,
    Monthly,
}

impl UpdateCadence {
    pub fn for_period(period: Period) -> Self {
        match period {
            Period::FiveYears => UpdateCadence::Weekly,
            Period::Max => UpdateCadence::Monthly,
            _ => UpdateCadence::Daily,
        }
    }

    pub fn max_age_days(&self) -> i64 {
        match self {
            UpdateCadence::Daily => 1,
            UpdateCadence::Weekly => 7,
            UpdateCadence::Monthly => 30,
        }
    }
}

/// Whether a bucket last refreshed on `refreshed_on` must be refetched as of
/// `today`. A bucket with no ledger entry is always stale.
pub fn is_stale(period: Period, refreshed_on: Option<NaiveDate>, today: NaiveDate) -> bool {
    match refreshed_on {
        Some(date) => {
            (today - date).num_days() >= UpdateCadence::for_period(period).max_age_days()
        }
        None => true,
    }
}
