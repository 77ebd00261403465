//! Daily baseline reconciliation and occupancy derivation.
//!
//! The device only reports ever-increasing totals. "Today" is the difference
//! between those totals and a baseline captured on the first reading of the
//! day, so both functions here are pure: the caller owns the baseline and
//! persists whatever `reconcile_baseline` hands back.

use chrono::NaiveDate;

use crate::model::{DailyBaseline, DerivedStatus, RawCounters};

/// Returns the baseline valid for `today`.
///
/// A baseline already stamped with `today` comes back untouched. A stale or
/// missing one is replaced by the current totals, which zeroes the day's
/// counts at the moment of rollover.
pub fn reconcile_baseline(
    raw: &RawCounters,
    current: Option<&DailyBaseline>,
    today: NaiveDate,
) -> DailyBaseline {
    match current {
        Some(b) if b.is_current(today) => *b,
        _ => DailyBaseline {
            baseline_in: raw.vehicles_in_total,
            baseline_out: raw.vehicles_out_total,
            for_date: today,
        },
    }
}

pub fn derive_status(raw: &RawCounters, baseline: &DailyBaseline, capacity: u64) -> DerivedStatus {
    // Totals can fall below the baseline after a device reset; clamp at zero.
    let vehicles_in_today = raw.vehicles_in_total.saturating_sub(baseline.baseline_in);
    let vehicles_out_today = raw.vehicles_out_total.saturating_sub(baseline.baseline_out);
    let slots_occupied = vehicles_in_today.saturating_sub(vehicles_out_today);

    let slots_available = i64::try_from(capacity)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(slots_occupied).unwrap_or(i64::MAX));
    let occupancy_percent = if capacity == 0 {
        100.0
    } else {
        slots_occupied as f64 / capacity as f64 * 100.0
    };

    DerivedStatus {
        vehicles_in_today,
        vehicles_out_today,
        slots_occupied,
        slots_available,
        is_full: slots_occupied >= capacity,
        occupancy_percent,
        slots_remaining_reported: raw.slots_remaining_reported,
    }
}
