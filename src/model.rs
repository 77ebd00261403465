use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of parking slots in the lot.
pub const CAPACITY: u64 = 10;

/// Cumulative counters as reported by the device since its own epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCounters {
    pub vehicles_in_total: u64,
    pub vehicles_out_total: u64,
    /// The device's own slots-remaining figure. Shown alongside, never used
    /// to derive availability.
    pub slots_remaining_reported: u64,
}

/// Cumulative totals captured at the start of `for_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBaseline {
    pub baseline_in: u64,
    pub baseline_out: u64,
    pub for_date: NaiveDate,
}

impl DailyBaseline {
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.for_date == today
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedStatus {
    pub vehicles_in_today: u64,
    pub vehicles_out_today: u64,
    pub slots_occupied: u64,
    /// Negative when more vehicles are inside than there are slots.
    pub slots_available: i64,
    pub is_full: bool,
    pub occupancy_percent: f64,
    pub slots_remaining_reported: u64,
}

impl DerivedStatus {
    pub fn label(&self) -> &'static str {
        if self.is_full {
            "FULL"
        } else {
            "AVAILABLE"
        }
    }
}
