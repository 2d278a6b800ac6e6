//! Time and duration conversion utilities.
//!
//! Signed shifts of durations, clamping at zero instead of underflowing.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Shift the duration by a signed number of milliseconds.
    ///
    /// Negative shifts larger than the duration clamp to zero, positive shifts
    /// saturate at `Duration::MAX`.
    #[must_use]
    fn offset_by_millis(self, millis: i64) -> Duration;
}

impl DurationExt for Duration {
    fn offset_by_millis(self, millis: i64) -> Duration {
        let shift = Duration::from_millis(millis.unsigned_abs());
        if millis >= 0 {
            self.saturating_add(shift)
        } else {
            self.saturating_sub(shift)
        }
    }
}
