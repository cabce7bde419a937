//! Period calculator: which periods of a position are due at a given instant.
//!
//! Pure computation, no storage access. Periods are measured as elapsed time
//! since the position's start; period `k` ends at `start + k × period`.

use crate::domain::{ConfigurationError, PeriodIndex, Position, TimeMs};
use std::ops::RangeInclusive;

/// Accrual schedule of a single position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSchedule {
    start: TimeMs,
    period_ms: i64,
    total_periods: PeriodIndex,
}

impl PeriodSchedule {
    /// Build a schedule, rejecting non-positive durations and terms.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if `period_ms` or `total_periods` is not positive.
    pub fn new(
        start: TimeMs,
        period_ms: i64,
        total_periods: i64,
    ) -> Result<Self, ConfigurationError> {
        if period_ms <= 0 {
            return Err(ConfigurationError::NonPositiveDuration(period_ms));
        }
        let total_periods = PeriodIndex::try_from(total_periods)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigurationError::NonPositiveTotalPeriods(total_periods))?;
        Ok(Self {
            start,
            period_ms,
            total_periods,
        })
    }

    /// Schedule of an already validated position.
    pub fn for_position(position: &Position) -> Self {
        Self {
            start: position.start,
            period_ms: position.period_unit.duration_ms(),
            total_periods: position.total_periods,
        }
    }

    pub fn total_periods(&self) -> PeriodIndex {
        self.total_periods
    }

    /// Whole periods elapsed at `now`, clamped to the term.
    pub fn elapsed_periods(&self, now: TimeMs) -> PeriodIndex {
        if now < self.start {
            return 0;
        }
        let elapsed_ms = now.as_ms().saturating_sub(self.start.as_ms());
        let whole = elapsed_ms / self.period_ms;
        PeriodIndex::try_from(whole)
            .unwrap_or(PeriodIndex::MAX)
            .min(self.total_periods)
    }

    /// Ascending indices `1..=N` that are eligible for credit at `now`.
    pub fn due_periods(&self, now: TimeMs) -> RangeInclusive<PeriodIndex> {
        1..=self.elapsed_periods(now)
    }

    /// True once every period of the term has elapsed.
    pub fn is_term_elapsed(&self, now: TimeMs) -> bool {
        self.elapsed_periods(now) == self.total_periods
    }

    /// Nominal boundary time of period `index`.
    pub fn period_time(&self, index: PeriodIndex) -> TimeMs {
        let offset = self.period_ms.saturating_mul(i64::from(index));
        self.start.saturating_add_ms(offset)
    }
}

/// Due period indices for raw schedule inputs.
///
/// # Errors
/// Returns a [`ConfigurationError`] (and no periods) for a non-positive
/// duration or term.
pub fn due_periods(
    start: TimeMs,
    period_ms: i64,
    total_periods: i64,
    now: TimeMs,
) -> Result<RangeInclusive<PeriodIndex>, ConfigurationError> {
    Ok(PeriodSchedule::new(start, period_ms, total_periods)?.due_periods(now))
}
