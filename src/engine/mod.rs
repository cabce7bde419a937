//! Pure computation engine(s) for deterministic accrual logic.

pub mod period;

pub use period::{due_periods, PeriodSchedule};
