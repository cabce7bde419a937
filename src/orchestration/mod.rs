pub mod scheduler;

pub use scheduler::{RunSummary, Scheduler, SchedulerError};
