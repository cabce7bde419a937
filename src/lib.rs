pub mod api;
pub mod config;
pub mod db;
pub mod distribution;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use distribution::{
    CompletionReport, DistributionError, DistributionReport, LifecycleManager, ProfitDistributor,
};
pub use domain::{Decimal, NewPosition, PeriodUnit, Position, PositionId, TimeMs, UserId};
pub use error::AppError;
pub use orchestration::Scheduler;
