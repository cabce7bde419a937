//! Scheduled trigger: periodically runs distribution followed by completion.
//!
//! Each tick reads wall-clock time once and passes it to both operations.
//! A run that exceeds the timeout is abandoned; units it already committed
//! stay committed and the next tick picks up the rest.

use crate::distribution::{
    CompletionReport, DistributionError, DistributionReport, LifecycleManager, ProfitDistributor,
};
use crate::domain::TimeMs;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("run exceeded timeout of {0:?}")]
    TimedOut(Duration),
}

/// Reports of one scheduled run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub distribution: DistributionReport,
    pub completion: CompletionReport,
}

#[derive(Clone)]
pub struct Scheduler {
    distributor: Arc<ProfitDistributor>,
    lifecycle: Arc<LifecycleManager>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(
        distributor: Arc<ProfitDistributor>,
        lifecycle: Arc<LifecycleManager>,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            distributor,
            lifecycle,
            interval,
            timeout,
        }
    }

    /// Run `distribute(now)` then `complete_expired(now)`, bounded by the timeout.
    ///
    /// # Errors
    /// Returns an error if either batch cannot start or the run times out.
    pub async fn run_once(&self, now: TimeMs) -> Result<RunSummary, SchedulerError> {
        let run = async {
            let distribution = self.distributor.distribute(now).await?;
            let completion = self.lifecycle.complete_expired(now).await?;
            Ok::<_, SchedulerError>(RunSummary {
                distribution,
                completion,
            })
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| SchedulerError::TimedOut(limit))?,
            None => run.await,
        }
    }

    /// Tick forever. The first tick fires immediately.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        loop {
            ticker.tick().await;

            match self.run_once(TimeMs::now()).await {
                Ok(summary) => {
                    let errors =
                        summary.distribution.errors.len() + summary.completion.errors.len();
                    if errors > 0 {
                        warn!(errors, "Scheduled run finished with errors");
                    }
                }
                Err(SchedulerError::TimedOut(limit)) => {
                    warn!(timeout_secs = limit.as_secs(), "Scheduled run timed out");
                }
                Err(e) => {
                    error!(error = %e, "Scheduled run failed");
                }
            }
        }
    }
}
