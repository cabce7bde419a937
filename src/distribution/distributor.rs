//! Profit distribution engine.
//!
//! `distribute(now)` credits every due, not-yet-credited period of every active
//! position. Each period is its own unit of work (see [`LedgerGuard`]); positions
//! are processed concurrently, but a single position's periods always run in
//! ascending order on one task.

use crate::db::Repository;
use crate::domain::{Position, PositionId, PositionRecord, TimeMs};
use crate::engine::PeriodSchedule;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::guard::{CreditOutcome, LedgerGuard};
use super::report::{DistributionError, DistributionReport, PositionOutcome, UnitFailure};

#[derive(Clone)]
pub struct ProfitDistributor {
    repo: Arc<Repository>,
    guard: LedgerGuard,
    concurrency: usize,
}

impl ProfitDistributor {
    pub fn new(repo: Arc<Repository>, concurrency: usize) -> Self {
        Self {
            guard: LedgerGuard::new(repo.clone()),
            repo,
            concurrency: concurrency.max(1),
        }
    }

    /// Credit all due periods of all active positions as of `now`.
    ///
    /// Per-position and per-period failures are collected in the report. The
    /// only error returned is failing to list active positions at all.
    ///
    /// # Errors
    /// Returns [`DistributionError::TransientStorage`] if the batch cannot start.
    pub async fn distribute(&self, now: TimeMs) -> Result<DistributionReport, DistributionError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("distribute", %run_id, now = now.as_ms());

        async move {
            let records = self.repo.list_active_positions().await?;
            let mut report = DistributionReport::new(run_id);
            let positions = validate_positions(records, &mut report.errors);

            let outcomes: Vec<PositionOutcome> = stream::iter(positions.iter().cloned())
                .map(|position| async move { self.distribute_position(&position, now).await })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for outcome in outcomes {
                report.record(outcome);
            }
            report.normalize();

            info!(
                positions = positions.len(),
                credited = report.credited,
                skipped = report.skipped,
                errors = report.errors.len(),
                amount = %report.amount_credited,
                "Distribution run finished"
            );
            Ok::<_, DistributionError>(report)
        }
        .instrument(span)
        .await
    }

    /// Credit the due periods of a single position, in ascending order.
    ///
    /// Stops at the first failed period so credited periods always form a
    /// contiguous prefix `1..=k`; the rest are retried on the next invocation.
    pub async fn distribute_position(&self, position: &Position, now: TimeMs) -> PositionOutcome {
        let mut outcome = PositionOutcome::new(position.id);
        let schedule = PeriodSchedule::for_position(position);
        let due = schedule.due_periods(now);
        if due.is_empty() {
            return outcome;
        }

        let already: HashSet<_> = match self.repo.credited_period_indices(position.id).await {
            Ok(indices) => indices.into_iter().collect(),
            Err(e) => {
                let error = DistributionError::from(e);
                warn!(position_id = %position.id, error = %error, "Failed to read credited periods");
                outcome.failure = Some(UnitFailure::new(position.id, None, &error));
                return outcome;
            }
        };

        for period_index in due {
            if already.contains(&period_index) {
                outcome.skipped += 1;
                continue;
            }

            match self.guard.credit_period(position, &schedule, period_index).await {
                Ok(CreditOutcome::Credited(amount)) => {
                    outcome.credited += 1;
                    outcome.amount_credited += amount;
                }
                Ok(CreditOutcome::AlreadyCredited) => {
                    outcome.skipped += 1;
                }
                Ok(CreditOutcome::PositionInactive) => {
                    outcome.skipped += 1;
                    return outcome;
                }
                Err(error) => {
                    warn!(
                        position_id = %position.id,
                        period_index,
                        error = %error,
                        "Period credit failed"
                    );
                    outcome.failure = Some(UnitFailure::new(position.id, Some(period_index), &error));
                    return outcome;
                }
            }
        }

        if schedule.is_term_elapsed(now) {
            outcome.fully_accrued = self.is_fully_accrued(position).await;
        }

        debug!(
            position_id = %position.id,
            credited = outcome.credited,
            skipped = outcome.skipped,
            "Position distribution finished"
        );
        outcome
    }

    async fn is_fully_accrued(&self, position: &Position) -> bool {
        match self.repo.get_position(position.id).await {
            Ok(Some(record)) => Position::try_from(record)
                .map(|current| current.is_fully_accrued())
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Failed to re-read position");
                false
            }
        }
    }
}

/// Convert raw rows into positions, reporting each invalid row as a
/// configuration error. Invalid positions are excluded from the run.
pub(crate) fn validate_positions(
    records: Vec<PositionRecord>,
    errors: &mut Vec<UnitFailure>,
) -> Vec<Position> {
    let mut positions = Vec::with_capacity(records.len());
    for record in records {
        let id = PositionId::new(record.id);
        match Position::try_from(record) {
            Ok(position) => positions.push(position),
            Err(e) => {
                let error = DistributionError::from(e);
                warn!(position_id = %id, error = %error, "Excluding misconfigured position");
                errors.push(UnitFailure::new(id, None, &error));
            }
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{d, hourly_position, setup_test_db};
    use crate::domain::{TransactionKind, UserId};
    use crate::distribution::report::ErrorKind;

    const HOUR: i64 = 3_600_000;

    async fn setup() -> (Arc<Repository>, ProfitDistributor, tempfile::TempDir) {
        let (repo, temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        repo.provision_account(&UserId::new("alice"), d("5000"))
            .await
            .unwrap();
        let distributor = ProfitDistributor::new(repo.clone(), 4);
        (repo, distributor, temp)
    }

    #[tokio::test]
    async fn test_distribute_credits_elapsed_periods() {
        let (repo, distributor, _temp) = setup().await;
        let id = repo
            .open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();

        let report = distributor.distribute(TimeMs::new(5 * HOUR + 10)).await.unwrap();
        assert_eq!(report.credited, 5);
        assert_eq!(report.skipped, 0);
        assert!(report.errors.is_empty());
        assert_eq!(report.amount_credited, d("5"));
        assert!(report.completion_candidates.is_empty());
        assert_eq!(
            repo.credited_period_indices(id).await.unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let (repo, distributor, _temp) = setup().await;
        repo.open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();

        distributor.distribute(TimeMs::new(3 * HOUR)).await.unwrap();
        let report = distributor.distribute(TimeMs::new(3 * HOUR)).await.unwrap();
        assert_eq!(report.credited, 0);
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn test_misconfigured_position_is_reported_and_others_proceed() {
        let (repo, distributor, _temp) = setup().await;
        let good = repo
            .open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();
        let bad = repo
            .open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();
        sqlx::query("UPDATE positions SET period_rate = '-0.01' WHERE id = ?")
            .bind(bad.as_i64())
            .execute(repo.pool())
            .await
            .unwrap();

        let report = distributor.distribute(TimeMs::new(2 * HOUR)).await.unwrap();
        assert_eq!(report.credited, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].position_id, bad);
        assert_eq!(report.errors[0].kind, ErrorKind::Configuration);
        assert_eq!(report.errors[0].period_index, None);
        assert_eq!(repo.credited_period_indices(good).await.unwrap(), vec![1, 2]);
        assert!(repo.credited_period_indices(bad).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_term_position_is_completion_candidate() {
        let (repo, distributor, _temp) = setup().await;
        let id = repo
            .open_position(&hourly_position("alice", "1000", 4))
            .await
            .unwrap();

        let report = distributor.distribute(TimeMs::new(10 * HOUR)).await.unwrap();
        assert_eq!(report.credited, 4);
        assert_eq!(report.completion_candidates, vec![id]);
        assert_eq!(
            repo.sum_position_transactions(id, TransactionKind::Profit)
                .await
                .unwrap(),
            d("4")
        );
    }

    #[tokio::test]
    async fn test_rounded_up_position_stops_at_full_term_amount() {
        let (repo, distributor, _temp) = setup().await;
        let mut new_position = hourly_position("alice", "1", 10);
        new_position.period_rate = d("0.005");
        let id = repo.open_position(&new_position).await.unwrap();

        let report = distributor.distribute(TimeMs::new(20 * HOUR)).await.unwrap();
        assert_eq!(report.credited, 10);
        assert_eq!(report.amount_credited, d("0.05"));
        assert_eq!(report.completion_candidates, vec![id]);

        let record = repo.get_position(id).await.unwrap().unwrap();
        assert_eq!(record.accumulated_profit_minor, 5);
    }

    #[tokio::test]
    async fn test_distribute_runs_on_spawned_task() {
        let (repo, distributor, _temp) = setup().await;
        repo.open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();

        let report = tokio::spawn(async move {
            distributor.distribute(TimeMs::new(2 * HOUR)).await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.credited, 2);
    }

    #[tokio::test]
    async fn test_distribute_position_fills_gap_in_order() {
        let (repo, distributor, _temp) = setup().await;
        let id = repo
            .open_position(&hourly_position("alice", "1000", 24))
            .await
            .unwrap();
        let position =
            Position::try_from(repo.get_position(id).await.unwrap().unwrap()).unwrap();

        distributor.distribute_position(&position, TimeMs::new(2 * HOUR)).await;
        let outcome = distributor
            .distribute_position(&position, TimeMs::new(4 * HOUR))
            .await;
        assert_eq!(outcome.credited, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(repo.credited_period_indices(id).await.unwrap(), vec![1, 2, 3, 4]);
    }
}
