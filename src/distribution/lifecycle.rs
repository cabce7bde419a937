//! Position lifecycle: finalize positions whose term has fully elapsed.
//!
//! Completion always runs a catch-up credit pass first, then flips the
//! position to `completed` and returns the principal in one unit of work. The
//! status flip is the first write of that unit, so two concurrent completions
//! cannot both return principal.

use crate::db::repo::NewTransaction;
use crate::db::Repository;
use crate::domain::{ConfigurationError, Position, TimeMs, TransactionKind};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::distributor::{validate_positions, ProfitDistributor};
use super::report::{CompletionReport, DistributionError, UnitFailure};

/// Outcome of finalizing one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Completed,
    /// Someone else already moved the position out of `active`.
    NotActive,
}

#[derive(Clone)]
pub struct LifecycleManager {
    repo: Arc<Repository>,
    distributor: Arc<ProfitDistributor>,
    concurrency: usize,
}

impl LifecycleManager {
    pub fn new(
        repo: Arc<Repository>,
        distributor: Arc<ProfitDistributor>,
        concurrency: usize,
    ) -> Self {
        Self {
            repo,
            distributor,
            concurrency: concurrency.max(1),
        }
    }

    /// Complete every active position whose term has elapsed at `now`.
    ///
    /// # Errors
    /// Returns [`DistributionError::TransientStorage`] only if active
    /// positions cannot be listed; per-position failures go in the report.
    pub async fn complete_expired(
        &self,
        now: TimeMs,
    ) -> Result<CompletionReport, DistributionError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("complete_expired", %run_id, now = now.as_ms());

        async move {
            let records = self.repo.list_active_positions().await?;
            let mut report = CompletionReport::new(run_id);
            let expired: Vec<Position> = validate_positions(records, &mut report.errors)
                .into_iter()
                .filter(|p| now >= p.term_end())
                .collect();

            let results: Vec<_> = stream::iter(expired.iter().cloned())
                .map(|position| self.finalize(position, now))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (position, credited, result) in results {
                report.credited += credited;
                match result {
                    Ok(Completion::Completed) => {
                        report.completed += 1;
                        report.principal_returned += position.principal;
                    }
                    Ok(Completion::NotActive) => {}
                    Err(failure) => report.errors.push(failure),
                }
            }
            report.normalize();

            info!(
                expired = expired.len(),
                completed = report.completed,
                credited = report.credited,
                errors = report.errors.len(),
                principal_returned = %report.principal_returned,
                "Completion run finished"
            );
            Ok::<_, DistributionError>(report)
        }
        .instrument(span)
        .await
    }

    /// Catch up and complete one expired position.
    ///
    /// Returns the periods credited during catch-up and the completion result.
    async fn finalize(
        &self,
        position: Position,
        now: TimeMs,
    ) -> (Position, u64, Result<Completion, UnitFailure>) {
        let outcome = self.distributor.distribute_position(&position, now).await;
        if let Some(failure) = outcome.failure {
            warn!(
                position_id = %position.id,
                reason = %failure.reason,
                "Catch-up failed, position left active"
            );
            return (position, outcome.credited, Err(failure));
        }

        let result = self
            .complete_position(&position, now)
            .await
            .map_err(|error| {
                warn!(position_id = %position.id, error = %error, "Completion failed");
                UnitFailure::new(position.id, None, &error)
            });
        (position, outcome.credited, result)
    }

    /// Mark `position` completed and return its principal, atomically.
    ///
    /// A no-op returning [`Completion::NotActive`] if the position is no longer
    /// active. Nothing is written unless periods `1..=total_periods` are all credited.
    ///
    /// # Errors
    /// Returns [`DistributionError::IncompleteCoverage`] when a period is missing,
    /// or [`DistributionError::TransientStorage`] if the unit cannot commit.
    pub async fn complete_position(
        &self,
        position: &Position,
        now: TimeMs,
    ) -> Result<Completion, DistributionError> {
        let principal = position
            .principal
            .to_minor_units()
            .ok_or(ConfigurationError::AmountOverflow)?;

        let mut tx = self.repo.begin().await?;

        if !Repository::mark_completed(&mut *tx, position.id, now).await? {
            tx.rollback().await?;
            debug!(position_id = %position.id, "Position already left active");
            return Ok(Completion::NotActive);
        }

        let credited =
            Repository::count_term_credits(&mut *tx, position.id, position.total_periods).await?;
        if credited != i64::from(position.total_periods) {
            tx.rollback().await?;
            return Err(DistributionError::IncompleteCoverage {
                credited,
                expected: position.total_periods,
            });
        }

        Repository::adjust_balance(&mut *tx, position.user_id.as_str(), principal).await?;
        Repository::append_transaction(
            &mut *tx,
            &NewTransaction {
                user_id: position.user_id.as_str(),
                kind: TransactionKind::PrincipalReturn,
                amount_minor: principal,
                position_id: Some(position.id),
                period_index: None,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            position_id = %position.id,
            user_id = %position.user_id,
            principal = %position.principal,
            "Position completed"
        );
        Ok(Completion::Completed)
    }
}
