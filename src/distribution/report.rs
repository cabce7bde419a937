//! Results of a distribution or completion run, and the errors they aggregate.

use crate::domain::{ConfigurationError, Decimal, PeriodIndex, PositionId};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A failure local to one position (or one period of it).
///
/// Already-credited periods are an outcome (`Reservation::AlreadyCredited`), not an error.
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("storage error: {0}")]
    TransientStorage(#[from] sqlx::Error),
    #[error("invalid position: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("incomplete coverage: {credited} of {expected} periods credited")]
    IncompleteCoverage { credited: i64, expected: PeriodIndex },
}

impl DistributionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DistributionError::TransientStorage(_) => ErrorKind::TransientStorage,
            DistributionError::Configuration(_) => ErrorKind::Configuration,
            DistributionError::IncompleteCoverage { .. } => ErrorKind::IncompleteCoverage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientStorage,
    Configuration,
    IncompleteCoverage,
}

/// One entry of a report's `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitFailure {
    pub position_id: PositionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_index: Option<PeriodIndex>,
    pub kind: ErrorKind,
    pub reason: String,
}

impl UnitFailure {
    pub fn new(
        position_id: PositionId,
        period_index: Option<PeriodIndex>,
        error: &DistributionError,
    ) -> Self {
        Self {
            position_id,
            period_index,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// What `distribute_position` did for a single position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionOutcome {
    pub position_id: PositionId,
    pub credited: u64,
    pub skipped: u64,
    pub amount_credited: Decimal,
    pub failure: Option<UnitFailure>,
    /// Accumulated profit has reached the full-term amount.
    pub fully_accrued: bool,
}

impl PositionOutcome {
    pub fn new(position_id: PositionId) -> Self {
        Self {
            position_id,
            credited: 0,
            skipped: 0,
            amount_credited: Decimal::zero(),
            failure: None,
            fully_accrued: false,
        }
    }
}

/// Result of one `distribute` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    pub run_id: Uuid,
    pub credited: u64,
    pub skipped: u64,
    pub errors: Vec<UnitFailure>,
    pub amount_credited: Decimal,
    /// Positions whose accumulated profit now equals the full-term amount.
    pub completion_candidates: Vec<PositionId>,
}

impl DistributionReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            credited: 0,
            skipped: 0,
            errors: Vec::new(),
            amount_credited: Decimal::zero(),
            completion_candidates: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: PositionOutcome) {
        self.credited += outcome.credited;
        self.skipped += outcome.skipped;
        self.amount_credited += outcome.amount_credited;
        if let Some(failure) = outcome.failure {
            self.errors.push(failure);
        }
        if outcome.fully_accrued {
            self.completion_candidates.push(outcome.position_id);
        }
    }

    /// Sort lists so reports compare equal regardless of processing order.
    pub fn normalize(&mut self) {
        self.errors.sort_by_key(|f| (f.position_id, f.period_index));
        self.completion_candidates.sort();
    }
}

/// Result of one `complete_expired` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub run_id: Uuid,
    pub completed: u64,
    /// Periods credited while catching up expired positions.
    pub credited: u64,
    pub principal_returned: Decimal,
    pub errors: Vec<UnitFailure>,
}

impl CompletionReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            completed: 0,
            credited: 0,
            principal_returned: Decimal::zero(),
            errors: Vec::new(),
        }
    }

    pub fn normalize(&mut self) {
        self.errors.sort_by_key(|f| (f.position_id, f.period_index));
    }
}
