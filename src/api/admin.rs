//! Administrator trigger: run distribution or completion on demand.

use crate::api::AppState;
use crate::distribution::{CompletionReport, DistributionReport};
use crate::domain::TimeMs;
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerQuery {
    /// Evaluate as of this instant instead of the current time.
    pub now_ms: Option<i64>,
}

impl TriggerQuery {
    fn now(&self) -> TimeMs {
        self.now_ms.map(TimeMs::new).unwrap_or_else(TimeMs::now)
    }
}

pub async fn distribute(
    Query(params): Query<TriggerQuery>,
    State(state): State<AppState>,
) -> Result<Json<DistributionReport>, AppError> {
    let report = state.distributor.distribute(params.now()).await?;
    Ok(Json(report))
}

pub async fn complete_expired(
    Query(params): Query<TriggerQuery>,
    State(state): State<AppState>,
) -> Result<Json<CompletionReport>, AppError> {
    let report = state.lifecycle.complete_expired(params.now()).await?;
    Ok(Json(report))
}
