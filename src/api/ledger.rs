use crate::api::AppState;
use crate::distribution::{audit_account, audit_position, AccountAudit, PositionAudit};
use crate::domain::{PositionId, UserId};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;

pub async fn get_position_ledger(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<PositionAudit>, AppError> {
    let id = PositionId::new(id);
    audit_position(&state.repo, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("position {}", id)))
}

pub async fn get_account_ledger(
    Path(user): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountAudit>, AppError> {
    let user = UserId::new(user);
    audit_account(&state.repo, &user)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("account {}", user)))
}
