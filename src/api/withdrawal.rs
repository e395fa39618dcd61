use axum::{ body::Bytes, extract::{ Path, Query, State }, Json };
use serde::Deserialize;
use uuid::Uuid;

use crate::db::entity::transaction;
use crate::error::Result;
use crate::services::withdrawal_service::WithdrawalRequest;
use crate::services::Outcome;
use crate::storage::Receipt;

use super::deposit::AgentAction;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ReceiptParams {
    pub agent_id: Uuid,
    /// File extension of the uploaded receipt, e.g. `jpg`.
    #[serde(default)]
    pub ext: Option<String>,
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(request): Json<WithdrawalRequest>
) -> Result<Json<transaction::Model>> {
    let tx = state.withdrawal_service.create(request).await?;
    Ok(Json(tx))
}

pub async fn get_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<transaction::Model>> {
    let tx = state.withdrawal_service.get(id).await?;
    Ok(Json(tx))
}

/// The request body is the raw receipt file.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ReceiptParams>,
    body: Bytes
) -> Result<Json<Outcome<transaction::Model>>> {
    let receipt = Receipt::new(body.to_vec(), params.ext.as_deref())?;
    let outcome = state.withdrawal_service.approve(id, params.agent_id, receipt).await?;
    Ok(Json(outcome))
}

pub async fn decline_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<AgentAction>
) -> Result<Json<Outcome<transaction::Model>>> {
    let outcome = state.withdrawal_service.decline(id, action.agent_id, action.reason).await?;
    Ok(Json(outcome))
}
