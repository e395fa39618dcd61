use axum::{ extract::{ Path, State }, Json };
use serde::Deserialize;
use uuid::Uuid;

use crate::db::entity::transaction;
use crate::error::Result;
use crate::services::deposit_service::DepositRequest;
use crate::services::Outcome;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentAction {
    pub agent_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn create_deposit(
    State(state): State<AppState>,
    Json(request): Json<DepositRequest>
) -> Result<Json<transaction::Model>> {
    let tx = state.deposit_service.create(request).await?;
    Ok(Json(tx))
}

pub async fn get_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<transaction::Model>> {
    let tx = state.deposit_service.get(id).await?;
    Ok(Json(tx))
}

pub async fn approve_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<AgentAction>
) -> Result<Json<Outcome<transaction::Model>>> {
    let outcome = state.deposit_service.approve(id, action.agent_id).await?;
    Ok(Json(outcome))
}

pub async fn decline_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(action): Json<AgentAction>
) -> Result<Json<Outcome<transaction::Model>>> {
    let outcome = state.deposit_service.decline(id, action.agent_id, action.reason).await?;
    Ok(Json(outcome))
}
