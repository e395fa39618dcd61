use axum::{ extract::{ Path, State }, Json };
use sea_orm::prelude::Decimal;
use serde::{ Deserialize, Serialize };
use uuid::Uuid;

use crate::db::entity::{ agent, agent_penalty, payment_rail_account, transaction };
use crate::enums::{ OnlineStatus, VerificationStatus };
use crate::error::Result;
use crate::services::agent_service::NewAgent;
use crate::services::ledger_service::CommissionSummary;
use crate::services::rail_account_service::NewRailAccount;
use crate::store::AgentStatusPatch;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct AmountBody {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub verification_status: Option<VerificationStatus>,
    #[serde(default)]
    pub online_status: Option<OnlineStatus>,
}

pub async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<NewAgent>
) -> Result<Json<agent::Model>> {
    let agent = state.agent_service.register(request).await?;
    Ok(Json(agent))
}

pub async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<agent::Model>>> {
    let agents = state.agent_service.list().await?;
    Ok(Json(agents))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<agent::Model>> {
    let agent = state.agent_service.get(id).await?;
    Ok(Json(agent))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>
) -> Result<Json<agent::Model>> {
    let patch = AgentStatusPatch {
        is_active: body.is_active,
        verification_status: body.verification_status,
        online_status: body.online_status,
    };
    let agent = state.agent_service.update_status(id, patch).await?;
    Ok(Json(agent))
}

pub async fn buy_platform_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AmountBody>
) -> Result<Json<BalanceResponse>> {
    let balance = state.agent_service.buy_platform_balance(id, body.amount).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn fund_available_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AmountBody>
) -> Result<Json<BalanceResponse>> {
    let balance = state.agent_service.fund_available_balance(id, body.amount).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn pending_work(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<Vec<transaction::Model>>> {
    let pending = state.agent_service.pending_work(id).await?;
    Ok(Json(pending))
}

pub async fn list_penalties(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<Vec<agent_penalty::Model>>> {
    let penalties = state.agent_service.penalties(id).await?;
    Ok(Json(penalties))
}

pub async fn commissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<CommissionSummary>> {
    let summary = state.ledger_service.agent_commissions(id).await?;
    Ok(Json(summary))
}

pub async fn open_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<NewRailAccount>
) -> Result<Json<payment_rail_account::Model>> {
    let account = state.rail_account_service.open(id, request).await?;
    Ok(Json(account))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<Vec<payment_rail_account::Model>>> {
    let accounts = state.rail_account_service.list(id).await?;
    Ok(Json(accounts))
}

pub async fn set_primary_account(
    State(state): State<AppState>,
    Path((id, account_id)): Path<(Uuid, Uuid)>
) -> Result<Json<payment_rail_account::Model>> {
    let account = state.rail_account_service.set_primary(id, account_id).await?;
    Ok(Json(account))
}

pub async fn top_up_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AmountBody>
) -> Result<Json<BalanceResponse>> {
    let balance = state.rail_account_service.top_up(id, body.amount).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub async fn withdraw_from_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AmountBody>
) -> Result<Json<BalanceResponse>> {
    let balance = state.rail_account_service.withdraw(id, body.amount).await?;
    Ok(Json(BalanceResponse { balance }))
}
