use std::sync::Arc;

use axum::{ routing::{ get, post }, Router };
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod agent;
pub mod deposit;
pub mod payout;
pub mod user;
pub mod withdrawal;

use crate::services::{
    AgentService,
    DepositService,
    IncidentService,
    LedgerService,
    PayoutService,
    RailAccountService,
    UserService,
    WithdrawalService,
};

#[derive(Clone)]
pub struct AppState {
    pub agent_service: Arc<AgentService>,
    pub user_service: Arc<UserService>,
    pub rail_account_service: Arc<RailAccountService>,
    pub deposit_service: Arc<DepositService>,
    pub withdrawal_service: Arc<WithdrawalService>,
    pub payout_service: Arc<PayoutService>,
    pub ledger_service: Arc<LedgerService>,
    pub incident_service: Arc<IncidentService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // End users
        .route("/api/users", post(user::open_account))
        .route("/api/users/{id}", get(user::get_account))
        .route("/api/users/{id}/transactions", get(user::list_transactions))
        // Agents
        .route("/api/agents", get(agent::list_agents).post(agent::register_agent))
        .route("/api/agents/{id}", get(agent::get_agent))
        .route("/api/agents/{id}/status", post(agent::update_status))
        .route("/api/agents/{id}/platform-balance", post(agent::buy_platform_balance))
        .route("/api/agents/{id}/available-balance", post(agent::fund_available_balance))
        .route("/api/agents/{id}/pending", get(agent::pending_work))
        .route("/api/agents/{id}/penalties", get(agent::list_penalties))
        .route("/api/agents/{id}/commissions", get(agent::commissions))
        .route(
            "/api/agents/{id}/accounts",
            get(agent::list_accounts).post(agent::open_account)
        )
        .route("/api/agents/{id}/accounts/{account_id}/primary", post(agent::set_primary_account))
        .route("/api/accounts/{id}/top-up", post(agent::top_up_account))
        .route("/api/accounts/{id}/withdraw", post(agent::withdraw_from_account))
        // Deposits
        .route("/api/deposits", post(deposit::create_deposit))
        .route("/api/deposits/{id}", get(deposit::get_deposit))
        .route("/api/deposits/{id}/approve", post(deposit::approve_deposit))
        .route("/api/deposits/{id}/decline", post(deposit::decline_deposit))
        // Withdrawals
        .route("/api/withdrawals", post(withdrawal::create_withdrawal))
        .route("/api/withdrawals/{id}", get(withdrawal::get_withdrawal))
        .route("/api/withdrawals/{id}/approve", post(withdrawal::approve_withdrawal))
        .route("/api/withdrawals/{id}/decline", post(withdrawal::decline_withdrawal))
        // Agent payouts
        .route("/api/payouts", get(payout::list_payouts).post(payout::request_payout))
        .route("/api/payouts/report", get(payout::fee_report))
        .route("/api/payouts/{id}", get(payout::get_payout))
        .route("/api/payouts/{id}/approve", post(payout::approve_payout))
        .route("/api/payouts/{id}/reject", post(payout::reject_payout))
        // Administration
        .route("/api/admin/profits", get(admin::profit_summary))
        .route("/api/admin/incidents", get(admin::list_incidents))
        .route("/api/admin/incidents/{id}/resume", post(admin::resume_incident))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}
