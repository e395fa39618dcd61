use axum::{ extract::{ Path, State }, Json };
use uuid::Uuid;

use crate::db::entity::{ transaction, workflow_saga };
use crate::error::Result;
use crate::services::ledger_service::ProfitSummary;

use super::AppState;

pub async fn profit_summary(State(state): State<AppState>) -> Result<Json<ProfitSummary>> {
    let summary = state.ledger_service.profit_summary().await?;
    Ok(Json(summary))
}

pub async fn list_incidents(
    State(state): State<AppState>
) -> Result<Json<Vec<workflow_saga::Model>>> {
    let incidents = state.incident_service.list().await?;
    Ok(Json(incidents))
}

pub async fn resume_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<transaction::Model>> {
    let tx = state.incident_service.resume(id).await?;
    Ok(Json(tx))
}
