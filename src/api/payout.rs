use axum::{ body::Bytes, extract::{ Path, Query, State }, Json };
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::entity::agent_withdrawal_request;
use crate::enums::PayoutStatus;
use crate::error::Result;
use crate::services::payout_service::FeeReportRow;
use crate::services::Outcome;
use crate::storage::Receipt;
use crate::store::PayoutFilter;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct PayoutRequestBody {
    pub agent_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl PayoutQuery {
    fn into_filter(self) -> Result<PayoutFilter> {
        let status = match self.status {
            Some(s) => Some(s.parse::<PayoutStatus>()?),
            None => None,
        };
        Ok(PayoutFilter {
            agent_id: self.agent_id,
            status,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtensionParams {
    #[serde(default)]
    pub ext: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

pub async fn request_payout(
    State(state): State<AppState>,
    Json(body): Json<PayoutRequestBody>
) -> Result<Json<agent_withdrawal_request::Model>> {
    let request = state.payout_service.request(body.agent_id, body.amount).await?;
    Ok(Json(request))
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<PayoutQuery>
) -> Result<Json<Vec<agent_withdrawal_request::Model>>> {
    let requests = state.payout_service.list(query.into_filter()?).await?;
    Ok(Json(requests))
}

pub async fn get_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<agent_withdrawal_request::Model>> {
    let request = state.payout_service.get(id).await?;
    Ok(Json(request))
}

/// The request body is the raw receipt file.
pub async fn approve_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ExtensionParams>,
    body: Bytes
) -> Result<Json<Outcome<agent_withdrawal_request::Model>>> {
    let receipt = Receipt::new(body.to_vec(), params.ext.as_deref())?;
    let outcome = state.payout_service.approve(id, receipt).await?;
    Ok(Json(outcome))
}

pub async fn reject_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectBody>
) -> Result<Json<Outcome<agent_withdrawal_request::Model>>> {
    let outcome = state.payout_service.reject(id, &body.reason).await?;
    Ok(Json(outcome))
}

pub async fn fee_report(
    State(state): State<AppState>,
    Query(query): Query<PayoutQuery>
) -> Result<Json<Vec<FeeReportRow>>> {
    let rows = state.payout_service.fee_report(query.into_filter()?).await?;
    Ok(Json(rows))
}
