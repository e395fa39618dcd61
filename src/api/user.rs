use axum::{ extract::{ Path, State }, Json };
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::entity::{ end_user_account, transaction };
use crate::error::Result;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenAccountBody {
    #[serde(default)]
    pub balance: Decimal,
}

pub async fn open_account(
    State(state): State<AppState>,
    Json(body): Json<OpenAccountBody>
) -> Result<Json<end_user_account::Model>> {
    let account = state.user_service.open(body.balance).await?;
    Ok(Json(account))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<end_user_account::Model>> {
    let account = state.user_service.get(id).await?;
    Ok(Json(account))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>
) -> Result<Json<Vec<transaction::Model>>> {
    let transactions = state.user_service.transactions(id).await?;
    Ok(Json(transactions))
}
