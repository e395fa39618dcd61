use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::Decimal;
use uuid::Uuid;

use crate::db::entity::{ end_user_account, transaction };
use crate::error::{ AppError, Result };
use crate::fees;
use crate::store::{ LedgerStore, Store, TransactionFilter, TransactionStore };

/// End-user accounts credited by deposits and debited by withdrawals.
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn open(&self, opening_balance: Decimal) -> Result<end_user_account::Model> {
        fees::ensure_opening_balance(opening_balance)?;

        let now = Utc::now();
        self.store.insert_end_user(end_user_account::Model {
            id: Uuid::new_v4(),
            balance: opening_balance,
            held_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }).await
    }

    pub async fn get(&self, user_id: Uuid) -> Result<end_user_account::Model> {
        self.store
            .get_end_user(user_id).await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    pub async fn transactions(&self, user_id: Uuid) -> Result<Vec<transaction::Model>> {
        self.store.query_transactions(TransactionFilter {
            user_id: Some(user_id),
            ..Default::default()
        }).await
    }
}
