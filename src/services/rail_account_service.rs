use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::payment_rail_account;
use crate::error::{ AppError, Result };
use crate::fees;
use crate::ledger::apply_delta;
use crate::store::{ BalanceRef, LedgerStore, RailAccountStore, Store };

#[derive(Debug, Clone, Deserialize)]
pub struct NewRailAccount {
    pub payment_method: String,
    pub account_name: String,
    pub account_number: String,
    #[serde(default)]
    pub current_balance: Decimal,
    #[serde(default)]
    pub is_verified: bool,
}

/// An agent's mobile-money and bank accounts used to pay end users.
pub struct RailAccountService {
    store: Arc<dyn Store>,
    settings: EngineSettings,
}

impl RailAccountService {
    pub fn new(store: Arc<dyn Store>, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    /// The agent's first account becomes its primary account.
    pub async fn open(
        &self,
        agent_id: Uuid,
        req: NewRailAccount
    ) -> Result<payment_rail_account::Model> {
        let payment_method = req.payment_method.trim().to_lowercase();
        if payment_method.is_empty() {
            return Err(AppError::InvalidInput("Payment method is required".to_string()));
        }
        if req.account_number.trim().is_empty() {
            return Err(AppError::InvalidInput("Account number is required".to_string()));
        }
        fees::ensure_opening_balance(req.current_balance)?;

        self.store
            .get_agent(agent_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", agent_id)))?;

        let is_primary = self.store.find_primary_rail_account(agent_id).await?.is_none();

        let now = Utc::now();
        let account = self.store.insert_rail_account(payment_rail_account::Model {
            id: Uuid::new_v4(),
            agent_id,
            payment_method,
            account_name: req.account_name.trim().to_string(),
            account_number: req.account_number.trim().to_string(),
            current_balance: req.current_balance,
            is_primary,
            is_verified: req.is_verified,
            created_at: now,
            updated_at: now,
        }).await?;

        info!(
            account_id = %account.id,
            %agent_id,
            payment_method = %account.payment_method,
            is_primary,
            "payment account opened"
        );
        Ok(account)
    }

    pub async fn list(&self, agent_id: Uuid) -> Result<Vec<payment_rail_account::Model>> {
        self.store.list_rail_accounts(agent_id).await
    }

    pub async fn get(&self, account_id: Uuid) -> Result<payment_rail_account::Model> {
        self.store
            .get_rail_account(account_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Payment account {} not found", account_id)))
    }

    pub async fn top_up(&self, account_id: Uuid, amount: Decimal) -> Result<Decimal> {
        fees::ensure_amount(amount)?;
        self.adjust(account_id, amount).await
    }

    pub async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<Decimal> {
        fees::ensure_amount(amount)?;
        self.adjust(account_id, -amount).await
    }

    pub async fn set_primary(
        &self,
        agent_id: Uuid,
        account_id: Uuid
    ) -> Result<payment_rail_account::Model> {
        let account = self.get(account_id).await?;
        if account.agent_id != agent_id {
            return Err(
                AppError::InvalidInput(
                    format!("Payment account {} does not belong to agent {}", account_id, agent_id)
                )
            );
        }

        self.store.set_primary_rail_account(agent_id, account_id).await?;
        info!(%agent_id, %account_id, "primary payment account changed");
        self.get(account_id).await
    }

    async fn adjust(&self, account_id: Uuid, delta: Decimal) -> Result<Decimal> {
        let balance = apply_delta(
            self.store.as_ref(),
            BalanceRef::RailAccount(account_id),
            delta,
            self.settings.cas_max_attempts
        ).await?;

        info!(%account_id, %delta, %balance, "payment account balance adjusted");
        Ok(balance)
    }
}
