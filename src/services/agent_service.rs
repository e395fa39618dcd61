use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::{ agent, agent_penalty, transaction };
use crate::enums::{ OnlineStatus, TransactionStatus, VerificationStatus };
use crate::error::{ AppError, Result };
use crate::fees;
use crate::ledger::apply_delta;
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::store::{
    AgentStatusPatch,
    BalanceRef,
    LedgerStore,
    Store,
    TransactionFilter,
    TransactionStore,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub telegram_chat_id: Option<i64>,
    /// Opening float for end-user withdrawals.
    #[serde(default)]
    pub available_balance: Decimal,
}

#[derive(Clone)]
pub struct AgentService {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    settings: EngineSettings,
}

impl AgentService {
    pub fn new(store: Arc<dyn Store>, feed: ChangeFeed, settings: EngineSettings) -> Self {
        Self { store, feed, settings }
    }

    /// New agents start unverified and offline.
    pub async fn register(&self, req: NewAgent) -> Result<agent::Model> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Agent name is required".to_string()));
        }
        fees::ensure_opening_balance(req.available_balance)?;

        let now = Utc::now();
        let agent = self.store.insert_agent(agent::Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            available_balance: req.available_balance,
            platform_balance: Decimal::ZERO,
            is_active: true,
            verification_status: VerificationStatus::Pending.to_string(),
            online_status: OnlineStatus::Offline.to_string(),
            penalty_count: 0,
            telegram_chat_id: req.telegram_chat_id,
            created_at: now,
            updated_at: now,
        }).await?;

        info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        Ok(agent)
    }

    pub async fn get(&self, agent_id: Uuid) -> Result<agent::Model> {
        self.store
            .get_agent(agent_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", agent_id)))
    }

    pub async fn list(&self) -> Result<Vec<agent::Model>> {
        self.store.list_agents().await
    }

    pub async fn update_status(&self, agent_id: Uuid, patch: AgentStatusPatch) -> Result<agent::Model> {
        if !self.store.update_agent_status(agent_id, patch).await? {
            return Err(AppError::NotFound(format!("Agent {} not found", agent_id)));
        }
        self.get(agent_id).await
    }

    pub async fn set_online(&self, agent_id: Uuid, status: OnlineStatus) -> Result<agent::Model> {
        self.update_status(agent_id, AgentStatusPatch {
            online_status: Some(status),
            ..Default::default()
        }).await
    }

    pub async fn verify(&self, agent_id: Uuid, status: VerificationStatus) -> Result<agent::Model> {
        self.update_status(agent_id, AgentStatusPatch {
            verification_status: Some(status),
            ..Default::default()
        }).await
    }

    /// Credits platform balance the agent bought; returns the new balance.
    pub async fn buy_platform_balance(&self, agent_id: Uuid, amount: Decimal) -> Result<Decimal> {
        self.credit(BalanceRef::AgentPlatform(agent_id), agent_id, amount).await
    }

    /// Tops up the float used to pay out end-user withdrawals; returns the new balance.
    pub async fn fund_available_balance(&self, agent_id: Uuid, amount: Decimal) -> Result<Decimal> {
        self.credit(BalanceRef::AgentAvailable(agent_id), agent_id, amount).await
    }

    /// Transactions currently waiting on this agent, oldest first.
    pub async fn pending_work(&self, agent_id: Uuid) -> Result<Vec<transaction::Model>> {
        self.store.query_transactions(TransactionFilter {
            agent_id: Some(agent_id),
            status: Some(TransactionStatus::Pending),
            ..Default::default()
        }).await
    }

    pub async fn penalties(&self, agent_id: Uuid) -> Result<Vec<agent_penalty::Model>> {
        self.store.penalties_for_agent(agent_id).await
    }

    async fn credit(&self, target: BalanceRef, agent_id: Uuid, amount: Decimal) -> Result<Decimal> {
        fees::ensure_amount(amount)?;

        let balance = apply_delta(
            self.store.as_ref(),
            target,
            amount,
            self.settings.cas_max_attempts
        ).await?;

        info!(%target, %amount, %balance, "agent balance credited");
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id });
        Ok(balance)
    }
}
