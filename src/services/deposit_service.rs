use std::sync::Arc;

use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use tracing::{ info, warn };
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::{ transaction, workflow_saga };
use crate::enums::{ Resolution, TransactionKind, TransactionStatus, Workflow };
use crate::error::{ AppError, Result };
use crate::fees;
use crate::ledger::apply_delta;
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::saga::SagaCursor;
use crate::services::{ already_processed, Outcome };
use crate::store::{
    BalanceRef,
    LedgerStore,
    Store,
    TransactionGuard,
    TransactionPatch,
    TransactionStore,
};

/// Steps of a deposit settlement, as recorded in its saga cursor.
pub const STEP_STATUS_COMPLETED: i32 = 1;
pub const STEP_USER_CREDITED: i32 = 2;
pub const STEP_PLATFORM_DEBITED: i32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    /// Client reference; submitting the same reference twice returns the first deposit.
    pub reference: String,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub amount: Decimal,
    #[serde(default)]
    pub proof_url: Option<String>,
}

/// What the watchdog did with an expired deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoResolution {
    Completed,
    FailedInsufficientBalance,
    NotDue,
    AlreadyProcessed,
}

pub struct DepositService {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    settings: EngineSettings,
}

impl DepositService {
    pub fn new(store: Arc<dyn Store>, feed: ChangeFeed, settings: EngineSettings) -> Self {
        Self { store, feed, settings }
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<transaction::Model> {
        self.load_deposit(transaction_id).await
    }

    /// Registers a deposit the end user has paid to the agent off-platform.
    pub async fn create(&self, req: DepositRequest) -> Result<transaction::Model> {
        let reference = req.reference.trim();
        if reference.is_empty() {
            return Err(AppError::InvalidInput("Reference is required".to_string()));
        }
        fees::ensure_amount(req.amount)?;

        if let Some(existing) = self.store.find_transaction_by_reference(reference).await? {
            if existing.kind()? != TransactionKind::Deposit {
                return Err(
                    AppError::InvalidInput(format!("Reference {} belongs to a withdrawal", reference))
                );
            }
            return Ok(existing);
        }

        self.store
            .get_end_user(req.user_id).await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", req.user_id)))?;
        self.store
            .get_agent(req.agent_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", req.agent_id)))?;

        let now = Utc::now();
        let tx = self.store.insert_transaction(transaction::Model {
            id: Uuid::new_v4(),
            kind: TransactionKind::Deposit.to_string(),
            amount: req.amount,
            status: TransactionStatus::Pending.to_string(),
            reference: reference.to_string(),
            agent_id: req.agent_id,
            user_id: req.user_id,
            payload: None,
            payment_method: None,
            proof_url: req.proof_url,
            receipt_url: None,
            rejection_reason: None,
            resolution: None,
            reassigned_from: None,
            expires_at: now + self.settings.deposit_timeout,
            created_at: now,
            updated_at: now,
        }).await?;

        info!(transaction_id = %tx.id, agent_id = %tx.agent_id, amount = %tx.amount, "deposit created");
        self.feed.publish(ChangeEvent::TransactionCreated {
            transaction_id: tx.id,
            agent_id: tx.agent_id,
            kind: TransactionKind::Deposit,
            amount: tx.amount,
        });

        Ok(tx)
    }

    /// Agent confirms the deposit: the user is credited and the agent's platform balance debited.
    pub async fn approve(
        &self,
        transaction_id: Uuid,
        agent_id: Uuid
    ) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_deposit(transaction_id).await?;
        if !tx.is_pending() {
            return Ok(already_processed(&tx));
        }
        if tx.agent_id != agent_id {
            return Err(AppError::NotAssigned { transaction_id, agent_id });
        }

        let platform = self.store.read_balance(BalanceRef::AgentPlatform(agent_id)).await?;
        if platform < tx.amount {
            return Err(
                AppError::insufficient(
                    BalanceRef::AgentPlatform(agent_id).to_string(),
                    tx.amount,
                    platform
                )
            );
        }

        self.settle(&tx, Workflow::DepositApproval, None).await
    }

    /// Agent rejects the deposit. No balance moves.
    pub async fn decline(
        &self,
        transaction_id: Uuid,
        agent_id: Uuid,
        reason: Option<String>
    ) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_deposit(transaction_id).await?;
        if !tx.is_pending() {
            return Ok(already_processed(&tx));
        }
        if tx.agent_id != agent_id {
            return Err(AppError::NotAssigned { transaction_id, agent_id });
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Declined by agent".to_string());

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Failed),
            rejection_reason: Some(reason.clone()),
            ..Default::default()
        };
        if
            !self.store.update_transaction(
                transaction_id,
                TransactionGuard::pending_for(agent_id),
                patch
            ).await?
        {
            return self.reload_as_processed(transaction_id).await;
        }

        info!(%transaction_id, %agent_id, "deposit declined");
        self.feed.publish(ChangeEvent::TransactionFailed {
            transaction_id,
            agent_id,
            kind: TransactionKind::Deposit,
            reason: Some(reason),
        });

        self.reload_applied(transaction_id).await
    }

    /// Watchdog path for a deposit left pending past its deadline.
    pub async fn auto_resolve(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>
    ) -> Result<AutoResolution> {
        let tx = self.load_deposit(transaction_id).await?;
        if !tx.is_pending() {
            return Ok(AutoResolution::AlreadyProcessed);
        }
        if now - tx.created_at < self.settings.deposit_timeout {
            return Ok(AutoResolution::NotDue);
        }

        let platform = self.store.read_balance(BalanceRef::AgentPlatform(tx.agent_id)).await?;
        if platform < tx.amount {
            let reason = format!(
                "Agent platform balance {} is below the deposit amount {}",
                platform,
                tx.amount
            );
            let patch = TransactionPatch {
                status: Some(TransactionStatus::Failed),
                resolution: Some(Resolution::AutoFailedInsufficientBalance),
                rejection_reason: Some(reason.clone()),
                ..Default::default()
            };
            if
                !self.store.update_transaction(
                    tx.id,
                    TransactionGuard::pending_for(tx.agent_id),
                    patch
                ).await?
            {
                return Ok(AutoResolution::AlreadyProcessed);
            }

            warn!(transaction_id = %tx.id, agent_id = %tx.agent_id, "expired deposit failed: {}", reason);
            self.feed.publish(ChangeEvent::TransactionFailed {
                transaction_id: tx.id,
                agent_id: tx.agent_id,
                kind: TransactionKind::Deposit,
                reason: Some(reason),
            });
            return Ok(AutoResolution::FailedInsufficientBalance);
        }

        match
            self.settle(&tx, Workflow::DepositAutoResolve, Some(Resolution::AutoCompleted)).await?
        {
            Outcome::Applied(_) => Ok(AutoResolution::Completed),
            Outcome::AlreadyProcessed { .. } => Ok(AutoResolution::AlreadyProcessed),
        }
    }

    /// Continues a torn deposit saga from its last committed step.
    pub async fn resume(&self, saga: &workflow_saga::Model) -> Result<transaction::Model> {
        let tx = self.load_deposit(saga.transaction_id).await?;
        let mut cursor = SagaCursor::reopen(self.store.clone(), self.feed.clone(), saga).await?;

        if let Err(e) = self.run_steps(&mut cursor, &tx).await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(saga_id = %saga.id, transaction_id = %tx.id, "deposit saga resumed to completion");
        self.load_deposit(tx.id).await
    }

    async fn settle(
        &self,
        tx: &transaction::Model,
        workflow: Workflow,
        resolution: Option<Resolution>
    ) -> Result<Outcome<transaction::Model>> {
        let mut cursor = SagaCursor::begin(
            self.store.clone(),
            self.feed.clone(),
            tx.id,
            tx.agent_id,
            workflow,
            0
        ).await?;

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Completed),
            resolution,
            ..Default::default()
        };
        let won = match
            self.store.update_transaction(tx.id, TransactionGuard::pending_for(tx.agent_id), patch).await
        {
            Ok(won) => won,
            Err(e) => {
                cursor.abandon(&e.to_string()).await;
                return Err(e);
            }
        };
        if !won {
            cursor.abandon("transaction no longer pending").await;
            return self.reload_as_processed(tx.id).await;
        }

        let steps = async {
            cursor.advance(STEP_STATUS_COMPLETED).await?;
            self.run_steps(&mut cursor, tx).await
        };
        if let Err(e) = steps.await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(
            transaction_id = %tx.id,
            agent_id = %tx.agent_id,
            amount = %tx.amount,
            automatic = resolution.is_some(),
            "deposit completed"
        );
        self.feed.publish(ChangeEvent::TransactionCompleted {
            transaction_id: tx.id,
            agent_id: tx.agent_id,
            kind: TransactionKind::Deposit,
            amount: tx.amount,
            automatic: resolution.is_some(),
        });
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id: tx.agent_id });

        self.reload_applied(tx.id).await
    }

    async fn run_steps(&self, cursor: &mut SagaCursor, tx: &transaction::Model) -> Result<()> {
        let max_attempts = self.settings.cas_max_attempts;

        // The status guard lets one saga per deposit get here and the cursor
        // skips committed steps, so each credit is a plain delta.
        if cursor.step() < STEP_USER_CREDITED {
            apply_delta(
                self.store.as_ref(),
                BalanceRef::UserBalance(tx.user_id),
                tx.amount,
                max_attempts
            ).await?;
            cursor.advance(STEP_USER_CREDITED).await?;
        }

        if cursor.step() < STEP_PLATFORM_DEBITED {
            apply_delta(
                self.store.as_ref(),
                BalanceRef::AgentPlatform(tx.agent_id),
                -tx.amount,
                max_attempts
            ).await?;
            cursor.advance(STEP_PLATFORM_DEBITED).await?;
        }

        Ok(())
    }

    async fn load_deposit(&self, transaction_id: Uuid) -> Result<transaction::Model> {
        let tx = self.store
            .get_transaction(transaction_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", transaction_id)))?;

        if tx.kind()? != TransactionKind::Deposit {
            return Err(AppError::InvalidInput(format!("Transaction {} is not a deposit", transaction_id)));
        }
        Ok(tx)
    }

    async fn reload_applied(&self, transaction_id: Uuid) -> Result<Outcome<transaction::Model>> {
        Ok(Outcome::Applied(self.load_deposit(transaction_id).await?))
    }

    async fn reload_as_processed(&self, transaction_id: Uuid) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_deposit(transaction_id).await?;
        Ok(already_processed(&tx))
    }
}
