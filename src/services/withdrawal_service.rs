use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::Decimal;
use serde::Deserialize;
use tracing::{ error, info };
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::{ admin_profit, commission, payment_rail_account, transaction, workflow_saga };
use crate::enums::{ CommissionKind, TransactionKind, TransactionStatus, Workflow };
use crate::error::{ AppError, Result };
use crate::fees::{ self, WithdrawalFees };
use crate::ledger::apply_delta;
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::payload::WithdrawalPayload;
use crate::saga::SagaCursor;
use crate::services::reassignment_service::AgentSelector;
use crate::services::{ already_processed, Outcome };
use crate::storage::{ receipt_key, Receipt, ReceiptStorage };
use crate::store::{
    BalanceRef,
    LedgerStore,
    ProfitLedger,
    RailAccountStore,
    Store,
    TransactionGuard,
    TransactionPatch,
    TransactionStore,
};

/// Steps of a withdrawal approval, as recorded in its saga cursor.
pub const STEP_RECEIPT_STORED: i32 = 1;
pub const STEP_STATUS_COMPLETED: i32 = 2;
pub const STEP_RAIL_DEBITED: i32 = 3;
pub const STEP_AVAILABLE_DEBITED: i32 = 4;
pub const STEP_AGENT_CREDITED: i32 = 5;
pub const STEP_LEDGER_RECORDED: i32 = 6;
pub const STEP_ESCROW_RELEASED: i32 = 7;

/// Steps of a withdrawal decline.
pub const STEP_DECLINE_STATUS_FAILED: i32 = 1;
pub const STEP_DECLINE_HOLD_RELEASED: i32 = 2;
pub const STEP_DECLINE_REFUNDED: i32 = 3;

const COMMISSION_STATUS: &str = "credited";

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub reference: String,
    pub user_id: Uuid,
    /// Assigned by the selection policy when absent.
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    pub amount: Decimal,
    /// Opaque details blob: JSON or URL-encoded JSON.
    #[serde(default)]
    pub payload: Option<String>,
}

pub struct WithdrawalService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ReceiptStorage>,
    feed: ChangeFeed,
    settings: EngineSettings,
    selector: AgentSelector,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ReceiptStorage>,
        feed: ChangeFeed,
        settings: EngineSettings
    ) -> Self {
        let selector = AgentSelector::new(store.clone(), &settings);
        Self {
            store,
            storage,
            feed,
            settings,
            selector,
        }
    }

    pub async fn get(&self, transaction_id: Uuid) -> Result<transaction::Model> {
        self.load_withdrawal(transaction_id).await
    }

    /// Opens a withdrawal: the amount moves from the user's balance into escrow
    /// and an agent is assigned.
    pub async fn create(&self, req: WithdrawalRequest) -> Result<transaction::Model> {
        let reference = req.reference.trim();
        if reference.is_empty() {
            return Err(AppError::InvalidInput("Reference is required".to_string()));
        }
        fees::ensure_amount(req.amount)?;

        if let Some(existing) = self.store.find_transaction_by_reference(reference).await? {
            if existing.kind()? != TransactionKind::Withdrawal {
                return Err(
                    AppError::InvalidInput(format!("Reference {} belongs to a deposit", reference))
                );
            }
            return Ok(existing);
        }

        self.store
            .get_end_user(req.user_id).await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", req.user_id)))?;

        let agent = match req.agent_id {
            Some(agent_id) =>
                self.store
                    .get_agent(agent_id).await?
                    .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", agent_id)))?,
            None =>
                self.selector
                    .select(req.amount, &[]).await?
                    .ok_or_else(|| AppError::NotFound("No eligible agent available".to_string()))?,
        };

        let max_attempts = self.settings.cas_max_attempts;
        let balance = BalanceRef::UserBalance(req.user_id);
        let held = BalanceRef::UserHeld(req.user_id);

        apply_delta(self.store.as_ref(), balance, -req.amount, max_attempts).await?;
        if let Err(e) = apply_delta(self.store.as_ref(), held, req.amount, max_attempts).await {
            self.compensate(balance, req.amount).await;
            return Err(e);
        }

        let now = Utc::now();
        let inserted = self.store.insert_transaction(transaction::Model {
            id: Uuid::new_v4(),
            kind: TransactionKind::Withdrawal.to_string(),
            amount: req.amount,
            status: TransactionStatus::Pending.to_string(),
            reference: reference.to_string(),
            agent_id: agent.id,
            user_id: req.user_id,
            payload: req.payload,
            payment_method: None,
            proof_url: None,
            receipt_url: None,
            rejection_reason: None,
            resolution: None,
            reassigned_from: None,
            expires_at: now + self.settings.withdrawal_timeout,
            created_at: now,
            updated_at: now,
        }).await;

        let tx = match inserted {
            Ok(tx) => tx,
            Err(e) => {
                self.compensate(held, -req.amount).await;
                self.compensate(balance, req.amount).await;
                return Err(e);
            }
        };

        info!(transaction_id = %tx.id, agent_id = %tx.agent_id, amount = %tx.amount, "withdrawal created");
        self.feed.publish(ChangeEvent::TransactionCreated {
            transaction_id: tx.id,
            agent_id: tx.agent_id,
            kind: TransactionKind::Withdrawal,
            amount: tx.amount,
        });

        Ok(tx)
    }

    /// Agent confirms the payout to the end user with a receipt.
    ///
    /// All preconditions are checked and the receipt stored before anything is
    /// written, so a rejected approval leaves no trace.
    pub async fn approve(
        &self,
        transaction_id: Uuid,
        agent_id: Uuid,
        receipt: Receipt
    ) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_withdrawal(transaction_id).await?;
        if !tx.is_pending() {
            return Ok(already_processed(&tx));
        }
        if tx.agent_id != agent_id {
            return Err(AppError::NotAssigned { transaction_id, agent_id });
        }

        let fees = WithdrawalFees::compute(tx.amount);

        let available_ref = BalanceRef::AgentAvailable(agent_id);
        let available = self.store.read_balance(available_ref).await?;
        if available < fees.gross {
            return Err(AppError::insufficient(available_ref.to_string(), fees.gross, available));
        }

        let payload = WithdrawalPayload::parse(tx.payload.as_deref());
        let account = self.resolve_account(agent_id, payload.payment_method.as_deref()).await?;
        if account.current_balance < fees.net {
            return Err(
                AppError::insufficient(
                    BalanceRef::RailAccount(account.id).to_string(),
                    fees.net,
                    account.current_balance
                )
            );
        }

        let key = receipt_key(tx.id, &receipt.extension, Utc::now());
        let receipt_url = self.storage.upload(&key, &receipt).await?;

        let mut cursor = SagaCursor::begin(
            self.store.clone(),
            self.feed.clone(),
            tx.id,
            agent_id,
            Workflow::WithdrawalApproval,
            STEP_RECEIPT_STORED
        ).await?;

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Completed),
            receipt_url: Some(receipt_url),
            payment_method: Some(account.payment_method.clone()),
            ..Default::default()
        };
        let won = match
            self.store.update_transaction(tx.id, TransactionGuard::pending_for(agent_id), patch).await
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
            self.run_approval_steps(&mut cursor, &tx, account.id, &fees).await
        };
        if let Err(e) = steps.await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(
            transaction_id = %tx.id,
            %agent_id,
            gross = %fees.gross,
            net = %fees.net,
            payment_method = %account.payment_method,
            "withdrawal completed"
        );
        self.feed.publish(ChangeEvent::TransactionCompleted {
            transaction_id: tx.id,
            agent_id,
            kind: TransactionKind::Withdrawal,
            amount: tx.amount,
            automatic: false,
        });
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id });

        Ok(Outcome::Applied(self.load_withdrawal(tx.id).await?))
    }

    /// Agent refuses the withdrawal; the escrowed amount goes back to the user.
    pub async fn decline(
        &self,
        transaction_id: Uuid,
        agent_id: Uuid,
        reason: Option<String>
    ) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_withdrawal(transaction_id).await?;
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

        let mut cursor = SagaCursor::begin(
            self.store.clone(),
            self.feed.clone(),
            tx.id,
            agent_id,
            Workflow::WithdrawalDecline,
            0
        ).await?;

        let patch = TransactionPatch {
            status: Some(TransactionStatus::Failed),
            rejection_reason: Some(reason.clone()),
            ..Default::default()
        };
        let won = match
            self.store.update_transaction(tx.id, TransactionGuard::pending_for(agent_id), patch).await
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
            cursor.advance(STEP_DECLINE_STATUS_FAILED).await?;
            self.run_decline_steps(&mut cursor, &tx).await
        };
        if let Err(e) = steps.await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(%transaction_id, %agent_id, "withdrawal declined, escrow refunded");
        self.feed.publish(ChangeEvent::TransactionFailed {
            transaction_id,
            agent_id,
            kind: TransactionKind::Withdrawal,
            reason: Some(reason),
        });

        Ok(Outcome::Applied(self.load_withdrawal(tx.id).await?))
    }

    /// Continues a torn approval or decline saga from its last committed step.
    pub async fn resume(&self, saga: &workflow_saga::Model) -> Result<transaction::Model> {
        let workflow: Workflow = saga.workflow.parse()?;
        let tx = self.load_withdrawal(saga.transaction_id).await?;

        let mut cursor = SagaCursor::reopen(self.store.clone(), self.feed.clone(), saga).await?;

        let steps = async {
            match workflow {
                Workflow::WithdrawalApproval => {
                    let account = self.resolve_account(tx.agent_id, tx.payment_method.as_deref()).await?;
                    let fees = WithdrawalFees::compute(tx.amount);
                    self.run_approval_steps(&mut cursor, &tx, account.id, &fees).await
                }
                Workflow::WithdrawalDecline => self.run_decline_steps(&mut cursor, &tx).await,
                other =>
                    Err(AppError::InvalidInput(format!("Saga workflow {} is not a withdrawal", other))),
            }
        };
        if let Err(e) = steps.await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(saga_id = %saga.id, transaction_id = %tx.id, %workflow, "withdrawal saga resumed to completion");
        self.feed.publish(ChangeEvent::BalanceChanged { agent_id: tx.agent_id });
        self.load_withdrawal(tx.id).await
    }

    async fn run_approval_steps(
        &self,
        cursor: &mut SagaCursor,
        tx: &transaction::Model,
        account_id: Uuid,
        fees: &WithdrawalFees
    ) -> Result<()> {
        let store = self.store.as_ref();
        let max_attempts = self.settings.cas_max_attempts;

        if cursor.step() < STEP_RAIL_DEBITED {
            apply_delta(store, BalanceRef::RailAccount(account_id), -fees.net, max_attempts).await?;
            cursor.advance(STEP_RAIL_DEBITED).await?;
        }

        if cursor.step() < STEP_AVAILABLE_DEBITED {
            apply_delta(store, BalanceRef::AgentAvailable(tx.agent_id), -fees.gross, max_attempts).await?;
            cursor.advance(STEP_AVAILABLE_DEBITED).await?;
        }

        if cursor.step() < STEP_AGENT_CREDITED {
            apply_delta(
                store,
                BalanceRef::AgentPlatform(tx.agent_id),
                fees.agent_total(),
                max_attempts
            ).await?;
            cursor.advance(STEP_AGENT_CREDITED).await?;
        }

        if cursor.step() < STEP_LEDGER_RECORDED {
            self.record_fees(tx, fees).await?;
            cursor.advance(STEP_LEDGER_RECORDED).await?;
        }

        if cursor.step() < STEP_ESCROW_RELEASED {
            apply_delta(store, BalanceRef::UserHeld(tx.user_id), -fees.gross, max_attempts).await?;
            cursor.advance(STEP_ESCROW_RELEASED).await?;
        }

        Ok(())
    }

    async fn run_decline_steps(&self, cursor: &mut SagaCursor, tx: &transaction::Model) -> Result<()> {
        let store = self.store.as_ref();
        let max_attempts = self.settings.cas_max_attempts;

        if cursor.step() < STEP_DECLINE_HOLD_RELEASED {
            apply_delta(store, BalanceRef::UserHeld(tx.user_id), -tx.amount, max_attempts).await?;
            cursor.advance(STEP_DECLINE_HOLD_RELEASED).await?;
        }

        if cursor.step() < STEP_DECLINE_REFUNDED {
            apply_delta(store, BalanceRef::UserBalance(tx.user_id), tx.amount, max_attempts).await?;
            cursor.advance(STEP_DECLINE_REFUNDED).await?;
        }

        Ok(())
    }

    /// Appends the commission and profit entries not yet present for `tx`.
    async fn record_fees(&self, tx: &transaction::Model, fees: &WithdrawalFees) -> Result<()> {
        let now = Utc::now();
        let existing = self.store.commissions_for_transaction(tx.id).await?;

        for (kind, amount) in [
            (CommissionKind::Commission, fees.agent_commission),
            (CommissionKind::TransactionFee, fees.agent_transaction_fee),
        ] {
            if existing.iter().any(|c| c.kind == kind.as_str()) {
                continue;
            }
            self.store.insert_commission(commission::Model {
                id: Uuid::new_v4(),
                agent_id: tx.agent_id,
                transaction_id: tx.id,
                amount,
                kind: kind.to_string(),
                status: COMMISSION_STATUS.to_string(),
                created_at: now,
            }).await?;
        }

        if self.store.admin_profit_for_transaction(tx.id).await?.is_none() {
            self.store.insert_admin_profit(admin_profit::Model {
                id: Uuid::new_v4(),
                transaction_id: tx.id,
                agent_id: tx.agent_id,
                platform_fee: fees.platform_fee,
                maintenance_fee: fees.maintenance_fee,
                total_amount: fees.platform_total(),
                created_at: now,
            }).await?;
        }

        Ok(())
    }

    /// The agent's account for the requested method, or their primary account
    /// when no method was given.
    async fn resolve_account(
        &self,
        agent_id: Uuid,
        payment_method: Option<&str>
    ) -> Result<payment_rail_account::Model> {
        match payment_method {
            Some(method) =>
                self.store
                    .find_rail_account(agent_id, method).await?
                    .ok_or_else(|| AppError::PaymentAccountNotFound {
                        agent_id,
                        lookup: format!("payment method '{}'", method),
                    }),
            None =>
                self.store
                    .find_primary_rail_account(agent_id).await?
                    .ok_or_else(|| AppError::PaymentAccountNotFound {
                        agent_id,
                        lookup: "primary account".to_string(),
                    }),
        }
    }

    /// Reverts an escrow write of `create` after a later step failed.
    async fn compensate(&self, target: BalanceRef, delta: Decimal) {
        if
            let Err(e) = apply_delta(
                self.store.as_ref(),
                target,
                delta,
                self.settings.cas_max_attempts
            ).await
        {
            error!(%target, %delta, "INCIDENT: escrow compensation failed: {}", e);
        }
    }

    async fn load_withdrawal(&self, transaction_id: Uuid) -> Result<transaction::Model> {
        let tx = self.store
            .get_transaction(transaction_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", transaction_id)))?;

        if tx.kind()? != TransactionKind::Withdrawal {
            return Err(
                AppError::InvalidInput(format!("Transaction {} is not a withdrawal", transaction_id))
            );
        }
        Ok(tx)
    }

    async fn reload_as_processed(&self, transaction_id: Uuid) -> Result<Outcome<transaction::Model>> {
        let tx = self.load_withdrawal(transaction_id).await?;
        Ok(already_processed(&tx))
    }
}
