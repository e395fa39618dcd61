//! Record stores behind the reconciliation engine.
//!
//! Every mutable balance is written only through
//! [`LedgerStore::compare_and_swap`] and every status change only through a
//! guarded conditional update, so concurrent handlers and the watchdog can
//! share the same records without a global lock.

use std::fmt;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use uuid::Uuid;

use crate::db::entity::{
    admin_profit,
    agent,
    agent_penalty,
    agent_withdrawal_request,
    commission,
    end_user_account,
    payment_rail_account,
    transaction,
    workflow_saga,
};
use crate::enums::{
    OnlineStatus,
    PayoutStatus,
    Resolution,
    SagaStatus,
    TransactionKind,
    TransactionStatus,
    VerificationStatus,
};
use crate::error::Result;

mod memory;
mod postgres;

pub use memory::{ FaultPoint, MemoryStore };
pub use postgres::SeaOrmStore;

/// One mutable balance field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceRef {
    AgentAvailable(Uuid),
    AgentPlatform(Uuid),
    UserBalance(Uuid),
    UserHeld(Uuid),
    RailAccount(Uuid),
}

impl fmt::Display for BalanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceRef::AgentAvailable(id) => write!(f, "agent {} available balance", id),
            BalanceRef::AgentPlatform(id) => write!(f, "agent {} platform balance", id),
            BalanceRef::UserBalance(id) => write!(f, "user {} balance", id),
            BalanceRef::UserHeld(id) => write!(f, "user {} held balance", id),
            BalanceRef::RailAccount(id) => write!(f, "payment account {} balance", id),
        }
    }
}

/// Operational flags of an agent; `None` leaves a flag unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentStatusPatch {
    pub is_active: Option<bool>,
    pub verification_status: Option<VerificationStatus>,
    pub online_status: Option<OnlineStatus>,
}

impl AgentStatusPatch {
    pub fn apply(&self, agent: &mut agent::Model, now: DateTime<Utc>) {
        if let Some(active) = self.is_active {
            agent.is_active = active;
        }
        if let Some(status) = self.verification_status {
            agent.verification_status = status.to_string();
        }
        if let Some(status) = self.online_status {
            agent.online_status = status.to_string();
        }
        agent.updated_at = now;
    }
}

/// Precondition of a conditional transaction update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionGuard {
    pub status: TransactionStatus,
    pub agent_id: Option<Uuid>,
}

impl TransactionGuard {
    pub fn pending() -> Self {
        Self { status: TransactionStatus::Pending, agent_id: None }
    }

    /// Pending and still owned by `agent_id`.
    pub fn pending_for(agent_id: Uuid) -> Self {
        Self { status: TransactionStatus::Pending, agent_id: Some(agent_id) }
    }

    pub fn matches(&self, tx: &transaction::Model) -> bool {
        tx.status == self.status.as_str() && self.agent_id.map_or(true, |a| a == tx.agent_id)
    }
}

/// Fields written by a conditional transaction update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub agent_id: Option<Uuid>,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub resolution: Option<Resolution>,
    pub reassigned_from: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TransactionPatch {
    pub fn status(status: TransactionStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn apply(&self, tx: &mut transaction::Model, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            tx.status = status.to_string();
        }
        if let Some(agent_id) = self.agent_id {
            tx.agent_id = agent_id;
        }
        if let Some(method) = &self.payment_method {
            tx.payment_method = Some(method.clone());
        }
        if let Some(url) = &self.receipt_url {
            tx.receipt_url = Some(url.clone());
        }
        if let Some(reason) = &self.rejection_reason {
            tx.rejection_reason = Some(reason.clone());
        }
        if let Some(resolution) = self.resolution {
            tx.resolution = Some(resolution.to_string());
        }
        if let Some(from) = self.reassigned_from {
            tx.reassigned_from = Some(from);
        }
        if let Some(expires_at) = self.expires_at {
            tx.expires_at = expires_at;
        }
        tx.updated_at = now;
    }
}

/// Read-through query over transactions, oldest first.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub agent_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// `created_at <= created_before`
    pub created_before: Option<DateTime<Utc>>,
    /// `expires_at <= expires_before`
    pub expires_before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &transaction::Model) -> bool {
        self.kind.map_or(true, |k| tx.kind == k.as_str()) &&
            self.status.map_or(true, |s| tx.status == s.as_str()) &&
            self.agent_id.map_or(true, |a| tx.agent_id == a) &&
            self.user_id.map_or(true, |u| tx.user_id == u) &&
            self.created_before.map_or(true, |t| tx.created_at <= t) &&
            self.expires_before.map_or(true, |t| tx.expires_at <= t)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayoutPatch {
    pub status: Option<PayoutStatus>,
    pub receipt_url: Option<String>,
    pub rejection_reason: Option<String>,
}

impl PayoutPatch {
    pub fn apply(&self, request: &mut agent_withdrawal_request::Model, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            request.status = status.to_string();
        }
        if let Some(url) = &self.receipt_url {
            request.receipt_url = Some(url.clone());
        }
        if let Some(reason) = &self.rejection_reason {
            request.rejection_reason = Some(reason.clone());
        }
        request.updated_at = now;
    }
}

/// Newest first.
#[derive(Debug, Clone, Default)]
pub struct PayoutFilter {
    pub agent_id: Option<Uuid>,
    pub status: Option<PayoutStatus>,
    pub limit: Option<u64>,
}

impl PayoutFilter {
    pub fn matches(&self, request: &agent_withdrawal_request::Model) -> bool {
        self.agent_id.map_or(true, |a| request.agent_id == a) &&
            self.status.map_or(true, |s| request.status == s.as_str())
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_agent(&self, agent: agent::Model) -> Result<agent::Model>;

    async fn get_agent(&self, id: Uuid) -> Result<Option<agent::Model>>;

    async fn list_agents(&self) -> Result<Vec<agent::Model>>;

    async fn update_agent_status(&self, agent_id: Uuid, patch: AgentStatusPatch) -> Result<bool>;

    async fn insert_end_user(
        &self,
        account: end_user_account::Model
    ) -> Result<end_user_account::Model>;

    async fn get_end_user(&self, id: Uuid) -> Result<Option<end_user_account::Model>>;

    /// Current value of a balance field; `NotFound` when the owning record is missing.
    async fn read_balance(&self, target: BalanceRef) -> Result<Decimal>;

    /// Sets `target = new` only if it still equals `expected`.
    async fn compare_and_swap(
        &self,
        target: BalanceRef,
        expected: Decimal,
        new: Decimal
    ) -> Result<bool>;

    /// Sets the penalty counter to `new` only if it still equals `expected`.
    async fn swap_penalty_count(&self, agent_id: Uuid, expected: i32, new: i32) -> Result<bool>;

    /// Inserts `penalty` unless a row with its id exists; returns the stored row either way.
    async fn insert_penalty(&self, penalty: agent_penalty::Model) -> Result<agent_penalty::Model>;

    async fn penalties_for_agent(&self, agent_id: Uuid) -> Result<Vec<agent_penalty::Model>>;
}

#[async_trait]
pub trait RailAccountStore: Send + Sync {
    async fn insert_rail_account(
        &self,
        account: payment_rail_account::Model
    ) -> Result<payment_rail_account::Model>;

    async fn get_rail_account(&self, id: Uuid) -> Result<Option<payment_rail_account::Model>>;

    async fn find_rail_account(
        &self,
        agent_id: Uuid,
        payment_method: &str
    ) -> Result<Option<payment_rail_account::Model>>;

    async fn find_primary_rail_account(
        &self,
        agent_id: Uuid
    ) -> Result<Option<payment_rail_account::Model>>;

    async fn list_rail_accounts(&self, agent_id: Uuid) -> Result<Vec<payment_rail_account::Model>>;

    /// Makes `account_id` the single primary account of `agent_id`.
    async fn set_primary_rail_account(&self, agent_id: Uuid, account_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, tx: transaction::Model) -> Result<transaction::Model>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<transaction::Model>>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str
    ) -> Result<Option<transaction::Model>>;

    /// Applies `patch` only if `guard` still holds. Returns whether a row changed.
    async fn update_transaction(
        &self,
        id: Uuid,
        guard: TransactionGuard,
        patch: TransactionPatch
    ) -> Result<bool>;

    async fn query_transactions(&self, filter: TransactionFilter) -> Result<Vec<transaction::Model>>;
}

/// Append-only commission and platform-profit entries.
#[async_trait]
pub trait ProfitLedger: Send + Sync {
    async fn insert_commission(&self, entry: commission::Model) -> Result<commission::Model>;

    async fn insert_admin_profit(
        &self,
        entry: admin_profit::Model
    ) -> Result<admin_profit::Model>;

    async fn commissions_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Vec<commission::Model>>;

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<commission::Model>>;

    async fn admin_profit_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Option<admin_profit::Model>>;

    async fn list_admin_profits(&self) -> Result<Vec<admin_profit::Model>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn insert_payout_request(
        &self,
        request: agent_withdrawal_request::Model
    ) -> Result<agent_withdrawal_request::Model>;

    async fn get_payout_request(&self, id: Uuid) -> Result<Option<agent_withdrawal_request::Model>>;

    /// Applies `patch` only if the request is still in `expected` status.
    async fn update_payout_request(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        patch: PayoutPatch
    ) -> Result<bool>;

    async fn query_payout_requests(
        &self,
        filter: PayoutFilter
    ) -> Result<Vec<agent_withdrawal_request::Model>>;
}

/// Persisted step cursors of multi-record workflows.
#[async_trait]
pub trait SagaLog: Send + Sync {
    async fn insert_saga(&self, saga: workflow_saga::Model) -> Result<workflow_saga::Model>;

    async fn get_saga(&self, id: Uuid) -> Result<Option<workflow_saga::Model>>;

    async fn advance_saga(
        &self,
        id: Uuid,
        step: i32,
        status: SagaStatus,
        error: Option<String>
    ) -> Result<()>;

    /// Marks the saga running at `step` only if its `updated_at` still equals
    /// `seen_updated_at`, so one worker at a time picks up a saga.
    async fn claim_saga(
        &self,
        id: Uuid,
        seen_updated_at: DateTime<Utc>,
        step: i32
    ) -> Result<bool>;

    async fn sagas_with_status(&self, status: SagaStatus) -> Result<Vec<workflow_saga::Model>>;

    /// Every saga of one transaction, oldest first.
    async fn sagas_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<workflow_saga::Model>>;

    /// Running sagas whose cursor has not moved since `updated_before`, oldest first.
    async fn stale_running_sagas(
        &self,
        updated_before: DateTime<Utc>,
        limit: Option<u64>
    ) -> Result<Vec<workflow_saga::Model>>;
}

/// Everything the engine needs from persistence.
pub trait Store: LedgerStore + RailAccountStore + TransactionStore + ProfitLedger + PayoutStore + SagaLog {}

impl<T> Store for T
    where T: LedgerStore + RailAccountStore + TransactionStore + ProfitLedger + PayoutStore + SagaLog
{}
