use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use sea_orm::DbErr;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AgentStatusPatch,
    BalanceRef,
    LedgerStore,
    PayoutFilter,
    PayoutPatch,
    PayoutStore,
    ProfitLedger,
    RailAccountStore,
    SagaLog,
    TransactionFilter,
    TransactionGuard,
    TransactionPatch,
    TransactionStore,
};
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
use crate::enums::{ PayoutStatus, SagaStatus };
use crate::error::{ AppError, Result };

/// Store operation that can be made to fail on purpose in fault drills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    AgentAvailableWrite,
    AgentPlatformWrite,
    UserBalanceWrite,
    UserHeldWrite,
    RailAccountWrite,
    CommissionInsert,
    AdminProfitInsert,
    PayoutInsert,
    PenaltyInsert,
    SagaInsert,
}

impl FaultPoint {
    fn for_balance(target: &BalanceRef) -> Self {
        match target {
            BalanceRef::AgentAvailable(_) => FaultPoint::AgentAvailableWrite,
            BalanceRef::AgentPlatform(_) => FaultPoint::AgentPlatformWrite,
            BalanceRef::UserBalance(_) => FaultPoint::UserBalanceWrite,
            BalanceRef::UserHeld(_) => FaultPoint::UserHeldWrite,
            BalanceRef::RailAccount(_) => FaultPoint::RailAccountWrite,
        }
    }
}

#[derive(Default)]
struct State {
    agents: HashMap<Uuid, agent::Model>,
    penalties: Vec<agent_penalty::Model>,
    end_users: HashMap<Uuid, end_user_account::Model>,
    rail_accounts: HashMap<Uuid, payment_rail_account::Model>,
    transactions: HashMap<Uuid, transaction::Model>,
    commissions: Vec<commission::Model>,
    admin_profits: Vec<admin_profit::Model>,
    payouts: HashMap<Uuid, agent_withdrawal_request::Model>,
    sagas: HashMap<Uuid, workflow_saga::Model>,
}

/// Process-local store used by tests and database-less runs.
///
/// Each operation holds the lock for its whole read-check-write, which gives
/// the same per-record atomicity as a conditional `UPDATE`.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    faults: Mutex<HashMap<FaultPoint, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls hitting `point` fail with a database error.
    pub fn fail_next(&self, point: FaultPoint, times: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point, times);
        }
    }

    fn check_fault(&self, point: FaultPoint) -> Result<()> {
        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AppError::Database(DbErr::Custom(format!("injected fault at {:?}", point))))
            }
            _ => Ok(()),
        }
    }
}

fn not_found(what: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_agent(&self, agent: agent::Model) -> Result<agent::Model> {
        let mut state = self.state.write().await;
        state.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<agent::Model>> {
        Ok(self.state.read().await.agents.get(&id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<agent::Model>> {
        let mut agents: Vec<_> = self.state.read().await.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn update_agent_status(&self, agent_id: Uuid, patch: AgentStatusPatch) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.agents.get_mut(&agent_id) {
            Some(agent) => {
                patch.apply(agent, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_end_user(
        &self,
        account: end_user_account::Model
    ) -> Result<end_user_account::Model> {
        let mut state = self.state.write().await;
        state.end_users.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_end_user(&self, id: Uuid) -> Result<Option<end_user_account::Model>> {
        Ok(self.state.read().await.end_users.get(&id).cloned())
    }

    async fn read_balance(&self, target: BalanceRef) -> Result<Decimal> {
        let state = self.state.read().await;
        let value = match target {
            BalanceRef::AgentAvailable(id) =>
                state.agents.get(&id).map(|a| a.available_balance).ok_or_else(|| not_found("Agent", id))?,
            BalanceRef::AgentPlatform(id) =>
                state.agents.get(&id).map(|a| a.platform_balance).ok_or_else(|| not_found("Agent", id))?,
            BalanceRef::UserBalance(id) =>
                state.end_users.get(&id).map(|u| u.balance).ok_or_else(|| not_found("User", id))?,
            BalanceRef::UserHeld(id) =>
                state.end_users.get(&id).map(|u| u.held_balance).ok_or_else(|| not_found("User", id))?,
            BalanceRef::RailAccount(id) =>
                state.rail_accounts
                    .get(&id)
                    .map(|r| r.current_balance)
                    .ok_or_else(|| not_found("Payment account", id))?,
        };
        Ok(value)
    }

    async fn compare_and_swap(
        &self,
        target: BalanceRef,
        expected: Decimal,
        new: Decimal
    ) -> Result<bool> {
        self.check_fault(FaultPoint::for_balance(&target))?;

        let now = Utc::now();
        let mut state = self.state.write().await;
        let (slot, updated_at) = match target {
            BalanceRef::AgentAvailable(id) => {
                let a = state.agents.get_mut(&id).ok_or_else(|| not_found("Agent", id))?;
                (&mut a.available_balance, &mut a.updated_at)
            }
            BalanceRef::AgentPlatform(id) => {
                let a = state.agents.get_mut(&id).ok_or_else(|| not_found("Agent", id))?;
                (&mut a.platform_balance, &mut a.updated_at)
            }
            BalanceRef::UserBalance(id) => {
                let u = state.end_users.get_mut(&id).ok_or_else(|| not_found("User", id))?;
                (&mut u.balance, &mut u.updated_at)
            }
            BalanceRef::UserHeld(id) => {
                let u = state.end_users.get_mut(&id).ok_or_else(|| not_found("User", id))?;
                (&mut u.held_balance, &mut u.updated_at)
            }
            BalanceRef::RailAccount(id) => {
                let r = state.rail_accounts
                    .get_mut(&id)
                    .ok_or_else(|| not_found("Payment account", id))?;
                (&mut r.current_balance, &mut r.updated_at)
            }
        };

        if *slot != expected {
            return Ok(false);
        }
        *slot = new;
        *updated_at = now;
        Ok(true)
    }

    async fn swap_penalty_count(&self, agent_id: Uuid, expected: i32, new: i32) -> Result<bool> {
        let mut state = self.state.write().await;
        let agent = state.agents.get_mut(&agent_id).ok_or_else(|| not_found("Agent", agent_id))?;
        if agent.penalty_count != expected {
            return Ok(false);
        }
        agent.penalty_count = new;
        agent.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_penalty(&self, penalty: agent_penalty::Model) -> Result<agent_penalty::Model> {
        self.check_fault(FaultPoint::PenaltyInsert)?;
        let mut state = self.state.write().await;
        if let Some(existing) = state.penalties.iter().find(|p| p.id == penalty.id) {
            return Ok(existing.clone());
        }
        state.penalties.push(penalty.clone());
        Ok(penalty)
    }

    async fn penalties_for_agent(&self, agent_id: Uuid) -> Result<Vec<agent_penalty::Model>> {
        Ok(
            self.state
                .read().await
                .penalties.iter()
                .filter(|p| p.agent_id == agent_id)
                .cloned()
                .collect()
        )
    }
}

#[async_trait]
impl RailAccountStore for MemoryStore {
    async fn insert_rail_account(
        &self,
        account: payment_rail_account::Model
    ) -> Result<payment_rail_account::Model> {
        let mut state = self.state.write().await;
        state.rail_accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_rail_account(&self, id: Uuid) -> Result<Option<payment_rail_account::Model>> {
        Ok(self.state.read().await.rail_accounts.get(&id).cloned())
    }

    async fn find_rail_account(
        &self,
        agent_id: Uuid,
        payment_method: &str
    ) -> Result<Option<payment_rail_account::Model>> {
        let state = self.state.read().await;
        let mut matches: Vec<_> = state.rail_accounts
            .values()
            .filter(|r| r.agent_id == agent_id && r.payment_method.eq_ignore_ascii_case(payment_method))
            .cloned()
            .collect();
        // Prefer the primary account, then the oldest
        matches.sort_by_key(|r| (!r.is_primary, r.created_at));
        Ok(matches.into_iter().next())
    }

    async fn find_primary_rail_account(
        &self,
        agent_id: Uuid
    ) -> Result<Option<payment_rail_account::Model>> {
        Ok(
            self.state
                .read().await
                .rail_accounts.values()
                .find(|r| r.agent_id == agent_id && r.is_primary)
                .cloned()
        )
    }

    async fn list_rail_accounts(&self, agent_id: Uuid) -> Result<Vec<payment_rail_account::Model>> {
        let mut accounts: Vec<_> = self.state
            .read().await
            .rail_accounts.values()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|r| r.created_at);
        Ok(accounts)
    }

    async fn set_primary_rail_account(&self, agent_id: Uuid, account_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        match state.rail_accounts.get(&account_id) {
            Some(r) if r.agent_id == agent_id => {}
            _ => {
                return Err(not_found("Payment account", account_id));
            }
        }
        let now = Utc::now();
        for account in state.rail_accounts.values_mut().filter(|r| r.agent_id == agent_id) {
            let primary = account.id == account_id;
            if account.is_primary != primary {
                account.is_primary = primary;
                account.updated_at = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, tx: transaction::Model) -> Result<transaction::Model> {
        let mut state = self.state.write().await;
        if state.transactions.values().any(|t| t.reference == tx.reference) {
            return Err(
                AppError::Database(
                    DbErr::Custom(format!("duplicate transaction reference {}", tx.reference))
                )
            );
        }
        state.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<transaction::Model>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str
    ) -> Result<Option<transaction::Model>> {
        Ok(
            self.state
                .read().await
                .transactions.values()
                .find(|t| t.reference == reference)
                .cloned()
        )
    }

    async fn update_transaction(
        &self,
        id: Uuid,
        guard: TransactionGuard,
        patch: TransactionPatch
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.transactions.get_mut(&id) {
            Some(tx) if guard.matches(tx) => {
                patch.apply(tx, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query_transactions(&self, filter: TransactionFilter) -> Result<Vec<transaction::Model>> {
        let state = self.state.read().await;
        let mut found: Vec<_> = state.transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by_key(|t| (t.created_at, t.id));
        if let Some(limit) = filter.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }
}

#[async_trait]
impl ProfitLedger for MemoryStore {
    async fn insert_commission(&self, entry: commission::Model) -> Result<commission::Model> {
        self.check_fault(FaultPoint::CommissionInsert)?;
        let mut state = self.state.write().await;
        if
            state.commissions
                .iter()
                .any(|c| c.transaction_id == entry.transaction_id && c.kind == entry.kind)
        {
            return Err(
                AppError::Database(
                    DbErr::Custom(
                        format!("duplicate {} for transaction {}", entry.kind, entry.transaction_id)
                    )
                )
            );
        }
        state.commissions.push(entry.clone());
        Ok(entry)
    }

    async fn insert_admin_profit(
        &self,
        entry: admin_profit::Model
    ) -> Result<admin_profit::Model> {
        self.check_fault(FaultPoint::AdminProfitInsert)?;
        let mut state = self.state.write().await;
        if state.admin_profits.iter().any(|p| p.transaction_id == entry.transaction_id) {
            return Err(
                AppError::Database(
                    DbErr::Custom(format!("duplicate profit for transaction {}", entry.transaction_id))
                )
            );
        }
        state.admin_profits.push(entry.clone());
        Ok(entry)
    }

    async fn commissions_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Vec<commission::Model>> {
        Ok(
            self.state
                .read().await
                .commissions.iter()
                .filter(|c| c.transaction_id == transaction_id)
                .cloned()
                .collect()
        )
    }

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<commission::Model>> {
        Ok(
            self.state
                .read().await
                .commissions.iter()
                .filter(|c| c.agent_id == agent_id)
                .cloned()
                .collect()
        )
    }

    async fn admin_profit_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Option<admin_profit::Model>> {
        Ok(
            self.state
                .read().await
                .admin_profits.iter()
                .find(|p| p.transaction_id == transaction_id)
                .cloned()
        )
    }

    async fn list_admin_profits(&self) -> Result<Vec<admin_profit::Model>> {
        Ok(self.state.read().await.admin_profits.clone())
    }
}

#[async_trait]
impl PayoutStore for MemoryStore {
    async fn insert_payout_request(
        &self,
        request: agent_withdrawal_request::Model
    ) -> Result<agent_withdrawal_request::Model> {
        self.check_fault(FaultPoint::PayoutInsert)?;
        let mut state = self.state.write().await;
        state.payouts.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_payout_request(&self, id: Uuid) -> Result<Option<agent_withdrawal_request::Model>> {
        Ok(self.state.read().await.payouts.get(&id).cloned())
    }

    async fn update_payout_request(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        patch: PayoutPatch
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.payouts.get_mut(&id) {
            Some(request) if request.status == expected.as_str() => {
                patch.apply(request, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query_payout_requests(
        &self,
        filter: PayoutFilter
    ) -> Result<Vec<agent_withdrawal_request::Model>> {
        let state = self.state.read().await;
        let mut found: Vec<_> = state.payouts
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }
}

#[async_trait]
impl SagaLog for MemoryStore {
    async fn insert_saga(&self, saga: workflow_saga::Model) -> Result<workflow_saga::Model> {
        self.check_fault(FaultPoint::SagaInsert)?;
        self.state.write().await.sagas.insert(saga.id, saga.clone());
        Ok(saga)
    }

    async fn get_saga(&self, id: Uuid) -> Result<Option<workflow_saga::Model>> {
        Ok(self.state.read().await.sagas.get(&id).cloned())
    }

    async fn advance_saga(
        &self,
        id: Uuid,
        step: i32,
        status: SagaStatus,
        error: Option<String>
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let saga = state.sagas.get_mut(&id).ok_or_else(|| not_found("Saga", id))?;
        saga.step = step;
        saga.status = status.to_string();
        saga.error = error;
        saga.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_saga(
        &self,
        id: Uuid,
        seen_updated_at: DateTime<Utc>,
        step: i32
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let saga = state.sagas.get_mut(&id).ok_or_else(|| not_found("Saga", id))?;
        if saga.updated_at != seen_updated_at {
            return Ok(false);
        }
        saga.step = step;
        saga.status = SagaStatus::Running.to_string();
        saga.error = None;
        saga.updated_at = Utc::now();
        Ok(true)
    }

    async fn sagas_with_status(&self, status: SagaStatus) -> Result<Vec<workflow_saga::Model>> {
        let mut sagas: Vec<_> = self.state
            .read().await
            .sagas.values()
            .filter(|s| s.status == status.as_str())
            .cloned()
            .collect();
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }

    async fn sagas_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<workflow_saga::Model>> {
        let mut sagas: Vec<_> = self.state
            .read().await
            .sagas.values()
            .filter(|s| s.transaction_id == transaction_id)
            .cloned()
            .collect();
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }

    async fn stale_running_sagas(
        &self,
        updated_before: DateTime<Utc>,
        limit: Option<u64>
    ) -> Result<Vec<workflow_saga::Model>> {
        let mut sagas: Vec<_> = self.state
            .read().await
            .sagas.values()
            .filter(|s| s.status == SagaStatus::Running.as_str() && s.updated_at <= updated_before)
            .cloned()
            .collect();
        sagas.sort_by_key(|s| s.created_at);
        if let Some(limit) = limit {
            sagas.truncate(limit as usize);
        }
        Ok(sagas)
    }
}
