use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    IntoActiveModel,
    QueryFilter,
    QueryOrder,
    QuerySelect,
    TransactionTrait,
};
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

/// Postgres-backed store. Guarded writes are single `UPDATE ... WHERE` statements.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// `UPDATE e SET value_col = new WHERE id_col = id AND value_col = expected`
async fn swap_decimal<E>(
    db: &DatabaseConnection,
    id_col: E::Column,
    id: Uuid,
    value_col: E::Column,
    updated_col: E::Column,
    expected: Decimal,
    new: Decimal
) -> Result<bool>
    where E: EntityTrait
{
    let result = E::update_many()
        .col_expr(value_col, Expr::value(new))
        .col_expr(updated_col, Expr::value(Utc::now()))
        .filter(id_col.eq(id))
        .filter(value_col.eq(expected))
        .exec(db).await?;

    Ok(result.rows_affected == 1)
}

fn not_found(what: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl LedgerStore for SeaOrmStore {
    async fn insert_agent(&self, agent: agent::Model) -> Result<agent::Model> {
        Ok(agent.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<agent::Model>> {
        Ok(agent::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn list_agents(&self) -> Result<Vec<agent::Model>> {
        let agents = agent::Entity
            ::find()
            .order_by_asc(agent::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(agents)
    }

    async fn update_agent_status(&self, agent_id: Uuid, patch: AgentStatusPatch) -> Result<bool> {
        use agent::Column;

        let mut update = agent::Entity
            ::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(agent_id));

        if let Some(active) = patch.is_active {
            update = update.col_expr(Column::IsActive, Expr::value(active));
        }
        if let Some(status) = patch.verification_status {
            update = update.col_expr(Column::VerificationStatus, Expr::value(status.to_string()));
        }
        if let Some(status) = patch.online_status {
            update = update.col_expr(Column::OnlineStatus, Expr::value(status.to_string()));
        }

        let result = update.exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn insert_end_user(
        &self,
        account: end_user_account::Model
    ) -> Result<end_user_account::Model> {
        Ok(account.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_end_user(&self, id: Uuid) -> Result<Option<end_user_account::Model>> {
        Ok(end_user_account::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn read_balance(&self, target: BalanceRef) -> Result<Decimal> {
        match target {
            BalanceRef::AgentAvailable(id) | BalanceRef::AgentPlatform(id) => {
                let agent = self.get_agent(id).await?.ok_or_else(|| not_found("Agent", id))?;
                Ok(match target {
                    BalanceRef::AgentAvailable(_) => agent.available_balance,
                    _ => agent.platform_balance,
                })
            }
            BalanceRef::UserBalance(id) | BalanceRef::UserHeld(id) => {
                let user = self.get_end_user(id).await?.ok_or_else(|| not_found("User", id))?;
                Ok(match target {
                    BalanceRef::UserBalance(_) => user.balance,
                    _ => user.held_balance,
                })
            }
            BalanceRef::RailAccount(id) => {
                let account = self
                    .get_rail_account(id).await?
                    .ok_or_else(|| not_found("Payment account", id))?;
                Ok(account.current_balance)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        target: BalanceRef,
        expected: Decimal,
        new: Decimal
    ) -> Result<bool> {
        match target {
            BalanceRef::AgentAvailable(id) =>
                swap_decimal::<agent::Entity>(
                    &self.db,
                    agent::Column::Id,
                    id,
                    agent::Column::AvailableBalance,
                    agent::Column::UpdatedAt,
                    expected,
                    new
                ).await,
            BalanceRef::AgentPlatform(id) =>
                swap_decimal::<agent::Entity>(
                    &self.db,
                    agent::Column::Id,
                    id,
                    agent::Column::PlatformBalance,
                    agent::Column::UpdatedAt,
                    expected,
                    new
                ).await,
            BalanceRef::UserBalance(id) =>
                swap_decimal::<end_user_account::Entity>(
                    &self.db,
                    end_user_account::Column::Id,
                    id,
                    end_user_account::Column::Balance,
                    end_user_account::Column::UpdatedAt,
                    expected,
                    new
                ).await,
            BalanceRef::UserHeld(id) =>
                swap_decimal::<end_user_account::Entity>(
                    &self.db,
                    end_user_account::Column::Id,
                    id,
                    end_user_account::Column::HeldBalance,
                    end_user_account::Column::UpdatedAt,
                    expected,
                    new
                ).await,
            BalanceRef::RailAccount(id) =>
                swap_decimal::<payment_rail_account::Entity>(
                    &self.db,
                    payment_rail_account::Column::Id,
                    id,
                    payment_rail_account::Column::CurrentBalance,
                    payment_rail_account::Column::UpdatedAt,
                    expected,
                    new
                ).await,
        }
    }

    async fn swap_penalty_count(&self, agent_id: Uuid, expected: i32, new: i32) -> Result<bool> {
        let result = agent::Entity
            ::update_many()
            .col_expr(agent::Column::PenaltyCount, Expr::value(new))
            .col_expr(agent::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(agent::Column::Id.eq(agent_id))
            .filter(agent::Column::PenaltyCount.eq(expected))
            .exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn insert_penalty(&self, penalty: agent_penalty::Model) -> Result<agent_penalty::Model> {
        if let Some(existing) = agent_penalty::Entity::find_by_id(penalty.id).one(&self.db).await? {
            return Ok(existing);
        }
        Ok(penalty.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn penalties_for_agent(&self, agent_id: Uuid) -> Result<Vec<agent_penalty::Model>> {
        let penalties = agent_penalty::Entity
            ::find()
            .filter(agent_penalty::Column::AgentId.eq(agent_id))
            .order_by_asc(agent_penalty::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(penalties)
    }
}

#[async_trait]
impl RailAccountStore for SeaOrmStore {
    async fn insert_rail_account(
        &self,
        account: payment_rail_account::Model
    ) -> Result<payment_rail_account::Model> {
        Ok(account.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_rail_account(&self, id: Uuid) -> Result<Option<payment_rail_account::Model>> {
        Ok(payment_rail_account::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn find_rail_account(
        &self,
        agent_id: Uuid,
        payment_method: &str
    ) -> Result<Option<payment_rail_account::Model>> {
        let account = payment_rail_account::Entity
            ::find()
            .filter(payment_rail_account::Column::AgentId.eq(agent_id))
            .filter(payment_rail_account::Column::PaymentMethod.eq(payment_method.to_lowercase()))
            .order_by_desc(payment_rail_account::Column::IsPrimary)
            .order_by_asc(payment_rail_account::Column::CreatedAt)
            .one(&self.db).await?;
        Ok(account)
    }

    async fn find_primary_rail_account(
        &self,
        agent_id: Uuid
    ) -> Result<Option<payment_rail_account::Model>> {
        let account = payment_rail_account::Entity
            ::find()
            .filter(payment_rail_account::Column::AgentId.eq(agent_id))
            .filter(payment_rail_account::Column::IsPrimary.eq(true))
            .one(&self.db).await?;
        Ok(account)
    }

    async fn list_rail_accounts(&self, agent_id: Uuid) -> Result<Vec<payment_rail_account::Model>> {
        let accounts = payment_rail_account::Entity
            ::find()
            .filter(payment_rail_account::Column::AgentId.eq(agent_id))
            .order_by_asc(payment_rail_account::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(accounts)
    }

    async fn set_primary_rail_account(&self, agent_id: Uuid, account_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        // Clear first: the partial unique index allows one primary per agent
        payment_rail_account::Entity
            ::update_many()
            .col_expr(payment_rail_account::Column::IsPrimary, Expr::value(false))
            .col_expr(payment_rail_account::Column::UpdatedAt, Expr::value(now))
            .filter(payment_rail_account::Column::AgentId.eq(agent_id))
            .filter(payment_rail_account::Column::IsPrimary.eq(true))
            .exec(&txn).await?;

        let result = payment_rail_account::Entity
            ::update_many()
            .col_expr(payment_rail_account::Column::IsPrimary, Expr::value(true))
            .col_expr(payment_rail_account::Column::UpdatedAt, Expr::value(now))
            .filter(payment_rail_account::Column::Id.eq(account_id))
            .filter(payment_rail_account::Column::AgentId.eq(agent_id))
            .exec(&txn).await?;

        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Err(not_found("Payment account", account_id));
        }

        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for SeaOrmStore {
    async fn insert_transaction(&self, tx: transaction::Model) -> Result<transaction::Model> {
        Ok(tx.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<transaction::Model>> {
        Ok(transaction::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str
    ) -> Result<Option<transaction::Model>> {
        let tx = transaction::Entity
            ::find()
            .filter(transaction::Column::Reference.eq(reference))
            .one(&self.db).await?;
        Ok(tx)
    }

    async fn update_transaction(
        &self,
        id: Uuid,
        guard: TransactionGuard,
        patch: TransactionPatch
    ) -> Result<bool> {
        use transaction::Column;

        let mut update = transaction::Entity
            ::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(guard.status.as_str()));

        if let Some(agent_id) = guard.agent_id {
            update = update.filter(Column::AgentId.eq(agent_id));
        }
        if let Some(status) = patch.status {
            update = update.col_expr(Column::Status, Expr::value(status.to_string()));
        }
        if let Some(agent_id) = patch.agent_id {
            update = update.col_expr(Column::AgentId, Expr::value(agent_id));
        }
        if let Some(method) = patch.payment_method {
            update = update.col_expr(Column::PaymentMethod, Expr::value(method));
        }
        if let Some(url) = patch.receipt_url {
            update = update.col_expr(Column::ReceiptUrl, Expr::value(url));
        }
        if let Some(reason) = patch.rejection_reason {
            update = update.col_expr(Column::RejectionReason, Expr::value(reason));
        }
        if let Some(resolution) = patch.resolution {
            update = update.col_expr(Column::Resolution, Expr::value(resolution.to_string()));
        }
        if let Some(from) = patch.reassigned_from {
            update = update.col_expr(Column::ReassignedFrom, Expr::value(from));
        }
        if let Some(expires_at) = patch.expires_at {
            update = update.col_expr(Column::ExpiresAt, Expr::value(expires_at));
        }

        let result = update.exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn query_transactions(&self, filter: TransactionFilter) -> Result<Vec<transaction::Model>> {
        use transaction::Column;

        let mut query = transaction::Entity::find();

        if let Some(kind) = filter.kind {
            query = query.filter(Column::Kind.eq(kind.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(agent_id) = filter.agent_id {
            query = query.filter(Column::AgentId.eq(agent_id));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        if let Some(before) = filter.created_before {
            query = query.filter(Column::CreatedAt.lte(before));
        }
        if let Some(before) = filter.expires_before {
            query = query.filter(Column::ExpiresAt.lte(before));
        }

        query = query.order_by_asc(Column::CreatedAt).order_by_asc(Column::Id);

        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query.all(&self.db).await?)
    }
}

#[async_trait]
impl ProfitLedger for SeaOrmStore {
    async fn insert_commission(&self, entry: commission::Model) -> Result<commission::Model> {
        Ok(entry.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn insert_admin_profit(
        &self,
        entry: admin_profit::Model
    ) -> Result<admin_profit::Model> {
        Ok(entry.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn commissions_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Vec<commission::Model>> {
        let entries = commission::Entity
            ::find()
            .filter(commission::Column::TransactionId.eq(transaction_id))
            .all(&self.db).await?;
        Ok(entries)
    }

    async fn commissions_for_agent(&self, agent_id: Uuid) -> Result<Vec<commission::Model>> {
        let entries = commission::Entity
            ::find()
            .filter(commission::Column::AgentId.eq(agent_id))
            .order_by_desc(commission::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(entries)
    }

    async fn admin_profit_for_transaction(
        &self,
        transaction_id: Uuid
    ) -> Result<Option<admin_profit::Model>> {
        let entry = admin_profit::Entity
            ::find()
            .filter(admin_profit::Column::TransactionId.eq(transaction_id))
            .one(&self.db).await?;
        Ok(entry)
    }

    async fn list_admin_profits(&self) -> Result<Vec<admin_profit::Model>> {
        let entries = admin_profit::Entity
            ::find()
            .order_by_desc(admin_profit::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(entries)
    }
}

#[async_trait]
impl PayoutStore for SeaOrmStore {
    async fn insert_payout_request(
        &self,
        request: agent_withdrawal_request::Model
    ) -> Result<agent_withdrawal_request::Model> {
        Ok(request.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_payout_request(&self, id: Uuid) -> Result<Option<agent_withdrawal_request::Model>> {
        Ok(agent_withdrawal_request::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn update_payout_request(
        &self,
        id: Uuid,
        expected: PayoutStatus,
        patch: PayoutPatch
    ) -> Result<bool> {
        use agent_withdrawal_request::Column;

        let mut update = agent_withdrawal_request::Entity
            ::update_many()
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(expected.as_str()));

        if let Some(status) = patch.status {
            update = update.col_expr(Column::Status, Expr::value(status.to_string()));
        }
        if let Some(url) = patch.receipt_url {
            update = update.col_expr(Column::ReceiptUrl, Expr::value(url));
        }
        if let Some(reason) = patch.rejection_reason {
            update = update.col_expr(Column::RejectionReason, Expr::value(reason));
        }

        let result = update.exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn query_payout_requests(
        &self,
        filter: PayoutFilter
    ) -> Result<Vec<agent_withdrawal_request::Model>> {
        use agent_withdrawal_request::Column;

        let mut query = agent_withdrawal_request::Entity::find();

        if let Some(agent_id) = filter.agent_id {
            query = query.filter(Column::AgentId.eq(agent_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }

        query = query.order_by_desc(Column::CreatedAt);

        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query.all(&self.db).await?)
    }
}

#[async_trait]
impl SagaLog for SeaOrmStore {
    async fn insert_saga(&self, saga: workflow_saga::Model) -> Result<workflow_saga::Model> {
        Ok(saga.into_active_model().reset_all().insert(&self.db).await?)
    }

    async fn get_saga(&self, id: Uuid) -> Result<Option<workflow_saga::Model>> {
        Ok(workflow_saga::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn advance_saga(
        &self,
        id: Uuid,
        step: i32,
        status: SagaStatus,
        error: Option<String>
    ) -> Result<()> {
        use workflow_saga::Column;

        let result = workflow_saga::Entity
            ::update_many()
            .col_expr(Column::Step, Expr::value(step))
            .col_expr(Column::Status, Expr::value(status.to_string()))
            .col_expr(Column::Error, Expr::value(error))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .exec(&self.db).await?;

        if result.rows_affected == 0 {
            return Err(not_found("Saga", id));
        }
        Ok(())
    }

    async fn claim_saga(
        &self,
        id: Uuid,
        seen_updated_at: DateTime<Utc>,
        step: i32
    ) -> Result<bool> {
        use workflow_saga::Column;

        let result = workflow_saga::Entity
            ::update_many()
            .col_expr(Column::Step, Expr::value(step))
            .col_expr(Column::Status, Expr::value(SagaStatus::Running.to_string()))
            .col_expr(Column::Error, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Id.eq(id))
            .filter(Column::UpdatedAt.eq(seen_updated_at))
            .exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn sagas_with_status(&self, status: SagaStatus) -> Result<Vec<workflow_saga::Model>> {
        let sagas = workflow_saga::Entity
            ::find()
            .filter(workflow_saga::Column::Status.eq(status.as_str()))
            .order_by_asc(workflow_saga::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(sagas)
    }

    async fn sagas_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<workflow_saga::Model>> {
        let sagas = workflow_saga::Entity
            ::find()
            .filter(workflow_saga::Column::TransactionId.eq(transaction_id))
            .order_by_asc(workflow_saga::Column::CreatedAt)
            .all(&self.db).await?;
        Ok(sagas)
    }

    async fn stale_running_sagas(
        &self,
        updated_before: DateTime<Utc>,
        limit: Option<u64>
    ) -> Result<Vec<workflow_saga::Model>> {
        use workflow_saga::Column;

        let mut query = workflow_saga::Entity
            ::find()
            .filter(Column::Status.eq(SagaStatus::Running.as_str()))
            .filter(Column::UpdatedAt.lte(updated_before))
            .order_by_asc(Column::CreatedAt);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(&self.db).await?)
    }
}
