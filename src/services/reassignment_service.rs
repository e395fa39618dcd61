use std::sync::Arc;

use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use tracing::{ info, warn };
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::{ agent, agent_penalty, transaction, workflow_saga };
use crate::enums::{ OnlineStatus, VerificationStatus, Workflow };
use crate::error::{ AppError, Result };
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::saga::SagaCursor;
use crate::store::{ LedgerStore, Store, TransactionGuard, TransactionPatch, TransactionStore };

/// Steps of a reassignment, as recorded in its saga cursor.
pub const STEP_REASSIGNED: i32 = 1;
pub const STEP_PENALTY_RECORDED: i32 = 2;
pub const STEP_PENALTY_COUNTED: i32 = 3;

const PENALTY_REASON: &str = "Withdrawal not processed before its deadline";

/// Picks the agent that should handle a withdrawal.
pub struct AgentSelector {
    store: Arc<dyn Store>,
    max_penalties: i32,
}

impl AgentSelector {
    pub fn new(store: Arc<dyn Store>, settings: &EngineSettings) -> Self {
        Self {
            store,
            max_penalties: settings.max_agent_penalties,
        }
    }

    pub fn is_eligible(agent: &agent::Model, amount: Decimal, max_penalties: i32) -> bool {
        agent.is_active &&
            agent.verification_status == VerificationStatus::Verified.as_str() &&
            agent.online_status == OnlineStatus::Online.as_str() &&
            agent.penalty_count < max_penalties &&
            agent.available_balance >= amount
    }

    /// Eligible agent with the fewest penalties, then the most available
    /// float, then the lowest id. `None` when nobody qualifies.
    pub async fn select(&self, amount: Decimal, exclude: &[Uuid]) -> Result<Option<agent::Model>> {
        let mut candidates: Vec<agent::Model> = self.store
            .list_agents().await?
            .into_iter()
            .filter(|a| !exclude.contains(&a.id))
            .filter(|a| Self::is_eligible(a, amount, self.max_penalties))
            .collect();

        candidates.sort_by(|a, b| {
            a.penalty_count
                .cmp(&b.penalty_count)
                .then_with(|| b.available_balance.cmp(&a.available_balance))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(candidates.into_iter().next())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignOutcome {
    Reassigned {
        transaction_id: Uuid,
        from: Uuid,
        to: Uuid,
    },
    /// No eligible agent; the deadline was pushed back.
    Deferred {
        transaction_id: Uuid,
        retry_at: DateTime<Utc>,
    },
    /// The withdrawal was acted on or moved by someone else first.
    Skipped,
}

/// Moves withdrawals whose deadline passed to another agent and penalises the previous one.
pub struct ReassignmentCoordinator {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    settings: EngineSettings,
    selector: AgentSelector,
}

impl ReassignmentCoordinator {
    pub fn new(store: Arc<dyn Store>, feed: ChangeFeed, settings: EngineSettings) -> Self {
        let selector = AgentSelector::new(store.clone(), &settings);
        Self {
            store,
            feed,
            settings,
            selector,
        }
    }

    pub async fn reassign(
        &self,
        tx: &transaction::Model,
        now: DateTime<Utc>
    ) -> Result<ReassignOutcome> {
        if !tx.is_pending() {
            return Ok(ReassignOutcome::Skipped);
        }

        let from = tx.agent_id;
        let guard = TransactionGuard::pending_for(from);

        let Some(next) = self.selector.select(tx.amount, &[from]).await? else {
            let retry_at = now + self.settings.reassign_retry;
            let patch = TransactionPatch {
                expires_at: Some(retry_at),
                ..Default::default()
            };
            if !self.store.update_transaction(tx.id, guard, patch).await? {
                return Ok(ReassignOutcome::Skipped);
            }
            warn!(transaction_id = %tx.id, agent_id = %from, %retry_at, "no eligible agent for expired withdrawal");
            return Ok(ReassignOutcome::Deferred { transaction_id: tx.id, retry_at });
        };

        let mut cursor = SagaCursor::begin(
            self.store.clone(),
            self.feed.clone(),
            tx.id,
            from,
            Workflow::WithdrawalReassignment,
            0
        ).await?;

        let patch = TransactionPatch {
            agent_id: Some(next.id),
            reassigned_from: Some(from),
            expires_at: Some(now + self.settings.withdrawal_timeout),
            ..Default::default()
        };
        let won = match self.store.update_transaction(tx.id, guard, patch).await {
            Ok(won) => won,
            Err(e) => {
                cursor.abandon(&e.to_string()).await;
                return Err(e);
            }
        };
        if !won {
            cursor.abandon("withdrawal moved on before reassignment").await;
            return Ok(ReassignOutcome::Skipped);
        }

        info!(transaction_id = %tx.id, from = %from, to = %next.id, "withdrawal reassigned");
        self.feed.publish(ChangeEvent::WithdrawalReassigned {
            transaction_id: tx.id,
            from_agent: from,
            to_agent: next.id,
            amount: tx.amount,
        });

        let steps = async {
            cursor.advance(STEP_REASSIGNED).await?;
            self.run_penalty_steps(&mut cursor, from, tx.id).await
        };
        if let Err(e) = steps.await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        Ok(ReassignOutcome::Reassigned {
            transaction_id: tx.id,
            from,
            to: next.id,
        })
    }

    /// Records the penalty of a reassignment whose move already committed.
    pub async fn resume(&self, saga: &workflow_saga::Model) -> Result<transaction::Model> {
        let tx = self.store
            .get_transaction(saga.transaction_id).await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {} not found", saga.transaction_id))
            })?;

        let mut cursor = SagaCursor::reopen(self.store.clone(), self.feed.clone(), saga).await?;
        if let Err(e) = self.run_penalty_steps(&mut cursor, saga.agent_id, tx.id).await {
            return Err(cursor.tear(e).await);
        }
        cursor.complete().await;

        info!(saga_id = %saga.id, transaction_id = %tx.id, agent_id = %saga.agent_id, "reassignment penalty recorded on resume");
        Ok(tx)
    }

    async fn run_penalty_steps(
        &self,
        cursor: &mut SagaCursor,
        agent_id: Uuid,
        transaction_id: Uuid
    ) -> Result<()> {
        // One penalty row per reassignment, keyed by its saga.
        if cursor.step() < STEP_PENALTY_RECORDED {
            self.store.insert_penalty(agent_penalty::Model {
                id: cursor.id(),
                agent_id,
                transaction_id,
                reason: PENALTY_REASON.to_string(),
                created_at: Utc::now(),
            }).await?;
            cursor.advance(STEP_PENALTY_RECORDED).await?;
        }

        if cursor.step() < STEP_PENALTY_COUNTED {
            self.sync_penalty_count(agent_id).await?;
            cursor.advance(STEP_PENALTY_COUNTED).await?;
        }

        Ok(())
    }

    /// Brings the agent's counter in line with its penalty rows. Re-running it
    /// never counts a penalty twice.
    async fn sync_penalty_count(&self, agent_id: Uuid) -> Result<()> {
        let attempts = self.settings.cas_max_attempts.max(1);
        for _ in 0..attempts {
            let agent = self.store
                .get_agent(agent_id).await?
                .ok_or_else(|| AppError::NotFound(format!("Agent {} not found", agent_id)))?;
            let recorded = self.store.penalties_for_agent(agent_id).await?.len() as i32;

            if agent.penalty_count == recorded {
                return Ok(());
            }
            if self.store.swap_penalty_count(agent_id, agent.penalty_count, recorded).await? {
                info!(%agent_id, penalties = recorded, "agent penalised");
                return Ok(());
            }
        }

        Err(
            AppError::StaleTransition(
                format!("Penalty counter of agent {} kept changing after {} attempts", agent_id, attempts)
            )
        )
    }
}
