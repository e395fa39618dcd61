//! Persisted step cursors for multi-record workflows.
//!
//! A workflow writes several records that cannot share a database transaction.
//! Its cursor records the last committed step, so a failure part-way through
//! leaves a `torn` saga that names exactly where to resume. A process that dies
//! mid-workflow leaves the saga `running`; once its cursor has been idle past
//! the staleness window it is resumed the same way.

use std::sync::Arc;

use chrono::Utc;
use tracing::{ error, warn };
use uuid::Uuid;

use crate::db::entity::workflow_saga;
use crate::enums::{ SagaStatus, Workflow };
use crate::error::{ AppError, Result };
use crate::notify::{ ChangeEvent, ChangeFeed };
use crate::store::{ SagaLog, Store };

pub struct SagaCursor {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    id: Uuid,
    transaction_id: Uuid,
    workflow: Workflow,
    step: i32,
}

impl SagaCursor {
    /// Records a new running saga positioned at `step`.
    pub async fn begin(
        store: Arc<dyn Store>,
        feed: ChangeFeed,
        transaction_id: Uuid,
        agent_id: Uuid,
        workflow: Workflow,
        step: i32
    ) -> Result<Self> {
        let now = Utc::now();
        let saga = store.insert_saga(workflow_saga::Model {
            id: Uuid::new_v4(),
            transaction_id,
            agent_id,
            workflow: workflow.to_string(),
            step,
            status: SagaStatus::Running.to_string(),
            error: None,
            created_at: now,
            updated_at: now,
        }).await?;

        Ok(Self {
            store,
            feed,
            id: saga.id,
            transaction_id,
            workflow,
            step,
        })
    }

    /// Picks a torn or stalled running saga back up at its last committed step.
    /// Deciding whether a running saga is stalled is up to the caller.
    pub async fn reopen(
        store: Arc<dyn Store>,
        feed: ChangeFeed,
        saga: &workflow_saga::Model
    ) -> Result<Self> {
        let status: SagaStatus = saga.status.parse()?;
        if !matches!(status, SagaStatus::Torn | SagaStatus::Running) {
            return Err(
                AppError::InvalidInput(format!("Saga {} is {} and cannot be resumed", saga.id, status))
            );
        }

        if !store.claim_saga(saga.id, saga.updated_at, saga.step).await? {
            return Err(
                AppError::StaleTransition(format!("Saga {} was picked up by another worker", saga.id))
            );
        }

        Ok(Self {
            store,
            feed,
            id: saga.id,
            transaction_id: saga.transaction_id,
            workflow: saga.workflow.parse()?,
            step: saga.step,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Marks `step` as committed.
    pub async fn advance(&mut self, step: i32) -> Result<()> {
        // Kept in memory first so a failed persist still tears at the right step.
        self.step = step;
        self.store.advance_saga(self.id, step, SagaStatus::Running, None).await
    }

    pub async fn complete(self) {
        if
            let Err(e) = self.store.advance_saga(
                self.id,
                self.step,
                SagaStatus::Completed,
                None
            ).await
        {
            warn!(saga_id = %self.id, "all steps committed but saga not closed: {}", e);
        }
    }

    /// Closes a saga that never got past its status transition.
    pub async fn abandon(self, reason: &str) {
        if
            let Err(e) = self.store.advance_saga(
                self.id,
                self.step,
                SagaStatus::Abandoned,
                Some(reason.to_string())
            ).await
        {
            warn!(saga_id = %self.id, "could not close abandoned saga: {}", e);
        }
    }

    /// Records the failure as an incident and converts it into `PartialFailure`.
    pub async fn tear(self, cause: AppError) -> AppError {
        let message = cause.to_string();

        error!(
            saga_id = %self.id,
            transaction_id = %self.transaction_id,
            workflow = %self.workflow,
            step = self.step,
            "INCIDENT: workflow torn after committed step: {}",
            message
        );

        if
            let Err(e) = self.store.advance_saga(
                self.id,
                self.step,
                SagaStatus::Torn,
                Some(message.clone())
            ).await
        {
            error!(saga_id = %self.id, step = self.step, "could not persist torn saga: {}", e);
        }

        self.feed.publish(ChangeEvent::PartialFailure {
            saga_id: self.id,
            transaction_id: self.transaction_id,
            step: self.step,
        });

        AppError::PartialFailure {
            saga_id: self.id,
            transaction_id: self.transaction_id,
            step: self.step,
            message,
        }
    }
}
