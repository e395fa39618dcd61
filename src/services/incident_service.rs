use std::sync::Arc;

use chrono::{ DateTime, Utc };
use tracing::{ info, warn };
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::entity::{ transaction, workflow_saga };
use crate::enums::{ SagaStatus, TransactionStatus, Workflow };
use crate::error::{ AppError, Result };
use crate::services::{ deposit_service, reassignment_service, withdrawal_service };
use crate::services::{ DepositService, ReassignmentCoordinator, WithdrawalService };
use crate::store::{ SagaLog, Store, TransactionStore };

/// What became of a saga handed to [`IncidentService::recover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The remaining steps ran to completion.
    Resumed,
    /// The saga stalled before its status transition committed; nothing ran.
    Abandoned,
}

/// Torn and stalled workflows awaiting reconciliation.
pub struct IncidentService {
    store: Arc<dyn Store>,
    settings: EngineSettings,
    deposits: Arc<DepositService>,
    withdrawals: Arc<WithdrawalService>,
    reassignment: Arc<ReassignmentCoordinator>,
}

impl IncidentService {
    pub fn new(
        store: Arc<dyn Store>,
        settings: EngineSettings,
        deposits: Arc<DepositService>,
        withdrawals: Arc<WithdrawalService>,
        reassignment: Arc<ReassignmentCoordinator>
    ) -> Self {
        Self {
            store,
            settings,
            deposits,
            withdrawals,
            reassignment,
        }
    }

    /// Torn sagas plus running ones whose cursor has been idle past the staleness window.
    pub async fn list(&self) -> Result<Vec<workflow_saga::Model>> {
        let mut sagas = self.store.sagas_with_status(SagaStatus::Torn).await?;
        sagas.extend(
            self.store.stale_running_sagas(Utc::now() - self.settings.saga_stale_after, None).await?
        );
        sagas.sort_by_key(|s| s.created_at);
        Ok(sagas)
    }

    /// Re-runs the remaining steps of a torn or stalled saga and returns its transaction.
    pub async fn resume(&self, saga_id: Uuid) -> Result<transaction::Model> {
        let saga = self.store
            .get_saga(saga_id).await?
            .ok_or_else(|| AppError::NotFound(format!("Saga {} not found", saga_id)))?;

        self.recover(&saga, Utc::now()).await?;

        self.store
            .get_transaction(saga.transaction_id).await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {} not found", saga.transaction_id))
            })
    }

    /// Continues `saga` if it is torn, or running with a cursor idle since
    /// before `now - saga_stale_after`.
    ///
    /// A stalled saga that had not yet recorded its status transition only
    /// continues when the transaction shows that transition and no other saga
    /// of the same transaction already owns it. Otherwise it is abandoned.
    pub async fn recover(&self, saga: &workflow_saga::Model, now: DateTime<Utc>) -> Result<Recovery> {
        let workflow: Workflow = saga.workflow.parse()?;

        match saga.status.parse::<SagaStatus>()? {
            SagaStatus::Torn => {}
            SagaStatus::Running => {
                if saga.updated_at > now - self.settings.saga_stale_after {
                    return Err(
                        AppError::InvalidInput(format!("Saga {} is still running", saga.id))
                    );
                }

                let committed = committed_step(workflow);
                if saga.step < committed {
                    if !self.owns_transition(saga, workflow).await? {
                        warn!(
                            saga_id = %saga.id,
                            transaction_id = %saga.transaction_id,
                            %workflow,
                            "stalled saga never committed its transition, abandoning"
                        );
                        self.store.advance_saga(
                            saga.id,
                            saga.step,
                            SagaStatus::Abandoned,
                            Some("stalled before its status transition".to_string())
                        ).await?;
                        return Ok(Recovery::Abandoned);
                    }

                    let adopted = workflow_saga::Model {
                        step: committed,
                        ..saga.clone()
                    };
                    self.dispatch(&adopted, workflow).await?;
                    return Ok(Recovery::Resumed);
                }
            }
            other => {
                return Err(
                    AppError::InvalidInput(
                        format!("Saga {} is {} and cannot be resumed", saga.id, other)
                    )
                );
            }
        }

        info!(saga_id = %saga.id, %workflow, step = saga.step, status = %saga.status, "resuming saga");
        self.dispatch(saga, workflow).await?;
        Ok(Recovery::Resumed)
    }

    async fn dispatch(&self, saga: &workflow_saga::Model, workflow: Workflow) -> Result<()> {
        match workflow {
            Workflow::DepositApproval | Workflow::DepositAutoResolve => {
                self.deposits.resume(saga).await?;
            }
            Workflow::WithdrawalApproval | Workflow::WithdrawalDecline => {
                self.withdrawals.resume(saga).await?;
            }
            Workflow::WithdrawalReassignment => {
                self.reassignment.resume(saga).await?;
            }
        }
        Ok(())
    }

    /// Whether the transaction carries the transition `saga` was about to make
    /// and no sibling saga already took responsibility for it.
    async fn owns_transition(&self, saga: &workflow_saga::Model, workflow: Workflow) -> Result<bool> {
        let Some(tx) = self.store.get_transaction(saga.transaction_id).await? else {
            return Ok(false);
        };

        let transitioned = match workflow {
            Workflow::DepositApproval | Workflow::DepositAutoResolve | Workflow::WithdrawalApproval =>
                tx.status == TransactionStatus::Completed.as_str() && tx.agent_id == saga.agent_id,
            Workflow::WithdrawalDecline =>
                tx.status == TransactionStatus::Failed.as_str() && tx.agent_id == saga.agent_id,
            Workflow::WithdrawalReassignment => tx.reassigned_from == Some(saga.agent_id),
        };
        if !transitioned {
            return Ok(false);
        }

        for sibling in self.store.sagas_for_transaction(tx.id).await? {
            if sibling.id == saga.id || !same_transition(&sibling, saga) {
                continue;
            }

            let sibling_workflow: Workflow = sibling.workflow.parse()?;
            match sibling.status.parse::<SagaStatus>()? {
                SagaStatus::Abandoned => {}
                SagaStatus::Completed | SagaStatus::Torn => {
                    return Ok(false);
                }
                SagaStatus::Running => {
                    if sibling.step >= committed_step(sibling_workflow) {
                        return Ok(false);
                    }
                    // Several stalled candidates: the oldest one takes it.
                    if (sibling.created_at, sibling.id) < (saga.created_at, saga.id) {
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }
}

/// Cursor step at which a workflow's guarded status transition is recorded.
fn committed_step(workflow: Workflow) -> i32 {
    match workflow {
        Workflow::DepositApproval | Workflow::DepositAutoResolve =>
            deposit_service::STEP_STATUS_COMPLETED,
        Workflow::WithdrawalApproval => withdrawal_service::STEP_STATUS_COMPLETED,
        Workflow::WithdrawalDecline => withdrawal_service::STEP_DECLINE_STATUS_FAILED,
        Workflow::WithdrawalReassignment => reassignment_service::STEP_REASSIGNED,
    }
}

/// Sagas competing for the same status transition of one transaction.
fn same_transition(a: &workflow_saga::Model, b: &workflow_saga::Model) -> bool {
    let (Ok(wa), Ok(wb)) = (a.workflow.parse::<Workflow>(), b.workflow.parse::<Workflow>()) else {
        return false;
    };
    let settles_deposit = |w: Workflow| {
        matches!(w, Workflow::DepositApproval | Workflow::DepositAutoResolve)
    };

    match (wa, wb) {
        (Workflow::WithdrawalReassignment, Workflow::WithdrawalReassignment) =>
            a.agent_id == b.agent_id,
        _ => wa == wb || (settles_deposit(wa) && settles_deposit(wb)),
    }
}
