use std::sync::Arc;

use chrono::{ DateTime, Utc };
use tokio::time::{ interval, MissedTickBehavior };
use tracing::{ debug, error, info, warn };

use crate::config::EngineSettings;
use crate::db::entity::transaction;
use crate::enums::{ TransactionKind, TransactionStatus };
use crate::error::Result;
use crate::services::deposit_service::AutoResolution;
use crate::services::reassignment_service::ReassignOutcome;
use crate::services::{ DepositService, IncidentService, ReassignmentCoordinator, Recovery };
use crate::store::{
    SagaLog,
    Store,
    TransactionFilter,
    TransactionGuard,
    TransactionPatch,
    TransactionStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub deposits_completed: usize,
    pub deposits_failed: usize,
    pub withdrawals_reassigned: usize,
    pub withdrawals_deferred: usize,
    pub sagas_resumed: usize,
    pub sagas_abandoned: usize,
    pub errors: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == TickReport::default()
    }
}

/// Background task resolving pending work whose server-side deadline passed
/// and picking up workflows a crashed process left running.
pub struct Watchdog {
    store: Arc<dyn Store>,
    deposits: Arc<DepositService>,
    reassignment: Arc<ReassignmentCoordinator>,
    incidents: Arc<IncidentService>,
    settings: EngineSettings,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn Store>,
        deposits: Arc<DepositService>,
        reassignment: Arc<ReassignmentCoordinator>,
        incidents: Arc<IncidentService>,
        settings: EngineSettings
    ) -> Self {
        Self {
            store,
            deposits,
            reassignment,
            incidents,
            settings,
        }
    }

    pub async fn start(self) {
        let mut ticker = interval(self.settings.watchdog_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_ms = self.settings.watchdog_tick.as_millis() as u64, "watchdog started");

        loop {
            ticker.tick().await;

            match self.run_once(Utc::now()).await {
                Ok(report) if !report.is_idle() => info!(?report, "watchdog tick"),
                Ok(_) => {}
                Err(e) => error!("Watchdog error: {}", e),
            }
        }
    }

    /// One pass over stalled sagas, expired deposits and expired withdrawals.
    /// Failures of single items are logged and counted, never abort the pass.
    /// A failed item has its deadline pushed back by `reassign_retry`, so the
    /// next batch reaches the items behind it.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();
        let batch = self.settings.watchdog_batch_size;

        let stalled = self.store.stale_running_sagas(
            now - self.settings.saga_stale_after,
            Some(batch)
        ).await?;

        for saga in stalled {
            match self.incidents.recover(&saga, now).await {
                Ok(Recovery::Resumed) => {
                    report.sagas_resumed += 1;
                }
                Ok(Recovery::Abandoned) => {
                    report.sagas_abandoned += 1;
                }
                Err(e) => {
                    report.errors += 1;
                    error!(saga_id = %saga.id, workflow = %saga.workflow, "stalled saga recovery failed: {}", e);
                }
            }
        }

        let expired_deposits = self.store.query_transactions(TransactionFilter {
            kind: Some(TransactionKind::Deposit),
            status: Some(TransactionStatus::Pending),
            expires_before: Some(now),
            limit: Some(batch),
            ..Default::default()
        }).await?;

        for tx in expired_deposits {
            match self.deposits.auto_resolve(tx.id, now).await {
                Ok(AutoResolution::Completed) => {
                    report.deposits_completed += 1;
                }
                Ok(AutoResolution::FailedInsufficientBalance) => {
                    report.deposits_failed += 1;
                }
                Ok(other) => debug!(transaction_id = %tx.id, ?other, "deposit left as is"),
                Err(e) => {
                    report.errors += 1;
                    error!(transaction_id = %tx.id, "auto-resolve failed: {}", e);
                    self.back_off(&tx, now).await;
                }
            }
        }

        let expired_withdrawals = self.store.query_transactions(TransactionFilter {
            kind: Some(TransactionKind::Withdrawal),
            status: Some(TransactionStatus::Pending),
            expires_before: Some(now),
            limit: Some(batch),
            ..Default::default()
        }).await?;

        for tx in expired_withdrawals {
            match self.reassignment.reassign(&tx, now).await {
                Ok(ReassignOutcome::Reassigned { .. }) => {
                    report.withdrawals_reassigned += 1;
                }
                Ok(ReassignOutcome::Deferred { .. }) => {
                    report.withdrawals_deferred += 1;
                }
                Ok(ReassignOutcome::Skipped) => {
                    debug!(transaction_id = %tx.id, "withdrawal moved on before reassignment");
                }
                Err(e) => {
                    report.errors += 1;
                    error!(transaction_id = %tx.id, "reassignment failed: {}", e);
                    self.back_off(&tx, now).await;
                }
            }
        }

        Ok(report)
    }

    /// Pushes the deadline of an item that failed this tick, unless it moved on.
    async fn back_off(&self, tx: &transaction::Model, now: DateTime<Utc>) {
        let retry_at = now + self.settings.reassign_retry;
        let patch = TransactionPatch {
            expires_at: Some(retry_at),
            ..Default::default()
        };

        match self.store.update_transaction(tx.id, TransactionGuard::pending_for(tx.agent_id), patch).await {
            Ok(true) => debug!(transaction_id = %tx.id, %retry_at, "retry postponed"),
            Ok(false) => {}
            Err(e) => warn!(transaction_id = %tx.id, "could not postpone retry: {}", e),
        }
    }
}
