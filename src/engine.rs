use std::sync::Arc;

use crate::api::AppState;
use crate::config::EngineSettings;
use crate::notify::ChangeFeed;
use crate::services::{
    AgentService,
    DepositService,
    IncidentService,
    LedgerService,
    PayoutService,
    RailAccountService,
    ReassignmentCoordinator,
    UserService,
    WithdrawalService,
};
use crate::storage::ReceiptStorage;
use crate::store::Store;
use crate::watchdog::Watchdog;

/// All services wired over one store, receipt storage and change feed.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub feed: ChangeFeed,
    pub settings: EngineSettings,
    pub agents: Arc<AgentService>,
    pub users: Arc<UserService>,
    pub rail_accounts: Arc<RailAccountService>,
    pub deposits: Arc<DepositService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub payouts: Arc<PayoutService>,
    pub reassignment: Arc<ReassignmentCoordinator>,
    pub ledger: Arc<LedgerService>,
    pub incidents: Arc<IncidentService>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ReceiptStorage>,
        feed: ChangeFeed,
        settings: EngineSettings
    ) -> Self {
        let agents = Arc::new(AgentService::new(store.clone(), feed.clone(), settings.clone()));
        let users = Arc::new(UserService::new(store.clone()));
        let rail_accounts = Arc::new(RailAccountService::new(store.clone(), settings.clone()));
        let deposits = Arc::new(DepositService::new(store.clone(), feed.clone(), settings.clone()));
        let withdrawals = Arc::new(
            WithdrawalService::new(store.clone(), storage.clone(), feed.clone(), settings.clone())
        );
        let payouts = Arc::new(
            PayoutService::new(store.clone(), storage, feed.clone(), settings.clone())
        );
        let reassignment = Arc::new(
            ReassignmentCoordinator::new(store.clone(), feed.clone(), settings.clone())
        );
        let ledger = Arc::new(LedgerService::new(store.clone()));
        let incidents = Arc::new(
            IncidentService::new(
                store.clone(),
                settings.clone(),
                deposits.clone(),
                withdrawals.clone(),
                reassignment.clone()
            )
        );

        Self {
            store,
            feed,
            settings,
            agents,
            users,
            rail_accounts,
            deposits,
            withdrawals,
            payouts,
            reassignment,
            ledger,
            incidents,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            agent_service: self.agents.clone(),
            user_service: self.users.clone(),
            rail_account_service: self.rail_accounts.clone(),
            deposit_service: self.deposits.clone(),
            withdrawal_service: self.withdrawals.clone(),
            payout_service: self.payouts.clone(),
            ledger_service: self.ledger.clone(),
            incident_service: self.incidents.clone(),
        }
    }

    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            self.store.clone(),
            self.deposits.clone(),
            self.reassignment.clone(),
            self.incidents.clone(),
            self.settings.clone()
        )
    }
}
