pub mod agent_service;
pub mod deposit_service;
pub mod incident_service;
pub mod ledger_service;
pub mod payout_service;
pub mod rail_account_service;
pub mod reassignment_service;
pub mod user_service;
pub mod withdrawal_service;

pub use agent_service::AgentService;
pub use deposit_service::DepositService;
pub use incident_service::{ IncidentService, Recovery };
pub use ledger_service::LedgerService;
pub use payout_service::PayoutService;
pub use rail_account_service::RailAccountService;
pub use reassignment_service::{ AgentSelector, ReassignmentCoordinator };
pub use user_service::UserService;
pub use withdrawal_service::WithdrawalService;

use serde::Serialize;
use uuid::Uuid;

use crate::db::entity::transaction;

/// Result of a status transition attempt.
///
/// Losing the race to another actor is not an error: the record already left
/// `pending` and nothing was written by this call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<T> {
    Applied(T),
    AlreadyProcessed {
        id: Uuid,
        status: String,
    },
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::AlreadyProcessed { .. } => None,
        }
    }
}

pub(crate) fn already_processed<T>(tx: &transaction::Model) -> Outcome<T> {
    Outcome::AlreadyProcessed {
        id: tx.id,
        status: tx.status.clone(),
    }
}
