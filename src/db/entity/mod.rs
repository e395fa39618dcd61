pub mod agent;
pub mod agent_penalty;
pub mod end_user_account;
pub mod payment_rail_account;
pub mod transaction;
pub mod agent_withdrawal_request;
pub mod commission;
pub mod admin_profit;
pub mod workflow_saga;

pub use agent::Entity as Agent;
pub use agent_penalty::Entity as AgentPenalty;
pub use end_user_account::Entity as EndUserAccount;
pub use payment_rail_account::Entity as PaymentRailAccount;
pub use transaction::Entity as Transaction;
pub use agent_withdrawal_request::Entity as AgentWithdrawalRequest;
pub use commission::Entity as Commission;
pub use admin_profit::Entity as AdminProfit;
pub use workflow_saga::Entity as WorkflowSaga;
