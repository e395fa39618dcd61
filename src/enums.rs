use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── TransactionKind ────────────────────────────────────────────────

/// Direction of an end-user transaction handled by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            _ => Err(AppError::InvalidInput(format!("Invalid transaction kind: {}", s))),
        }
    }
}

// ─── TransactionStatus ──────────────────────────────────────────────

/// Lifecycle of a transaction. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(AppError::InvalidInput(format!("Invalid transaction status: {}", s))),
        }
    }
}

// ─── Resolution ─────────────────────────────────────────────────────

/// Marker stamped on a transaction resolved by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    AutoCompleted,
    AutoFailedInsufficientBalance,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::AutoCompleted => "auto_completed",
            Resolution::AutoFailedInsufficientBalance => "auto_failed_insufficient_balance",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── PayoutStatus ───────────────────────────────────────────────────

/// Status of an agent's request to cash out platform balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PayoutStatus::Pending),
            "approved" => Ok(PayoutStatus::Approved),
            "rejected" => Ok(PayoutStatus::Rejected),
            _ => Err(AppError::InvalidInput(format!("Invalid payout status: {}", s))),
        }
    }
}

// ─── CommissionKind ─────────────────────────────────────────────────

/// Fee component credited to an agent on a completed withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    Commission,
    TransactionFee,
}

impl CommissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionKind::Commission => "commission",
            CommissionKind::TransactionFee => "transaction_fee",
        }
    }
}

impl fmt::Display for CommissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "commission" => Ok(CommissionKind::Commission),
            "transaction_fee" => Ok(CommissionKind::TransactionFee),
            _ => Err(AppError::InvalidInput(format!("Invalid commission kind: {}", s))),
        }
    }
}

// ─── VerificationStatus ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            _ => Err(AppError::InvalidInput(format!("Invalid verification status: {}", s))),
        }
    }
}

// ─── OnlineStatus ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl OnlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineStatus::Online => "online",
            OnlineStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnlineStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(OnlineStatus::Online),
            "offline" => Ok(OnlineStatus::Offline),
            _ => Err(AppError::InvalidInput(format!("Invalid online status: {}", s))),
        }
    }
}

// ─── Workflow / SagaStatus ──────────────────────────────────────────

/// Multi-record workflow tracked by a saga cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    DepositApproval,
    DepositAutoResolve,
    WithdrawalApproval,
    WithdrawalDecline,
    /// Move of an expired withdrawal plus the penalty of the agent who let it expire.
    WithdrawalReassignment,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::DepositApproval => "deposit_approval",
            Workflow::DepositAutoResolve => "deposit_auto_resolve",
            Workflow::WithdrawalApproval => "withdrawal_approval",
            Workflow::WithdrawalDecline => "withdrawal_decline",
            Workflow::WithdrawalReassignment => "withdrawal_reassignment",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workflow {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposit_approval" => Ok(Workflow::DepositApproval),
            "deposit_auto_resolve" => Ok(Workflow::DepositAutoResolve),
            "withdrawal_approval" => Ok(Workflow::WithdrawalApproval),
            "withdrawal_decline" => Ok(Workflow::WithdrawalDecline),
            "withdrawal_reassignment" => Ok(Workflow::WithdrawalReassignment),
            _ => Err(AppError::InvalidInput(format!("Invalid workflow: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaStatus {
    Running,
    Completed,
    /// Lost the status race, or never committed it, before any money moved.
    Abandoned,
    /// A step failed after an earlier one committed; needs resume or manual reconciliation.
    Torn,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "running",
            SagaStatus::Completed => "completed",
            SagaStatus::Abandoned => "abandoned",
            SagaStatus::Torn => "torn",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(SagaStatus::Running),
            "completed" => Ok(SagaStatus::Completed),
            "abandoned" => Ok(SagaStatus::Abandoned),
            "torn" => Ok(SagaStatus::Torn),
            _ => Err(AppError::InvalidInput(format!("Invalid saga status: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_db_string() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("WITHDRAWAL".parse::<TransactionKind>().unwrap(), TransactionKind::Withdrawal);
        assert_eq!("Online".parse::<OnlineStatus>().unwrap(), OnlineStatus::Online);
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        assert!("refunded".parse::<TransactionStatus>().is_err());
        assert!("bonus".parse::<CommissionKind>().is_err());
    }
}
