//! Fee splitting for end-user withdrawals and agent payouts.
//!
//! Every component is rounded to cents and the net amount is derived by
//! subtraction, so `net + fees == gross` holds exactly.

use sea_orm::prelude::Decimal;
use serde::Serialize;

use crate::error::{ AppError, Result };

/// Agent commission, 2.5 %.
pub const AGENT_COMMISSION_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 3);
/// Agent transaction fee, 1.5 %.
pub const AGENT_TRANSACTION_FEE_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);
/// Platform fee, 2 %.
pub const PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);
/// Maintenance fee, 2 %.
pub const MAINTENANCE_FEE_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Precision of every amount the engine accepts.
pub const MONEY_DP: u32 = 2;

/// Positive, cent-precise amount of a money movement.
pub fn ensure_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidInput("Amount must be positive".to_string()));
    }
    ensure_precision(amount)
}

/// Non-negative, cent-precise opening balance.
pub fn ensure_opening_balance(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(AppError::InvalidInput("Opening balance cannot be negative".to_string()));
    }
    ensure_precision(amount)
}

fn ensure_precision(amount: Decimal) -> Result<()> {
    if amount.normalize().scale() > MONEY_DP {
        return Err(
            AppError::InvalidInput(
                format!("Amount {} has more than {} decimal places", amount, MONEY_DP)
            )
        );
    }
    Ok(())
}

fn portion(amount: Decimal, rate: Decimal) -> Decimal {
    (amount * rate).round_dp(MONEY_DP)
}

/// Split of a gross end-user withdrawal across the four stakeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawalFees {
    pub gross: Decimal,
    pub agent_commission: Decimal,
    pub agent_transaction_fee: Decimal,
    pub platform_fee: Decimal,
    pub maintenance_fee: Decimal,
    pub net: Decimal,
}

impl WithdrawalFees {
    pub fn compute(gross: Decimal) -> Self {
        let agent_commission = portion(gross, AGENT_COMMISSION_RATE);
        let agent_transaction_fee = portion(gross, AGENT_TRANSACTION_FEE_RATE);
        let platform_fee = portion(gross, PLATFORM_FEE_RATE);
        let maintenance_fee = portion(gross, MAINTENANCE_FEE_RATE);
        let net = gross - agent_commission - agent_transaction_fee - platform_fee - maintenance_fee;

        Self {
            gross,
            agent_commission,
            agent_transaction_fee,
            platform_fee,
            maintenance_fee,
            net,
        }
    }

    /// Credited to the agent's platform balance.
    pub fn agent_total(&self) -> Decimal {
        self.agent_commission + self.agent_transaction_fee
    }

    /// Recorded as platform profit; not moved anywhere.
    pub fn platform_total(&self) -> Decimal {
        self.platform_fee + self.maintenance_fee
    }

    pub fn total_fees(&self) -> Decimal {
        self.agent_total() + self.platform_total()
    }
}

/// Split of an agent's platform-balance payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutFees {
    pub gross: Decimal,
    pub platform_fee: Decimal,
    pub maintenance_fee: Decimal,
    pub net: Decimal,
}

impl PayoutFees {
    pub fn compute(gross: Decimal) -> Self {
        let platform_fee = portion(gross, PLATFORM_FEE_RATE);
        let maintenance_fee = portion(gross, MAINTENANCE_FEE_RATE);

        Self {
            gross,
            platform_fee,
            maintenance_fee,
            net: gross - platform_fee - maintenance_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_withdrawal_of_100_splits_into_documented_parts() {
        let fees = WithdrawalFees::compute(dec("100"));

        assert_eq!(fees.platform_fee, dec("2"));
        assert_eq!(fees.maintenance_fee, dec("2"));
        assert_eq!(fees.agent_commission, dec("2.5"));
        assert_eq!(fees.agent_transaction_fee, dec("1.5"));
        assert_eq!(fees.total_fees(), dec("8"));
        assert_eq!(fees.net, dec("92"));
        assert_eq!(fees.agent_total(), dec("4"));
        assert_eq!(fees.platform_total(), dec("4"));
    }

    #[test]
    fn test_withdrawal_parts_always_sum_to_gross() {
        for raw in ["0.01", "1", "13.37", "99.99", "250", "1234.56", "50000"] {
            let fees = WithdrawalFees::compute(dec(raw));
            assert_eq!(fees.net + fees.agent_total() + fees.platform_total(), fees.gross, "{raw}");
        }
    }

    #[test]
    fn test_payout_of_50_nets_48() {
        let fees = PayoutFees::compute(dec("50"));

        assert_eq!(fees.platform_fee, dec("1"));
        assert_eq!(fees.maintenance_fee, dec("1"));
        assert_eq!(fees.net, dec("48"));
    }

    #[test]
    fn test_rates_are_the_published_percentages() {
        assert_eq!(AGENT_COMMISSION_RATE, dec("0.025"));
        assert_eq!(AGENT_TRANSACTION_FEE_RATE, dec("0.015"));
        assert_eq!(PLATFORM_FEE_RATE, dec("0.02"));
        assert_eq!(MAINTENANCE_FEE_RATE, dec("0.02"));
    }

    #[test]
    fn test_amounts_must_be_cent_precise() {
        assert!(ensure_amount(dec("10.05")).is_ok());
        assert!(ensure_amount(dec("10.0500")).is_ok());
        assert!(matches!(ensure_amount(dec("10.00005")), Err(AppError::InvalidInput(_))));
        assert!(matches!(ensure_amount(dec("0")), Err(AppError::InvalidInput(_))));
        assert!(ensure_opening_balance(dec("0")).is_ok());
        assert!(ensure_opening_balance(dec("0.001")).is_err());
    }
}
