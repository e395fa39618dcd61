use std::sync::Arc;

use sea_orm::prelude::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::entity::{ admin_profit, commission };
use crate::error::Result;
use crate::store::{ ProfitLedger, Store };

#[derive(Debug, Clone, Serialize)]
pub struct CommissionSummary {
    pub agent_id: Uuid,
    pub total: Decimal,
    pub entries: Vec<commission::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfitSummary {
    pub withdrawals: usize,
    pub platform_fees: Decimal,
    pub maintenance_fees: Decimal,
    pub total: Decimal,
}

/// Read side of the commission and platform-profit ledgers.
pub struct LedgerService {
    store: Arc<dyn Store>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn agent_commissions(&self, agent_id: Uuid) -> Result<CommissionSummary> {
        let entries = self.store.commissions_for_agent(agent_id).await?;
        let total = entries.iter().map(|c| c.amount).sum();
        Ok(CommissionSummary { agent_id, total, entries })
    }

    pub async fn transaction_commissions(&self, transaction_id: Uuid) -> Result<Vec<commission::Model>> {
        self.store.commissions_for_transaction(transaction_id).await
    }

    pub async fn profits(&self) -> Result<Vec<admin_profit::Model>> {
        self.store.list_admin_profits().await
    }

    pub async fn profit_summary(&self) -> Result<ProfitSummary> {
        let profits = self.store.list_admin_profits().await?;

        let platform_fees: Decimal = profits.iter().map(|p| p.platform_fee).sum();
        let maintenance_fees: Decimal = profits.iter().map(|p| p.maintenance_fee).sum();

        Ok(ProfitSummary {
            withdrawals: profits.len(),
            platform_fees,
            maintenance_fees,
            total: platform_fees + maintenance_fees,
        })
    }
}
