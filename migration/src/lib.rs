pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_agents_table;
mod m20250301_000002_create_end_user_accounts_table;
mod m20250301_000003_create_payment_rail_accounts_table;
mod m20250301_000004_create_transactions_table;
mod m20250301_000005_create_agent_withdrawal_requests_table;
mod m20250301_000006_create_commission_ledger_tables;
mod m20250301_000007_create_workflow_sagas_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_agents_table::Migration),
            Box::new(m20250301_000002_create_end_user_accounts_table::Migration),
            Box::new(m20250301_000003_create_payment_rail_accounts_table::Migration),
            Box::new(m20250301_000004_create_transactions_table::Migration),
            Box::new(m20250301_000005_create_agent_withdrawal_requests_table::Migration),
            Box::new(m20250301_000006_create_commission_ledger_tables::Migration),
            Box::new(m20250301_000007_create_workflow_sagas_table::Migration)
        ]
    }
}
