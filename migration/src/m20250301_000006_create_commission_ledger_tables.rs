use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Commission::Table)
                .if_not_exists()
                .col(ColumnDef::new(Commission::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Commission::AgentId).uuid().not_null())
                .col(ColumnDef::new(Commission::TransactionId).uuid().not_null())
                .col(ColumnDef::new(Commission::Amount).decimal_len(20, 4).not_null())
                .col(ColumnDef::new(Commission::Kind).string_len(30).not_null())
                .col(ColumnDef::new(Commission::Status).string_len(20).not_null())
                .col(
                    ColumnDef::new(Commission::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        // A fee component is recorded at most once per transaction
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_commissions_transaction_kind")
                .table(Commission::Table)
                .col(Commission::TransactionId)
                .col(Commission::Kind)
                .unique()
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_commissions_agent_id")
                .table(Commission::Table)
                .col(Commission::AgentId)
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(AdminProfit::Table)
                .if_not_exists()
                .col(ColumnDef::new(AdminProfit::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(AdminProfit::TransactionId).uuid().not_null().unique_key())
                .col(ColumnDef::new(AdminProfit::AgentId).uuid().not_null())
                .col(ColumnDef::new(AdminProfit::PlatformFee).decimal_len(20, 4).not_null())
                .col(ColumnDef::new(AdminProfit::MaintenanceFee).decimal_len(20, 4).not_null())
                .col(ColumnDef::new(AdminProfit::TotalAmount).decimal_len(20, 4).not_null())
                .col(
                    ColumnDef::new(AdminProfit::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AdminProfit::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Commission::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Commission {
    #[sea_orm(iden = "commissions")]
    Table,
    Id,
    AgentId,
    TransactionId,
    Amount,
    Kind,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AdminProfit {
    #[sea_orm(iden = "admin_profits")]
    Table,
    Id,
    TransactionId,
    AgentId,
    PlatformFee,
    MaintenanceFee,
    TotalAmount,
    CreatedAt,
}
