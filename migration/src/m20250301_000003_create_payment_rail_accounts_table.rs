use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(PaymentRailAccount::Table)
                .if_not_exists()
                .col(ColumnDef::new(PaymentRailAccount::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(PaymentRailAccount::AgentId).uuid().not_null())
                .col(ColumnDef::new(PaymentRailAccount::PaymentMethod).string_len(50).not_null())
                .col(ColumnDef::new(PaymentRailAccount::AccountName).string().not_null())
                .col(ColumnDef::new(PaymentRailAccount::AccountNumber).string_len(50).not_null())
                .col(
                    ColumnDef::new(PaymentRailAccount::CurrentBalance)
                        .decimal_len(20, 4)
                        .not_null()
                        .default(0)
                )
                .col(
                    ColumnDef::new(PaymentRailAccount::IsPrimary)
                        .boolean()
                        .not_null()
                        .default(false)
                )
                .col(
                    ColumnDef::new(PaymentRailAccount::IsVerified)
                        .boolean()
                        .not_null()
                        .default(false)
                )
                .col(
                    ColumnDef::new(PaymentRailAccount::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(PaymentRailAccount::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .check(Expr::col(PaymentRailAccount::CurrentBalance).gte(0))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_payment_rail_accounts_agent")
                        .from(PaymentRailAccount::Table, PaymentRailAccount::AgentId)
                        .to(Agent::Table, Agent::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_payment_rail_accounts_agent_method")
                .table(PaymentRailAccount::Table)
                .col(PaymentRailAccount::AgentId)
                .col(PaymentRailAccount::PaymentMethod)
                .to_owned()
        ).await?;

        // One primary account per agent
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_rail_accounts_primary \
                 ON payment_rail_accounts (agent_id) WHERE is_primary"
            ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(PaymentRailAccount::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum PaymentRailAccount {
    #[sea_orm(iden = "payment_rail_accounts")]
    Table,
    Id,
    AgentId,
    PaymentMethod,
    AccountName,
    AccountNumber,
    CurrentBalance,
    IsPrimary,
    IsVerified,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Agent {
    #[sea_orm(iden = "agents")]
    Table,
    Id,
}
