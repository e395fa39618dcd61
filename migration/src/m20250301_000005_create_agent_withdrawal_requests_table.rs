use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(AgentWithdrawalRequest::Table)
                .if_not_exists()
                .col(ColumnDef::new(AgentWithdrawalRequest::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(AgentWithdrawalRequest::AgentId).uuid().not_null())
                .col(ColumnDef::new(AgentWithdrawalRequest::Amount).decimal_len(20, 4).not_null())
                .col(
                    ColumnDef::new(AgentWithdrawalRequest::PlatformFee)
                        .decimal_len(20, 4)
                        .not_null()
                )
                .col(
                    ColumnDef::new(AgentWithdrawalRequest::MaintenanceFee)
                        .decimal_len(20, 4)
                        .not_null()
                )
                .col(
                    ColumnDef::new(AgentWithdrawalRequest::NetAmount)
                        .decimal_len(20, 4)
                        .not_null()
                )
                .col(ColumnDef::new(AgentWithdrawalRequest::Status).string_len(20).not_null())
                .col(ColumnDef::new(AgentWithdrawalRequest::RejectionReason).string().null())
                .col(ColumnDef::new(AgentWithdrawalRequest::ReceiptUrl).string().null())
                .col(
                    ColumnDef::new(AgentWithdrawalRequest::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(AgentWithdrawalRequest::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_agent_withdrawal_requests_agent")
                        .from(AgentWithdrawalRequest::Table, AgentWithdrawalRequest::AgentId)
                        .to(Agent::Table, Agent::Id)
                        .on_delete(ForeignKeyAction::Restrict)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_agent_withdrawal_requests_agent_status")
                .table(AgentWithdrawalRequest::Table)
                .col(AgentWithdrawalRequest::AgentId)
                .col(AgentWithdrawalRequest::Status)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AgentWithdrawalRequest::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum AgentWithdrawalRequest {
    #[sea_orm(iden = "agent_withdrawal_requests")]
    Table,
    Id,
    AgentId,
    Amount,
    PlatformFee,
    MaintenanceFee,
    NetAmount,
    Status,
    RejectionReason,
    ReceiptUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Agent {
    #[sea_orm(iden = "agents")]
    Table,
    Id,
}
