use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Agent::Table)
                .if_not_exists()
                .col(ColumnDef::new(Agent::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Agent::Name).string().not_null())
                .col(
                    ColumnDef::new(Agent::AvailableBalance)
                        .decimal_len(20, 4)
                        .not_null()
                        .default(0)
                )
                .col(
                    ColumnDef::new(Agent::PlatformBalance)
                        .decimal_len(20, 4)
                        .not_null()
                        .default(0)
                )
                .col(ColumnDef::new(Agent::IsActive).boolean().not_null().default(true))
                .col(
                    ColumnDef::new(Agent::VerificationStatus)
                        .string_len(20)
                        .not_null()
                        .default("pending")
                )
                .col(
                    ColumnDef::new(Agent::OnlineStatus)
                        .string_len(20)
                        .not_null()
                        .default("offline")
                )
                .col(ColumnDef::new(Agent::PenaltyCount).integer().not_null().default(0))
                .col(ColumnDef::new(Agent::TelegramChatId).big_integer().null())
                .col(
                    ColumnDef::new(Agent::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(Agent::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .check(Expr::col(Agent::AvailableBalance).gte(0))
                .check(Expr::col(Agent::PlatformBalance).gte(0))
                .to_owned()
        ).await?;

        manager.create_table(
            Table::create()
                .table(AgentPenalty::Table)
                .if_not_exists()
                .col(ColumnDef::new(AgentPenalty::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(AgentPenalty::AgentId).uuid().not_null())
                .col(ColumnDef::new(AgentPenalty::TransactionId).uuid().not_null())
                .col(ColumnDef::new(AgentPenalty::Reason).string().not_null())
                .col(
                    ColumnDef::new(AgentPenalty::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_agent_penalties_agent")
                        .from(AgentPenalty::Table, AgentPenalty::AgentId)
                        .to(Agent::Table, Agent::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_agent_penalties_agent_id")
                .table(AgentPenalty::Table)
                .col(AgentPenalty::AgentId)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AgentPenalty::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Agent::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Agent {
    #[sea_orm(iden = "agents")]
    Table,
    Id,
    Name,
    AvailableBalance,
    PlatformBalance,
    IsActive,
    VerificationStatus,
    OnlineStatus,
    PenaltyCount,
    TelegramChatId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AgentPenalty {
    #[sea_orm(iden = "agent_penalties")]
    Table,
    Id,
    AgentId,
    TransactionId,
    Reason,
    CreatedAt,
}
