use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Transaction::Table)
                .if_not_exists()
                .col(ColumnDef::new(Transaction::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(Transaction::Kind).string_len(20).not_null())
                .col(ColumnDef::new(Transaction::Amount).decimal_len(20, 4).not_null())
                .col(ColumnDef::new(Transaction::Status).string_len(20).not_null())
                .col(ColumnDef::new(Transaction::Reference).string().not_null())
                .col(ColumnDef::new(Transaction::AgentId).uuid().not_null())
                .col(ColumnDef::new(Transaction::UserId).uuid().not_null())
                .col(ColumnDef::new(Transaction::Payload).text().null())
                .col(ColumnDef::new(Transaction::PaymentMethod).string_len(50).null())
                .col(ColumnDef::new(Transaction::ProofUrl).string().null())
                .col(ColumnDef::new(Transaction::ReceiptUrl).string().null())
                .col(ColumnDef::new(Transaction::RejectionReason).string().null())
                .col(ColumnDef::new(Transaction::Resolution).string_len(50).null())
                .col(ColumnDef::new(Transaction::ReassignedFrom).uuid().null())
                .col(ColumnDef::new(Transaction::ExpiresAt).timestamp_with_time_zone().not_null())
                .col(
                    ColumnDef::new(Transaction::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(Transaction::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .check(Expr::col(Transaction::Amount).gt(0))
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_transactions_reference")
                .table(Transaction::Table)
                .col(Transaction::Reference)
                .unique()
                .to_owned()
        ).await?;

        // Watchdog scan: pending items by kind ordered by deadline
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_transactions_status_kind_expires")
                .table(Transaction::Table)
                .col(Transaction::Status)
                .col(Transaction::Kind)
                .col(Transaction::ExpiresAt)
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_transactions_agent_status")
                .table(Transaction::Table)
                .col(Transaction::AgentId)
                .col(Transaction::Status)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Transaction::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Transaction {
    #[sea_orm(iden = "transactions")]
    Table,
    Id,
    Kind,
    Amount,
    Status,
    Reference,
    AgentId,
    UserId,
    Payload,
    PaymentMethod,
    ProofUrl,
    ReceiptUrl,
    RejectionReason,
    Resolution,
    ReassignedFrom,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}
