use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(WorkflowSaga::Table)
                .if_not_exists()
                .col(ColumnDef::new(WorkflowSaga::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(WorkflowSaga::TransactionId).uuid().not_null())
                .col(ColumnDef::new(WorkflowSaga::AgentId).uuid().not_null())
                .col(ColumnDef::new(WorkflowSaga::Workflow).string_len(30).not_null())
                .col(ColumnDef::new(WorkflowSaga::Step).integer().not_null().default(0))
                .col(ColumnDef::new(WorkflowSaga::Status).string_len(20).not_null())
                .col(ColumnDef::new(WorkflowSaga::Error).text().null())
                .col(
                    ColumnDef::new(WorkflowSaga::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(WorkflowSaga::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_workflow_sagas_status_updated_at")
                .table(WorkflowSaga::Table)
                .col(WorkflowSaga::Status)
                .col(WorkflowSaga::UpdatedAt)
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_workflow_sagas_transaction_id")
                .table(WorkflowSaga::Table)
                .col(WorkflowSaga::TransactionId)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(WorkflowSaga::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum WorkflowSaga {
    #[sea_orm(iden = "workflow_sagas")]
    Table,
    Id,
    TransactionId,
    AgentId,
    Workflow,
    Step,
    Status,
    Error,
    CreatedAt,
    UpdatedAt,
}
