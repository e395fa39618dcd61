use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(EndUserAccount::Table)
                .if_not_exists()
                .col(ColumnDef::new(EndUserAccount::Id).uuid().not_null().primary_key())
                .col(
                    ColumnDef::new(EndUserAccount::Balance)
                        .decimal_len(20, 4)
                        .not_null()
                        .default(0)
                )
                .col(
                    ColumnDef::new(EndUserAccount::HeldBalance)
                        .decimal_len(20, 4)
                        .not_null()
                        .default(0)
                )
                .col(
                    ColumnDef::new(EndUserAccount::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(EndUserAccount::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .check(Expr::col(EndUserAccount::Balance).gte(0))
                .check(Expr::col(EndUserAccount::HeldBalance).gte(0))
                .to_owned()
        ).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(EndUserAccount::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum EndUserAccount {
    #[sea_orm(iden = "end_user_accounts")]
    Table,
    Id,
    Balance,
    HeldBalance,
    CreatedAt,
    UpdatedAt,
}
