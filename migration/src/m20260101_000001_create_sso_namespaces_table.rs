use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 每个身份提供方一个分区
        manager
            .create_table(
                Table::create()
                    .table(SsoNamespaces::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SsoNamespaces::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SsoNamespaces::Name)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SsoNamespaces::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SsoNamespaces::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SsoNamespaces {
    Table,
    Id,
    Name,
    CreatedAt,
}
