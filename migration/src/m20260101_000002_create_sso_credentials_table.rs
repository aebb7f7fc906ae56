use sea_orm_migration::prelude::*;

use crate::m20260101_000001_create_sso_namespaces_table::SsoNamespaces;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SsoCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SsoCredentials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SsoCredentials::Namespace)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SsoCredentials::SessionKey)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SsoCredentials::Payload).blob().not_null())
                    .col(
                        ColumnDef::new(SsoCredentials::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SsoCredentials::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sso_credentials_namespace")
                            .from(SsoCredentials::Table, SsoCredentials::Namespace)
                            .to(SsoNamespaces::Table, SsoNamespaces::Name)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // upsert 依赖该唯一索引
        manager
            .create_index(
                Index::create()
                    .name("idx_sso_credentials_namespace_key")
                    .table(SsoCredentials::Table)
                    .col(SsoCredentials::Namespace)
                    .col(SsoCredentials::SessionKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sso_credentials_updated_at")
                    .table(SsoCredentials::Table)
                    .col(SsoCredentials::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SsoCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SsoCredentials {
    Table,
    Id,
    Namespace,
    SessionKey,
    Payload,
    CreatedAt,
    UpdatedAt,
}
