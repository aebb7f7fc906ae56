//! # 数据库后端
//!
//! sea-orm 实现的持久化后端，分区存于 `sso_namespaces`，记录存于 `sso_credentials`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use entity::{sso_credentials, sso_namespaces};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
    sea_query::OnConflict,
};

use super::KvBackend;
use crate::error::{Result, SsoError};
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};

/// 基于 sea-orm 的持久化后端
#[derive(Debug)]
pub struct DatabaseBackend {
    db: DatabaseConnection,
    /// 已确认存在的分区
    known_namespaces: DashSet<String>,
}

impl DatabaseBackend {
    /// 使用已迁移的数据库连接创建后端
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            known_namespaces: DashSet::new(),
        }
    }

    /// 底层连接
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn require_namespace(&self, namespace: &str) -> Result<()> {
        if self.known_namespaces.contains(namespace) {
            return Ok(());
        }

        let exists = sso_namespaces::Entity::find()
            .filter(sso_namespaces::Column::Name.eq(namespace))
            .count(&self.db)
            .await?
            > 0;
        if !exists {
            return Err(SsoError::persistence(format!("分区不存在: {namespace}")));
        }

        self.known_namespaces.insert(namespace.to_string());
        Ok(())
    }
}

#[async_trait]
impl KvBackend for DatabaseBackend {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let model = sso_namespaces::ActiveModel {
            name: Set(namespace.to_string()),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };

        let inserted = sso_namespaces::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sso_namespaces::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.known_namespaces.insert(namespace.to_string());
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "ensure_namespace",
            "分区已就绪",
            namespace = namespace,
            created = inserted > 0
        );
        Ok(())
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.require_namespace(namespace).await?;

        let now = Utc::now().naive_utc();
        let model = sso_credentials::ActiveModel {
            namespace: Set(namespace.to_string()),
            session_key: Set(key.to_string()),
            payload: Set(value),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        sso_credentials::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    sso_credentials::Column::Namespace,
                    sso_credentials::Column::SessionKey,
                ])
                .update_columns([
                    sso_credentials::Column::Payload,
                    sso_credentials::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.require_namespace(namespace).await?;

        let found = sso_credentials::Entity::find()
            .filter(sso_credentials::Column::Namespace.eq(namespace))
            .filter(sso_credentials::Column::SessionKey.eq(key))
            .one(&self.db)
            .await?;
        Ok(found.map(|model| model.payload))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.require_namespace(namespace).await?;

        let result = sso_credentials::Entity::delete_many()
            .filter(sso_credentials::Column::Namespace.eq(namespace))
            .filter(sso_credentials::Column::SessionKey.eq(key))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn purge_before(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.require_namespace(namespace).await?;

        let result = sso_credentials::Entity::delete_many()
            .filter(sso_credentials::Column::Namespace.eq(namespace))
            .filter(sso_credentials::Column::UpdatedAt.lt(cutoff.naive_utc()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    fn backend_name(&self) -> &'static str {
        "database"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::{init_database, run_migrations};

    async fn backend(dir: &tempfile::TempDir) -> DatabaseBackend {
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("kv.db").display()),
            ..DatabaseConfig::default()
        };
        let db = init_database(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        DatabaseBackend::new(db)
    }

    #[tokio::test]
    async fn test_unknown_namespace_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;

        let err = backend.put("githubTokens", "k", vec![1]).await.unwrap_err();
        assert!(matches!(err, SsoError::Persistence { .. }));
        assert!(backend.get("githubTokens", "k").await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;
        backend.ensure_namespace("githubTokens").await.unwrap();
        backend.ensure_namespace("githubTokens").await.unwrap();

        backend.put("githubTokens", "k", b"one".to_vec()).await.unwrap();
        backend.put("githubTokens", "k", b"two".to_vec()).await.unwrap();

        assert_eq!(
            backend.get("githubTokens", "k").await.unwrap(),
            Some(b"two".to_vec())
        );
        assert_eq!(backend.get("githubTokens", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;
        backend.ensure_namespace("redditTokens").await.unwrap();
        backend.put("redditTokens", "a", vec![1]).await.unwrap();
        backend.put("redditTokens", "b", vec![2]).await.unwrap();

        assert!(backend.delete("redditTokens", "a").await.unwrap());
        assert!(!backend.delete("redditTokens", "a").await.unwrap());

        let purged = backend
            .purge_before("redditTokens", Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(backend.get("redditTokens", "b").await.unwrap(), None);
    }
}
