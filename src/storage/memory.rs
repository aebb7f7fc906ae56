//! 内存后端（非持久，用于测试和本地运行）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use super::KvBackend;
use crate::error::{Result, SsoError};

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    updated_at: DateTime<Utc>,
}

/// 基于 `DashMap` 的内存键值存储
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: DashSet<String>,
    entries: DashMap<(String, String), StoredValue>,
}

impl MemoryBackend {
    /// 创建空的内存后端
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 分区中的条目数
    #[must_use]
    pub fn len(&self, namespace: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .count()
    }

    /// 分区是否为空
    #[must_use]
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    fn check_namespace(&self, namespace: &str) -> Result<()> {
        if self.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(SsoError::persistence(format!("分区不存在: {namespace}")))
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.insert(namespace.to_string());
        Ok(())
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_namespace(namespace)?;
        self.entries.insert(
            (namespace.to_string(), key.to_string()),
            StoredValue {
                bytes: value,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_namespace(namespace)?;
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.bytes.clone()))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.check_namespace(namespace)?;
        Ok(self
            .entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn purge_before(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_namespace(namespace)?;
        let mut purged = 0u64;
        self.entries.retain(|(ns, _), value| {
            let keep = ns != namespace || value.updated_at >= cutoff;
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
