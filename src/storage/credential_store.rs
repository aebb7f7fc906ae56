//! # 凭据存储
//!
//! 在 `KvBackend` 之上按分区存取 `SessionRecord`，JSON 编码，每次调用都有超时上限。

use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::KvBackend;
use crate::error::{Result, SsoError};
use crate::sso::SessionRecord;
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 单次存储调用的默认超时
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// 会话凭据存储
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KvBackend>,
    timeout: Duration,
}

impl CredentialStore {
    /// 使用默认超时创建
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// 设置单次调用超时
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 底层后端名称
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::CredentialStore,
                    operation,
                    "存储调用超时",
                    backend = self.backend.backend_name(),
                    timeout_ms = self.timeout.as_millis() as u64
                );
                Err(SsoError::persistence(format!(
                    "{operation} 超时 ({}ms)",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// 幂等地创建分区，首次使用分区前必须调用
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.bounded("ensure_namespace", self.backend.ensure_namespace(namespace))
            .await
    }

    /// 写入记录，覆盖同键旧值
    pub async fn put(&self, namespace: &str, key: &str, record: &SessionRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| SsoError::serialization("会话记录编码失败", e))?;
        self.bounded("put", self.backend.put(namespace, key, bytes))
            .await?;
        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::CredentialStore,
            "put",
            "会话记录已写入",
            namespace = namespace,
            provider = %record.provider
        );
        Ok(())
    }

    /// 读取记录
    ///
    /// 键不存在时返回 `NotFound`，数据损坏时返回 `Deserialization`。
    pub async fn get(&self, namespace: &str, key: &str) -> Result<SessionRecord> {
        let bytes = self
            .bounded("get", self.backend.get(namespace, key))
            .await?
            .ok_or_else(|| SsoError::not_found(namespace, key))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SsoError::deserialization(format!("会话记录损坏: {namespace}"), e))
    }

    /// 删除记录，返回是否确有删除
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.bounded("delete", self.backend.delete(namespace, key))
            .await
    }

    /// 删除最后写入早于 `max_age` 的记录
    pub async fn purge_expired(&self, namespace: &str, max_age: Duration) -> Result<u64> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| SsoError::config_with_source("凭据有效期超出范围", e))?;
        let cutoff = Utc::now() - max_age;
        self.bounded("purge_expired", self.backend.purge_before(namespace, cutoff))
            .await
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.backend.backend_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
