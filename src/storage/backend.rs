//! 键值存储后端抽象

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// 按分区隔离的字节键值存储
///
/// 实现必须保证：同一 `(namespace, key)` 的 `put` 对之后任意调用方的 `get` 可见；
/// 不同分区之间互不可见。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// 幂等地创建分区
    async fn ensure_namespace(&self, namespace: &str) -> Result<()>;

    /// 写入或覆盖
    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// 点查，不存在时返回 `None`
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// 删除，返回是否确有删除
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// 删除分区中最后写入时间早于 `cutoff` 的条目，返回删除数量
    async fn purge_before(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}
