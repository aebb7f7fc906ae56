//! # 凭据持久化
//!
//! `KvBackend` 是按分区隔离的字节键值存储抽象，`CredentialStore` 在其上做
//! JSON 编解码和超时控制。

mod backend;
mod credential_store;
mod database;
mod memory;

pub use backend::KvBackend;
#[cfg(test)]
pub use backend::MockKvBackend;
pub use credential_store::{CredentialStore, DEFAULT_STORE_TIMEOUT};
pub use database::DatabaseBackend;
pub use memory::MemoryBackend;
