//! # Entity 模块
//!
//! SSO 凭据持久化的 Sea-ORM 实体定义

pub mod sso_credentials;
pub mod sso_namespaces;

pub use sso_credentials::Entity as SsoCredentials;
pub use sso_namespaces::Entity as SsoNamespaces;

#[cfg(test)]
mod tests;
