//! # OAuth SSO Library
//!
//! 与身份提供方无关的 OAuth2 授权码单点登录核心库

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod provider;
pub mod server;
pub mod sso;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Result, SsoError};
pub use provider::ProviderConfig;
pub use sso::{AuthFlowController, Credentials, FlowOptions, OptionalCredentials};
pub use storage::CredentialStore;
