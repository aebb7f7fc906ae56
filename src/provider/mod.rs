//! # 身份提供商配置
//!
//! 每个提供商一份不可变配置：客户端凭据、授权/令牌端点、作用域、
//! 可选的固定回调地址和额外授权参数。内置 GitHub 与 Reddit 预设。

mod config;

pub use config::{AuthStyle, ProviderConfig};
