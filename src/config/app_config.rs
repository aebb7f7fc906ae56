//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::DatabaseConfig;
use crate::error::{Result, SsoError};
use crate::provider::ProviderConfig;
use crate::sso::FlowOptions;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// SSO 流程参数
    #[serde(default)]
    pub sso: SsoSettings,
    /// 身份提供方列表
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// HTTP 服务配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5675,
        }
    }
}

/// 凭据存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// 数据库持久化
    #[default]
    Database,
    /// 内存（重启即丢失）
    Memory,
}

/// SSO 流程参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsoSettings {
    /// state 新鲜度窗口（秒）
    pub state_ttl_secs: u64,
    /// 挂起 state 告警阈值，超过时只告警不丢弃
    pub state_capacity: u64,
    /// 后台清扫间隔（秒）
    pub sweep_interval_secs: u64,
    /// 令牌交换超时（秒）
    pub exchange_timeout_secs: u64,
    /// 单次存储调用超时（秒）
    pub store_timeout_secs: u64,
    /// 会话 cookie 是否带 `Secure`
    pub cookie_secure: bool,
    /// 凭据存储类型
    pub storage: StorageKind,
    /// 会话有效期（天），同时决定 cookie 过期与凭据清扫
    pub session_ttl_days: u32,
}

impl Default for SsoSettings {
    fn default() -> Self {
        Self {
            state_ttl_secs: 600,
            state_capacity: 100_000,
            sweep_interval_secs: 60,
            exchange_timeout_secs: 10,
            store_timeout_secs: 5,
            cookie_secure: true,
            storage: StorageKind::Database,
            session_ttl_days: 90,
        }
    }
}

impl SsoSettings {
    /// 控制器运行参数
    #[must_use]
    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            state_ttl: Duration::from_secs(self.state_ttl_secs),
            state_capacity: self.state_capacity,
            exchange_timeout: Duration::from_secs(self.exchange_timeout_secs),
            cookie_secure: self.cookie_secure,
            session_ttl_days: i64::from(self.session_ttl_days),
            ..FlowOptions::default()
        }
    }

    /// 存储调用超时
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// 清扫间隔
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 会话有效期
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_days as u64 * 24 * 60 * 60)
    }
}

impl AppConfig {
    /// 监听地址 `host:port`
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 为已知提供方补齐端点
    pub fn apply_presets(&mut self) {
        for provider in &mut self.providers {
            provider.apply_preset();
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(SsoError::config("数据库URL不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(SsoError::config("数据库最大连接数必须大于0"));
        }

        let sso = &self.sso;
        for (name, value) in [
            ("state_ttl_secs", sso.state_ttl_secs),
            ("state_capacity", sso.state_capacity),
            ("sweep_interval_secs", sso.sweep_interval_secs),
            ("exchange_timeout_secs", sso.exchange_timeout_secs),
            ("store_timeout_secs", sso.store_timeout_secs),
            ("session_ttl_days", u64::from(sso.session_ttl_days)),
        ] {
            if value == 0 {
                return Err(SsoError::config(format!("sso.{name} 必须大于0")));
            }
        }

        if self.providers.is_empty() {
            return Err(SsoError::config("至少需要配置一个身份提供方"));
        }

        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(SsoError::config(format!("身份提供方重复: {}", provider.name)));
            }
            provider.validate()?;
            if provider.name == "reddit" && provider.redirect_uri.is_none() {
                return Err(SsoError::config("reddit 需要配置固定的 redirect_uri"));
            }
            for path in [
                provider.login_path(),
                provider.callback_path(),
                provider.logout_path(),
            ] {
                if !path.starts_with('/') || path == "/" {
                    return Err(SsoError::config(format!("无效的路由路径: {path}")));
                }
                if !paths.insert(path.clone()) {
                    return Err(SsoError::config(format!("路由路径冲突: {path}")));
                }
            }
        }

        Ok(())
    }
}
