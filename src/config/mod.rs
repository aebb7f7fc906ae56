//! # 配置管理模块
//!
//! 从 TOML 文件加载配置，叠加环境变量覆盖后校验。
//!
//! 环境变量通过可注入的查找函数读取，测试无需修改进程环境。

mod app_config;
mod database;

pub use app_config::{AppConfig, ServerConfig, SsoSettings, StorageKind};
pub use database::DatabaseConfig;

use std::env;
use std::path::Path;

use crate::error::{Result, SsoError};
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/sso.toml";
/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "SSO_CONFIG_PATH";

/// 配置文件路径：显式参数优先，其次环境变量，最后默认值
#[must_use]
pub fn resolve_config_path(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// 从文件加载配置并读取进程环境变量覆盖
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    load_config_with(path, |key| env::var(key).ok())
}

/// 从文件加载配置，环境变量由 `lookup` 提供
pub fn load_config_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(SsoError::config(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        SsoError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
    })?;
    let config = parse_config(&content, lookup)?;

    ldebug!(
        "system",
        LogStage::Startup,
        LogComponent::Config,
        "load_config",
        "配置加载完成",
        path = %path.display(),
        providers = config.providers.len()
    );
    Ok(config)
}

/// 解析 TOML 文本：补齐预设、应用覆盖、校验
pub fn parse_config<F>(content: &str, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: AppConfig = toml::from_str(content)?;
    config.apply_presets();
    apply_env_overrides(&mut config, lookup)?;
    config.validate()?;
    Ok(config)
}

/// 提供方相关环境变量前缀：`SSO_<PROVIDER>_`
fn provider_env_prefix(name: &str) -> String {
    format!("SSO_{}_", name.to_ascii_uppercase().replace('-', "_"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SsoError::config(format!("{key} 不是合法的布尔值: {other}"))),
    }
}

/// 应用环境变量覆盖
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SSO_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(port) = lookup("SSO_SERVER_PORT") {
        config.server.port = port.trim().parse().map_err(|e| {
            SsoError::config_with_source(format!("SSO_SERVER_PORT 无效: {port}"), e)
        })?;
    }
    if let Some(secure) = lookup("SSO_COOKIE_SECURE") {
        config.sso.cookie_secure = parse_bool("SSO_COOKIE_SECURE", &secure)?;
    }

    for provider in &mut config.providers {
        let prefix = provider_env_prefix(&provider.name);
        if let Some(client_id) = lookup(&format!("{prefix}CLIENT_ID")) {
            provider.client_id = client_id;
        }
        if let Some(client_secret) = lookup(&format!("{prefix}CLIENT_SECRET")) {
            provider.client_secret = client_secret;
        }
        if let Some(redirect_uri) = lookup(&format!("{prefix}REDIRECT_URI")) {
            provider.redirect_uri = Some(redirect_uri);
        }
    }
    Ok(())
}
