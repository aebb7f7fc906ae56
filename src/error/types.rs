//! # 错误类型定义

use thiserror::Error;

use super::ErrorCategory;

/// 单点登录主要错误类型
#[derive(Debug, Error)]
pub enum SsoError {
    /// 防伪 state 缺失、未知、已消费或已过期
    #[error("state 校验失败")]
    BadState,

    /// 回调中缺少授权码
    #[error("回调缺少授权码")]
    MissingCode,

    /// 令牌端点调用失败（网络错误、超时、非 2xx 或响应格式错误）
    #[error("令牌交换失败: {message}")]
    ExchangeFailed { message: String },

    /// 登录流程中写入凭据失败
    #[error("凭据存储失败: {message}")]
    StoreFailed {
        message: String,
        #[source]
        source: Option<Box<SsoError>>,
    },

    /// 会话键不存在
    #[error("凭据未找到: {namespace}/{key}")]
    NotFound { namespace: String, key: String },

    /// 凭据无法编码
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 存储中的数据已损坏
    #[error("反序列化错误: {message}")]
    Deserialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 底层持久化错误
    #[error("持久化错误: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 带上下文的错误
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<SsoError>,
    },
}

impl SsoError {
    /// 登录流程错误对应的 `ssoError` 重定向原因
    ///
    /// 只有会出现在回调重定向里的错误才有原因码，其余返回 `None`。
    #[must_use]
    pub fn redirect_reason(&self) -> Option<&'static str> {
        match self {
            Self::BadState => Some("bad-state"),
            Self::MissingCode => Some("no-code"),
            Self::ExchangeFailed { .. } => Some("exchange-failed"),
            Self::StoreFailed { .. } => Some("store-failed"),
            Self::Context { source, .. } => source.redirect_reason(),
            _ => None,
        }
    }

    /// 错误分类，用于日志和告警
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadState | Self::MissingCode | Self::NotFound { .. } => ErrorCategory::Client,
            Self::Context { source, .. } => source.category(),
            _ => ErrorCategory::Server,
        }
    }

    /// 是否为 `NotFound`（穿透上下文包装）
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// 创建令牌交换错误
    pub fn exchange<T: Into<String>>(message: T) -> Self {
        Self::ExchangeFailed {
            message: message.into(),
        }
    }

    /// 创建存储失败错误，保留底层原因
    pub fn store_failed<T: Into<String>>(message: T, source: Self) -> Self {
        Self::StoreFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// 创建未找到错误
    pub fn not_found<N: Into<String>, K: Into<String>>(namespace: N, key: K) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// 创建序列化错误
    pub fn serialization<T: Into<String>, E: Into<anyhow::Error>>(message: T, source: E) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }

    /// 创建反序列化错误
    pub fn deserialization<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Deserialization {
            message: message.into(),
            source: source.into(),
        }
    }

    /// 创建持久化错误
    pub fn persistence<T: Into<String>>(message: T) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的持久化错误
    pub fn persistence_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<sea_orm::error::DbErr> for SsoError {
    fn from(err: sea_orm::error::DbErr) -> Self {
        Self::persistence_with_source("数据库操作失败", err)
    }
}

impl From<serde_json::Error> for SsoError {
    fn from(err: serde_json::Error) -> Self {
        Self::deserialization("JSON解析失败", err)
    }
}

impl From<toml::de::Error> for SsoError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<std::io::Error> for SsoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<reqwest::Error> for SsoError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("请求超时: {err}")
        } else {
            format!("HTTP请求失败: {err}")
        };
        Self::exchange(message)
    }
}
