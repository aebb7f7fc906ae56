//! # 会话凭据
//!
//! `TokenRecord` 是提供方返回的令牌，`SessionRecord` 是持久化的会话记录，
//! `Credentials` 是解析请求后交给业务处理器的结果，附带一个会自动刷新令牌的
//! `AuthenticatedClient`。

use chrono::{DateTime, Utc};
use reqwest::{IntoUrl, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::token_exchange::TokenExchangeClient;
use crate::error::{Result, SsoError};
use crate::provider::ProviderConfig;
use crate::storage::CredentialStore;
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

/// 距过期不足该时长即视为需要刷新
pub const REFRESH_LEEWAY: Duration = Duration::from_secs(30);

fn default_token_type() -> String {
    "bearer".to_string()
}

/// 提供方签发的令牌
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// 绝对过期时间，由交换时的 `expires_in` 换算
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl TokenRecord {
    /// 仅含访问令牌的记录
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    /// 访问令牌非空
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// 在 `leeway` 内过期（无过期时间的令牌永不过期）
    #[must_use]
    pub fn expires_within(&self, leeway: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let leeway = chrono::Duration::from_std(leeway).unwrap_or_else(|_| chrono::Duration::zero());
        expires_at - leeway <= Utc::now()
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// 持久化的会话记录
///
/// 记录不可原地修改；刷新令牌时生成新记录并在同一会话键下覆盖。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub provider: String,
    pub token: TokenRecord,
    /// 写入前由调用方附加的提供方特定字段
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// 新建记录
    pub fn new(provider: impl Into<String>, token: TokenRecord) -> Self {
        Self {
            provider: provider.into(),
            token,
            extra: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// 附加字段
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// 以新令牌生成替代记录，保留附加字段与创建时间
    #[must_use]
    pub fn replaced_token(&self, token: TokenRecord) -> Self {
        Self {
            provider: self.provider.clone(),
            token,
            extra: self.extra.clone(),
            created_at: self.created_at,
        }
    }
}

struct ClientInner {
    http_client: reqwest::Client,
    record: Mutex<SessionRecord>,
    exchanger: TokenExchangeClient,
    provider: Arc<ProviderConfig>,
    store: CredentialStore,
    session_key: String,
}

/// 自动附带访问令牌的 HTTP 客户端
///
/// 令牌临近过期且存在刷新令牌时，先调用令牌端点刷新，再把新记录写回存储。
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<ClientInner>,
}

impl AuthenticatedClient {
    pub(crate) fn new(
        http_client: reqwest::Client,
        record: SessionRecord,
        exchanger: TokenExchangeClient,
        provider: Arc<ProviderConfig>,
        store: CredentialStore,
        session_key: String,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http_client,
                record: Mutex::new(record),
                exchanger,
                provider,
                store,
                session_key,
            }),
        }
    }

    /// 当前有效的访问令牌，必要时刷新
    pub async fn access_token(&self) -> Result<String> {
        let mut record = self.inner.record.lock().await;
        if !record.token.expires_within(REFRESH_LEEWAY) {
            return Ok(record.token.access_token.clone());
        }

        let Some(refresh_token) = record.token.refresh_token.clone() else {
            return Err(SsoError::exchange("访问令牌已过期且没有刷新令牌"));
        };

        let token = self
            .inner
            .exchanger
            .refresh(&self.inner.provider, &refresh_token)
            .await?;
        let refreshed = record.replaced_token(token);
        self.inner
            .store
            .put(
                &self.inner.provider.namespace(),
                &self.inner.session_key,
                &refreshed,
            )
            .await?;

        linfo!(
            "system",
            LogStage::Exchange,
            LogComponent::TokenExchange,
            "refresh",
            "访问令牌已刷新",
            provider = %self.inner.provider.name
        );

        *record = refreshed;
        Ok(record.token.access_token.clone())
    }

    /// 构造附带 Bearer 令牌的请求
    pub async fn request(&self, method: Method, url: impl IntoUrl) -> Result<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(self.inner.http_client.request(method, url).bearer_auth(token))
    }

    /// GET 请求
    pub async fn get(&self, url: impl IntoUrl) -> Result<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    /// 当前记录快照
    pub async fn record(&self) -> SessionRecord {
        self.inner.record.lock().await.clone()
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("provider", &self.inner.provider.name)
            .finish_non_exhaustive()
    }
}

/// 请求解析出的凭据
#[derive(Clone)]
pub struct Credentials {
    pub provider: String,
    pub session_key: String,
    pub record: SessionRecord,
    pub client: AuthenticatedClient,
}

impl Credentials {
    /// 解析时的访问令牌（不触发刷新）
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.record.token.access_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("session_key", &"<redacted>")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
