//! # 令牌交换
//!
//! 授权码换取访问令牌、刷新令牌换取新令牌。请求为标准表单，响应同时接受
//! JSON 与表单编码（部分提供方默认返回 `access_token=...&token_type=...`）。

use chrono::Utc;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};
use std::time::Duration;

use super::credential::TokenRecord;
use crate::error::{Result, SsoError};
use crate::provider::{AuthStyle, ProviderConfig};
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 默认交换超时
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// 错误响应体在消息中保留的最大长度
const MAX_ERROR_BODY: usize = 256;

/// 令牌端点客户端
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl TokenExchangeClient {
    /// 创建带超时的客户端
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oauth-sso/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SsoError::config_with_source("无法创建令牌交换 HTTP 客户端", e))?;
        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// 使用外部提供的 HTTP 客户端
    #[must_use]
    pub const fn with_client(http_client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    /// 交换超时
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 用授权码换取令牌
    pub async fn exchange_code(&self, provider: &ProviderConfig, code: &str) -> Result<TokenRecord> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
        ];
        if let Some(redirect_uri) = &provider.redirect_uri {
            params.push(("redirect_uri", redirect_uri.clone()));
        }
        self.request_token(provider, params).await
    }

    /// 用刷新令牌换取新令牌
    ///
    /// 提供方未返回新的刷新令牌时沿用旧值。
    pub async fn refresh(&self, provider: &ProviderConfig, refresh_token: &str) -> Result<TokenRecord> {
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        let mut record = self.request_token(provider, params).await?;
        if record.refresh_token.is_none() {
            record.refresh_token = Some(refresh_token.to_string());
        }
        Ok(record)
    }

    async fn request_token(
        &self,
        provider: &ProviderConfig,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<TokenRecord> {
        let mut request = self
            .http_client
            .post(&provider.token_url)
            .header(ACCEPT, "application/json");

        match provider.auth_style {
            AuthStyle::InParams => {
                params.push(("client_id", provider.client_id.clone()));
                if !provider.client_secret.is_empty() {
                    params.push(("client_secret", provider.client_secret.clone()));
                }
            }
            AuthStyle::BasicAuth => {
                request = request.basic_auth(
                    form_escape(&provider.client_id),
                    Some(form_escape(&provider.client_secret)),
                );
            }
        }

        let grant_type = params
            .first()
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        let exchange = async {
            let response = request.form(&params).send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await?;
            Ok::<_, SsoError>((status, content_type, body))
        };

        let (status, content_type, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                SsoError::exchange(format!("令牌端点超时 ({}ms)", self.timeout.as_millis()))
            })??;

        if !status.is_success() {
            lwarn!(
                "system",
                LogStage::Exchange,
                LogComponent::TokenExchange,
                "token_request",
                "令牌端点返回错误状态",
                provider = %provider.name,
                grant_type = %grant_type,
                status = status.as_u16()
            );
            return Err(SsoError::exchange(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body, MAX_ERROR_BODY)
            )));
        }

        let record = parse_token_body(content_type.as_deref(), &body)?;
        ldebug!(
            "system",
            LogStage::Exchange,
            LogComponent::TokenExchange,
            "token_request",
            "令牌交换成功",
            provider = %provider.name,
            grant_type = %grant_type,
            has_refresh_token = record.refresh_token.is_some(),
            expires_at = ?record.expires_at
        );
        Ok(record)
    }
}

/// 解析令牌端点响应
///
/// 先归一化为 JSON 对象再交给 `BasicTokenResponse` 反序列化：
/// 缺省 `token_type` 视为 bearer，字符串形式的 `expires_in` 转为数字，
/// 空字符串字段视为缺失。出现 `error` 字段即视为失败。
pub fn parse_token_body(content_type: Option<&str>, body: &str) -> Result<TokenRecord> {
    let is_json = content_type.is_some_and(|value| value.contains("json"))
        || body.trim_start().starts_with('{');

    let mut fields: Map<String, Value> = if is_json {
        serde_json::from_str(body)
            .map_err(|e| SsoError::exchange(format!("令牌响应不是合法 JSON: {e}")))?
    } else {
        url::form_urlencoded::parse(body.trim().as_bytes())
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect()
    };

    if let Some(error) = fields.get("error").and_then(Value::as_str) {
        let description = fields
            .get("error_description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(SsoError::exchange(format!("{error}: {description}")));
    }

    fields.retain(|_, value| !matches!(value, Value::String(s) if s.is_empty()) && !value.is_null());
    fields
        .entry("token_type")
        .or_insert_with(|| Value::String("bearer".to_string()));
    normalize_expires_in(&mut fields);

    let response: BasicTokenResponse = serde_json::from_value(Value::Object(fields))
        .map_err(|e| SsoError::exchange(format!("令牌响应格式错误: {e}")))?;

    let access_token = response.access_token().secret().clone();
    if access_token.trim().is_empty() {
        return Err(SsoError::exchange("令牌响应缺少 access_token"));
    }

    // 超出时间可表示范围的 expires_in 按永不过期处理
    let expires_at = response
        .expires_in()
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .and_then(|ttl| Utc::now().checked_add_signed(ttl));

    Ok(TokenRecord {
        access_token,
        refresh_token: response.refresh_token().map(|token| token.secret().clone()),
        token_type: response.token_type().as_ref().to_string(),
        expires_at,
        scopes: response
            .scopes()
            .map(|scopes| scopes.iter().map(|scope| scope.as_str().to_owned()).collect())
            .unwrap_or_default(),
    })
}

fn normalize_expires_in(fields: &mut Map<String, Value>) {
    let parsed = match fields.get("expires_in") {
        Some(Value::String(raw)) => raw.trim().parse::<u64>().ok().map(Value::from),
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .map(Value::from),
        _ => return,
    };
    match parsed {
        Some(value) => {
            fields.insert("expires_in".to_string(), value);
        }
        None => {
            fields.remove("expires_in");
        }
    }
}

fn form_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn truncate(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
