//! 提供商配置结构与授权URL构建

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::error::{Result, SsoError};

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// 令牌端点的客户端认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// `client_id` / `client_secret` 放在表单参数里
    #[default]
    InParams,
    /// 使用 HTTP Basic 认证头
    BasicAuth,
}

/// 单个OAuth2提供商的配置
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 提供商名称，用于命名存储分区和 cookie
    pub name: String,
    /// OAuth2客户端ID（可由环境变量提供）
    #[serde(default)]
    pub client_id: String,
    /// OAuth2客户端密钥
    #[serde(default)]
    pub client_secret: String,
    /// 授权端点URL（已知提供商可留空）
    #[serde(default)]
    pub authorize_url: String,
    /// 令牌端点URL（已知提供商可留空）
    #[serde(default)]
    pub token_url: String,
    /// 作用域，按顺序拼接
    #[serde(default)]
    pub scopes: Vec<String>,
    /// 固定回调地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// 额外授权参数，例如 `duration=permanent`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_params: BTreeMap<String, String>,
    /// 令牌端点客户端认证方式
    #[serde(default)]
    pub auth_style: AuthStyle,
    /// 发起登录的路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_path: Option<String>,
    /// 提供商回调路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_path: Option<String>,
    /// 退出登录路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_path: Option<String>,
}

impl ProviderConfig {
    /// 创建新的提供商配置
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            scopes: Vec::new(),
            redirect_uri: None,
            extra_params: BTreeMap::new(),
            auth_style: AuthStyle::InParams,
            login_path: None,
            callback_path: None,
            logout_path: None,
        }
    }

    /// GitHub 预设：回调地址由 GitHub 应用设置决定
    pub fn github<I, S>(client_id: impl Into<String>, client_secret: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            "github",
            client_id,
            client_secret,
            GITHUB_AUTHORIZE_URL,
            GITHUB_TOKEN_URL,
        )
        .with_scopes(scopes)
    }

    /// Reddit 预设：需要固定回调地址，请求永久令牌，令牌端点要求 Basic 认证
    pub fn reddit<I, S>(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            "reddit",
            client_id,
            client_secret,
            REDDIT_AUTHORIZE_URL,
            REDDIT_TOKEN_URL,
        )
        .with_scopes(scopes)
        .with_redirect_uri(redirect_uri)
        .with_extra_param("duration", "permanent")
        .with_auth_style(AuthStyle::BasicAuth)
    }

    /// 设置作用域
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// 设置固定回调地址
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// 添加额外授权参数
    #[must_use]
    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    /// 设置令牌端点认证方式
    #[must_use]
    pub const fn with_auth_style(mut self, auth_style: AuthStyle) -> Self {
        self.auth_style = auth_style;
        self
    }

    /// 设置登录、回调、退出路径
    #[must_use]
    pub fn with_paths(
        mut self,
        login_path: impl Into<String>,
        callback_path: impl Into<String>,
        logout_path: impl Into<String>,
    ) -> Self {
        self.login_path = Some(login_path.into());
        self.callback_path = Some(callback_path.into());
        self.logout_path = Some(logout_path.into());
        self
    }

    /// 为已知提供商补齐缺省的端点和特性
    ///
    /// 只填充空字段，显式配置的值保持不变。
    pub fn apply_preset(&mut self) {
        let (authorize_url, token_url) = match self.name.as_str() {
            "github" => (GITHUB_AUTHORIZE_URL, GITHUB_TOKEN_URL),
            "reddit" => {
                self.extra_params
                    .entry("duration".to_string())
                    .or_insert_with(|| "permanent".to_string());
                self.auth_style = AuthStyle::BasicAuth;
                (REDDIT_AUTHORIZE_URL, REDDIT_TOKEN_URL)
            }
            _ => return,
        };
        if self.authorize_url.is_empty() {
            self.authorize_url = authorize_url.to_string();
        }
        if self.token_url.is_empty() {
            self.token_url = token_url.to_string();
        }
    }

    /// 存储分区名：`<provider>Tokens`
    #[must_use]
    pub fn namespace(&self) -> String {
        format!("{}Tokens", self.name)
    }

    /// 会话 cookie 名：`<provider>Tok`
    #[must_use]
    pub fn cookie_name(&self) -> String {
        format!("{}Tok", self.name)
    }

    /// 登录路径，默认 `/auth/<provider>/login`
    #[must_use]
    pub fn login_path(&self) -> String {
        self.login_path
            .clone()
            .unwrap_or_else(|| format!("/auth/{}/login", self.name))
    }

    /// 回调路径，默认 `/auth/<provider>/callback`
    #[must_use]
    pub fn callback_path(&self) -> String {
        self.callback_path
            .clone()
            .unwrap_or_else(|| format!("/auth/{}/callback", self.name))
    }

    /// 退出路径，默认 `/auth/<provider>/logout`
    #[must_use]
    pub fn logout_path(&self) -> String {
        self.logout_path
            .clone()
            .unwrap_or_else(|| format!("/auth/{}/logout", self.name))
    }

    /// 验证配置，返回解析后的授权端点
    pub fn validate(&self) -> Result<Url> {
        if self.name.trim().is_empty() {
            return Err(SsoError::config("提供商名称不能为空"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SsoError::config(format!(
                "提供商名称只能包含字母、数字、'-'和'_': {}",
                self.name
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(SsoError::config(format!("{}配置中缺少client_id", self.name)));
        }

        let authorize_url = Url::parse(&self.authorize_url).map_err(|e| {
            SsoError::config_with_source(format!("{}的授权URL无效", self.name), e)
        })?;
        Url::parse(&self.token_url)
            .map_err(|e| SsoError::config_with_source(format!("{}的令牌URL无效", self.name), e))?;
        if let Some(redirect_uri) = &self.redirect_uri {
            Url::parse(redirect_uri).map_err(|e| {
                SsoError::config_with_source(format!("{}的回调地址无效", self.name), e)
            })?;
        }

        Ok(authorize_url)
    }

    /// 构建授权URL
    ///
    /// `authorize_url` 为 `validate()` 返回的已解析端点。
    #[must_use]
    pub fn build_authorize_url(&self, authorize_url: &Url, state: &str) -> String {
        let mut url = authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            if let Some(redirect_uri) = &self.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            query.append_pair("response_type", "code");
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }
        url.to_string()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("extra_params", &self.extra_params)
            .field("auth_style", &self.auth_style)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn query_of(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_github_authorize_url() {
        let config = ProviderConfig::github("gh-client", "gh-secret", ["public_repo", "write:repo_hook"]);
        let endpoint = config.validate().unwrap();
        let url = config.build_authorize_url(&endpoint, "state123");

        assert!(url.starts_with(GITHUB_AUTHORIZE_URL));
        let params = query_of(&url);
        assert_eq!(params["client_id"], "gh-client");
        assert_eq!(params["scope"], "public_repo write:repo_hook");
        assert_eq!(params["state"], "state123");
        assert_eq!(params["response_type"], "code");
        assert!(!params.contains_key("redirect_uri"));
        assert!(!url.contains("gh-secret"));
    }

    #[test]
    fn test_reddit_preset_quirks() {
        let config = ProviderConfig::reddit("r-id", "r-secret", "https://app.example.com/redditAuth", ["identity"]);
        assert_eq!(config.auth_style, AuthStyle::BasicAuth);

        let endpoint = config.validate().unwrap();
        let params = query_of(&config.build_authorize_url(&endpoint, "s"));
        assert_eq!(params["duration"], "permanent");
        assert_eq!(params["redirect_uri"], "https://app.example.com/redditAuth");
    }

    #[test]
    fn test_apply_preset_keeps_explicit_values() {
        let mut config = ProviderConfig::new("github", "id", "secret", "", "http://127.0.0.1:9/token");
        config.apply_preset();
        assert_eq!(config.authorize_url, GITHUB_AUTHORIZE_URL);
        assert_eq!(config.token_url, "http://127.0.0.1:9/token");

        let mut custom = ProviderConfig::new("gitlab", "id", "secret", "", "");
        custom.apply_preset();
        assert!(custom.authorize_url.is_empty());
        assert!(custom.validate().is_err());
    }

    #[test]
    fn test_names_and_paths() {
        let config = ProviderConfig::github("id", "secret", Vec::<String>::new());
        assert_eq!(config.namespace(), "githubTokens");
        assert_eq!(config.cookie_name(), "githubTok");
        assert_eq!(config.callback_path(), "/auth/github/callback");

        let config = config.with_paths("/login", "/ghauth", "/logout");
        assert_eq!(config.login_path(), "/login");
        assert_eq!(config.callback_path(), "/ghauth");
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(ProviderConfig::new("", "id", "s", "https://a/x", "https://a/t").validate().is_err());
        assert!(ProviderConfig::new("git hub", "id", "s", "https://a/x", "https://a/t").validate().is_err());
        assert!(ProviderConfig::new("p", " ", "s", "https://a/x", "https://a/t").validate().is_err());
        assert!(ProviderConfig::new("p", "id", "s", "not a url", "https://a/t").validate().is_err());
        assert!(
            ProviderConfig::new("p", "id", "s", "https://a/x", "https://a/t")
                .with_redirect_uri("::")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::github("id", "top-secret", ["repo"]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("top-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
