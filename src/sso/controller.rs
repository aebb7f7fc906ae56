//! # 授权码流程控制器
//!
//! 组合提供方配置、state 登记表、凭据存储和 cookie 绑定，提供三个协议操作：
//! 发起登录、处理回调、从请求解析凭据。另提供登出、分派辅助、axum 路由与提取器。
//!
//! 回调失败一律以 `302 /?ssoError=<reason>` 返回，不返回 4xx/5xx。

use async_trait::async_trait;
use axum::{
    Form, Router,
    extract::{FromRef, FromRequestParts, Query, State, rejection::{FormRejection, QueryRejection}},
    http::{HeaderValue, StatusCode, header::LOCATION, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::cookie::{DEFAULT_SESSION_TTL_DAYS, SessionCookieBinder};
use super::credential::{AuthenticatedClient, Credentials, SessionRecord};
use super::random::{SESSION_KEY_LENGTH, SecureTokenGenerator, TokenGenerator};
use super::state::{DEFAULT_STATE_CAPACITY, DEFAULT_STATE_TTL, StateRegistry};
use super::token_exchange::{DEFAULT_EXCHANGE_TIMEOUT, TokenExchangeClient};
use crate::error::{Result, SsoError};
use crate::provider::ProviderConfig;
use crate::storage::CredentialStore;
use crate::{
    ldebug, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// `302 Found` 重定向
///
/// axum 自带的 `Redirect::to` 是 303，这里保持浏览器 SSO 流程常用的 302。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found(String);

impl Found {
    /// 重定向到 `location`
    pub fn to(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// 重定向到首页并携带错误原因
    #[must_use]
    pub fn sso_error(reason: &str) -> Self {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("ssoError", reason)
            .finish();
        Self(format!("/?{query}"))
    }

    /// 目标地址
    #[must_use]
    pub fn location(&self) -> &str {
        &self.0
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        match HeaderValue::try_from(self.0) {
            Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// 回调参数（query 或 form）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
    /// 提供方返回的错误（如用户拒绝授权）
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// 以当前值为准，缺失的字段从 `other` 补齐
    #[must_use]
    pub fn or_fill_from(mut self, other: Self) -> Self {
        if self.state.is_empty() {
            self.state = other.state;
        }
        if self.code.is_empty() {
            self.code = other.code;
        }
        self.error = self.error.or(other.error);
        self.error_description = self.error_description.or(other.error_description);
        self
    }
}

/// 写入存储前附加提供方特定字段（如登录名、头像）
#[async_trait]
pub trait SessionEnricher: Send + Sync {
    /// 修改即将写入的记录；返回错误时登录以 `exchange-failed` 结束
    async fn enrich(
        &self,
        provider: &ProviderConfig,
        http_client: &reqwest::Client,
        record: &mut SessionRecord,
    ) -> Result<()>;
}

/// 控制器运行参数
#[derive(Clone)]
pub struct FlowOptions {
    pub state_ttl: Duration,
    pub state_capacity: u64,
    pub exchange_timeout: Duration,
    pub cookie_secure: bool,
    pub session_ttl_days: i64,
    pub generator: Arc<dyn TokenGenerator>,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            state_ttl: DEFAULT_STATE_TTL,
            state_capacity: DEFAULT_STATE_CAPACITY,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            cookie_secure: true,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            generator: Arc::new(SecureTokenGenerator),
        }
    }
}

impl FlowOptions {
    /// 注入随机令牌来源
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// 设置 cookie 的 `Secure` 标志
    #[must_use]
    pub const fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// 设置令牌交换超时
    #[must_use]
    pub const fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// 设置 state 新鲜度窗口
    #[must_use]
    pub const fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }
}

impl fmt::Debug for FlowOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowOptions")
            .field("state_ttl", &self.state_ttl)
            .field("state_capacity", &self.state_capacity)
            .field("exchange_timeout", &self.exchange_timeout)
            .field("cookie_secure", &self.cookie_secure)
            .field("session_ttl_days", &self.session_ttl_days)
            .finish_non_exhaustive()
    }
}

/// 单个身份提供方的授权码流程控制器
pub struct AuthFlowController {
    provider: Arc<ProviderConfig>,
    authorize_url: Url,
    namespace: String,
    states: StateRegistry,
    store: CredentialStore,
    exchanger: TokenExchangeClient,
    cookies: SessionCookieBinder,
    generator: Arc<dyn TokenGenerator>,
    http_client: reqwest::Client,
    enricher: Option<Arc<dyn SessionEnricher>>,
}

impl AuthFlowController {
    /// 校验配置并确保存储分区存在
    pub async fn new(
        provider: ProviderConfig,
        store: CredentialStore,
        options: FlowOptions,
    ) -> Result<Self> {
        let authorize_url = provider.validate()?;
        let namespace = provider.namespace();
        store.ensure_namespace(&namespace).await?;

        let exchanger = TokenExchangeClient::new(options.exchange_timeout)?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("oauth-sso/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SsoError::config_with_source("无法创建 API HTTP 客户端", e))?;
        let states = StateRegistry::new(
            options.state_ttl,
            options.state_capacity,
            Arc::clone(&options.generator),
        );
        let cookies = SessionCookieBinder::new(provider.cookie_name(), options.cookie_secure)
            .with_ttl_days(options.session_ttl_days);

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Controller,
            "init",
            "SSO 控制器初始化完成",
            provider = %provider.name,
            namespace = %namespace,
            backend = store.backend_name()
        );

        Ok(Self {
            provider: Arc::new(provider),
            authorize_url,
            namespace,
            states,
            store,
            exchanger,
            cookies,
            generator: options.generator,
            http_client,
            enricher: None,
        })
    }

    /// 设置会话附加字段的钩子
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn SessionEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// 提供方配置
    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// 存储分区名
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// state 登记表
    #[must_use]
    pub const fn state_registry(&self) -> &StateRegistry {
        &self.states
    }

    /// 凭据存储
    #[must_use]
    pub const fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// cookie 绑定
    #[must_use]
    pub const fn cookie_binder(&self) -> &SessionCookieBinder {
        &self.cookies
    }

    /// 发起登录：签发 state 并重定向到提供方授权页
    pub async fn begin_login(&self) -> Found {
        let state = self.states.issue().await;
        let location = self.provider.build_authorize_url(&self.authorize_url, &state);
        ldebug!(
            "system",
            LogStage::Authentication,
            LogComponent::Controller,
            "begin_login",
            "重定向到提供方授权页",
            provider = %self.provider.name
        );
        Found::to(location)
    }

    /// 处理回调：成功时写入会话 cookie 并重定向到 `/`，失败时重定向到 `/?ssoError=<reason>`
    pub async fn complete_login(&self, jar: CookieJar, params: &CallbackParams) -> (CookieJar, Found) {
        match self.exchange_callback(params).await {
            Ok(session_key) => {
                linfo!(
                    "system",
                    LogStage::Callback,
                    LogComponent::Controller,
                    "complete_login",
                    "登录完成",
                    provider = %self.provider.name
                );
                (self.cookies.issue(jar, &session_key), Found::to("/"))
            }
            Err(e) => {
                let reason = e.redirect_reason().unwrap_or("exchange-failed");
                lwarn!(
                    "system",
                    LogStage::Callback,
                    LogComponent::Controller,
                    "complete_login",
                    "登录失败",
                    provider = %self.provider.name,
                    reason = reason,
                    error = %e
                );
                (jar, Found::sso_error(reason))
            }
        }
    }

    /// 回调的核心事务，成功时返回新会话键
    ///
    /// state 在检查授权码之前被消费，所以缺少授权码的回调同样会烧掉 state。
    pub async fn exchange_callback(&self, params: &CallbackParams) -> Result<String> {
        if params.state.is_empty() || !self.states.consume(&params.state).await {
            return Err(SsoError::BadState);
        }
        if params.code.is_empty() {
            if let Some(error) = &params.error {
                ldebug!(
                    "system",
                    LogStage::Callback,
                    LogComponent::Controller,
                    "provider_error",
                    "提供方返回错误",
                    provider = %self.provider.name,
                    error = %error,
                    description = ?params.error_description
                );
            }
            return Err(SsoError::MissingCode);
        }

        let token = self
            .exchanger
            .exchange_code(&self.provider, &params.code)
            .await?;
        let mut record = SessionRecord::new(self.provider.name.clone(), token);

        if let Some(enricher) = &self.enricher {
            enricher
                .enrich(&self.provider, &self.http_client, &mut record)
                .await
                .map_err(|e| match e {
                    SsoError::ExchangeFailed { .. } => e,
                    other => SsoError::exchange(format!("会话附加字段失败: {other}")),
                })?;
        }

        let session_key = self.generator.generate(SESSION_KEY_LENGTH);
        self.store
            .put(&self.namespace, &session_key, &record)
            .await
            .map_err(|e| SsoError::store_failed("写入会话记录失败", e))?;
        Ok(session_key)
    }

    /// 解析请求凭据，任何异常都视为未登录
    pub async fn resolve(&self, jar: &CookieJar) -> Option<Credentials> {
        match self.try_resolve(jar).await {
            Ok(credentials) => credentials,
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Resolve,
                    LogComponent::Controller,
                    "resolve",
                    "会话记录不可用，按未登录处理",
                    provider = %self.provider.name,
                    error = %e
                );
                None
            }
        }
    }

    /// 解析请求凭据
    ///
    /// 无 cookie、会话键未知、访问令牌为空时返回 `Ok(None)`；记录损坏或存储异常时返回错误。
    pub async fn try_resolve(&self, jar: &CookieJar) -> Result<Option<Credentials>> {
        let Some(session_key) = self.cookies.read(jar) else {
            return Ok(None);
        };

        let record = match self.store.get(&self.namespace, &session_key).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if !record.token.is_usable() {
            return Ok(None);
        }

        let client = AuthenticatedClient::new(
            self.http_client.clone(),
            record.clone(),
            self.exchanger.clone(),
            Arc::clone(&self.provider),
            self.store.clone(),
            session_key.clone(),
        );
        Ok(Some(Credentials {
            provider: self.provider.name.clone(),
            session_key,
            record,
            client,
        }))
    }

    /// 登出：删除存储记录并清除 cookie
    pub async fn logout(&self, jar: CookieJar) -> (CookieJar, Found) {
        if let Some(session_key) = self.cookies.read(&jar) {
            if let Err(e) = self.store.delete(&self.namespace, &session_key).await {
                lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::Controller,
                    "logout",
                    "删除会话记录失败",
                    provider = %self.provider.name,
                    error = %e
                );
            }
        }
        (self.cookies.clear(jar), Found::to("/"))
    }

    /// 按是否已登录在两个处理器之间分派
    pub async fn dispatch<R, LoggedOut, LoggedOutFut, LoggedIn, LoggedInFut>(
        &self,
        jar: &CookieJar,
        logged_out: LoggedOut,
        logged_in: LoggedIn,
    ) -> R
    where
        LoggedOut: FnOnce() -> LoggedOutFut,
        LoggedOutFut: Future<Output = R>,
        LoggedIn: FnOnce(Credentials) -> LoggedInFut,
        LoggedInFut: Future<Output = R>,
    {
        match self.resolve(jar).await {
            Some(credentials) => logged_in(credentials).await,
            None => logged_out().await,
        }
    }

    /// 启动 state 清扫任务
    pub fn spawn_state_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.states.spawn_sweeper(interval)
    }

    /// 登录、回调（GET/POST）、登出路由
    pub fn routes<S>(self: &Arc<Self>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(&self.provider.login_path(), get(login_handler))
            .route(
                &self.provider.callback_path(),
                get(callback_query_handler).post(callback_form_handler),
            )
            .route(
                &self.provider.logout_path(),
                get(logout_handler).post(logout_handler),
            )
            .with_state(Arc::clone(self))
    }
}

impl fmt::Debug for AuthFlowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthFlowController")
            .field("provider", &self.provider)
            .field("namespace", &self.namespace)
            .field("states", &self.states)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

async fn login_handler(State(controller): State<Arc<AuthFlowController>>) -> Found {
    controller.begin_login().await
}

async fn callback_query_handler(
    State(controller): State<Arc<AuthFlowController>>,
    jar: CookieJar,
    params: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> (CookieJar, Found) {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    controller.complete_login(jar, &params).await
}

/// POST 回调：查询串优先，表单补齐
async fn callback_form_handler(
    State(controller): State<Arc<AuthFlowController>>,
    jar: CookieJar,
    query: std::result::Result<Query<CallbackParams>, QueryRejection>,
    form: std::result::Result<Form<CallbackParams>, FormRejection>,
) -> (CookieJar, Found) {
    let query = query.map(|Query(params)| params).unwrap_or_default();
    let form = form.map(|Form(params)| params).unwrap_or_default();
    controller.complete_login(jar, &query.or_fill_from(form)).await
}

async fn logout_handler(
    State(controller): State<Arc<AuthFlowController>>,
    jar: CookieJar,
) -> (CookieJar, Found) {
    controller.logout(jar).await
}

/// 处理器中可选的已解析凭据
///
/// 应用状态需能通过 `FromRef` 取得对应提供方的 `Arc<AuthFlowController>`。
#[derive(Debug, Clone)]
pub struct OptionalCredentials(pub Option<Credentials>);

impl<S> FromRequestParts<S> for OptionalCredentials
where
    Arc<AuthFlowController>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let controller = Arc::<AuthFlowController>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(Self(controller.resolve(&jar).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::credential::TokenRecord;
    use crate::sso::random::SequenceTokenGenerator;
    use crate::storage::{MemoryBackend, MockKvBackend};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(
            "github",
            "client-1",
            "secret-1",
            format!("{}/authorize", server.uri()),
            format!("{}/token", server.uri()),
        )
        .with_scopes(["public_repo"])
    }

    async fn controller(
        server: &MockServer,
        generator: Arc<SequenceTokenGenerator>,
    ) -> (AuthFlowController, CredentialStore) {
        let store = CredentialStore::new(Arc::new(MemoryBackend::new()));
        let options = FlowOptions::default().with_generator(generator);
        let controller = AuthFlowController::new(provider(server), store.clone(), options)
            .await
            .unwrap();
        (controller, store)
    }

    fn params(state: &str, code: &str) -> CallbackParams {
        CallbackParams {
            state: state.to_string(),
            code: code.to_string(),
            ..CallbackParams::default()
        }
    }

    async fn mount_token(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn test_found_locations() {
        assert_eq!(Found::sso_error("bad-state").location(), "/?ssoError=bad-state");
        let response = Found::to("/").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_begin_login_embeds_state() {
        let server = MockServer::start().await;
        let generator = Arc::new(SequenceTokenGenerator::new(["abc123"]));
        let (controller, _) = controller(&server, generator).await;

        let found = controller.begin_login().await;
        let url = Url::parse(found.location()).unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(query.contains(&("state".to_string(), "abc123".to_string())));
        assert!(query.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(query.contains(&("scope".to_string(), "public_repo".to_string())));
    }

    #[tokio::test]
    async fn test_successful_callback_stores_and_sets_cookie() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200).set_body_string("access_token=TOK123&token_type=bearer"),
        )
        .await;
        let generator = Arc::new(SequenceTokenGenerator::new(["abc123", "session-key-1"]));
        let (controller, store) = controller(&server, generator).await;
        controller.begin_login().await;

        let (jar, found) = controller
            .complete_login(CookieJar::new(), &params("abc123", "xyz"))
            .await;

        assert_eq!(found.location(), "/");
        assert_eq!(jar.get("githubTok").unwrap().value(), "session-key-1");
        let stored = store.get("githubTokens", "session-key-1").await.unwrap();
        assert_eq!(stored.token.access_token, "TOK123");
        assert_eq!(stored.provider, "github");

        let (_, replay) = controller
            .complete_login(CookieJar::new(), &params("abc123", "xyz"))
            .await;
        assert_eq!(replay.location(), "/?ssoError=bad-state");
    }

    #[tokio::test]
    async fn test_bad_state_regardless_of_code() {
        let server = MockServer::start().await;
        let (controller, _) = controller(&server, Arc::new(SequenceTokenGenerator::default())).await;

        for (state, code) in [("", "xyz"), ("", ""), ("unknown", "xyz"), ("unknown", "")] {
            let err = controller.exchange_callback(&params(state, code)).await.unwrap_err();
            assert!(matches!(err, SsoError::BadState));
        }
    }

    #[tokio::test]
    async fn test_missing_code_burns_state() {
        let server = MockServer::start().await;
        let generator = Arc::new(SequenceTokenGenerator::new(["abc123"]));
        let (controller, _) = controller(&server, generator).await;
        controller.begin_login().await;

        let (_, found) = controller
            .complete_login(CookieJar::new(), &params("abc123", ""))
            .await;
        assert_eq!(found.location(), "/?ssoError=no-code");

        let err = controller
            .exchange_callback(&params("abc123", "xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, SsoError::BadState));
    }

    #[tokio::test]
    async fn test_exchange_failure_writes_nothing() {
        let server = MockServer::start().await;
        mount_token(&server, ResponseTemplate::new(502)).await;

        let mut backend = MockKvBackend::new();
        backend.expect_ensure_namespace().returning(|_| Ok(()));
        backend.expect_put().never();
        backend.expect_backend_name().return_const("mock");
        let store = CredentialStore::new(Arc::new(backend));
        let options = FlowOptions::default()
            .with_generator(Arc::new(SequenceTokenGenerator::new(["abc123"])));
        let controller = AuthFlowController::new(provider(&server), store, options)
            .await
            .unwrap();
        controller.begin_login().await;

        let (jar, found) = controller
            .complete_login(CookieJar::new(), &params("abc123", "xyz"))
            .await;
        assert_eq!(found.location(), "/?ssoError=exchange-failed");
        assert!(jar.get("githubTok").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_store_failed() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200).set_body_string("access_token=TOK&token_type=bearer"),
        )
        .await;

        let mut backend = MockKvBackend::new();
        backend.expect_ensure_namespace().returning(|_| Ok(()));
        backend
            .expect_put()
            .returning(|_, _, _| Err(SsoError::persistence("只读文件系统")));
        backend.expect_backend_name().return_const("mock");
        let store = CredentialStore::new(Arc::new(backend));
        let options = FlowOptions::default()
            .with_generator(Arc::new(SequenceTokenGenerator::new(["abc123"])));
        let controller = AuthFlowController::new(provider(&server), store, options)
            .await
            .unwrap();
        controller.begin_login().await;

        let (_, found) = controller
            .complete_login(CookieJar::new(), &params("abc123", "xyz"))
            .await;
        assert_eq!(found.location(), "/?ssoError=store-failed");
    }

    #[tokio::test]
    async fn test_resolve_none_cases() {
        let server = MockServer::start().await;
        let (controller, store) = controller(&server, Arc::new(SequenceTokenGenerator::default())).await;
        store
            .put(
                "githubTokens",
                "empty-token",
                &SessionRecord::new("github", TokenRecord::bearer("")),
            )
            .await
            .unwrap();

        assert!(controller.resolve(&CookieJar::new()).await.is_none());
        for key in ["unknown", "empty-token"] {
            let jar = controller.cookie_binder().issue(CookieJar::new(), key);
            assert!(controller.resolve(&jar).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_corrupt_record_soft_and_hard_fail() {
        let server = MockServer::start().await;
        let mut backend = MockKvBackend::new();
        backend.expect_ensure_namespace().returning(|_| Ok(()));
        backend
            .expect_get()
            .returning(|_, _| Ok(Some(b"garbage".to_vec())));
        backend.expect_backend_name().return_const("mock");
        let store = CredentialStore::new(Arc::new(backend));
        let controller = AuthFlowController::new(provider(&server), store, FlowOptions::default())
            .await
            .unwrap();
        let jar = controller.cookie_binder().issue(CookieJar::new(), "k");

        assert!(controller.resolve(&jar).await.is_none());
        let err = controller.try_resolve(&jar).await.unwrap_err();
        assert!(matches!(err, SsoError::Deserialization { .. }));
    }

    #[tokio::test]
    async fn test_resolve_and_dispatch_logged_in() {
        let server = MockServer::start().await;
        let (controller, store) = controller(&server, Arc::new(SequenceTokenGenerator::default())).await;
        store
            .put(
                "githubTokens",
                "k1",
                &SessionRecord::new("github", TokenRecord::bearer("TOK")),
            )
            .await
            .unwrap();
        let jar = controller.cookie_binder().issue(CookieJar::new(), "k1");

        let credentials = controller.resolve(&jar).await.unwrap();
        assert_eq!(credentials.access_token(), "TOK");
        assert_eq!(credentials.session_key, "k1");

        let who = controller
            .dispatch(
                &jar,
                || async { "anonymous".to_string() },
                |credentials| async move { credentials.provider },
            )
            .await;
        assert_eq!(who, "github");

        let who = controller
            .dispatch(
                &CookieJar::new(),
                || async { "anonymous".to_string() },
                |credentials| async move { credentials.provider },
            )
            .await;
        assert_eq!(who, "anonymous");
    }

    #[tokio::test]
    async fn test_logout_deletes_record() {
        let server = MockServer::start().await;
        let (controller, store) = controller(&server, Arc::new(SequenceTokenGenerator::default())).await;
        store
            .put(
                "githubTokens",
                "k1",
                &SessionRecord::new("github", TokenRecord::bearer("TOK")),
            )
            .await
            .unwrap();
        let jar = controller.cookie_binder().issue(CookieJar::new(), "k1");

        let (_, found) = controller.logout(jar).await;
        assert_eq!(found.location(), "/");
        assert!(store.get("githubTokens", "k1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_enricher_attaches_fields() {
        struct LoginEnricher;

        #[async_trait]
        impl SessionEnricher for LoginEnricher {
            async fn enrich(
                &self,
                _provider: &ProviderConfig,
                _http_client: &reqwest::Client,
                record: &mut SessionRecord,
            ) -> Result<()> {
                record.extra.insert("login".to_string(), "octocat".into());
                Ok(())
            }
        }

        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200).set_body_string("access_token=TOK&token_type=bearer"),
        )
        .await;
        let generator = Arc::new(SequenceTokenGenerator::new(["abc123", "k1"]));
        let (controller, store) = controller(&server, generator).await;
        let controller = controller.with_enricher(Arc::new(LoginEnricher));
        controller.begin_login().await;

        controller
            .exchange_callback(&params("abc123", "xyz"))
            .await
            .unwrap();
        let stored = store.get("githubTokens", "k1").await.unwrap();
        assert_eq!(stored.extra.get("login").and_then(|v| v.as_str()), Some("octocat"));
    }

    #[test]
    fn test_callback_params_query_wins_and_form_fills_gaps() {
        let query = CallbackParams {
            state: "abc123".to_string(),
            ..CallbackParams::default()
        };
        let form = CallbackParams {
            state: "ignored".to_string(),
            code: "xyz".to_string(),
            error: Some("access_denied".to_string()),
            ..CallbackParams::default()
        };

        let merged = query.or_fill_from(form);
        assert_eq!(merged.state, "abc123");
        assert_eq!(merged.code, "xyz");
        assert_eq!(merged.error.as_deref(), Some("access_denied"));
    }
}
