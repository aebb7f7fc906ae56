//! # 服务装配
//!
//! 从配置构建凭据存储、各提供方控制器、路由与后台任务，并运行 HTTP 服务。

use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    response::Html,
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, StorageKind};
use crate::database::{init_database, run_migrations};
use crate::error::{Context, Result, SsoError};
use crate::sso::AuthFlowController;
use crate::storage::{CredentialStore, DatabaseBackend, KvBackend, MemoryBackend};
use crate::{
    ldebug, lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 出现在首页上的错误原因白名单
const KNOWN_REASONS: [&str; 4] = ["bad-state", "no-code", "exchange-failed", "store-failed"];

/// 装配完成的服务
pub struct SsoApp {
    /// 全部路由（含首页）
    pub router: Router,
    /// 按配置顺序的控制器
    pub controllers: Vec<Arc<AuthFlowController>>,
    /// 凭据存储
    pub store: CredentialStore,
}

/// 按配置打开凭据存储，数据库不可用时返回错误
pub async fn open_store(config: &AppConfig) -> Result<CredentialStore> {
    let backend: Arc<dyn KvBackend> = match config.sso.storage {
        StorageKind::Database => {
            let db = init_database(&config.database)
                .await
                .context("数据库连接失败")?;
            run_migrations(&db).await.context("数据库迁移失败")?;
            Arc::new(DatabaseBackend::new(db))
        }
        StorageKind::Memory => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Main,
                "open_store",
                "使用内存凭据存储，重启后会话全部失效"
            );
            Arc::new(MemoryBackend::new())
        }
    };
    Ok(CredentialStore::new(backend).with_timeout(config.sso.store_timeout()))
}

/// 为每个提供方创建控制器
pub async fn build_controllers(
    config: &AppConfig,
    store: &CredentialStore,
) -> Result<Vec<Arc<AuthFlowController>>> {
    let mut controllers = Vec::with_capacity(config.providers.len());
    for provider in &config.providers {
        let name = provider.name.clone();
        let controller =
            AuthFlowController::new(provider.clone(), store.clone(), config.sso.flow_options())
                .await
                .with_context(|| format!("初始化提供方 {name} 失败"))?;
        controllers.push(Arc::new(controller));
    }
    Ok(controllers)
}

#[derive(Clone)]
struct IndexState {
    controllers: Arc<[Arc<AuthFlowController>]>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexQuery {
    #[serde(rename = "ssoError")]
    sso_error: Option<String>,
}

/// 首页：列出每个提供方的登录状态
async fn index_handler(
    State(state): State<IndexState>,
    jar: CookieJar,
    query: std::result::Result<Query<IndexQuery>, QueryRejection>,
) -> Html<String> {
    let mut body = String::from("<!doctype html><html><body><h1>SSO</h1>");

    let reason = query
        .ok()
        .and_then(|Query(query)| query.sso_error)
        .filter(|reason| KNOWN_REASONS.contains(&reason.as_str()));
    if let Some(reason) = reason {
        let _ = write!(body, "<p class=\"error\">登录失败: {reason}</p>");
    }

    body.push_str("<ul>");
    for controller in state.controllers.iter() {
        let provider = controller.provider();
        let item = controller
            .dispatch(
                &jar,
                move || async move {
                    format!(
                        "<li><a href=\"{}\">使用 {} 登录</a></li>",
                        provider.login_path(),
                        provider.name
                    )
                },
                move |credentials| async move {
                    format!(
                        "<li>已通过 {} 登录 <a href=\"{}\">退出</a></li>",
                        credentials.provider,
                        provider.logout_path()
                    )
                },
            )
            .await;
        body.push_str(&item);
    }
    body.push_str("</ul></body></html>");
    Html(body)
}

/// 合并所有提供方路由与首页
pub fn build_router(controllers: &[Arc<AuthFlowController>]) -> Router {
    let mut router = Router::new();
    for controller in controllers {
        router = router.merge(controller.routes::<()>());
    }

    let index = Router::new()
        .route("/", get(index_handler))
        .with_state(IndexState {
            controllers: controllers.to_vec().into(),
        });

    router.merge(index).layer(TraceLayer::new_for_http())
}

/// 组装完整服务
pub async fn build_app(config: &AppConfig) -> Result<SsoApp> {
    let store = open_store(config).await?;
    let controllers = build_controllers(config, &store).await?;
    let router = build_router(&controllers);
    Ok(SsoApp {
        router,
        controllers,
        store,
    })
}

/// 启动 state 清扫与过期凭据清扫
pub fn spawn_background_tasks(config: &AppConfig, app: &SsoApp) -> Vec<JoinHandle<()>> {
    let interval = config.sso.sweep_interval();
    let mut handles: Vec<JoinHandle<()>> = app
        .controllers
        .iter()
        .map(|controller| controller.spawn_state_sweeper(interval))
        .collect();

    let store = app.store.clone();
    let namespaces: Vec<String> = app
        .controllers
        .iter()
        .map(|controller| controller.namespace().to_string())
        .collect();
    let max_age = config.sso.session_ttl();
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for namespace in &namespaces {
                match store.purge_expired(namespace, max_age).await {
                    Ok(0) => {}
                    Ok(purged) => ldebug!(
                        "system",
                        LogStage::BackgroundTask,
                        LogComponent::CredentialStore,
                        "credential_sweep",
                        "已清理过期凭据",
                        namespace = %namespace,
                        purged = purged
                    ),
                    Err(e) => lwarn!(
                        "system",
                        LogStage::BackgroundTask,
                        LogComponent::CredentialStore,
                        "credential_sweep",
                        "清理过期凭据失败",
                        namespace = %namespace,
                        error = %e
                    ),
                }
            }
        }
    }));
    handles
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "signal",
            "无法监听 Ctrl+C 信号",
            error = %e
        );
        std::future::pending::<()>().await;
    }
}

/// 运行 HTTP 服务直到收到 Ctrl+C
pub async fn run_server(config: &AppConfig) -> Result<()> {
    let app = build_app(config).await?;
    let tasks = spawn_background_tasks(config, &app);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SsoError::Io {
            message: format!("无法监听 {addr}"),
            source: e,
        })?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "listen",
        &format!("SSO 服务监听于 {addr}"),
        providers = app.controllers.len(),
        backend = app.store.backend_name()
    );

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SsoError::Io {
            message: "HTTP 服务异常退出".to_string(),
            source: e,
        })?;

    for task in tasks {
        task.abort();
    }
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "shutdown",
        "服务正常关闭"
    );
    Ok(())
}
