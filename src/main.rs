//! # OAuth SSO 主程序
//!
//! 加载配置、打开凭据存储并为每个身份提供方挂载登录路由

use clap::Parser;
use oauth_sso::{
    Result, config, lerror, linfo,
    logging::{self, LogComponent, LogStage},
    server,
};

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "oauth-sso", version, about = "OAuth2 单点登录服务")]
struct Cli {
    /// 配置文件路径（默认读取 SSO_CONFIG_PATH 或 config/sso.toml）
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,

    /// 只校验配置后退出
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref());

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let app_config = match config::load_config(&config_path) {
        Ok(app_config) => app_config,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "load_config",
                &format!("配置加载失败: {e}"),
                path = %config_path
            );
            std::process::exit(1);
        }
    };

    if cli.check_config {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "check_config",
            "配置校验通过",
            path = %config_path,
            providers = app_config.providers.len()
        );
        return Ok(());
    }

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动"
    );
    if let Err(e) = server::run_server(&app_config).await {
        // 存储打不开或端口被占用时无法提供服务
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }
    Ok(())
}
