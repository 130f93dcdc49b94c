use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use registration::app::Application;
use registration::shutdown::ShutdownManager;
use registration_core::models::RegistrationRequest;
use registration_core::{init_logging, AppConfig};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("registration")
        .version("1.0.0")
        .about("学生注册扇出聚合与失败重试系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次尝试默认位置"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("启动后提交示例注册")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认位置>")
        )
    })?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动学生注册系统");
    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_listen_address)?;
    }

    let app = Arc::new(Application::new(config).context("初始化应用程序失败")?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    if matches.get_flag("demo") {
        submit_demo_registrations(&app).await;
    }

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(40), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("学生注册系统已退出");
    Ok(())
}

/// 安装Prometheus导出器
fn init_metrics(listen_address: &str) -> Result<()> {
    let addr: SocketAddr = listen_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {listen_address}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus导出器失败")?;
    info!("Prometheus指标导出器监听 {addr}");
    Ok(())
}

async fn submit_demo_registrations(app: &Application) {
    let samples = [
        RegistrationRequest::new(
            "S2026001",
            "Ada Lovelace",
            "ada@rsu.edu",
            "Computer Science",
            Some("1".to_string()),
        ),
        RegistrationRequest::new(
            "S2024017",
            "Grace Hopper",
            "grace@rsu.edu",
            "Mathematics",
            Some("3".to_string()),
        ),
    ];

    let intake = app.intake();
    for request in samples {
        let receipt = intake.submit(request).await;
        info!(
            "示例注册 {}: {:?} {}",
            receipt.student_id,
            receipt.status,
            receipt.routing_message.as_deref().unwrap_or(&receipt.message)
        );
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
