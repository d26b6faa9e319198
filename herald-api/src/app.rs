use crate::router::{admin, status};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use herald_cluster::ProxyCoordinator;
use herald_core::config::loader::load_config;
use herald_core::ClusterConfig;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 应用状态，包含协调器和配置
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ProxyCoordinator>,
    pub config: Arc<ClusterConfig>,
}

impl AppState {
    /// 从默认配置文件创建应用状态
    pub async fn new() -> Result<Self> {
        let config = load_config()?;
        info!("Configuration loaded successfully");
        Self::from_config(config).await
    }

    /// 从给定配置创建应用状态并启动协调器
    pub async fn from_config(config: ClusterConfig) -> Result<Self> {
        let coordinator = Arc::new(ProxyCoordinator::from_config(config.clone()).await?);
        coordinator.start().await?;
        info!("Proxy coordinator started");

        Ok(Self {
            coordinator,
            config: Arc::new(config),
        })
    }

    /// 使用外部构建的协调器创建应用状态（测试用）
    pub fn from_parts(config: ClusterConfig, coordinator: Arc<ProxyCoordinator>) -> Self {
        Self {
            coordinator,
            config: Arc::new(config),
        }
    }

    /// 停止应用
    pub async fn shutdown(&self) {
        info!("Shutting down application...");
        let wait = Duration::from_secs(self.config.settings.shutdown_wait_seconds);
        self.coordinator.stop(wait).await;
        info!("Application shutdown complete");
    }
}

/// 创建应用路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(status::health_check))
        .route("/metrics", get(status::metrics))
        .route("/nodes", get(status::nodes))
        .route("/proxies", get(status::proxy_info))
        .route("/proxies/configuration", get(status::proxy_configuration))
        .nest("/control", create_control_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 创建控制平面路由（配置了管理令牌时需要认证）
fn create_control_routes() -> Router<AppState> {
    Router::new()
        .route("/enable", post(admin::enable))
        .route("/disable", post(admin::disable))
        .route("/reset", post(admin::reset))
        .route("/refresh", post(admin::refresh))
        .route("/contexts/enable", post(admin::enable_context))
        .route("/contexts/disable", post(admin::disable_context))
        .route("/contexts/stop", post(admin::stop_context))
        .route("/proxies/add", post(admin::add_proxy))
        .route("/proxies/remove", post(admin::remove_proxy))
}

/// 首页处理器
async fn index() -> &'static str {
    "Herald - Proxy Advertisement Coordinator"
}

/// 启动应用服务器
pub async fn start_server() -> Result<()> {
    // 初始化日志 - 完全依赖RUST_LOG环境变量
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting herald management server...");

    let app_state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            return Err(e);
        }
    };

    let listen = app_state.config.management.listen.clone();
    let app = create_app(app_state.clone());

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    let addr = listener.local_addr()?;

    info!("Management server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /                        - API information");
    info!("  GET  /health                  - Coordinator health");
    info!("  GET  /metrics                 - Advertisement statistics");
    info!("  GET  /nodes                   - Registry snapshot");
    info!("  GET  /proxies                 - Proxy status");
    info!("  POST /control/enable          - Enable all contexts");
    info!("  POST /control/disable         - Disable all contexts");
    info!("  POST /control/contexts/stop   - Stop a context with a deadline");
    info!("  POST /control/proxies/add     - Add a static proxy");

    // 设置优雅关闭
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
        }
        info!("Shutdown signal received");
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        app_state.shutdown().await;
        return Err(e.into());
    }

    app_state.shutdown().await;
    Ok(())
}
