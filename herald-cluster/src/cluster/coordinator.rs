use super::broadcaster::{AdvertiseMetrics, AdvertiseStats, AdvertisementBroadcaster};
use super::load::{FixedLoadProvider, LoadFactorProvider};
use super::registry::{ContextCommand, Node, NodeRegistry, RegistrySnapshot, StopTicket};
use super::transport::{AdvertiseTransport, UdpTransport};
use herald_core::{ClusterConfig, ContextRef, CoordinatorError, ProxyEndpoint};
use parking_lot::RwLock as SyncRwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 协调器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

struct BroadcastTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// 代理协调器
/// 持有注册表和广播器，对外暴露完整的操作集
///
/// 所有依赖在构造时注入并保持不可变；生命周期由单把读写锁守护，
/// STOPPED 状态下除 start/stop 外的操作全部返回 NotRunning。
pub struct ProxyCoordinator {
    config: Arc<ClusterConfig>,
    registry: Arc<NodeRegistry>,
    broadcaster: Arc<AdvertisementBroadcaster>,
    transport: Arc<dyn AdvertiseTransport>,
    proxies: Arc<SyncRwLock<Vec<ProxyEndpoint>>>,
    excluded: HashSet<ContextRef>,
    state: RwLock<LifecycleState>,
    task: Mutex<Option<BroadcastTask>>,
}

impl ProxyCoordinator {
    /// 创建协调器
    /// 配置错误（包括不可解析的排除上下文条目）在这里被拒绝
    pub fn new(
        config: ClusterConfig,
        provider: Arc<dyn LoadFactorProvider>,
        transport: Arc<dyn AdvertiseTransport>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let excluded: HashSet<ContextRef> = config.excluded_contexts()?.into_iter().collect();

        let registry = Arc::new(NodeRegistry::new());
        let proxies = Arc::new(SyncRwLock::new(config.proxies.clone()));
        let broadcaster = Arc::new(AdvertisementBroadcaster::new(
            registry.clone(),
            provider,
            transport.clone(),
            proxies.clone(),
            Duration::from_secs(config.advertise.interval_seconds),
            Duration::from_millis(config.advertise.provider_timeout_ms),
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            transport,
            proxies,
            excluded,
            state: RwLock::new(LifecycleState::Stopped),
            task: Mutex::new(None),
        })
    }

    /// 使用 UDP 传输和配置的固定负载因子构建协调器
    pub async fn from_config(config: ClusterConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(UdpTransport::bind(&config.advertise).await?);
        let provider = Arc::new(FixedLoadProvider::new(config.settings.load_factor));
        Ok(Self::new(config, provider, transport)?)
    }

    /// 启动协调器：解析通告策略、注册本地节点、启动广播循环
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Running {
            return Ok(());
        }

        info!(
            "Starting proxy coordinator for node {}",
            self.config.node_key()
        );

        // 通告策略：显式配置优先，缺省时由组播可用性决定
        let multicast_available = self.transport.multicast_available();
        let advertise = self.config.advertise.enabled.unwrap_or(multicast_available);
        if advertise && !multicast_available {
            warn!("Advertising requested but no multicast-capable interface is available");
        }
        let multicast_active = advertise && multicast_available;
        self.broadcaster.set_multicast_active(multicast_active);

        if !multicast_active && self.proxies.read().is_empty() {
            warn!(
                "Advertising is disabled and the static proxy list is empty, \
                 proxies will not discover this node"
            );
        }

        // 注册本地节点；排除列表中的上下文不进入注册表
        let contexts = self.config.local_contexts()?;
        let advertised: Vec<ContextRef> = contexts
            .into_iter()
            .filter(|ctx| {
                if self.excluded.contains(ctx) {
                    debug!("Excluding context {} from advertisement", ctx);
                    false
                } else {
                    true
                }
            })
            .collect();
        self.registry.register(Node::with_contexts(
            self.config.node.host.clone(),
            self.config.node.port,
            advertised,
        ));

        let token = CancellationToken::new();
        let handle = tokio::spawn(self.broadcaster.clone().run(token.clone()));
        *self.task.lock().await = Some(BroadcastTask { token, handle });

        *state = LifecycleState::Running;
        info!("Proxy coordinator started");
        Ok(())
    }

    /// 停止协调器
    ///
    /// 取消广播定时器并最多等待 `wait` 让进行中的发送结束；
    /// 超时后中止任务并记录警告，绝不无限阻塞。
    pub async fn stop(&self, wait: Duration) {
        let mut state = self.state.write().await;
        if *state == LifecycleState::Stopped {
            return;
        }

        info!("Stopping proxy coordinator (wait {:?})", wait);
        if let Some(task) = self.task.lock().await.take() {
            task.token.cancel();
            let mut handle = task.handle;
            match tokio::time::timeout(wait, &mut handle).await {
                Ok(Ok(())) => debug!("Broadcast task finished cleanly"),
                Ok(Err(e)) => warn!("Broadcast task failed during shutdown: {}", e),
                Err(_) => {
                    warn!(
                        "Broadcast task did not finish within {:?}, aborting in-flight send",
                        wait
                    );
                    handle.abort();
                }
            }
        }

        *state = LifecycleState::Stopped;
        info!("Proxy coordinator stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.state.read().await == LifecycleState::Running
    }

    async fn ensure_running(&self) -> Result<(), CoordinatorError> {
        if *self.state.read().await == LifecycleState::Running {
            Ok(())
        } else {
            Err(CoordinatorError::NotRunning)
        }
    }

    /// 全局启用：所有节点和上下文立即变为 ENABLED
    pub async fn enable(&self) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        info!("Enabling all contexts");
        self.registry.set_all_contexts_enabled(true);
        Ok(())
    }

    /// 全局停用：所有上下文立即变为 DISABLED，绕过 STOPPING 等待
    pub async fn disable(&self) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        info!("Disabling all contexts");
        self.registry.set_all_contexts_enabled(false);
        Ok(())
    }

    /// 启用单个上下文；未知上下文返回 false
    pub async fn enable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError> {
        self.ensure_running().await?;
        self.apply_context_command(virtual_host, path, ContextCommand::Enable)
    }

    /// 停用单个上下文；未知上下文返回 false
    pub async fn disable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError> {
        self.ensure_running().await?;
        self.apply_context_command(virtual_host, path, ContextCommand::Disable)
    }

    /// 将上下文转换到 STOPPING；到期后即使没有后续调用也会变为 DISABLED
    /// 未知上下文返回 false
    pub async fn stop_context(
        &self,
        virtual_host: &str,
        path: &str,
        wait: Option<Duration>,
    ) -> Result<bool, CoordinatorError> {
        self.ensure_running().await?;
        let wait = wait.unwrap_or(Duration::from_secs(
            self.config.settings.stop_context_wait_seconds,
        ));
        match self
            .registry
            .set_context_state(virtual_host, path, ContextCommand::Stop(wait))
        {
            Ok(tickets) => {
                self.arm_stop_timers(tickets);
                Ok(true)
            }
            Err(CoordinatorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn apply_context_command(
        &self,
        virtual_host: &str,
        path: &str,
        command: ContextCommand,
    ) -> Result<bool, CoordinatorError> {
        match self.registry.set_context_state(virtual_host, path, command) {
            Ok(_) => Ok(true),
            Err(CoordinatorError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 为每个 STOPPING 转换安排一次性到期定时器
    /// 状态在此期间被改写时，代数不匹配使回调成为空操作
    fn arm_stop_timers(&self, tickets: Vec<StopTicket>) {
        for ticket in tickets {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ticket.wait).await;
                if registry.expire_stopping(&ticket.node_key, &ticket.context, ticket.generation) {
                    debug!(
                        "Context {} on {} transitioned to DISABLED after {:?}",
                        ticket.context, ticket.node_key, ticket.wait
                    );
                }
            });
        }
    }

    /// 向静态代理列表添加端点；重复添加是空操作
    pub async fn add_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        let endpoint = ProxyEndpoint::new(host, port);
        let mut proxies = self.proxies.write();
        if proxies.contains(&endpoint) {
            debug!("Proxy {} already configured", endpoint);
        } else {
            info!("Adding proxy {}", endpoint);
            proxies.push(endpoint);
        }
        Ok(())
    }

    /// 从静态代理列表移除端点；移除不存在的端点是空操作
    pub async fn remove_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        let endpoint = ProxyEndpoint::new(host, port);
        let mut proxies = self.proxies.write();
        let before = proxies.len();
        proxies.retain(|existing| existing != &endpoint);
        if proxies.len() < before {
            info!("Removed proxy {}", endpoint);
        } else {
            debug!("Proxy {} was not configured", endpoint);
        }
        Ok(())
    }

    /// 每个代理端点的可观测状态：最近一次发送的结果
    pub async fn proxy_info(&self) -> Result<BTreeMap<String, String>, CoordinatorError> {
        self.ensure_running().await?;
        let proxies: Vec<ProxyEndpoint> = self.proxies.read().clone();
        Ok(proxies
            .iter()
            .map(|endpoint| {
                let status = self
                    .broadcaster
                    .endpoint_status(endpoint)
                    .unwrap_or_else(|| "pending".to_string());
                (endpoint.to_string(), status)
            })
            .collect())
    }

    /// 每个代理端点的生效通告参数
    pub async fn proxy_configuration(&self) -> Result<BTreeMap<String, String>, CoordinatorError> {
        self.ensure_running().await?;
        let advertise = &self.config.advertise;
        let description = format!(
            "interval={}s ttl={} group={}:{}",
            advertise.interval_seconds, advertise.ttl, advertise.group, advertise.port
        );
        let proxies: Vec<ProxyEndpoint> = self.proxies.read().clone();
        Ok(proxies
            .iter()
            .map(|endpoint| (endpoint.to_string(), description.clone()))
            .collect())
    }

    /// 清空所有上下文状态回 ENABLED 并重新开始序列号计数
    pub async fn reset(&self) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        info!("Resetting context states and advertisement sequences");
        self.registry.reset();
        self.broadcaster.reset_sequences();
        Ok(())
    }

    /// 唤醒广播循环，立即发送一轮完整通告
    pub async fn refresh(&self) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        debug!("Refresh requested, waking broadcaster");
        self.broadcaster.request_refresh();
        Ok(())
    }

    /// 注册一个后端节点；排除列表中的上下文被过滤掉
    pub async fn register_node(
        &self,
        host: &str,
        port: u16,
        contexts: Vec<ContextRef>,
    ) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        let advertised: Vec<ContextRef> = contexts
            .into_iter()
            .filter(|ctx| !self.excluded.contains(ctx))
            .collect();
        self.registry
            .register(Node::with_contexts(host, port, advertised));
        Ok(())
    }

    /// 注销节点；未知节点返回 NotFound
    pub async fn unregister_node(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        self.ensure_running().await?;
        self.registry.unregister(&format!("{host}:{port}"))
    }

    /// 注册表的一致快照（只读，可在 STOPPED 状态下使用）
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    pub fn metrics(&self) -> Arc<AdvertiseMetrics> {
        self.broadcaster.metrics()
    }

    pub fn config(&self) -> Arc<ClusterConfig> {
        self.config.clone()
    }

    /// 协调器状态摘要
    pub async fn status(&self) -> CoordinatorStatus {
        let running = self.is_running().await;
        CoordinatorStatus {
            running,
            node_key: self.config.node_key(),
            multicast_active: self.broadcaster.multicast_active(),
            proxy_count: self.proxies.read().len(),
            node_count: self.registry.node_count(),
            advertise: self.broadcaster.metrics().snapshot(),
        }
    }
}

/// 协调器状态摘要
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub node_key: String,
    pub multicast_active: bool,
    pub proxy_count: usize,
    pub node_count: usize,
    pub advertise: AdvertiseStats,
}
