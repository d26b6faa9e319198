use super::load::LoadFactorProvider;
use super::registry::NodeRegistry;
use super::transport::AdvertiseTransport;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use herald_core::ProxyEndpoint;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 通告消息
/// 每个广播周期为每个节点新建一条，构造后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvertisementMessage {
    pub node_id: String,
    pub load_factor: f64,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

/// 广播统计计数器
#[derive(Default)]
pub struct AdvertiseMetrics {
    ticks: AtomicU64,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
    provider_fallbacks: AtomicU64,
}

impl AdvertiseMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_provider_fallback(&self) {
        self.provider_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AdvertiseStats {
        AdvertiseStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            provider_fallbacks: self.provider_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// 广播统计快照
#[derive(Debug, Clone, Serialize)]
pub struct AdvertiseStats {
    pub ticks: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub provider_fallbacks: u64,
}

/// 通告广播器
///
/// 按固定周期从注册表取快照，为每个启用的节点构造通告消息并发送。
/// 序列号按节点单调递增，进程重启或 reset 后从零重新开始，
/// 接收方需要自行容忍序列号回绕到零。
pub struct AdvertisementBroadcaster {
    registry: Arc<NodeRegistry>,
    provider: Arc<dyn LoadFactorProvider>,
    transport: Arc<dyn AdvertiseTransport>,
    proxies: Arc<RwLock<Vec<ProxyEndpoint>>>,
    sequences: Mutex<HashMap<String, u64>>,
    endpoint_status: Mutex<HashMap<String, String>>,
    last_load: Mutex<f64>,
    metrics: Arc<AdvertiseMetrics>,
    interval: Duration,
    provider_timeout: Duration,
    multicast_active: AtomicBool,
    refresh: Notify,
}

impl AdvertisementBroadcaster {
    pub fn new(
        registry: Arc<NodeRegistry>,
        provider: Arc<dyn LoadFactorProvider>,
        transport: Arc<dyn AdvertiseTransport>,
        proxies: Arc<RwLock<Vec<ProxyEndpoint>>>,
        interval: Duration,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            provider,
            transport,
            proxies,
            sequences: Mutex::new(HashMap::new()),
            endpoint_status: Mutex::new(HashMap::new()),
            last_load: Mutex::new(0.0),
            metrics: Arc::new(AdvertiseMetrics::new()),
            interval,
            provider_timeout,
            multicast_active: AtomicBool::new(false),
            refresh: Notify::new(),
        }
    }

    pub fn metrics(&self) -> Arc<AdvertiseMetrics> {
        self.metrics.clone()
    }

    /// 组播通告是否激活；由协调器在启动时根据探测结果设置
    pub fn set_multicast_active(&self, active: bool) {
        self.multicast_active.store(active, Ordering::Relaxed);
    }

    pub fn multicast_active(&self) -> bool {
        self.multicast_active.load(Ordering::Relaxed)
    }

    /// 唤醒广播循环，立即发送一轮完整通告
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// 序列号从零重新开始
    pub fn reset_sequences(&self) {
        self.sequences.lock().clear();
    }

    /// 每个静态代理端点最近一次发送的结果
    pub fn endpoint_status(&self, endpoint: &ProxyEndpoint) -> Option<String> {
        self.endpoint_status.lock().get(&endpoint.to_string()).cloned()
    }

    /// 广播循环；取消令牌触发后在当前一轮发送结束时退出
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "Advertisement broadcaster started with interval {:?}",
            self.interval
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.refresh.notified() => self.advertise_once().await,
                _ = ticker.tick() => self.advertise_once().await,
            }
        }

        info!("Advertisement broadcaster stopped");
    }

    /// 发送一轮通告
    /// 注册表锁只在取快照时短暂持有，所有 I/O 都在锁外进行
    pub async fn advertise_once(&self) {
        self.metrics.record_tick();

        let proxies: Vec<ProxyEndpoint> = self.proxies.read().clone();
        let multicast = self.multicast_active();
        if !multicast && proxies.is_empty() {
            debug!("Skipping advertisement tick: no multicast and no static proxies");
            return;
        }

        let load_factor = self.resolve_load().await;
        let snapshot = self.registry.snapshot();

        for node in snapshot.nodes.iter().filter(|node| node.enabled) {
            let message = AdvertisementMessage {
                node_id: node.key.clone(),
                load_factor,
                timestamp: Utc::now(),
                sequence: self.next_sequence(&node.key),
            };

            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode advertisement for {}: {}", node.key, e);
                    continue;
                }
            };

            if multicast {
                match self.transport.broadcast(&payload).await {
                    Ok(()) => self.metrics.record_sent(),
                    Err(e) => {
                        warn!("Multicast advertisement for {} failed: {}", node.key, e);
                        self.metrics.record_failure();
                    }
                }
            }

            // 静态代理并发发送，单个失败不影响其余端点
            let payload = &payload;
            let sends = proxies.iter().map(|endpoint| async move {
                (endpoint, self.transport.send_to(endpoint, payload).await)
            });
            for (endpoint, result) in join_all(sends).await {
                match result {
                    Ok(()) => {
                        self.metrics.record_sent();
                        self.endpoint_status
                            .lock()
                            .insert(endpoint.to_string(), "ok".to_string());
                    }
                    Err(e) => {
                        warn!(
                            "Advertisement for {} to proxy {} failed: {}",
                            node.key, endpoint, e
                        );
                        self.metrics.record_failure();
                        self.endpoint_status
                            .lock()
                            .insert(endpoint.to_string(), format!("send failed: {e}"));
                    }
                }
            }
        }
    }

    /// 拉取当前负载因子；提供者超时或出错时沿用上一次的值
    async fn resolve_load(&self) -> f64 {
        match tokio::time::timeout(self.provider_timeout, self.provider.current_load()).await {
            Ok(Ok(value)) => {
                let value = value.clamp(0.0, 1.0);
                *self.last_load.lock() = value;
                value
            }
            Ok(Err(e)) => {
                warn!("Load factor provider failed: {}, using previous value", e);
                self.metrics.record_provider_fallback();
                *self.last_load.lock()
            }
            Err(_) => {
                warn!(
                    "Load factor provider exceeded {:?}, using previous value",
                    self.provider_timeout
                );
                self.metrics.record_provider_fallback();
                *self.last_load.lock()
            }
        }
    }

    fn next_sequence(&self, node_id: &str) -> u64 {
        let mut sequences = self.sequences.lock();
        let sequence = sequences.entry(node_id.to_string()).or_insert(0);
        *sequence += 1;
        *sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::load::FixedLoadProvider;
    use crate::cluster::registry::Node;
    use anyhow::Result;
    use async_trait::async_trait;
    use herald_core::ContextRef;

    /// 记录所有发出报文的测试传输
    struct RecordingTransport {
        broadcasts: Mutex<Vec<Vec<u8>>>,
        unicasts: Mutex<Vec<(ProxyEndpoint, Vec<u8>)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                broadcasts: Mutex::new(Vec::new()),
                unicasts: Mutex::new(Vec::new()),
            }
        }

        fn broadcast_messages(&self) -> Vec<AdvertisementMessage> {
            self.broadcasts
                .lock()
                .iter()
                .map(|payload| serde_json::from_slice(payload).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl AdvertiseTransport for RecordingTransport {
        fn multicast_available(&self) -> bool {
            true
        }

        async fn broadcast(&self, payload: &[u8]) -> Result<()> {
            self.broadcasts.lock().push(payload.to_vec());
            Ok(())
        }

        async fn send_to(&self, endpoint: &ProxyEndpoint, payload: &[u8]) -> Result<()> {
            self.unicasts.lock().push((endpoint.clone(), payload.to_vec()));
            Ok(())
        }
    }

    /// 第一次调用成功、之后一直失败的负载提供者
    struct FlakyLoadProvider {
        calls: AtomicU64,
    }

    #[async_trait]
    impl LoadFactorProvider for FlakyLoadProvider {
        async fn current_load(&self) -> Result<f64> {
            if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                Ok(0.7)
            } else {
                anyhow::bail!("provider unavailable")
            }
        }
    }

    fn create_broadcaster(
        provider: Arc<dyn LoadFactorProvider>,
        transport: Arc<RecordingTransport>,
        proxies: Vec<ProxyEndpoint>,
    ) -> AdvertisementBroadcaster {
        let registry = Arc::new(NodeRegistry::new());
        registry.register(Node::with_contexts(
            "10.0.0.1",
            8009,
            vec![ContextRef::new("localhost", "/app")],
        ));

        AdvertisementBroadcaster::new(
            registry,
            provider,
            transport,
            Arc::new(RwLock::new(proxies)),
            Duration::from_secs(10),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase_per_node() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FixedLoadProvider::new(0.5)),
            transport.clone(),
            vec![],
        );
        broadcaster.set_multicast_active(true);

        broadcaster.advertise_once().await;
        broadcaster.advertise_once().await;
        broadcaster.advertise_once().await;

        let messages = transport.broadcast_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages.iter().map(|m| m.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(messages.iter().all(|m| m.node_id == "10.0.0.1:8009"));
        assert!(messages.iter().all(|m| m.load_factor == 0.5));
    }

    #[tokio::test]
    async fn test_reset_restarts_sequence_numbers() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FixedLoadProvider::new(1.0)),
            transport.clone(),
            vec![],
        );
        broadcaster.set_multicast_active(true);

        broadcaster.advertise_once().await;
        broadcaster.advertise_once().await;
        broadcaster.reset_sequences();
        broadcaster.advertise_once().await;

        let messages = transport.broadcast_messages();
        assert_eq!(
            messages.iter().map(|m| m.sequence).collect::<Vec<_>>(),
            vec![1, 2, 1]
        );
    }

    #[tokio::test]
    async fn test_failing_provider_falls_back_to_previous_value() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FlakyLoadProvider {
                calls: AtomicU64::new(0),
            }),
            transport.clone(),
            vec![],
        );
        broadcaster.set_multicast_active(true);

        broadcaster.advertise_once().await;
        broadcaster.advertise_once().await;

        let messages = transport.broadcast_messages();
        assert_eq!(messages[0].load_factor, 0.7);
        // 第二个周期提供者失败，沿用上一次的值
        assert_eq!(messages[1].load_factor, 0.7);
        assert_eq!(broadcaster.metrics().snapshot().provider_fallbacks, 1);
    }

    /// 响应慢于超时上限的负载提供者
    struct SlowLoadProvider;

    #[async_trait]
    impl LoadFactorProvider for SlowLoadProvider {
        async fn current_load(&self) -> Result<f64> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(0.9)
        }
    }

    #[tokio::test]
    async fn test_slow_provider_falls_back_to_previous_value() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(Arc::new(SlowLoadProvider), transport.clone(), vec![]);
        broadcaster.set_multicast_active(true);

        broadcaster.advertise_once().await;

        let messages = transport.broadcast_messages();
        // 提供者超时，使用初始值 0.0 而不是等待它
        assert_eq!(messages[0].load_factor, 0.0);
        assert_eq!(broadcaster.metrics().snapshot().provider_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_no_multicast_and_no_proxies_skips_sending() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FixedLoadProvider::new(1.0)),
            transport.clone(),
            vec![],
        );
        // 组播未激活且没有静态代理

        broadcaster.advertise_once().await;

        assert!(transport.broadcasts.lock().is_empty());
        assert!(transport.unicasts.lock().is_empty());
        assert_eq!(broadcaster.metrics().snapshot().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_static_proxies_each_receive_message() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FixedLoadProvider::new(1.0)),
            transport.clone(),
            vec![
                ProxyEndpoint::new("proxy1", 6666),
                ProxyEndpoint::new("proxy2", 6666),
            ],
        );

        broadcaster.advertise_once().await;

        let unicasts = transport.unicasts.lock();
        assert_eq!(unicasts.len(), 2);
        assert!(unicasts.iter().any(|(ep, _)| ep.host == "proxy1"));
        assert!(unicasts.iter().any(|(ep, _)| ep.host == "proxy2"));
    }

    #[tokio::test]
    async fn test_disabled_nodes_are_not_advertised() {
        let transport = Arc::new(RecordingTransport::new());
        let broadcaster = create_broadcaster(
            Arc::new(FixedLoadProvider::new(1.0)),
            transport.clone(),
            vec![],
        );
        broadcaster.set_multicast_active(true);

        broadcaster.registry.set_all_contexts_enabled(false);
        broadcaster.advertise_once().await;

        assert!(transport.broadcasts.lock().is_empty());
    }
}
