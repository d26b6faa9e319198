use async_trait::async_trait;
use herald_core::{ContextRef, CoordinatorError};
use std::collections::BTreeMap;
use std::time::Duration;

use super::broadcaster::AdvertiseStats;
use super::coordinator::{CoordinatorStatus, ProxyCoordinator};
use super::registry::RegistrySnapshot;

/// 集群协调器接口
///
/// 这个trait定义了协调器对管理平面暴露的操作集，
/// 允许不同的实现并支持依赖注入和单元测试
#[async_trait]
pub trait ClusterCoordinator: Send + Sync {
    /// 启动协调器
    async fn start(&self) -> Result<(), CoordinatorError>;

    /// 停止协调器，最多等待 `wait` 让进行中的发送结束
    async fn stop(&self, wait: Duration);

    /// 协调器是否正在运行
    async fn is_running(&self) -> bool;

    /// 全局启用所有上下文
    async fn enable(&self) -> Result<(), CoordinatorError>;

    /// 全局停用所有上下文（绕过 STOPPING）
    async fn disable(&self) -> Result<(), CoordinatorError>;

    /// 启用单个上下文
    async fn enable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError>;

    /// 停用单个上下文
    async fn disable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError>;

    /// 带截止时间地停止单个上下文
    async fn stop_context(
        &self,
        virtual_host: &str,
        path: &str,
        wait: Option<Duration>,
    ) -> Result<bool, CoordinatorError>;

    /// 添加静态代理端点
    async fn add_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError>;

    /// 移除静态代理端点
    async fn remove_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError>;

    /// 端点 -> 状态字符串快照
    async fn proxy_info(&self) -> Result<BTreeMap<String, String>, CoordinatorError>;

    /// 端点 -> 生效配置快照
    async fn proxy_configuration(&self) -> Result<BTreeMap<String, String>, CoordinatorError>;

    /// 清空上下文状态并重新开始序列号计数
    async fn reset(&self) -> Result<(), CoordinatorError>;

    /// 立即发送一轮完整通告
    async fn refresh(&self) -> Result<(), CoordinatorError>;

    /// 注册后端节点
    async fn register_node(
        &self,
        host: &str,
        port: u16,
        contexts: Vec<ContextRef>,
    ) -> Result<(), CoordinatorError>;

    /// 注销后端节点
    async fn unregister_node(&self, host: &str, port: u16) -> Result<(), CoordinatorError>;

    /// 注册表快照
    fn snapshot(&self) -> RegistrySnapshot;

    /// 广播统计
    fn advertise_stats(&self) -> AdvertiseStats;

    /// 状态摘要
    async fn status(&self) -> CoordinatorStatus;
}

/// 为 ProxyCoordinator 实现 ClusterCoordinator trait
#[async_trait]
impl ClusterCoordinator for ProxyCoordinator {
    async fn start(&self) -> Result<(), CoordinatorError> {
        ProxyCoordinator::start(self).await
    }

    async fn stop(&self, wait: Duration) {
        ProxyCoordinator::stop(self, wait).await;
    }

    async fn is_running(&self) -> bool {
        ProxyCoordinator::is_running(self).await
    }

    async fn enable(&self) -> Result<(), CoordinatorError> {
        ProxyCoordinator::enable(self).await
    }

    async fn disable(&self) -> Result<(), CoordinatorError> {
        ProxyCoordinator::disable(self).await
    }

    async fn enable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError> {
        ProxyCoordinator::enable_context(self, virtual_host, path).await
    }

    async fn disable_context(
        &self,
        virtual_host: &str,
        path: &str,
    ) -> Result<bool, CoordinatorError> {
        ProxyCoordinator::disable_context(self, virtual_host, path).await
    }

    async fn stop_context(
        &self,
        virtual_host: &str,
        path: &str,
        wait: Option<Duration>,
    ) -> Result<bool, CoordinatorError> {
        ProxyCoordinator::stop_context(self, virtual_host, path, wait).await
    }

    async fn add_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        ProxyCoordinator::add_proxy(self, host, port).await
    }

    async fn remove_proxy(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        ProxyCoordinator::remove_proxy(self, host, port).await
    }

    async fn proxy_info(&self) -> Result<BTreeMap<String, String>, CoordinatorError> {
        ProxyCoordinator::proxy_info(self).await
    }

    async fn proxy_configuration(&self) -> Result<BTreeMap<String, String>, CoordinatorError> {
        ProxyCoordinator::proxy_configuration(self).await
    }

    async fn reset(&self) -> Result<(), CoordinatorError> {
        ProxyCoordinator::reset(self).await
    }

    async fn refresh(&self) -> Result<(), CoordinatorError> {
        ProxyCoordinator::refresh(self).await
    }

    async fn register_node(
        &self,
        host: &str,
        port: u16,
        contexts: Vec<ContextRef>,
    ) -> Result<(), CoordinatorError> {
        ProxyCoordinator::register_node(self, host, port, contexts).await
    }

    async fn unregister_node(&self, host: &str, port: u16) -> Result<(), CoordinatorError> {
        ProxyCoordinator::unregister_node(self, host, port).await
    }

    fn snapshot(&self) -> RegistrySnapshot {
        ProxyCoordinator::snapshot(self)
    }

    fn advertise_stats(&self) -> AdvertiseStats {
        self.metrics().snapshot()
    }

    async fn status(&self) -> CoordinatorStatus {
        ProxyCoordinator::status(self).await
    }
}
