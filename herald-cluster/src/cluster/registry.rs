use herald_core::{ContextRef, CoordinatorError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// 上下文状态
/// STOPPING 携带到期时间和代数；代数不匹配的到期定时器被忽略
#[derive(Debug, Clone, PartialEq)]
pub enum ContextState {
    Enabled,
    Stopping { deadline: Instant, generation: u64 },
    Disabled,
}

impl ContextState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextState::Enabled => "ENABLED",
            ContextState::Stopping { .. } => "STOPPING",
            ContextState::Disabled => "DISABLED",
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ContextState::Enabled)
    }
}

/// 后端节点：host/port 标识 + 每个上下文的状态
#[derive(Debug, Clone)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub enabled: bool,
    pub contexts: HashMap<ContextRef, ContextState>,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            enabled: true,
            contexts: HashMap::new(),
        }
    }

    pub fn with_contexts(
        host: impl Into<String>,
        port: u16,
        contexts: impl IntoIterator<Item = ContextRef>,
    ) -> Self {
        let mut node = Self::new(host, port);
        node.contexts = contexts
            .into_iter()
            .map(|ctx| (ctx, ContextState::Enabled))
            .collect();
        node
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 上下文状态变更命令
#[derive(Debug, Clone, Copy)]
pub enum ContextCommand {
    Enable,
    Disable,
    Stop(Duration),
}

/// STOPPING 转换的凭据，协调器据此安排到期定时器
#[derive(Debug, Clone)]
pub struct StopTicket {
    pub node_key: String,
    pub context: ContextRef,
    pub wait: Duration,
    pub generation: u64,
}

/// 节点注册表
/// 所有变更都在同一把锁内完成，快照在读锁下整体克隆
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Node>>,
    generation: AtomicU64,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// 注册节点；同键节点被整体替换（节点重启后重新注册）
    pub fn register(&self, node: Node) {
        let key = node.key();
        debug!("Registering node {} with {} contexts", key, node.contexts.len());
        self.nodes.write().insert(key, node);
    }

    pub fn unregister(&self, node_key: &str) -> Result<(), CoordinatorError> {
        match self.nodes.write().remove(node_key) {
            Some(_) => {
                debug!("Unregistered node {}", node_key);
                Ok(())
            }
            None => Err(CoordinatorError::unknown_node(node_key)),
        }
    }

    /// 向已注册节点添加上下文，初始状态为 ENABLED
    pub fn add_context(&self, node_key: &str, context: ContextRef) -> Result<(), CoordinatorError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(node_key)
            .ok_or_else(|| CoordinatorError::unknown_node(node_key))?;
        node.contexts.entry(context).or_insert(ContextState::Enabled);
        Ok(())
    }

    pub fn remove_context(
        &self,
        node_key: &str,
        context: &ContextRef,
    ) -> Result<(), CoordinatorError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(node_key)
            .ok_or_else(|| CoordinatorError::unknown_node(node_key))?;
        node.contexts
            .remove(context)
            .map(|_| ())
            .ok_or_else(|| {
                CoordinatorError::unknown_context(&context.virtual_host, &context.path)
            })
    }

    /// 对所有持有该上下文的节点应用状态变更
    /// 没有任何节点持有该上下文时返回 NotFound
    pub fn set_context_state(
        &self,
        virtual_host: &str,
        path: &str,
        command: ContextCommand,
    ) -> Result<Vec<StopTicket>, CoordinatorError> {
        let target = ContextRef::new(virtual_host, path);
        let mut tickets = Vec::new();
        let mut found = false;

        let mut nodes = self.nodes.write();
        for node in nodes.values_mut() {
            let key = node.key();
            if let Some(state) = node.contexts.get_mut(&target) {
                found = true;
                match command {
                    ContextCommand::Enable => *state = ContextState::Enabled,
                    ContextCommand::Disable => *state = ContextState::Disabled,
                    ContextCommand::Stop(wait) => {
                        // 已经 DISABLED 的上下文无需再走 STOPPING
                        if *state != ContextState::Disabled {
                            let generation = self.next_generation();
                            *state = ContextState::Stopping {
                                deadline: Instant::now() + wait,
                                generation,
                            };
                            tickets.push(StopTicket {
                                node_key: key,
                                context: target.clone(),
                                wait,
                                generation,
                            });
                        }
                    }
                }
            }
        }

        if found {
            Ok(tickets)
        } else {
            Err(CoordinatorError::unknown_context(virtual_host, path))
        }
    }

    /// 定时器回调：仅当上下文仍处于同代 STOPPING 时转换为 DISABLED
    pub fn expire_stopping(
        &self,
        node_key: &str,
        context: &ContextRef,
        generation: u64,
    ) -> bool {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(node_key) else {
            return false;
        };
        let Some(state) = node.contexts.get_mut(context) else {
            return false;
        };

        match state {
            ContextState::Stopping {
                generation: current, ..
            } if *current == generation => {
                *state = ContextState::Disabled;
                debug!("Context {} on {} expired to DISABLED", context, node_key);
                true
            }
            _ => false,
        }
    }

    /// 全局开关：所有节点和上下文立即变为 ENABLED/DISABLED
    /// DISABLED 绕过 STOPPING，未到期的定时器因状态替换而失效
    pub fn set_all_contexts_enabled(&self, enabled: bool) {
        let target = if enabled {
            ContextState::Enabled
        } else {
            ContextState::Disabled
        };
        let mut nodes = self.nodes.write();
        for node in nodes.values_mut() {
            node.enabled = enabled;
            for state in node.contexts.values_mut() {
                *state = target.clone();
            }
        }
    }

    /// 所有上下文状态清回 ENABLED
    pub fn reset(&self) {
        self.set_all_contexts_enabled(true);
    }

    pub fn contains_node(&self, node_key: &str) -> bool {
        self.nodes.read().contains_key(node_key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// 一致的时间点视图：读锁下整体克隆，调用方在锁外消费
    pub fn snapshot(&self) -> RegistrySnapshot {
        let nodes = self.nodes.read();
        let mut snapshot_nodes: Vec<NodeSnapshot> = nodes
            .values()
            .map(|node| NodeSnapshot {
                key: node.key(),
                host: node.host.clone(),
                port: node.port,
                enabled: node.enabled,
                contexts: node
                    .contexts
                    .iter()
                    .map(|(context, state)| ContextEntry {
                        context: context.clone(),
                        state: state.clone(),
                    })
                    .collect(),
            })
            .collect();
        snapshot_nodes.sort_by(|a, b| a.key.cmp(&b.key));
        RegistrySnapshot {
            nodes: snapshot_nodes,
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// 注册表快照
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl RegistrySnapshot {
    pub fn node(&self, node_key: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.key == node_key)
    }

    /// 查询上下文状态（任意持有该上下文的节点）
    pub fn context_state(&self, virtual_host: &str, path: &str) -> Option<&ContextState> {
        let target = ContextRef::new(virtual_host, path);
        self.nodes.iter().find_map(|node| {
            node.contexts
                .iter()
                .find(|entry| entry.context == target)
                .map(|entry| &entry.state)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub key: String,
    pub host: String,
    pub port: u16,
    pub enabled: bool,
    pub contexts: Vec<ContextEntry>,
}

#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub context: ContextRef,
    pub state: ContextState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_node() -> Node {
        Node::with_contexts(
            "10.0.0.1",
            8009,
            vec![
                ContextRef::new("localhost", "/app"),
                ContextRef::new("localhost", "/shop"),
            ],
        )
    }

    #[test]
    fn test_snapshot_only_contains_registered_nodes() {
        let registry = NodeRegistry::new();
        assert!(registry.snapshot().is_empty());

        registry.register(create_test_node());
        registry.register(Node::new("10.0.0.2", 8009));
        assert_eq!(registry.snapshot().nodes.len(), 2);

        registry.unregister("10.0.0.2:8009").unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(snapshot.node("10.0.0.2:8009").is_none());
        assert!(snapshot.node("10.0.0.1:8009").is_some());
    }

    #[test]
    fn test_unregister_unknown_node_fails() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.unregister("nope:1"),
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[test]
    fn test_set_context_state_unknown_context_fails() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        let result = registry.set_context_state("localhost", "/missing", ContextCommand::Disable);
        assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
    }

    #[test]
    fn test_stop_then_expire_disables_context() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        let tickets = registry
            .set_context_state(
                "localhost",
                "/app",
                ContextCommand::Stop(Duration::from_secs(2)),
            )
            .unwrap();
        assert_eq!(tickets.len(), 1);

        let snapshot = registry.snapshot();
        assert!(matches!(
            snapshot.context_state("localhost", "/app"),
            Some(ContextState::Stopping { .. })
        ));

        let ticket = &tickets[0];
        assert!(registry.expire_stopping(&ticket.node_key, &ticket.context, ticket.generation));
        assert_eq!(
            registry.snapshot().context_state("localhost", "/app"),
            Some(&ContextState::Disabled)
        );
    }

    #[test]
    fn test_stale_expiry_is_ignored_after_reenable() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        let tickets = registry
            .set_context_state(
                "localhost",
                "/app",
                ContextCommand::Stop(Duration::from_secs(2)),
            )
            .unwrap();
        let ticket = &tickets[0];

        // 上下文被重新启用后，旧代数的到期回调必须是空操作
        registry
            .set_context_state("localhost", "/app", ContextCommand::Enable)
            .unwrap();
        assert!(!registry.expire_stopping(&ticket.node_key, &ticket.context, ticket.generation));
        assert_eq!(
            registry.snapshot().context_state("localhost", "/app"),
            Some(&ContextState::Enabled)
        );
    }

    #[test]
    fn test_disable_all_bypasses_stopping() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        registry
            .set_context_state(
                "localhost",
                "/app",
                ContextCommand::Stop(Duration::from_secs(60)),
            )
            .unwrap();

        registry.set_all_contexts_enabled(false);
        let snapshot = registry.snapshot();
        for node in &snapshot.nodes {
            assert!(!node.enabled);
            for entry in &node.contexts {
                assert_eq!(entry.state, ContextState::Disabled);
            }
        }
    }

    #[test]
    fn test_stop_on_disabled_context_is_noop() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        registry
            .set_context_state("localhost", "/app", ContextCommand::Disable)
            .unwrap();
        let tickets = registry
            .set_context_state(
                "localhost",
                "/app",
                ContextCommand::Stop(Duration::from_secs(2)),
            )
            .unwrap();

        assert!(tickets.is_empty());
        assert_eq!(
            registry.snapshot().context_state("localhost", "/app"),
            Some(&ContextState::Disabled)
        );
    }

    #[test]
    fn test_add_and_remove_context() {
        let registry = NodeRegistry::new();
        registry.register(Node::new("10.0.0.1", 8009));

        let ctx = ContextRef::new("localhost", "/late");
        registry.add_context("10.0.0.1:8009", ctx.clone()).unwrap();
        assert_eq!(
            registry.snapshot().context_state("localhost", "/late"),
            Some(&ContextState::Enabled)
        );

        registry.remove_context("10.0.0.1:8009", &ctx).unwrap();
        assert!(registry
            .snapshot()
            .context_state("localhost", "/late")
            .is_none());

        assert!(matches!(
            registry.remove_context("10.0.0.1:8009", &ctx),
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[test]
    fn test_reset_returns_contexts_to_enabled() {
        let registry = NodeRegistry::new();
        registry.register(create_test_node());

        registry.set_all_contexts_enabled(false);
        registry.reset();

        let snapshot = registry.snapshot();
        for node in &snapshot.nodes {
            assert!(node.enabled);
            for entry in &node.contexts {
                assert_eq!(entry.state, ContextState::Enabled);
            }
        }
    }
}
