use thiserror::Error;

/// 配置错误类型
/// 在协调器启动前被检测到，对启动是致命的
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid node address '{0}': host must be non-empty and port non-zero")]
    InvalidNodeAddress(String),
    #[error("advertise group '{0}' is not a valid IPv4 multicast address")]
    InvalidAdvertiseGroup(String),
    #[error("advertise interface '{0}' is not a valid IPv4 address")]
    InvalidAdvertiseInterface(String),
    #[error("advertise interval must be at least 1 second")]
    InvalidAdvertiseInterval,
    #[error("invalid proxy endpoint '{0}': host must be non-empty and port non-zero")]
    InvalidProxyEndpoint(String),
    #[error("unparseable context entry '{0}'")]
    InvalidContextEntry(String),
    #[error("invalid management listen address '{0}'")]
    InvalidListenAddress(String),
    #[error("load factor {0} is outside the range [0.0, 1.0]")]
    InvalidLoadFactor(f64),
}

/// 协调器操作错误类型
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// 协调器处于 STOPPED 状态时调用了操作方法
    #[error("coordinator is not running")]
    NotRunning,
    /// 引用了未注册的节点或上下文
    #[error("{0} is not registered")]
    NotFound(String),
    /// 启动时的配置错误
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl CoordinatorError {
    /// 未知节点错误
    pub fn unknown_node(node_key: &str) -> Self {
        Self::NotFound(format!("node '{node_key}'"))
    }

    /// 未知上下文错误
    pub fn unknown_context(virtual_host: &str, path: &str) -> Self {
        Self::NotFound(format!("context '{virtual_host}:{path}'"))
    }
}
