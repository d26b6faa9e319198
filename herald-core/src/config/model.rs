use crate::error::ConfigError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

/// 默认排除的上下文列表
/// 节点注册时这些上下文永远不会被通告给代理
static DEFAULT_EXCLUDED_CONTEXTS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["ROOT", "invoker", "jbossws", "juddi", "console"]);

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClusterConfig {
    pub node: NodeConfig,
    #[serde(default)]
    pub advertise: AdvertiseConfig,
    #[serde(default)]
    pub proxies: Vec<ProxyEndpoint>,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub settings: GlobalSettings,
}

/// 本地节点配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// 未带虚拟主机前缀的上下文条目使用的默认虚拟主机
    #[serde(default = "default_virtual_host")]
    pub default_virtual_host: String,
    /// 本节点提供的上下文，条目格式为 "path" 或 "host:path"
    #[serde(default)]
    pub contexts: Vec<String>,
    /// 不通告给代理的上下文；缺省时使用内置默认列表
    #[serde(default)]
    pub excluded_contexts: Option<Vec<String>>,
}

/// 组播通告配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdvertiseConfig {
    /// 是否启用组播通告；缺省时由组播可用性探测决定
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default = "default_advertise_group")]
    pub group: String,
    #[serde(default = "default_advertise_port")]
    pub port: u16,
    /// 发送组播使用的本地接口地址
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_advertise_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_advertise_ttl")]
    pub ttl: u32,
    /// 负载因子提供者单次调用的时间上限
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_ms: u64,
}

/// 静态代理端点
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 管理接口配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ManagementConfig {
    #[serde(default = "default_listen_addr")]
    pub listen: String,
    /// 设置后，管理接口的变更操作需要携带该令牌
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    /// stop_context 未显式给出等待时间时使用的默认值
    #[serde(default = "default_stop_context_wait")]
    pub stop_context_wait_seconds: u64,
    #[serde(default = "default_shutdown_wait")]
    pub shutdown_wait_seconds: u64,
    /// 固定负载因子提供者的取值
    #[serde(default = "default_load_factor")]
    pub load_factor: f64,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            group: default_advertise_group(),
            port: default_advertise_port(),
            interface: None,
            interval_seconds: default_advertise_interval(),
            ttl: default_advertise_ttl(),
            provider_timeout_ms: default_provider_timeout(),
        }
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            admin_token: None,
        }
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            stop_context_wait_seconds: default_stop_context_wait(),
            shutdown_wait_seconds: default_shutdown_wait(),
            load_factor: default_load_factor(),
        }
    }
}

/// 上下文引用：虚拟主机 + 上下文路径
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct ContextRef {
    pub virtual_host: String,
    pub path: String,
}

impl ContextRef {
    pub fn new(virtual_host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            virtual_host: virtual_host.into(),
            path: normalize_context_path(&path.into()),
        }
    }

    /// 解析 "path" 或 "host:path" 形式的条目
    /// 不带虚拟主机的条目使用给定的默认虚拟主机
    pub fn parse(entry: &str, default_virtual_host: &str) -> Result<Self, ConfigError> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(ConfigError::InvalidContextEntry(entry.to_string()));
        }

        let parts: Vec<&str> = entry.split(':').collect();
        match parts.as_slice() {
            [path] => Ok(Self::new(default_virtual_host, path.trim())),
            [host, path] if !host.trim().is_empty() => Ok(Self::new(host.trim(), path.trim())),
            _ => Err(ConfigError::InvalidContextEntry(entry.to_string())),
        }
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.virtual_host, self.path)
    }
}

/// 规范化上下文路径："ROOT" 表示根上下文，其余补全前导 '/'
fn normalize_context_path(path: &str) -> String {
    let path = path.trim();
    if path == "ROOT" || path == "/" || path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

impl ClusterConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_node_config()?;
        self.validate_advertise_config()?;
        self.validate_proxy_config()?;
        self.validate_management_config()?;

        if !(0.0..=1.0).contains(&self.settings.load_factor) {
            return Err(ConfigError::InvalidLoadFactor(self.settings.load_factor));
        }

        // 上下文条目必须可解析
        self.local_contexts()?;
        self.excluded_contexts()?;

        Ok(())
    }

    fn validate_node_config(&self) -> Result<(), ConfigError> {
        if self.node.host.trim().is_empty() || self.node.port == 0 {
            return Err(ConfigError::InvalidNodeAddress(format!(
                "{}:{}",
                self.node.host, self.node.port
            )));
        }
        Ok(())
    }

    fn validate_advertise_config(&self) -> Result<(), ConfigError> {
        let group: Ipv4Addr = self
            .advertise
            .group
            .parse()
            .map_err(|_| ConfigError::InvalidAdvertiseGroup(self.advertise.group.clone()))?;
        if !group.is_multicast() {
            return Err(ConfigError::InvalidAdvertiseGroup(
                self.advertise.group.clone(),
            ));
        }

        if let Some(interface) = &self.advertise.interface {
            interface
                .parse::<Ipv4Addr>()
                .map_err(|_| ConfigError::InvalidAdvertiseInterface(interface.clone()))?;
        }

        if self.advertise.interval_seconds == 0 {
            return Err(ConfigError::InvalidAdvertiseInterval);
        }

        Ok(())
    }

    fn validate_proxy_config(&self) -> Result<(), ConfigError> {
        for proxy in &self.proxies {
            if proxy.host.trim().is_empty() || proxy.port == 0 {
                return Err(ConfigError::InvalidProxyEndpoint(proxy.to_string()));
            }
        }
        Ok(())
    }

    fn validate_management_config(&self) -> Result<(), ConfigError> {
        self.management
            .listen
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidListenAddress(self.management.listen.clone()))?;
        Ok(())
    }

    /// 本地节点的键："host:port"
    pub fn node_key(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    /// 本节点提供的上下文，解析为 ContextRef
    pub fn local_contexts(&self) -> Result<Vec<ContextRef>, ConfigError> {
        self.node
            .contexts
            .iter()
            .map(|entry| ContextRef::parse(entry, &self.node.default_virtual_host))
            .collect()
    }

    /// 排除的上下文列表；未配置时回退到内置默认列表
    pub fn excluded_contexts(&self) -> Result<Vec<ContextRef>, ConfigError> {
        match &self.node.excluded_contexts {
            Some(entries) => entries
                .iter()
                .map(|entry| ContextRef::parse(entry, &self.node.default_virtual_host))
                .collect(),
            None => Ok(DEFAULT_EXCLUDED_CONTEXTS
                .iter()
                .map(|path| ContextRef::new(self.node.default_virtual_host.clone(), *path))
                .collect()),
        }
    }
}

// Default value functions
fn default_virtual_host() -> String {
    "localhost".to_string()
}

fn default_advertise_group() -> String {
    "224.0.1.105".to_string()
}

fn default_advertise_port() -> u16 {
    23364
}

fn default_advertise_interval() -> u64 {
    10
}

fn default_advertise_ttl() -> u32 {
    16
}

fn default_provider_timeout() -> u64 {
    500 // 负载因子提供者最多阻塞半秒
}

fn default_listen_addr() -> String {
    "127.0.0.1:8642".to_string()
}

fn default_stop_context_wait() -> u64 {
    10
}

fn default_shutdown_wait() -> u64 {
    10
}

fn default_load_factor() -> f64 {
    1.0
}
