//! Herald Cluster Library
//!
//! Node registry, advertisement broadcasting and proxy coordination:
//! - Node registry with per-context enable/disable state
//! - Periodic advertisement of node reachability and load factor
//! - Proxy coordinator facade for the management plane

pub mod cluster;

pub use cluster::{
    AdvertiseMetrics, AdvertiseStats, AdvertiseTransport, AdvertisementBroadcaster,
    AdvertisementMessage, ClusterCoordinator, ContextCommand, ContextState, CoordinatorStatus,
    FixedLoadProvider, LifecycleState, LoadFactorProvider, Node, NodeRegistry, ProxyCoordinator,
    RegistrySnapshot, UdpTransport,
};
