pub mod broadcaster;
pub mod coordinator;
pub mod load;
pub mod registry;
pub mod traits;
pub mod transport;


pub use broadcaster::{AdvertiseMetrics, AdvertiseStats, AdvertisementBroadcaster, AdvertisementMessage};
pub use coordinator::{CoordinatorStatus, LifecycleState, ProxyCoordinator};
pub use load::{FixedLoadProvider, LoadFactorProvider};
pub use registry::{
    ContextCommand, ContextEntry, ContextState, Node, NodeRegistry, NodeSnapshot,
    RegistrySnapshot, StopTicket,
};
pub use traits::ClusterCoordinator;
pub use transport::{AdvertiseTransport, UdpTransport};
