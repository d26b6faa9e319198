//! Herald Core Library
//!
//! This library provides core functionality for the herald coordinator including:
//! - Configuration management
//! - Shared cluster types (contexts, proxy endpoints)
//! - Error taxonomy

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::model::{
    AdvertiseConfig, ClusterConfig, ContextRef, GlobalSettings, ManagementConfig, NodeConfig,
    ProxyEndpoint,
};
pub use error::{ConfigError, CoordinatorError};
