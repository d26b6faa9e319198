//! Herald Management API
//!
//! HTTP control plane over the proxy coordinator facade:
//! - Status and registry observability endpoints
//! - Context enable/disable/stop operations
//! - Static proxy list management

pub mod app;
pub mod router;

pub use app::{create_app, start_server, AppState};
