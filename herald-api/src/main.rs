//! Herald Management Server
//!
//! Main entry point for the herald coordinator management API

use herald_api::start_server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    start_server().await?;
    Ok(())
}
