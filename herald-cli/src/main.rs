//! Herald CLI Tool
//!
//! Command line interface for managing the herald coordinator

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "herald-cli")]
#[command(about = "A CLI tool for managing the herald coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
        /// Include static proxies and management token
        #[arg(long)]
        advanced: bool,
    },
    /// Show coordinator status via the management API
    Status {
        /// Base URL of the management API
        #[arg(short, long, default_value = "http://127.0.0.1:8642")]
        url: String,
    },
    /// Show configured proxies and their advertisement status
    Proxies {
        /// Base URL of the management API
        #[arg(short, long, default_value = "http://127.0.0.1:8642")]
        url: String,
    },
    /// Stop a context with a drain deadline
    StopContext {
        /// Base URL of the management API
        #[arg(short, long, default_value = "http://127.0.0.1:8642")]
        url: String,
        /// Context path, e.g. /app
        #[arg(short, long)]
        context: String,
        /// Virtual host (defaults to the node's default virtual host)
        #[arg(long)]
        virtual_host: Option<String>,
        /// Seconds to wait before the context becomes DISABLED
        #[arg(short, long)]
        wait: Option<u64>,
        /// Admin token when the management API requires one
        #[arg(long)]
        token: Option<String>,
    },
    /// Send one round of advertisements using a local coordinator
    AdvertiseOnce {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match herald_core::config::loader::load_config_from_path(&config) {
                Ok(cfg) => match cfg.validate() {
                    Ok(()) => {
                        println!("✅ Configuration is valid");
                        println!("  - node {}", cfg.node_key());
                        println!("  - {} local contexts", cfg.node.contexts.len());
                        println!("  - {} static proxies", cfg.proxies.len());
                        println!(
                            "  - advertise group {}:{} every {}s",
                            cfg.advertise.group, cfg.advertise.port, cfg.advertise.interval_seconds
                        );
                    }
                    Err(e) => {
                        eprintln!("❌ Configuration validation failed: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("❌ Configuration could not be loaded: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output, advanced } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output, advanced)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Status { url } => {
            show_status(&url).await?;
        }
        Commands::Proxies { url } => {
            show_proxies(&url).await?;
        }
        Commands::StopContext {
            url,
            context,
            virtual_host,
            wait,
            token,
        } => {
            stop_context(&url, &context, virtual_host, wait, token).await?;
        }
        Commands::AdvertiseOnce { config } => {
            let cfg = herald_core::config::loader::load_config_from_path(&config)?;
            advertise_once(cfg).await?;
        }
    }

    Ok(())
}

/// 生成配置文件
fn generate_config_file(output_path: &str, advanced: bool) -> Result<()> {
    let config_content = if advanced {
        r#"# Herald Advanced Configuration File
# This configuration includes static proxies and a protected management API

[node]
host = "10.0.0.1"
port = 8009
default_virtual_host = "localhost"
contexts = ["/app", "web:/shop"]
# Entries may be "path" or "host:path"; unset falls back to the built-in list
excluded_contexts = ["admin", "web:/private"]

[advertise]
# Unset 'enabled' lets multicast availability decide
enabled = true
group = "224.0.1.105"
port = 23364
interval_seconds = 10
ttl = 16
provider_timeout_ms = 500

[[proxies]]
host = "proxy1.example.com"
port = 6666

[[proxies]]
host = "proxy2.example.com"
port = 6666

[management]
listen = "127.0.0.1:8642"
admin_token = "change-me"

[settings]
stop_context_wait_seconds = 10
shutdown_wait_seconds = 10
load_factor = 1.0
"#
    } else {
        r#"# Herald Configuration File
# This is a basic configuration example

[node]
host = "10.0.0.1"
port = 8009
contexts = ["/app"]

[advertise]
group = "224.0.1.105"
port = 23364
interval_seconds = 10

[management]
listen = "127.0.0.1:8642"
"#
    };

    std::fs::write(output_path, config_content)?;
    Ok(())
}

/// 显示协调器状态
async fn show_status(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let health: serde_json::Value = client
        .get(format!("{}/health", base_url.trim_end_matches('/')))
        .send()
        .await?
        .json()
        .await?;

    println!("📊 Coordinator Status");
    println!("=====================");
    println!(
        "State: {}",
        if health["status"] == "ok" {
            "🟢 Running"
        } else {
            "🔴 Stopped"
        }
    );
    println!("Node: {}", health["node"]);
    println!("Multicast Active: {}", health["multicast_active"]);
    println!("Registered Nodes: {}", health["nodes_registered"]);
    println!("Configured Proxies: {}", health["proxies_configured"]);
    println!();

    let metrics: serde_json::Value = client
        .get(format!("{}/metrics", base_url.trim_end_matches('/')))
        .send()
        .await?
        .json()
        .await?;

    println!("📡 Advertisement Statistics");
    println!("===========================");
    println!("Ticks: {}", metrics["advertise"]["ticks"]);
    println!("Messages Sent: {}", metrics["advertise"]["messages_sent"]);
    println!("Send Failures: {}", metrics["advertise"]["send_failures"]);
    println!(
        "Provider Fallbacks: {}",
        metrics["advertise"]["provider_fallbacks"]
    );

    Ok(())
}

/// 显示代理列表及其状态
async fn show_proxies(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let proxies: serde_json::Value = client
        .get(format!("{}/proxies", base_url.trim_end_matches('/')))
        .send()
        .await?
        .json()
        .await?;

    println!("🔀 Configured Proxies");
    println!("=====================");
    match proxies.as_object() {
        Some(entries) if !entries.is_empty() => {
            for (endpoint, status) in entries {
                println!("{} - {}", endpoint, status.as_str().unwrap_or("unknown"));
            }
        }
        _ => println!("(no static proxies configured)"),
    }

    Ok(())
}

/// 请求停止一个上下文
async fn stop_context(
    base_url: &str,
    context: &str,
    virtual_host: Option<String>,
    wait: Option<u64>,
    token: Option<String>,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let body = serde_json::json!({
        "virtual_host": virtual_host,
        "context": context,
        "wait_seconds": wait,
    });

    let mut request = client
        .post(format!(
            "{}/control/contexts/stop",
            base_url.trim_end_matches('/')
        ))
        .json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;

    if status.is_success() && body["stopped"] == true {
        println!("✅ Context {} is stopping", context);
    } else if status.is_success() {
        println!("❌ Context {} is not registered", context);
        std::process::exit(1);
    } else {
        eprintln!("❌ Stop request failed ({}): {}", status, body);
        std::process::exit(1);
    }

    Ok(())
}

/// 构建一个本地协调器并发送一轮通告，用于连通性检查
async fn advertise_once(config: herald_core::ClusterConfig) -> Result<()> {
    println!(
        "🔍 Sending one advertisement round for node {}",
        config.node_key()
    );
    println!(
        "Advertise group: {}:{}",
        config.advertise.group, config.advertise.port
    );
    if config.proxies.is_empty() {
        println!("Static proxies: (none)");
    } else {
        for proxy in &config.proxies {
            println!("Static proxy: {}", proxy);
        }
    }
    println!();

    let coordinator = herald_cluster::ProxyCoordinator::from_config(config).await?;
    coordinator.start().await?;
    coordinator.refresh().await?;

    // 给广播循环一点时间完成发送
    tokio::time::sleep(Duration::from_millis(500)).await;

    let stats = coordinator.metrics().snapshot();
    coordinator.stop(Duration::from_secs(2)).await;

    if stats.messages_sent > 0 {
        println!("✅ {} advertisement(s) sent", stats.messages_sent);
    } else if stats.send_failures > 0 {
        println!("❌ All sends failed ({} failures)", stats.send_failures);
        std::process::exit(1);
    } else {
        println!("⚠️  Nothing was sent: advertising is disabled and no proxies are configured");
    }

    Ok(())
}
