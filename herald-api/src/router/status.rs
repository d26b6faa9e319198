use crate::app::AppState;
use crate::router::coordinator_error_response;
use axum::{extract::State, response::IntoResponse, Json};
use herald_cluster::ContextState;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;

/// 健康检查处理器
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.coordinator.status().await;

    let status_code = if status.running {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if status.running { "ok" } else { "stopped" },
            "node": status.node_key,
            "multicast_active": status.multicast_active,
            "nodes_registered": status.node_count,
            "proxies_configured": status.proxy_count,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// 指标处理器 - 广播统计
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.coordinator.status().await;

    Json(json!({
        "coordinator": {
            "running": status.running,
            "node": status.node_key,
            "multicast_active": status.multicast_active,
        },
        "advertise": status.advertise,
        "registry": {
            "nodes": status.node_count,
            "proxies": status.proxy_count,
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// 注册表快照处理器 - 每个节点及其上下文状态
pub async fn nodes(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();
    let now = Instant::now();

    let mut nodes_detail = HashMap::new();
    for node in &snapshot.nodes {
        let contexts: Vec<_> = node
            .contexts
            .iter()
            .map(|entry| {
                let remaining_ms = match &entry.state {
                    ContextState::Stopping { deadline, .. } => {
                        Some(deadline.saturating_duration_since(now).as_millis() as u64)
                    }
                    _ => None,
                };
                json!({
                    "virtual_host": entry.context.virtual_host,
                    "path": entry.context.path,
                    "state": entry.state.as_str(),
                    "stopping_remaining_ms": remaining_ms,
                })
            })
            .collect();

        nodes_detail.insert(
            node.key.clone(),
            json!({
                "host": node.host,
                "port": node.port,
                "enabled": node.enabled,
                "contexts": contexts,
            }),
        );
    }

    Json(json!({
        "nodes": nodes_detail,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// 代理状态处理器 - 端点到状态字符串的映射
pub async fn proxy_info(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.proxy_info().await {
        Ok(info) => Json(json!(info)).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 代理配置处理器 - 端点到生效参数的映射
pub async fn proxy_configuration(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.proxy_configuration().await {
        Ok(configuration) => Json(json!(configuration)).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}
