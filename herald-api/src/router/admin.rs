use crate::app::AppState;
use crate::router::coordinator_error_response;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use headers::authorization::Bearer;
use headers::Authorization;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// 上下文操作请求体
#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    /// 缺省时使用配置的默认虚拟主机
    pub virtual_host: Option<String>,
    pub context: String,
    /// 仅 stop 使用；缺省时使用配置的默认等待时间
    pub wait_seconds: Option<u64>,
}

/// 代理操作请求体
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    pub host: String,
    pub port: u16,
}

type MaybeBearer = Option<TypedHeader<Authorization<Bearer>>>;

/// 认证检查：配置了管理令牌时，变更操作必须携带匹配的 Bearer 令牌
fn authorize(state: &AppState, authorization: &MaybeBearer) -> Result<(), Response> {
    let Some(expected) = &state.config.management.admin_token else {
        return Ok(());
    };

    match authorization {
        Some(TypedHeader(auth)) if auth.token() == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": {
                    "type": "invalid_token",
                    "message": "The provided admin token is invalid",
                    "code": 401
                }
            })),
        )
            .into_response()),
    }
}

fn resolve_virtual_host(state: &AppState, request: &ContextRequest) -> String {
    request
        .virtual_host
        .clone()
        .unwrap_or_else(|| state.config.node.default_virtual_host.clone())
}

/// 全局启用
pub async fn enable(State(state): State<AppState>, authorization: MaybeBearer) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state.coordinator.enable().await {
        Ok(()) => Json(json!({"enabled": true})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 全局停用
pub async fn disable(State(state): State<AppState>, authorization: MaybeBearer) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state.coordinator.disable().await {
        Ok(()) => Json(json!({"disabled": true})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 清空上下文状态并重新开始序列号计数
pub async fn reset(State(state): State<AppState>, authorization: MaybeBearer) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state.coordinator.reset().await {
        Ok(()) => Json(json!({"reset": true})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 立即发送一轮完整通告
pub async fn refresh(State(state): State<AppState>, authorization: MaybeBearer) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state.coordinator.refresh().await {
        Ok(()) => Json(json!({"refreshed": true})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 启用单个上下文
pub async fn enable_context(
    State(state): State<AppState>,
    authorization: MaybeBearer,
    Json(request): Json<ContextRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    let virtual_host = resolve_virtual_host(&state, &request);
    match state
        .coordinator
        .enable_context(&virtual_host, &request.context)
        .await
    {
        Ok(enabled) => Json(json!({"enabled": enabled})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 停用单个上下文
pub async fn disable_context(
    State(state): State<AppState>,
    authorization: MaybeBearer,
    Json(request): Json<ContextRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    let virtual_host = resolve_virtual_host(&state, &request);
    match state
        .coordinator
        .disable_context(&virtual_host, &request.context)
        .await
    {
        Ok(disabled) => Json(json!({"disabled": disabled})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 带截止时间地停止单个上下文
pub async fn stop_context(
    State(state): State<AppState>,
    authorization: MaybeBearer,
    Json(request): Json<ContextRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    let virtual_host = resolve_virtual_host(&state, &request);
    let wait = request.wait_seconds.map(Duration::from_secs);
    match state
        .coordinator
        .stop_context(&virtual_host, &request.context, wait)
        .await
    {
        Ok(stopped) => Json(json!({"stopped": stopped})).into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 添加静态代理端点
pub async fn add_proxy(
    State(state): State<AppState>,
    authorization: MaybeBearer,
    Json(request): Json<ProxyRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state
        .coordinator
        .add_proxy(&request.host, request.port)
        .await
    {
        Ok(()) => Json(json!({"added": format!("{}:{}", request.host, request.port)}))
            .into_response(),
        Err(e) => coordinator_error_response(e),
    }
}

/// 移除静态代理端点
pub async fn remove_proxy(
    State(state): State<AppState>,
    authorization: MaybeBearer,
    Json(request): Json<ProxyRequest>,
) -> Response {
    if let Err(response) = authorize(&state, &authorization) {
        return response;
    }
    match state
        .coordinator
        .remove_proxy(&request.host, request.port)
        .await
    {
        Ok(()) => Json(json!({"removed": format!("{}:{}", request.host, request.port)}))
            .into_response(),
        Err(e) => coordinator_error_response(e),
    }
}
