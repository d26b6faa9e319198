use axum_test::TestServer;
use herald_api::{create_app, AppState};
use herald_core::{
    AdvertiseConfig, ClusterConfig, GlobalSettings, ManagementConfig, NodeConfig,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

/// 创建测试配置
fn create_test_config() -> ClusterConfig {
    ClusterConfig {
        node: NodeConfig {
            host: "10.0.0.1".to_string(),
            port: 8009,
            default_virtual_host: "localhost".to_string(),
            contexts: vec!["/app".to_string(), "web:/shop".to_string()],
            excluded_contexts: None,
        },
        advertise: AdvertiseConfig {
            enabled: Some(false),
            ..AdvertiseConfig::default()
        },
        proxies: vec![],
        management: ManagementConfig::default(),
        settings: GlobalSettings::default(),
    }
}

fn context_state(body: &Value, virtual_host: &str, path: &str) -> Option<String> {
    body["nodes"]["10.0.0.1:8009"]["contexts"]
        .as_array()?
        .iter()
        .find(|ctx| ctx["virtual_host"] == virtual_host && ctx["path"] == path)
        .and_then(|ctx| ctx["state"].as_str().map(str::to_string))
}

#[tokio::test]
async fn test_stop_context_transitions_through_stopping_to_disabled() {
    let state = AppState::from_config(create_test_config()).await.unwrap();
    let server = TestServer::new(create_app(state)).unwrap();

    let response = server
        .post("/control/contexts/stop")
        .json(&json!({"context": "/app", "wait_seconds": 1}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["stopped"], true);

    let body: Value = server.get("/nodes").await.json();
    assert_eq!(
        context_state(&body, "localhost", "/app").as_deref(),
        Some("STOPPING")
    );

    // 截止时间过后，没有任何后续调用也会变成 DISABLED
    sleep(Duration::from_millis(1300)).await;
    let body: Value = server.get("/nodes").await.json();
    assert_eq!(
        context_state(&body, "localhost", "/app").as_deref(),
        Some("DISABLED")
    );

    // 另一个虚拟主机下的上下文不受影响
    assert_eq!(
        context_state(&body, "web", "/shop").as_deref(),
        Some("ENABLED")
    );
}

#[tokio::test]
async fn test_disable_context_then_enable_context() {
    let state = AppState::from_config(create_test_config()).await.unwrap();
    let server = TestServer::new(create_app(state)).unwrap();

    let response = server
        .post("/control/contexts/disable")
        .json(&json!({"virtual_host": "web", "context": "/shop"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["disabled"], true);

    let body: Value = server.get("/nodes").await.json();
    assert_eq!(
        context_state(&body, "web", "/shop").as_deref(),
        Some("DISABLED")
    );

    let response = server
        .post("/control/contexts/enable")
        .json(&json!({"virtual_host": "web", "context": "/shop"}))
        .await;
    response.assert_status_ok();

    let body: Value = server.get("/nodes").await.json();
    assert_eq!(
        context_state(&body, "web", "/shop").as_deref(),
        Some("ENABLED")
    );
}

#[tokio::test]
async fn test_reset_clears_context_state() {
    let state = AppState::from_config(create_test_config()).await.unwrap();
    let server = TestServer::new(create_app(state)).unwrap();

    server.post("/control/disable").await.assert_status_ok();
    server.post("/control/reset").await.assert_status_ok();

    let body: Value = server.get("/nodes").await.json();
    assert_eq!(
        context_state(&body, "localhost", "/app").as_deref(),
        Some("ENABLED")
    );
    assert_eq!(
        context_state(&body, "web", "/shop").as_deref(),
        Some("ENABLED")
    );
}
