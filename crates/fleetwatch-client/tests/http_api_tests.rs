//! HTTP API client tests against a mocked backend.
//!
//! These tests verify that `HttpApi`:
//! 1. Hits the documented endpoints with the right method and payload
//! 2. Decodes the camelCase wire shapes
//! 3. Classifies non-2xx responses and timeouts

use std::time::Duration;

use fleetwatch_client::{AgentAction, ClientError, DashboardApi, FaultClass, HttpApi};
use fleetwatch_core::{AgentStatus, View};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path, query_param},
};

// ============================================================
// Read endpoints
// ============================================================

#[tokio::test]
async fn test_search_sends_query_and_parses_hits() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("q", "crawler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "type": "agent",
                "id": "crawler-1",
                "title": "Crawler",
                "description": "Web crawler agent",
                "timestamp": 1700000000000i64,
                "query": "crawler"
            },
            {
                "type": "knowledge",
                "id": 42,
                "title": "Crawl budget notes"
            }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let hits = api.search("crawler").await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].kind, "agent");
    assert!(hits[0].timestamp.is_some());
    assert_eq!(hits[1].id, "42");
    assert_eq!(hits[1].description, "");
}

#[tokio::test]
async fn test_system_metrics_camel_case() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/system/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cpu": 37.5,
            "memory": 61.0,
            "disk": 12.25,
            "uptime": 93784,
            "activeAgents": 4,
            "totalTasks": 18,
            "knowledgeItems": 256
        })))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let metrics = api.system_metrics().await.unwrap();

    assert_eq!(metrics.cpu, 37.5);
    assert_eq!(metrics.active_agents, 4);
    assert_eq!(metrics.total_tasks, 18);
    assert_eq!(metrics.knowledge_items, 256);
    assert_eq!(metrics.uptime_display(), "1d 2h 3m");
}

#[tokio::test]
async fn test_system_metrics_float_uptime() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/system/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cpu": 5.0,
            "uptime": 93784.91,
            "activeAgents": 2
        })))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let metrics = api.system_metrics().await.unwrap();

    assert_eq!(metrics.uptime, 93_784);
    assert_eq!(metrics.uptime_display(), "1d 2h 3m");
}

#[tokio::test]
async fn test_agent_statuses_with_unknown_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agents/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "scout", "status": "running", "metrics": {"cpu": 3.5, "tasks": 2}},
            {"id": "archivist", "status": "hibernating"}
        ])))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let updates = api.agent_statuses().await.unwrap();

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].status, AgentStatus::Running);
    let metrics = updates[0].metrics.as_ref().unwrap();
    assert_eq!(metrics.cpu, Some(3.5));
    assert_eq!(metrics.memory, None);
    assert_eq!(updates[1].status, AgentStatus::Unknown);
}

#[tokio::test]
async fn test_view_data_hits_view_endpoints() {
    let mock_server = MockServer::start().await;

    for view in View::ALL {
        Mock::given(method("GET"))
            .and(path(view.endpoint()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"view": view.to_string()})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    for view in View::ALL {
        let data = api.view_data(view).await.unwrap();
        assert_eq!(data["view"], view.to_string());
    }
}

// ============================================================
// Commands and agent actions
// ============================================================

#[tokio::test]
async fn test_execute_posts_command() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .and(body_json(serde_json::json!({"command": "sync"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": true, "data": {"synced": 3}})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let result = api.execute("sync").await.unwrap();

    assert!(result.success);
    assert_eq!(result.data, Some(serde_json::json!({"synced": 3})));
}

#[tokio::test]
async fn test_execute_rejection_body_on_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "success": false,
            "error": "Unknown command: frobnicate"
        })))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let result = api.execute("frobnicate").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Unknown command: frobnicate"));
}

#[tokio::test]
async fn test_execute_server_error_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let err = api.execute("sync").await.unwrap_err();

    assert!(matches!(err, ClientError::ApiTransient(_)));
    assert!(err.is_retryable());
    assert_eq!(err.fault_class(), FaultClass::Request);
}

#[tokio::test]
async fn test_agent_action_paths() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agents/scout/start"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/agents/ghost/stop"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such agent"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    api.agent_action("scout", AgentAction::Start).await.unwrap();

    let err = api.agent_action("ghost", AgentAction::Stop).await.unwrap_err();
    match err {
        ClientError::Api(message) => assert!(message.contains("404")),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_agent_action_encodes_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agents/team%2Fscout%3F/stop"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    api.agent_action("team/scout?", AgentAction::Stop).await.unwrap();
}

// ============================================================
// Failure classification
// ============================================================

#[tokio::test]
async fn test_request_timeout_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/system/metrics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 1).unwrap();
    let err = api.system_metrics().await.unwrap_err();

    assert!(
        matches!(err, ClientError::Timeout(1, _)),
        "expected timeout, got {err:?}"
    );
}

#[tokio::test]
async fn test_malformed_body_is_request_fault() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agents/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let api = HttpApi::new(mock_server.uri(), 5).unwrap();
    let err = api.agent_statuses().await.unwrap_err();
    assert!(
        matches!(&err, ClientError::InvalidResponse { path, .. } if path == "/api/agents/status"),
        "expected invalid response, got {err:?}"
    );
    assert_eq!(err.fault_class(), FaultClass::Request);
}

#[tokio::test]
async fn test_unreachable_server() {
    // Port 9 (discard) is not listening in test environments.
    let api = HttpApi::new("http://127.0.0.1:9", 2).unwrap();
    let err = api.system_metrics().await.unwrap_err();
    assert_eq!(err.fault_class(), FaultClass::Request);
}
