//! Maintenance requests decoded from JSON and applied to a member.

use crate::harness::{init_tracing, orchestrator, ClusterFixture};
use cephmaint::{
    MaintenanceError, MaintenanceFlags, MaintenanceRequest, MaintenanceResponse, MemoryCluster,
};
use std::sync::Arc;

fn decode(json: &str) -> MaintenanceRequest {
    serde_json::from_str(json).expect("valid request json")
}

fn unsafe_cluster() -> Arc<MemoryCluster> {
    Arc::new(ClusterFixture::four_node().build().with_unsafe_unit(0))
}

#[tokio::test]
async fn test_apply_enter_request() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let request = decode(r#"{"status":"maintenance","set_noout":true,"stop_osds":true}"#);

    let response = orchestrator(&cluster).apply("node-0", &request).await.unwrap();
    assert!(response.success);
    assert_eq!(response.results.len(), 7);
    assert!(cluster.noout());
    assert_eq!(cluster.out_units(), vec![0, 1]);
}

#[tokio::test]
async fn test_apply_reports_failure_without_force() {
    init_tracing();
    let cluster = unsafe_cluster();
    let request = decode(r#"{"status":"maintenance","set_noout":true}"#);

    let response = orchestrator(&cluster).apply("node-0", &request).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.results.len(), 2);
    assert!(!cluster.noout());
}

#[tokio::test]
async fn test_apply_forced_enter_counts_as_success() {
    init_tracing();
    let cluster = unsafe_cluster();
    let request = decode(r#"{"status":"maintenance","force":true,"set_noout":true}"#);

    let response = orchestrator(&cluster).apply("node-0", &request).await.unwrap();
    assert!(response.success);
    assert!(!response.results[1].is_ok());
    assert!(cluster.noout());
}

#[tokio::test]
async fn test_apply_exit_request() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_noout(true));
    let request = MaintenanceRequest::exit(MaintenanceFlags::default());

    let response = orchestrator(&cluster).apply("node-3", &request).await.unwrap();
    assert!(response.success, "{:?}", response.results);
    assert!(!cluster.noout());
}

#[tokio::test]
async fn test_apply_ignores_force_on_exit() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_noout(true));
    let request = decode(r#"{"status":"non-maintenance","force":true}"#);

    let response = orchestrator(&cluster).apply("node-7", &request).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.results.len(), 1);
    assert!(cluster.noout());
}

#[tokio::test]
async fn test_apply_dry_run_lists_actions() {
    init_tracing();
    let cluster = unsafe_cluster();
    let request = decode(
        r#"{"status":"maintenance","dry_run":true,"set_noout":true,"stop_osds":true,"control_services":true}"#,
    );

    let response = orchestrator(&cluster).apply("node-0", &request).await.unwrap();
    assert!(response.success);
    assert_eq!(
        response.results.last().map(|r| r.action.as_str()),
        Some("Stop non-osd services in node 'node-0'.")
    );
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_apply_empty_node_is_rejected() {
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let request = MaintenanceRequest::exit(MaintenanceFlags::default());
    let err = orchestrator(&cluster).apply("", &request).await.unwrap_err();
    assert!(matches!(err, MaintenanceError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_response_encoding() {
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let request = decode(r#"{"status":"maintenance","check_only":true}"#);
    let response = orchestrator(&cluster).apply("node-0", &request).await.unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["results"][0]["action"], "Check if node 'node-0' is in the cluster.");
    assert_eq!(json["results"][0]["error"], "");

    let back: MaintenanceResponse = serde_json::from_value(json).unwrap();
    assert_eq!(back, response);
}
