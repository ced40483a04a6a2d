//! End-to-end enter/exit scenarios against the in-memory cluster.

use crate::harness::{init_tracing, orchestrator, orchestrator_with, ClusterFixture};
use cephmaint::memory::{AUTO_HOST_RULE, AUTO_UNIT_RULE, CUSTOM_RULE};
use cephmaint::{EnterOptions, ExitOptions, MaintenanceConfig, MemoryCluster, ServiceKind};
use std::sync::Arc;

fn noout_only() -> EnterOptions {
    EnterOptions {
        set_noout: true,
        ..EnterOptions::default()
    }
}

fn small_cluster_config() -> MaintenanceConfig {
    MaintenanceConfig {
        min_monitors: 2,
        ..MaintenanceConfig::default()
    }
}

#[tokio::test]
async fn test_set_noout_when_already_set() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_noout(true));
    let results = orchestrator(&cluster)
        .enter("node-0", &noout_only())
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert!(cluster.noout());
}

#[tokio::test]
async fn test_unset_noout_when_already_unset() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let results = orchestrator(&cluster)
        .exit("node-1", &ExitOptions::default())
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert!(!cluster.noout());
}

#[tokio::test]
async fn test_failed_preflight_makes_no_mutating_calls() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_unsafe_unit(1));
    let opts = EnterOptions {
        set_noout: true,
        stop_storage_units: true,
        stop_control_services: true,
        confirm_failure_domain_downgrade: true,
        ..EnterOptions::default()
    };
    let results = orchestrator(&cluster).enter("node-0", &opts).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].error, "osd.1 cannot be safely stopped");
    assert!(cluster.mutating_calls().is_empty());
    assert!(!cluster.noout());
}

#[tokio::test]
async fn test_force_appends_action_results() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_unsafe_unit(0));
    let opts = EnterOptions {
        force: true,
        set_noout: true,
        stop_storage_units: true,
        ..EnterOptions::default()
    };
    let results = orchestrator(&cluster).enter("node-0", &opts).await.unwrap();

    assert!(!results[1].is_ok());
    assert!(results[2].is_ok(), "{}", results[2].error);
    let actions: Vec<&str> = results[3..].iter().map(|r| r.action.as_str()).collect();
    assert_eq!(actions.len(), 4);
    assert!(actions[0].starts_with("Downgrade failure domain"));
    assert_eq!(actions[1], "Run `ceph osd set noout`.");
    assert_eq!(actions[3], "Stop OSD service in node 'node-0'.");
    assert!(results[3..].iter().all(|r| r.is_ok()));
    assert_eq!(cluster.out_units(), vec![0, 1]);
}

#[tokio::test]
async fn test_check_only_returns_preflight_results_only() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let orch = orchestrator(&cluster);
    let opts = EnterOptions {
        check_only: true,
        force: true,
        set_noout: true,
        stop_storage_units: true,
        ..EnterOptions::default()
    };
    let preflight = orch.enter_plan(&opts).preflight.len();

    let results = orch.enter("node-0", &opts).await.unwrap();
    assert_eq!(results.len(), preflight);
    assert!(cluster.mutating_calls().is_empty());

    let dry = EnterOptions {
        dry_run: true,
        ..opts
    };
    assert_eq!(orch.enter("node-0", &dry).await.unwrap().len(), preflight);
}

#[tokio::test]
async fn test_check_only_with_failing_check_reports_all_checks() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build().with_unsafe_unit(0));
    let orch = orchestrator(&cluster);
    let opts = EnterOptions {
        check_only: true,
        force: true,
        set_noout: true,
        stop_storage_units: true,
        ..EnterOptions::default()
    };

    let results = orch.enter("node-0", &opts).await.unwrap();
    assert_eq!(results.len(), orch.enter_plan(&opts).preflight.len());
    assert_eq!(results[1].error, "osd.0 cannot be safely stopped");
    assert!(results[2].action.starts_with("Check if there are at least"));
    assert!(cluster.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_force_reports_quorum_shortfall_behind_failed_check() {
    init_tracing();
    let cluster = Arc::new(
        ClusterFixture::four_node()
            .without_service(ServiceKind::MetadataServer, "node-1")
            .build()
            .with_unsafe_unit(0),
    );
    let orch = orchestrator(&cluster);
    let opts = EnterOptions {
        force: true,
        set_noout: true,
        ..EnterOptions::default()
    };

    let results = orch.enter("node-0", &opts).await.unwrap();
    let preflight = orch.enter_plan(&opts).preflight.len();
    assert_eq!(results.len(), preflight + 3);
    assert!(!results[1].is_ok());
    assert!(results[2].error.contains("mds"), "{}", results[2].error);
    assert!(results[preflight..].iter().all(|r| r.is_ok()));
    assert!(cluster.noout());
}

#[tokio::test]
async fn test_quorum_counts_services_elsewhere() {
    init_tracing();
    let opts = EnterOptions {
        check_only: true,
        ..EnterOptions::default()
    };

    let cluster = Arc::new(ClusterFixture::four_node().build());
    let results = orchestrator(&cluster).enter("node-0", &opts).await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let cluster = Arc::new(
        ClusterFixture::four_node()
            .without_service(ServiceKind::MetadataServer, "node-1")
            .build(),
    );
    let results = orchestrator(&cluster).enter("node-0", &opts).await.unwrap();
    let quorum = &results[2];
    assert!(!quorum.is_ok());
    assert!(quorum.error.contains("mds"), "{}", quorum.error);
    assert!(!quorum.error.contains("mon"), "{}", quorum.error);
}

#[tokio::test]
async fn test_monitor_on_target_does_not_count() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::three_node().build());
    let opts = EnterOptions {
        check_only: true,
        ..EnterOptions::default()
    };
    let results = orchestrator(&cluster).enter("node-2", &opts).await.unwrap();
    assert!(results[2].error.contains("mon (need 3, 2 remaining)"), "{}", results[2].error);
}

#[tokio::test]
async fn test_custom_rule_left_alone() {
    init_tracing();
    for confirm in [false, true] {
        let cluster = Arc::new(ClusterFixture::three_node().build().with_active_rule(CUSTOM_RULE));
        let opts = EnterOptions {
            confirm_failure_domain_downgrade: confirm,
            ..EnterOptions::default()
        };
        let results = orchestrator_with(&cluster, small_cluster_config())
            .enter("node-0", &opts)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
        assert_eq!(cluster.active_rule(), CUSTOM_RULE);
        assert!(cluster.mutating_calls().is_empty());
    }
}

#[tokio::test]
async fn test_downgrade_requires_confirmation() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::three_node().build().with_active_rule(AUTO_HOST_RULE));
    let orch = orchestrator_with(&cluster, small_cluster_config());

    let results = orch.enter("node-0", &noout_only()).await.unwrap();
    assert_eq!(results.len(), 4);
    assert!(results[3].error.contains("please confirm"), "{}", results[3].error);
    assert_eq!(cluster.active_rule(), AUTO_HOST_RULE);
    assert!(cluster.mutating_calls().is_empty());

    let confirmed = EnterOptions {
        confirm_failure_domain_downgrade: true,
        ..noout_only()
    };
    let results = orch.enter("node-0", &confirmed).await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert_eq!(cluster.active_rule(), AUTO_UNIT_RULE);
    assert!(cluster.noout());
}

#[tokio::test]
async fn test_enter_then_exit_restores_cluster() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::four_node().build());
    let orch = orchestrator(&cluster);

    let enter = EnterOptions {
        set_noout: true,
        stop_storage_units: true,
        stop_control_services: true,
        ..EnterOptions::default()
    };
    let results = orch.enter("node-1", &enter).await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert!(cluster.noout());
    assert_eq!(cluster.out_units(), vec![2, 3]);
    assert_eq!(
        cluster.stopped_services(),
        vec![
            ServiceKind::Monitor,
            ServiceKind::MetadataServer,
            ServiceKind::Manager,
            ServiceKind::StorageDaemon
        ]
    );

    let exit = ExitOptions {
        start_control_services: true,
        ..ExitOptions::default()
    };
    let results = orch.exit("node-1", &exit).await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert!(!cluster.noout());
    assert!(cluster.out_units().is_empty());
    assert!(cluster.stopped_services().is_empty());
}

#[tokio::test]
async fn test_exit_upgrades_after_downgrade() {
    init_tracing();
    let cluster = Arc::new(ClusterFixture::three_node().build().with_active_rule(AUTO_HOST_RULE));
    let orch = orchestrator_with(&cluster, small_cluster_config());

    let enter = EnterOptions {
        confirm_failure_domain_downgrade: true,
        ..EnterOptions::default()
    };
    orch.enter("node-2", &enter).await.unwrap();
    assert_eq!(cluster.active_rule(), AUTO_UNIT_RULE);

    let results = orch.exit("node-2", &ExitOptions::default()).await.unwrap();
    assert!(!results.last().unwrap().is_ok());
    assert_eq!(cluster.active_rule(), AUTO_UNIT_RULE);

    let exit = ExitOptions {
        confirm_failure_domain_upgrade: true,
        ..ExitOptions::default()
    };
    let results = orch.exit("node-2", &exit).await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);
    assert_eq!(cluster.active_rule(), AUTO_HOST_RULE);
}

#[tokio::test]
async fn test_inventory_outage_reported_per_operation() {
    init_tracing();
    let cluster = Arc::new(MemoryCluster::new().fail_on("members", "connection refused"));
    let results = orchestrator(&cluster)
        .enter("node-0", &EnterOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].error.contains("connection refused"), "{}", results[0].error);
}
