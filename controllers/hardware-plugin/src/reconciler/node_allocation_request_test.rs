//! Unit tests for NodeAllocationRequest reconciler

use super::*;
use crate::test_utils::*;
use controller_common::ErrorPolicy;
use crds::{AllocatedNode, NodeAllocationRequestStatus};
use hwmgr_plugins::{HardwarePlugin, Inventory, LoopbackPlugin, LOOPBACK_PLUGIN_ID, METAL3_PLUGIN_ID};
use resource_store::{MockStore, ResourceStore, RetryConfig, RetryContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const NS: &str = "hwmgr";

fn setup(answer: Answer) -> (Arc<ScriptedPlugin>, MockStore<NodeAllocationRequest>, Reconciler) {
    let plugin = Arc::new(ScriptedPlugin::new(METAL3_PLUGIN_ID, answer));
    let requests = MockStore::new();
    let reconciler = create_test_reconciler(plugin.clone(), &requests);
    (plugin, requests, reconciler)
}

fn stored(requests: &MockStore<NodeAllocationRequest>, name: &str) -> NodeAllocationRequest {
    requests.get_object(NS, name).unwrap()
}

fn provisioned(nodes: &[&str]) -> Answer {
    Answer::Status(RequestStatus::provisioned(nodes.iter().map(|n| n.to_string()).collect()))
}

#[tokio::test]
async fn test_skips_request_for_other_plugin() {
    let (plugin, requests, reconciler) = setup(provisioned(&[]));
    requests.insert(create_test_node_allocation_request("cluster1", NS, LOOPBACK_PLUGIN_ID, 1));

    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(plugin.calls().is_empty());
    assert_eq!(requests.writes(), 0);
}

#[tokio::test]
async fn test_allocates_and_writes_status() {
    let (plugin, requests, reconciler) = setup(provisioned(&["cluster1-bmh-1"]));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));

    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(plugin.calls(), vec!["allocate"]);

    let request = stored(&requests, "cluster1");
    assert!(has_finalizer(&request));
    assert!(request.is_provisioned());
    let status = request.status.as_ref().unwrap();
    assert_eq!(status.node_names, vec!["cluster1-bmh-1"]);
    assert_eq!(status.observed_generation, Some(1));
    assert!(request.condition(hardware_condition::CONFIGURED).is_none());
}

#[tokio::test]
async fn test_provisioned_request_only_reports() {
    let (plugin, requests, reconciler) = setup(provisioned(&["cluster1-bmh-1"]));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));
    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();
    requests.reset_writes();

    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    assert_eq!(plugin.calls(), vec!["allocate", "status"]);
    assert_eq!(requests.writes(), 0);
}

#[tokio::test]
async fn test_spec_change_triggers_allocation() {
    let (plugin, requests, reconciler) = setup(provisioned(&["cluster1-bmh-1"]));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));
    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    let mut request = stored(&requests, "cluster1");
    request.spec.node_group[0].node_group_data.hw_profile = "profile-b".to_string();
    let request = requests.replace(NS, &request).await.unwrap();
    assert_eq!(request.metadata.generation, Some(2));

    reconciler.reconcile_node_allocation_request(&request).await.unwrap();

    assert_eq!(plugin.calls(), vec!["allocate", "allocate"]);
    assert_eq!(stored(&requests, "cluster1").status.unwrap().observed_generation, Some(2));
}

#[tokio::test]
async fn test_in_progress_requeues() {
    let (plugin, requests, reconciler) = setup(Answer::Status(RequestStatus::in_progress(
        Vec::new(),
        "Waiting for 1 more node(s) to be allocated",
    )));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));

    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(TEST_REQUEUE));
    let request = stored(&requests, "cluster1");
    let condition = request.condition(hardware_condition::PROVISIONED).unwrap();
    assert_eq!(condition.reason, reason::IN_PROGRESS);

    // still not provisioned: the plugin keeps allocating
    reconciler.reconcile_node_allocation_request(&request).await.unwrap();
    assert_eq!(plugin.calls(), vec!["allocate", "allocate"]);
}

#[tokio::test]
async fn test_configuration_in_progress_keeps_allocating() {
    let configuring = RequestStatus::provisioned(vec!["cluster1-bmh-1".to_string()]).with_configured(Some(
        Condition::new(
            hardware_condition::CONFIGURED,
            ConditionStatus::False,
            reason::IN_PROGRESS,
            "Configuration in progress for nodes: cluster1-bmh-1",
        ),
    ));
    let (plugin, requests, reconciler) = setup(Answer::Status(configuring));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));

    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();
    assert_eq!(action, Action::requeue(TEST_REQUEUE));

    let applied = RequestStatus::provisioned(vec!["cluster1-bmh-1".to_string()]).with_configured(Some(
        Condition::new(
            hardware_condition::CONFIGURED,
            ConditionStatus::True,
            reason::CONFIG_APPLIED,
            "Configuration has been applied to all nodes",
        ),
    ));
    plugin.set_answer(Answer::Status(applied));
    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(plugin.calls(), vec!["allocate", "allocate"]);
    let request = stored(&requests, "cluster1");
    assert!(request.condition(hardware_condition::CONFIGURED).unwrap().is_true());
}

#[tokio::test]
async fn test_validation_error_marks_failed() {
    let (plugin, requests, reconciler) = setup(Answer::Invalid("node group controller has no role".to_string()));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));

    let action = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());

    let request = stored(&requests, "cluster1");
    let condition = request.condition(hardware_condition::PROVISIONED).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, reason::FAILED);
    assert!(condition.message.contains("node group controller has no role"));
    assert!(is_failed_for_generation(&request));

    // failure is final for this generation
    reconciler.reconcile_node_allocation_request(&request).await.unwrap();
    assert_eq!(plugin.calls(), vec!["allocate"]);
}

#[tokio::test]
async fn test_transient_error_propagates_without_status() {
    let (_plugin, requests, reconciler) = setup(Answer::Unavailable);
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));

    let err = reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Plugin(_)));
    assert!(stored(&requests, "cluster1").status.is_none());
    assert_eq!(reconciler.requeue_after_error("hwmgr/cluster1").as_secs(), 60);
}

#[tokio::test]
async fn test_deletion_releases_hardware_and_finalizer() {
    let (plugin, requests, reconciler) = setup(provisioned(&["cluster1-bmh-1"]));
    requests.insert(create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1));
    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    requests.delete(NS, "cluster1").await.unwrap();
    let request = stored(&requests, "cluster1");
    assert!(request.metadata.deletion_timestamp.is_some());

    let action = reconciler.reconcile_node_allocation_request(&request).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(plugin.calls(), vec!["allocate", "deallocate"]);
    assert!(requests.get_object(NS, "cluster1").is_none());
}

#[test]
fn test_needs_allocation() {
    let mut request = create_test_node_allocation_request("cluster1", NS, METAL3_PLUGIN_ID, 1);
    assert!(needs_allocation(&request));

    request.status = Some(NodeAllocationRequestStatus {
        conditions: vec![Condition::new(
            hardware_condition::PROVISIONED,
            ConditionStatus::True,
            reason::COMPLETED,
            "Created",
        )],
        observed_generation: Some(1),
        ..Default::default()
    });
    assert!(!needs_allocation(&request));

    request.metadata.generation = Some(2);
    assert!(needs_allocation(&request));
}

#[tokio::test]
async fn test_loopback_round_trip() {
    const INVENTORY: &str = r#"
hosts:
  - {id: server-1, siteId: site1, resourcePoolId: pool1}
  - {id: server-2, siteId: site1, resourcePoolId: pool1}
"#;
    let nodes = MockStore::<AllocatedNode>::new();
    let plugin: Arc<dyn HardwarePlugin> = Arc::new(LoopbackPlugin::new(
        Inventory::from_yaml(INVENTORY).unwrap(),
        Arc::new(nodes.clone()),
        NS,
        RetryContext::new(RetryConfig::immediate(3), CancellationToken::new()),
    ));
    let requests = MockStore::new();
    let reconciler = create_test_reconciler(plugin, &requests);
    requests.insert(create_test_node_allocation_request("cluster1", NS, LOOPBACK_PLUGIN_ID, 2));

    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    let request = stored(&requests, "cluster1");
    assert!(request.is_provisioned());
    assert_eq!(
        request.status.as_ref().unwrap().node_names,
        vec!["cluster1-server-1", "cluster1-server-2"]
    );
    assert_eq!(nodes.len(), 2);

    requests.delete(NS, "cluster1").await.unwrap();
    reconciler
        .reconcile_node_allocation_request(&stored(&requests, "cluster1"))
        .await
        .unwrap();

    assert!(nodes.is_empty());
    assert!(requests.is_empty());
}
