//! Unit tests for ClusterInstance node configuration

use super::*;
use crate::reconciler::node_allocation::build_node_allocation_request;
use crate::test_utils::*;
use crds::ConditionStatus;

const CONTROL_AND_WORKERS: &[(&str, &str)] = &[
    ("master", "master-0.example.com"),
    ("master", "master-1.example.com"),
    ("master", "master-2.example.com"),
    ("worker", "worker-0.example.com"),
    ("worker", "worker-1.example.com"),
];

fn setup(slots: &[(&str, &str)]) -> (TestEnv, NodeAllocationRequest) {
    let env = TestEnv::with_cluster(slots);
    let nar = build_node_allocation_request(
        &env.request("pr1"),
        &env.cluster_instance("cluster1"),
        &create_test_hardware_template("hwtmpl"),
        PLUGIN_NS,
    )
    .unwrap();
    env.node_allocation_requests.insert(nar);
    let nar = env.node_allocation_request("cluster1").unwrap();
    (env, nar)
}

fn slot_doc(role: &str, host: &str) -> NodeDocument {
    NodeDocument::from_value(0, &node_slot(role, host)).unwrap()
}

fn node_info(suffix: u8) -> NodeInfo {
    NodeInfo::from(&create_test_allocated_node(
        &format!("cluster1-bmh{}", suffix),
        "cluster1",
        "controller",
        &format!("bmh{}", suffix),
        suffix,
    ))
}

#[test]
fn test_configure_node_slot() {
    let mut slot = slot_doc("master", "master-0.example.com");

    configure_node_slot(&mut slot, &node_info(1), "master-0.example.com", BOOT_LABEL).unwrap();

    let slot = slot.into_value();
    assert_eq!(slot["bmcAddress"], "redfish+https://10.0.0.1/redfish/v1/Systems/1");
    assert_eq!(slot["bmcCredentialsName"]["name"], "bmh1-bmc-secret");
    assert_eq!(slot["hostRef"], json!({"name": "bmh1", "namespace": "hosts"}));
    assert_eq!(slot["bootMACAddress"], "00:00:00:01:00:01");
    assert_eq!(slot["nodeNetwork"]["interfaces"][0]["macAddress"], "00:00:00:01:00:01");
    assert_eq!(slot["nodeNetwork"]["interfaces"][1]["macAddress"], "00:00:00:02:00:01");
    assert_eq!(slot["hostName"], "master-0.example.com");
}

#[test]
fn test_configure_node_slot_without_backend_reference() {
    let mut info = node_info(1);
    info.hw_mgr_node_ns.clear();
    info.bmc = None;
    let mut slot = slot_doc("master", "master-0.example.com");

    configure_node_slot(&mut slot, &info, "master-0.example.com", BOOT_LABEL).unwrap();

    let slot = slot.into_value();
    assert!(slot.get("hostRef").is_none());
    assert!(slot.get("bmcAddress").is_none());
    assert_eq!(slot["bootMACAddress"], "00:00:00:01:00:01");
}

#[test]
fn test_configure_node_slot_requires_boot_interface() {
    let mut slot = slot_doc("master", "master-0.example.com");

    let err = configure_node_slot(&mut slot, &node_info(1), "master-0.example.com", "pxe-interface").unwrap_err();

    assert!(err.is_input_error());
    assert!(err.to_string().starts_with("failed to get boot MAC for node 'master-0.example.com'"));
}

#[test]
fn test_configure_node_slot_requires_every_labelled_interface() {
    let mut info = node_info(1);
    info.interfaces.retain(|i| i.label == BOOT_LABEL);
    let mut slot = slot_doc("master", "master-0.example.com");

    let err = configure_node_slot(&mut slot, &info, "master-0.example.com", BOOT_LABEL).unwrap_err();

    assert_eq!(err.to_string(), "mac address not found for interface label data-interface");
}

#[test]
fn test_node_info_pool_groups_and_orders() {
    let pool = build_node_info_pool(vec![
        create_test_allocated_node("cluster1-bmh3", "cluster1", "worker", "bmh3", 3),
        create_test_allocated_node("cluster1-bmh2", "cluster1", "controller", "bmh2", 2),
        create_test_allocated_node("cluster1-bmh1", "cluster1", "controller", "bmh1", 1),
    ]);

    let names = |group: &str| -> Vec<String> { pool[group].iter().map(|n| n.node_name.clone()).collect() };
    assert_eq!(names("controller"), vec!["cluster1-bmh1", "cluster1-bmh2"]);
    assert_eq!(names("worker"), vec!["cluster1-bmh3"]);
}

#[tokio::test]
async fn test_partial_match_commits_matched_slots() {
    let (env, nar) = setup(CONTROL_AND_WORKERS);
    for (suffix, group) in [(1, "controller"), (2, "controller"), (3, "controller"), (4, "worker")] {
        env.allocated_nodes.insert(create_test_allocated_node(
            &format!("cluster1-bmh{}", suffix),
            "cluster1",
            group,
            &format!("bmh{}", suffix),
            suffix,
        ));
    }
    let reconciler = env.reconciler();
    let mut task = env.task("pr1");

    let err = reconciler.apply_node_configuration(&mut task, &nar).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to find matches for the following nodes: Index: 4, Host Name: worker-1.example.com"
    );
    let cluster = env.cluster_instance("cluster1");
    let boot_macs: Vec<Option<&str>> = cluster
        .spec
        .nodes
        .iter()
        .map(|n| n.get("bootMACAddress").and_then(Value::as_str))
        .collect();
    assert_eq!(
        boot_macs,
        vec![
            Some("00:00:00:01:00:01"),
            Some("00:00:00:01:00:02"),
            Some("00:00:00:01:00:03"),
            Some("00:00:00:01:00:04"),
            None,
        ]
    );
    assert_eq!(cluster.spec.extra["baseDomain"], "example.com");

    let node = env.allocated_nodes.get_object(PLUGIN_NS, "cluster1-bmh4").unwrap();
    assert_eq!(node.status.unwrap().hostname, "worker-0.example.com");
    let host_map = &task.request.status.as_ref().unwrap().extensions.allocated_node_host_map;
    assert_eq!(host_map.len(), 4);
    assert_eq!(host_map["cluster1-bmh1"], "master-0.example.com");
}

#[tokio::test]
async fn test_hard_error_aborts_before_commit() {
    let (env, nar) = setup(&[("master", "master-0.example.com"), ("master", "master-1.example.com")]);
    env.allocated_nodes
        .insert(create_test_allocated_node("cluster1-bmh1", "cluster1", "controller", "bmh1", 1));
    let mut broken = create_test_allocated_node("cluster1-bmh2", "cluster1", "controller", "bmh2", 2);
    broken.status.as_mut().unwrap().interfaces.clear();
    env.allocated_nodes.insert(broken);
    env.cluster_instances.reset_writes();
    let reconciler = env.reconciler();
    let mut task = env.task("pr1");

    let err = reconciler.apply_node_configuration(&mut task, &nar).await.unwrap_err();

    assert!(err.is_input_error());
    assert_eq!(env.cluster_instances.writes(), 0);
}

#[tokio::test]
async fn test_update_records_condition_once() {
    let (env, nar) = setup(&[("master", "sno.example.com")]);
    env.allocated_nodes
        .insert(create_test_allocated_node("cluster1-bmh1", "cluster1", "controller", "bmh1", 1));
    let reconciler = env.reconciler();
    let mut task = env.task("pr1");

    reconciler.update_cluster_instance(&mut task, &nar).await.unwrap();

    let condition = task
        .condition(provisioning_condition::HARDWARE_NODE_CONFIG_APPLIED)
        .cloned()
        .unwrap();
    assert!(condition.is_true());
    assert_eq!(condition.reason, reason::COMPLETED);

    env.cluster_instances.reset_writes();
    env.allocated_nodes.reset_writes();
    reconciler.update_cluster_instance(&mut task, &nar).await.unwrap();
    assert_eq!(env.cluster_instances.writes(), 0);
    assert_eq!(env.allocated_nodes.writes(), 0);
}

#[tokio::test]
async fn test_update_failure_marks_request_failed() {
    let (env, nar) = setup(&[("master", "sno.example.com")]);
    let reconciler = env.reconciler();
    let mut task = env.task("pr1");

    let err = reconciler.update_cluster_instance(&mut task, &nar).await.unwrap_err();

    assert!(matches!(err, ControllerError::UnmatchedNodes(_)));
    let condition = task
        .condition(provisioning_condition::HARDWARE_NODE_CONFIG_APPLIED)
        .cloned()
        .unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, reason::NOT_APPLIED);
    assert!(condition
        .message
        .starts_with("Failed to apply node configuration to the rendered ClusterInstance: failed to find matches"));
    assert_eq!(task.phase(), ProvisioningPhase::Failed);
}
