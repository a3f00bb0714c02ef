//! Unit tests for hardware status tracking

use super::*;
use crate::reconciler::node_allocation::build_node_allocation_request;
use crate::test_utils::*;
use chrono::Duration as ChronoDuration;
use crds::{set_condition, Condition, NodeAllocationRequestRef, ProvisioningRequestStatus};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(90 * 60);

fn task_started_at(provisioning: DateTime<Utc>, configuring: Option<DateTime<Utc>>) -> ProvisioningTask {
    let mut request = create_test_provisioning_request("pr1");
    request.status = Some(ProvisioningRequestStatus {
        extensions: crds::Extensions {
            node_allocation_request_ref: Some(NodeAllocationRequestRef {
                node_allocation_request_id: "cluster1".to_string(),
                namespace: PLUGIN_NS.to_string(),
                hardware_provisioning_check_start: Some(provisioning),
                hardware_configuring_check_start: configuring,
            }),
            ..Default::default()
        },
        ..Default::default()
    });
    ProvisioningTask::new(request, TIMEOUT)
}

fn nar_with(conditions: &[(&str, ConditionStatus, &str)]) -> NodeAllocationRequest {
    let mut nar = build_node_allocation_request(
        &create_test_provisioning_request("pr1"),
        &create_test_cluster_instance("cluster1", &[("master", "master-0")]),
        &create_test_hardware_template("hwtmpl"),
        PLUGIN_NS,
    )
    .unwrap();
    let status = nar.status.get_or_insert_with(Default::default);
    for (type_, condition_status, cause) in conditions {
        status
            .conditions
            .push(Condition::new(type_, *condition_status, cause, "reported by plugin"));
    }
    nar
}

fn mirrored(task: &ProvisioningTask, kind: HardwareCondition) -> Condition {
    task.condition(kind.request_condition()).cloned().unwrap()
}

fn configuring_clock(task: &ProvisioningTask) -> Option<DateTime<Utc>> {
    task.node_allocation_request_ref()
        .and_then(|r| r.hardware_configuring_check_start)
}

#[test]
fn test_absent_provisioned_waits() {
    let now = Utc::now();
    let mut task = task_started_at(now, None);

    let result = evaluate_condition(&mut task, &nar_with(&[]), HardwareCondition::Provisioned, now).unwrap();

    assert_eq!(result, (false, false));
    let condition = mirrored(&task, HardwareCondition::Provisioned);
    assert_eq!(condition.status, ConditionStatus::Unknown);
    assert_eq!(condition.reason, reason::UNKNOWN);
    assert_eq!(condition.message, "Waiting for NodeAllocationRequest (cluster1) to be processed");
    assert_eq!(task.phase(), ProvisioningPhase::InProgress);
}

#[test]
fn test_configured_never_requested_is_not_an_opinion() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::hours(5), None);
    let before = task.request.status.clone();

    let err = evaluate_condition(&mut task, &nar_with(&[]), HardwareCondition::Configured, now).unwrap_err();

    assert!(matches!(err, ControllerError::ConditionDoesNotExist(_)));
    assert_eq!(task.request.status, before);
}

#[test]
fn test_configured_absent_after_change_requested_waits() {
    let now = Utc::now();
    let mut task = task_started_at(now, Some(now));

    let result = evaluate_condition(&mut task, &nar_with(&[]), HardwareCondition::Configured, now).unwrap();

    assert_eq!(result, (false, false));
    assert_eq!(mirrored(&task, HardwareCondition::Configured).status, ConditionStatus::Unknown);
}

#[test]
fn test_in_progress_message_is_normalized() {
    let now = Utc::now();
    let mut task = task_started_at(now, None);
    let nar = nar_with(&[(hardware_condition::PROVISIONED, ConditionStatus::False, reason::IN_PROGRESS)]);

    let result = evaluate_condition(&mut task, &nar, HardwareCondition::Provisioned, now).unwrap();

    assert_eq!(result, (false, false));
    let condition = mirrored(&task, HardwareCondition::Provisioned);
    assert_eq!(condition.reason, reason::IN_PROGRESS);
    assert_eq!(condition.message, "Hardware provisioning is in progress");
    assert_eq!(task.phase(), ProvisioningPhase::InProgress);
}

#[test]
fn test_failed_is_terminal_and_not_timed_out() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::hours(3), None);
    let nar = nar_with(&[(hardware_condition::PROVISIONED, ConditionStatus::False, reason::FAILED)]);

    let result = evaluate_condition(&mut task, &nar, HardwareCondition::Provisioned, now).unwrap();

    assert_eq!(result, (false, true));
    let condition = mirrored(&task, HardwareCondition::Provisioned);
    assert_eq!(condition.reason, reason::FAILED);
    assert_eq!(condition.message, "Hardware provisioning failed");
    assert_eq!(task.phase(), ProvisioningPhase::Failed);
}

#[test]
fn test_times_out_one_second_after_threshold() {
    let now = Utc::now();
    let window = ChronoDuration::from_std(TIMEOUT).unwrap();
    let nar = nar_with(&[(hardware_condition::PROVISIONED, ConditionStatus::False, reason::IN_PROGRESS)]);

    let mut at_threshold = task_started_at(now - window, None);
    let result = evaluate_condition(&mut at_threshold, &nar, HardwareCondition::Provisioned, now).unwrap();
    assert_eq!(result, (false, false));

    let mut past_threshold = task_started_at(now - window - ChronoDuration::seconds(1), None);
    let result = evaluate_condition(&mut past_threshold, &nar, HardwareCondition::Provisioned, now).unwrap();
    assert_eq!(result, (false, true));
    let condition = mirrored(&past_threshold, HardwareCondition::Provisioned);
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason, reason::TIMED_OUT);
    assert_eq!(condition.message, "Hardware provisioning timed out");
    assert_eq!(past_threshold.phase(), ProvisioningPhase::Failed);
}

#[test]
fn test_unknown_condition_can_time_out() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::hours(2), None);

    let result = evaluate_condition(&mut task, &nar_with(&[]), HardwareCondition::Provisioned, now).unwrap();

    assert_eq!(result, (false, true));
    let condition = mirrored(&task, HardwareCondition::Provisioned);
    assert_eq!(condition.status, ConditionStatus::Unknown);
    assert_eq!(condition.reason, reason::TIMED_OUT);
}

#[test]
fn test_timeout_measured_from_later_clock() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::hours(10), Some(now - ChronoDuration::minutes(5)));
    let nar = nar_with(&[
        (hardware_condition::PROVISIONED, ConditionStatus::True, reason::COMPLETED),
        (hardware_condition::CONFIGURED, ConditionStatus::False, reason::IN_PROGRESS),
    ]);

    let result = evaluate_condition(&mut task, &nar, HardwareCondition::Configured, now).unwrap();

    assert_eq!(result, (false, false));
    assert_eq!(
        mirrored(&task, HardwareCondition::Configured).message,
        "Hardware configuring is in progress"
    );
}

#[test]
fn test_configuring_clock_starts_and_clears() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::minutes(30), None);
    let mut nar = nar_with(&[
        (hardware_condition::PROVISIONED, ConditionStatus::True, reason::COMPLETED),
        (hardware_condition::CONFIGURED, ConditionStatus::False, reason::IN_PROGRESS),
    ]);

    evaluate_condition(&mut task, &nar, HardwareCondition::Configured, now).unwrap();
    assert_eq!(configuring_clock(&task), Some(now));

    // polling again does not move the clock
    let later = now + ChronoDuration::minutes(1);
    evaluate_condition(&mut task, &nar, HardwareCondition::Configured, later).unwrap();
    assert_eq!(configuring_clock(&task), Some(now));

    set_condition(
        &mut nar.status.as_mut().unwrap().conditions,
        hardware_condition::CONFIGURED,
        ConditionStatus::True,
        reason::CONFIG_APPLIED,
        "Configuration has been applied",
    );
    let result = evaluate_condition(&mut task, &nar, HardwareCondition::Configured, later).unwrap();
    assert_eq!(result, (true, false));
    assert_eq!(configuring_clock(&task), None);
}

#[test]
fn test_succeeded_copies_plugin_condition() {
    let now = Utc::now();
    let mut task = task_started_at(now - ChronoDuration::hours(4), None);
    let nar = nar_with(&[(hardware_condition::PROVISIONED, ConditionStatus::True, reason::COMPLETED)]);

    let result = evaluate_condition(&mut task, &nar, HardwareCondition::Provisioned, now).unwrap();

    assert_eq!(result, (true, false));
    let condition = mirrored(&task, HardwareCondition::Provisioned);
    assert_eq!(condition.reason, reason::COMPLETED);
    assert_eq!(condition.message, "reported by plugin");
}

#[tokio::test]
async fn test_missing_reference_is_an_error() {
    let env = TestEnv::with_cluster(&[("master", "master-0")]);
    let reconciler = env.reconciler();
    let mut task = env.task("pr1");

    let err = reconciler.wait_for_hardware_data(&mut task).await.unwrap_err();

    assert!(matches!(err, ControllerError::MissingReference(_)));
}

#[tokio::test]
async fn test_missing_node_allocation_request_surfaces_after_retries() {
    let env = TestEnv::with_cluster(&[("master", "master-0")]);
    let reconciler = env.reconciler();
    let mut task = task_started_at(Utc::now(), None);

    let err = reconciler.wait_for_hardware_data(&mut task).await.unwrap_err();

    assert!(matches!(err, ControllerError::Store(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_not_provisioned_skips_configured_check() {
    let env = TestEnv::with_cluster(&[("master", "master-0")]);
    env.node_allocation_requests.insert(nar_with(&[(
        hardware_condition::PROVISIONED,
        ConditionStatus::False,
        reason::IN_PROGRESS,
    )]));
    let reconciler = env.reconciler();
    let mut task = task_started_at(Utc::now(), None);

    let data = reconciler.wait_for_hardware_data(&mut task).await.unwrap();

    assert_eq!(
        data,
        HardwareData {
            provisioned: false,
            configured: None,
            timed_out_or_failed: false
        }
    );
    let stored = env.request("pr1");
    assert!(stored.condition(provisioning_condition::HARDWARE_PROVISIONED).is_some());
    assert!(stored.condition(provisioning_condition::HARDWARE_CONFIGURED).is_none());
}

#[tokio::test]
async fn test_check_configured_never_requested_is_none() {
    let env = TestEnv::with_cluster(&[("master", "master-0")]);
    env.node_allocation_requests.insert(nar_with(&[(
        hardware_condition::PROVISIONED,
        ConditionStatus::True,
        reason::COMPLETED,
    )]));
    let reconciler = env.reconciler();
    let mut task = task_started_at(Utc::now(), None);
    env.provisioning_requests.reset_writes();

    let outcome = reconciler.check_configured(&mut task).await.unwrap();

    assert_eq!(
        outcome,
        ConfigurationOutcome {
            configured: None,
            timed_out_or_failed: false
        }
    );
    assert_eq!(env.provisioning_requests.writes(), 0);
}
