mod support;

use asset_alloc_core::contract::{PipelineMessage, Stage, StageInput};
use asset_alloc_core::error::StageError;
use asset_alloc_lambda::handlers::clear_files::handle_clear_files;
use asset_alloc_lambda::handlers::infra_check::handle_infra_check;
use asset_alloc_lambda::handlers::transform::handle_transform;
use asset_alloc_lambda::handlers::validation::handle_validation;
use chrono::Utc;
use serde_json::{json, Value};
use support::fixtures::{balanced_csv, test_config, TestEnvironment};

/// Task input the workflow builds after a task: the execution input with
/// the task result stored under `output.Payload`.
fn after_task(execution_input: &Value, result: &PipelineMessage) -> StageInput {
    let mut input = execution_input.clone();
    input["output"] = json!({ "Payload": result, "StatusCode": 200 });
    StageInput::from_workflow_input(input).expect("task input")
}

#[test]
fn messages_survive_every_workflow_handoff() {
    let config = test_config();
    let (env, upload) = TestEnvironment::with_upload("TAA_010124.csv", &balanced_csv());
    let execution_input = serde_json::to_value(PipelineMessage::from_upload(&upload))
        .expect("execution input");

    let first = StageInput::from_workflow_input(execution_input.clone()).expect("first input");
    let validated = handle_validation(first.message, &env.store).expect("validation");

    let second = after_task(&execution_input, &validated);
    assert_eq!(second.message.stage, Stage::InfraCheck);
    let checked = handle_infra_check(second.message, &config, &env.catalog, &env.publisher)
        .expect("infra check");

    let third = after_task(&execution_input, &checked);
    assert_eq!(third.message.file_version, Some(1));
    let converted = handle_transform(third.message, &config, &env.store, &env.catalog, Utc::now())
        .expect("transform");

    assert_eq!(
        serde_json::to_value(&converted).expect("serialize")["stage"],
        "metadata update"
    );
}

#[test]
fn out_of_order_task_is_rejected() {
    let config = test_config();
    let (env, upload) = TestEnvironment::with_upload("TAA_010124.csv", &balanced_csv());
    let message = PipelineMessage::from_upload(&upload);

    let error = handle_transform(message, &config, &env.store, &env.catalog, Utc::now())
        .expect_err("transform before validation");

    assert_eq!(error.code(), "ContractError");
    assert!(matches!(error, StageError::Contract(_)));
}

#[test]
fn caught_failure_clears_staging_prefix() {
    let config = test_config();
    let env = TestEnvironment::default();
    let upload = env.stage("TAA_010124.csv", "not,a,valid\nfile,,\n");
    env.stage("TAA_010224.csv", &balanced_csv());
    let mut input = serde_json::to_value(PipelineMessage::from_upload(&upload)).expect("input");
    input["Error"] = json!({"Error": "ValidationError", "Cause": "schema_mismatch: LEVEL"});

    let response = handle_clear_files(
        StageInput::from_workflow_input(input).expect("caught input"),
        &config,
        &env.store,
    )
    .expect("clear files");

    assert_eq!(response.moved.len(), 2);
    assert!(env
        .store
        .keys()
        .iter()
        .all(|key| key.starts_with("asset_allocation_data/error/")));
}
