use asset_alloc_lambda::adapters::catalog::GlueCatalogClient;
use asset_alloc_lambda::adapters::notifier::{RuntimePublisher, SnsAlertPublisher};
use asset_alloc_lambda::adapters::object_store::S3ObjectStore;
use asset_alloc_lambda::adapters::workflow::StepFunctionsStarter;
use asset_alloc_lambda::config::PipelineConfig;
use asset_alloc_lambda::handlers::clear_files::handle_clear_files;
use asset_alloc_lambda::handlers::infra_check::handle_infra_check;
use asset_alloc_lambda::handlers::pipeline::run_in_process;
use asset_alloc_lambda::handlers::transform::handle_transform;
use asset_alloc_lambda::handlers::trigger::{
    handle_upload_notification, is_pipeline_upload, is_s3_notification, parse_upload_events,
};
use asset_alloc_lambda::handlers::validation::handle_validation;
use asset_alloc_lambda::runtime::contract::{ContractError, Stage, StageInput};
use asset_alloc_lambda::runtime::error::StageError;
use asset_alloc_lambda::telemetry::init_tracing;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tracing::info;

#[derive(Clone)]
struct RuntimeDependencies {
    config: PipelineConfig,
    store: S3ObjectStore,
    catalog: GlueCatalogClient,
    publisher: RuntimePublisher,
    starter: Option<StepFunctionsStarter>,
}

#[derive(Debug)]
enum Route {
    Uploads,
    ClearFiles(StageInput),
    Stage(StageInput),
}

fn route(payload: &Value) -> Result<Route, ContractError> {
    if is_s3_notification(payload) {
        return Ok(Route::Uploads);
    }
    let input = StageInput::from_workflow_input(payload.clone())?;
    if input.error.is_some() {
        Ok(Route::ClearFiles(input))
    } else {
        Ok(Route::Stage(input))
    }
}

fn stage_failure(error: StageError) -> Error {
    Error::from(format!("{}: {error}", error.code()))
}

fn to_payload(value: impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value)
        .map_err(|error| Error::from(format!("failed to serialize response: {error}")))
}

fn handle_uploads(payload: &Value, deps: &RuntimeDependencies) -> Result<Value, Error> {
    if let Some(starter) = &deps.starter {
        let response = handle_upload_notification(payload, &deps.config.staging_prefix, starter)
            .map_err(|error| Error::from(error.to_string()))?;
        return to_payload(response);
    }

    let mut runs = Vec::new();
    for upload in parse_upload_events(payload).map_err(|error| stage_failure(error.into()))? {
        if !is_pipeline_upload(&upload, &deps.config.staging_prefix) {
            continue;
        }
        let run = run_in_process(
            &upload,
            &deps.config,
            &deps.store,
            &deps.catalog,
            &deps.publisher,
        );
        info!(key = %upload.key, state = ?run.state, "in-process run finished");
        runs.push(json!({
            "key": upload.key,
            "state": run.state,
            "error": run.error.as_ref().map(StageError::to_workflow_error),
        }));
    }
    Ok(json!({ "runs": runs }))
}

fn handle_request(payload: Value, deps: &RuntimeDependencies) -> Result<Value, Error> {
    match route(&payload).map_err(|error| stage_failure(error.into()))? {
        Route::Uploads => handle_uploads(&payload, deps),
        Route::ClearFiles(input) => {
            let response =
                handle_clear_files(input, &deps.config, &deps.store).map_err(stage_failure)?;
            to_payload(response)
        }
        Route::Stage(StageInput { message, .. }) => {
            let next = match message.stage {
                Stage::Validation => handle_validation(message, &deps.store),
                Stage::InfraCheck => {
                    handle_infra_check(message, &deps.config, &deps.catalog, &deps.publisher)
                }
                Stage::Transform => handle_transform(
                    message,
                    &deps.config,
                    &deps.store,
                    &deps.catalog,
                    Utc::now(),
                ),
                Stage::MetadataUpdate => Ok(message),
            }
            .map_err(stage_failure)?;
            to_payload(next)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = PipelineConfig::from_env()?;
    info!(
        bucket = %config.bucket,
        region = config.region.as_deref().unwrap_or("default"),
        workflow = config.state_machine_arn.is_some(),
        alerts = config.sns_topic_arn.is_some(),
        "pipeline runtime configured"
    );
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let publisher = match config.sns_topic_arn.as_deref() {
        Some(topic_arn) => RuntimePublisher::Sns(SnsAlertPublisher::new(
            topic_arn,
            aws_sdk_sns::Client::new(&aws_config),
        )),
        None => RuntimePublisher::LogOnly,
    };
    let starter = config.state_machine_arn.as_deref().map(|state_machine_arn| {
        StepFunctionsStarter::new(state_machine_arn, aws_sdk_sfn::Client::new(&aws_config))
    });
    let deps = RuntimeDependencies {
        store: S3ObjectStore::new(config.bucket.clone(), aws_sdk_s3::Client::new(&aws_config)),
        catalog: GlueCatalogClient::new(aws_sdk_glue::Client::new(&aws_config)),
        publisher,
        starter,
        config,
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = deps.clone();
        async move { handle_request(event.payload, &deps) }
    }))
    .await
}
