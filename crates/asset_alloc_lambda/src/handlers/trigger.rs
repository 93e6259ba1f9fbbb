use asset_alloc_core::contract::{execution_fingerprint, ContractError, PipelineMessage, UploadEvent};
use asset_alloc_core::storage_keys::folder_prefix;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::workflow::{ExecutionStart, WorkflowStartError, WorkflowStarter};
use crate::config::UPLOAD_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Start(#[from] WorkflowStartError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerResponse {
    pub started: Vec<String>,
    pub duplicates: Vec<String>,
    pub skipped: Vec<String>,
}

pub fn is_s3_notification(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:s3")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

/// Reads `ObjectCreated` records into upload events. Keys arrive
/// form-encoded and are decoded here.
pub fn parse_upload_events(event: &Value) -> Result<Vec<UploadEvent>, ContractError> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .filter(|records| !records.is_empty())
        .ok_or(ContractError::NoEvent)?;

    let mut uploads = Vec::with_capacity(records.len());
    for record in records {
        let text = |pointer: &str| {
            record
                .pointer(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| ContractError::Malformed(format!("s3 record {pointer}")))
        };

        let insertion_time = match record.get("eventTime").and_then(Value::as_str) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|error| ContractError::Malformed(format!("eventTime '{raw}': {error}")))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        uploads.push(UploadEvent {
            bucket: text("/s3/bucket/name")?.to_string(),
            key: decode_object_key(text("/s3/object/key")?)?,
            etag: record
                .pointer("/s3/object/eTag")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            insertion_time,
        });
    }
    Ok(uploads)
}

/// S3 notifications form-encode object keys: `+` is a space.
fn decode_object_key(raw: &str) -> Result<String, ContractError> {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| ContractError::Malformed(format!("object key '{raw}'")))
}

/// True for CSV objects directly or transitively under the staging prefix.
pub fn is_pipeline_upload(upload: &UploadEvent, staging_prefix: &str) -> bool {
    !upload.is_directory_marker()
        && upload.key.starts_with(&folder_prefix(staging_prefix))
        && upload.key.to_ascii_lowercase().ends_with(UPLOAD_SUFFIX)
}

/// Starts one workflow execution per matching upload. Execution names are
/// upload fingerprints, so a replayed notification lands on the existing
/// execution and is reported as a duplicate.
pub fn handle_upload_notification(
    event: &Value,
    staging_prefix: &str,
    starter: &impl WorkflowStarter,
) -> Result<TriggerResponse, TriggerError> {
    let mut response = TriggerResponse::default();

    for upload in parse_upload_events(event)? {
        if !is_pipeline_upload(&upload, staging_prefix) {
            info!(key = %upload.key, "upload outside pipeline filter, skipping");
            response.skipped.push(upload.key);
            continue;
        }

        let name = execution_fingerprint(&upload);
        let message = PipelineMessage::from_upload(&upload);
        let input = serde_json::to_string(&message)
            .map_err(|error| ContractError::Malformed(format!("workflow input: {error}")))?;

        match starter.start_execution(&name, &input)? {
            ExecutionStart::Started { execution_arn } => {
                info!(key = %upload.key, %execution_arn, "workflow execution started");
                response.started.push(upload.key);
            }
            ExecutionStart::AlreadyStarted => {
                warn!(key = %upload.key, execution = %name, "duplicate notification");
                response.duplicates.push(upload.key);
            }
        }
    }

    Ok(response)
}
