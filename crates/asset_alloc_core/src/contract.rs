use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Object-created notification reduced to the fields the pipeline keys on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadEvent {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub insertion_time: DateTime<Utc>,
}

impl UploadEvent {
    /// Splits the object key into `(folder_name, file_name)`.
    pub fn folder_and_file(&self) -> (String, String) {
        match self.key.rsplit_once('/') {
            Some((folder, file)) => (folder.to_string(), file.to_string()),
            None => (String::new(), self.key.clone()),
        }
    }

    pub fn is_directory_marker(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// Stage label carried on the wire. Each label names the work the message is
/// due for next, so the order of variants is the order of the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[serde(rename = "validation")]
    Validation,
    #[serde(rename = "infra check")]
    InfraCheck,
    #[serde(rename = "transform")]
    Transform,
    #[serde(rename = "metadata update")]
    MetadataUpdate,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InfraCheck => "infra check",
            Self::Transform => "transform",
            Self::MetadataUpdate => "metadata update",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineMessage {
    pub file_name: String,
    pub folder_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_version: Option<u32>,
    pub etag: String,
    pub stage: Stage,
}

impl PipelineMessage {
    pub fn from_upload(event: &UploadEvent) -> Self {
        let (folder_name, file_name) = event.folder_and_file();
        Self {
            file_name,
            folder_name,
            file_version: None,
            etag: event.etag.clone(),
            stage: Stage::Validation,
        }
    }

    pub fn object_key(&self) -> String {
        let folder = self.folder_name.trim_matches('/');
        if folder.is_empty() {
            self.file_name.clone()
        } else {
            format!("{folder}/{}", self.file_name)
        }
    }

    /// Moves the message to `next`. Stages only ever move forward.
    pub fn advance(mut self, next: Stage) -> Result<Self, ContractError> {
        if next <= self.stage {
            return Err(ContractError::StageRegression {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(self)
    }

    pub fn expect_stage(&self, expected: Stage) -> Result<(), ContractError> {
        if self.stage != expected {
            return Err(ContractError::UnexpectedStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    pub fn with_file_version(mut self, file_version: u32) -> Self {
        self.file_version = Some(file_version);
        self
    }
}

/// Failure record the workflow attaches under `Error` when a task is caught.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause", default)]
    pub cause: String,
}

/// One stage invocation as seen by a handler: the latest message plus the
/// caught failure, if the workflow routed it to the failure path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInput {
    pub message: PipelineMessage,
    pub error: Option<WorkflowError>,
}

impl StageInput {
    /// Reads a workflow task input. Task results are stored under
    /// `output.Payload`; when present that is the latest message, otherwise
    /// the message is the top-level object.
    pub fn from_workflow_input(input: Value) -> Result<Self, ContractError> {
        let Some(object) = input.as_object() else {
            return Err(ContractError::NoEvent);
        };
        if object.is_empty() {
            return Err(ContractError::NoEvent);
        }

        let error = match object.get("Error") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<WorkflowError>(value.clone())
                    .map_err(|error| ContractError::Malformed(format!("Error field: {error}")))?,
            ),
        };

        let payload = object
            .get("output")
            .and_then(|output| output.get("Payload"))
            .filter(|payload| payload.get("stage").is_some())
            .cloned()
            .unwrap_or_else(|| {
                let mut top_level = object.clone();
                top_level.remove("output");
                top_level.remove("Error");
                Value::Object(top_level)
            });

        let message = serde_json::from_value::<PipelineMessage>(payload)
            .map_err(|error| ContractError::Malformed(format!("pipeline message: {error}")))?;

        Ok(Self { message, error })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("no event found")]
    NoEvent,
    #[error("malformed {0}")]
    Malformed(String),
    #[error("stage cannot move from '{from}' to '{to}'")]
    StageRegression { from: Stage, to: Stage },
    #[error("expected stage '{expected}' but message is at '{actual}'")]
    UnexpectedStage { expected: Stage, actual: Stage },
    #[error("message has no file_version assigned")]
    MissingFileVersion,
}

/// Deterministic name for the workflow execution of one upload. Replays of
/// the same notification map to the same execution.
pub fn execution_fingerprint(event: &UploadEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json((&event.bucket, &event.key, &event.etag)));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).unwrap_or_default()
}
