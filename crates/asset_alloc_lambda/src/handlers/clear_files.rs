use asset_alloc_core::contract::{StageInput, WorkflowError};
use asset_alloc_core::error::StageError;
use asset_alloc_core::object_store::ObjectStore;
use asset_alloc_core::quarantine::quarantine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::telemetry::run_stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearFilesResponse {
    pub file_name: String,
    pub moved: Vec<String>,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowError>,
}

/// Failure-path step: moves everything under the staging prefix into the
/// quarantine prefix. The caught error is echoed back for the final `Fail`.
pub fn handle_clear_files(
    input: StageInput,
    config: &PipelineConfig,
    store: &impl ObjectStore,
) -> Result<ClearFilesResponse, StageError> {
    let StageInput { message, error } = input;
    if let Some(caught) = &error {
        warn!(
            file_name = %message.file_name,
            error = %caught.error,
            cause = %caught.cause,
            "clearing staged files after failure"
        );
    }

    run_stage("clear files", &message, || {
        let report = quarantine(store, &config.staging_prefix, &config.quarantine_prefix)?;
        Ok(ClearFilesResponse {
            file_name: message.file_name.clone(),
            moved: report.moved,
            error: error.clone(),
        })
    })
}
