use asset_alloc_core::alert::AlertPublisher;
use asset_alloc_core::catalog::GlueCatalog;
use asset_alloc_core::contract::{PipelineMessage, UploadEvent};
use asset_alloc_core::error::StageError;
use asset_alloc_core::object_store::ObjectStore;
use asset_alloc_core::orchestrator::{Orchestrator, PipelineRun, PipelineStages};
use asset_alloc_core::quarantine::{quarantine, QuarantineReport, RecoveryError};
use chrono::Utc;

use super::infra_check::handle_infra_check;
use super::transform::handle_transform;
use super::validation::handle_validation;
use crate::config::PipelineConfig;

/// The stage handlers bound to one set of collaborators, for running a
/// whole pipeline inside a single process.
pub struct LambdaStages<'a, S, C, P> {
    pub config: &'a PipelineConfig,
    pub store: &'a S,
    pub catalog: &'a C,
    pub publisher: &'a P,
}

impl<S, C, P> PipelineStages for LambdaStages<'_, S, C, P>
where
    S: ObjectStore,
    C: GlueCatalog,
    P: AlertPublisher,
{
    fn validate(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
        handle_validation(message, self.store)
    }

    fn infra_check(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
        handle_infra_check(message, self.config, self.catalog, self.publisher)
    }

    fn convert(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
        handle_transform(message, self.config, self.store, self.catalog, Utc::now())
    }

    fn recover(&self, _message: &PipelineMessage) -> Result<QuarantineReport, RecoveryError> {
        quarantine(
            self.store,
            &self.config.staging_prefix,
            &self.config.quarantine_prefix,
        )
    }
}

/// Runs one upload end to end without a workflow engine.
pub fn run_in_process<S, C, P>(
    upload: &UploadEvent,
    config: &PipelineConfig,
    store: &S,
    catalog: &C,
    publisher: &P,
) -> PipelineRun
where
    S: ObjectStore,
    C: GlueCatalog,
    P: AlertPublisher,
{
    let stages = LambdaStages {
        config,
        store,
        catalog,
        publisher,
    };
    Orchestrator::new(stages, publisher, config.source_id_short.clone())
        .run(PipelineMessage::from_upload(upload))
}
