use asset_alloc_core::alert::{info_subject, AlertPublisher};
use asset_alloc_core::catalog::{
    ensure_table, reserve_partition, GlueCatalog, PartitionOwner, TableProvision,
};
use asset_alloc_core::contract::{PipelineMessage, Stage};
use asset_alloc_core::error::StageError;
use asset_alloc_core::file_date::FileDate;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::telemetry::run_stage;

/// Makes sure both catalog tables exist, then reserves the load version by
/// registering its partition for this upload. A version already on the
/// message is re-claimed, so a re-run of this stage does not bump it.
/// Concurrent uploads for the same date each end up with their own version.
pub fn handle_infra_check(
    message: PipelineMessage,
    config: &PipelineConfig,
    catalog: &impl GlueCatalog,
    publisher: &impl AlertPublisher,
) -> Result<PipelineMessage, StageError> {
    run_stage("infra check", &message, || {
        message.expect_stage(Stage::InfraCheck)?;
        let file_date = FileDate::from_file_name(&message.file_name)?;
        let data_table = config.asset_alloc_table();

        for descriptor in [&data_table, &config.metadata_table()] {
            let provision = ensure_table(catalog, descriptor)?;
            info!(table = %descriptor.table_name, ?provision, "table ensured");
            if provision == TableProvision::AlreadyExisted {
                let body = format!(
                    "table {}.{} already exists; continuing with existing definition",
                    descriptor.database, descriptor.table_name
                );
                if let Err(error) = publisher.publish(&info_subject(&config.source_id_short), &body)
                {
                    warn!(%error, "info alert not delivered");
                }
            }
        }

        let owner = PartitionOwner::new(message.object_key(), &message.etag);
        let key = reserve_partition(
            catalog,
            &data_table,
            file_date,
            message.file_version,
            &owner,
        )?;
        let version = key.version_number;
        info!(version, file_date = %file_date.iso(), "load version assigned");

        Ok(message
            .clone()
            .advance(Stage::Transform)?
            .with_file_version(version))
    })
}
