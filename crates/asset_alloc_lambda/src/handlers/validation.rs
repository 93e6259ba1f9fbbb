use asset_alloc_core::contract::PipelineMessage;
use asset_alloc_core::error::StageError;
use asset_alloc_core::object_store::ObjectStore;
use asset_alloc_core::validation::validate_upload;
use tracing::info;

use crate::telemetry::run_stage;

/// Reads the staged file and checks it. Side-effect free: a failing file is
/// left in place for the failure path to quarantine.
pub fn handle_validation(
    message: PipelineMessage,
    store: &impl ObjectStore,
) -> Result<PipelineMessage, StageError> {
    run_stage("validation", &message, || {
        let bytes = store.get_object(&message.object_key())?;
        let (next, totals) = validate_upload(message.clone(), &bytes)?;
        info!(?totals, "file passed validation");
        Ok(next)
    })
}

#[cfg(test)]
mod tests {
    use asset_alloc_core::contract::Stage;
    use asset_alloc_core::object_store::StoreError;
    use asset_alloc_core::test_helpers::MemoryObjectStore;
    use asset_alloc_core::validation::ValidationReason;

    use super::*;

    const VALID: &str = "pfg_ast_clss_nm,pfg_sblvl_1_nm,pfg_sblvl_1_5_nm,pfg_sblvl_2_nm,pfg_sblvl_3_nm,pfg_sblvl_4_nm,wal_nm,LEVEL,amount_type,amount\n\
Equity,US,Large,Growth,Tech,Software,1,2,invest_pct,10\n\
Equity,US,Large,Growth,Tech,Software,1,2,taa_pct,10\n\
Equity,US,Large,Growth,Tech,Software,1,2,saa_pct,10\n";

    fn message() -> PipelineMessage {
        PipelineMessage {
            file_name: "TAA_010124.csv".to_string(),
            folder_name: "inbound".to_string(),
            file_version: None,
            etag: "abc".to_string(),
            stage: Stage::Validation,
        }
    }

    #[test]
    fn valid_file_moves_to_infra_check() {
        let store = MemoryObjectStore::default();
        store.insert("inbound/TAA_010124.csv", VALID.as_bytes());

        let next = handle_validation(message(), &store).expect("valid");

        assert_eq!(next.stage, Stage::InfraCheck);
        assert!(store.object("inbound/TAA_010124.csv").is_some());
    }

    #[test]
    fn purity_failure_surfaces_as_validation_error() {
        let store = MemoryObjectStore::default();
        store.insert(
            "inbound/TAA_010124.csv",
            VALID.replace("saa_pct,10", "saa_pct,9.5").as_bytes(),
        );

        let error = handle_validation(message(), &store).expect_err("impure");

        assert_eq!(error.code(), "ValidationError");
        match error {
            StageError::Validation(failure) => {
                assert_eq!(failure.reason, ValidationReason::PurityFailure)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_object_is_store_error() {
        let error = handle_validation(message(), &MemoryObjectStore::default())
            .expect_err("no object");
        assert_eq!(
            error,
            StageError::Store(StoreError::NotFound("inbound/TAA_010124.csv".to_string()))
        );
    }
}
