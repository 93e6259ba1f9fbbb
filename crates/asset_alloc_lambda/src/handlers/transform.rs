use asset_alloc_core::catalog::{upsert_partition, GlueCatalog, PartitionKey, PartitionOwner};
use asset_alloc_core::contract::{ContractError, PipelineMessage, Stage};
use asset_alloc_core::error::{ConversionError, StageError};
use asset_alloc_core::file_date::FileDate;
use asset_alloc_core::object_store::ObjectStore;
use asset_alloc_core::storage_keys::{converted_object_key, load_metadata_object_key};
use asset_alloc_core::table::AllocationTable;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::PipelineConfig;
use crate::converter::{encode_allocation_parquet, encode_load_metadata_parquet, LoadMetadataRecord};
use crate::telemetry::run_stage;

/// Converts the staged CSV into the data table's partition for its file date
/// and version, then records the load.
///
/// The partition is confirmed before any object is written: a version
/// reserved by a different upload fails with a catalog conflict and leaves
/// that upload's data untouched.
pub fn handle_transform(
    message: PipelineMessage,
    config: &PipelineConfig,
    store: &impl ObjectStore,
    catalog: &impl GlueCatalog,
    now: DateTime<Utc>,
) -> Result<PipelineMessage, StageError> {
    run_stage("transform", &message, || {
        message.expect_stage(Stage::Transform)?;
        let version = message
            .file_version
            .ok_or(ContractError::MissingFileVersion)?;
        let key = PartitionKey::new(FileDate::from_file_name(&message.file_name)?, version);

        let source = store.get_object(&message.object_key())?;
        let table = AllocationTable::from_csv_bytes(&source)
            .map_err(|error| ConversionError::Csv(error.to_string()))?;

        let data_table = config.asset_alloc_table();
        let parquet = encode_allocation_parquet(&table, &data_table.storage.columns)?;
        let owner = PartitionOwner::new(message.object_key(), &message.etag);
        let write = upsert_partition(catalog, &data_table, key, &owner)?;

        let converted_key = converted_object_key(
            &config.asset_alloc_table_location,
            &key,
            &message.file_name,
        );
        store.put_object(&converted_key, parquet)?;
        info!(
            object_key = %converted_key,
            rows = table.row_count(),
            partition = ?write,
            "converted file written"
        );

        let record = LoadMetadataRecord::loaded(&message, key, now);
        let metadata_key = load_metadata_object_key(
            &config.metadata_table_location,
            &key,
            &message.file_name,
        );
        store.put_object(&metadata_key, encode_load_metadata_parquet(&record)?)?;
        info!(object_key = %metadata_key, "load metadata written");

        Ok(message.clone().advance(Stage::MetadataUpdate)?)
    })
}

#[cfg(test)]
mod tests {
    use asset_alloc_core::catalog::{ensure_table, CatalogError, PartitionWrite};
    use asset_alloc_core::test_helpers::{MemoryCatalog, MemoryObjectStore};

    use super::*;

    const VALID: &str = "pfg_ast_clss_nm,pfg_sblvl_1_nm,pfg_sblvl_1_5_nm,pfg_sblvl_2_nm,pfg_sblvl_3_nm,pfg_sblvl_4_nm,wal_nm,LEVEL,amount_type,amount\n\
Equity,US,Large,Growth,Tech,Software,1,2,invest_pct,10\n\
Equity,US,Large,Growth,Tech,Software,1,2,taa_pct,10\n\
Equity,US,Large,Growth,Tech,Software,1,2,saa_pct,10\n";

    fn config() -> PipelineConfig {
        PipelineConfig::from_lookup(|name| match name {
            "BUCKET_NAME" => Some("alloc-bucket".to_string()),
            "GLUE_DATABASE" => Some("asset_alloc_db".to_string()),
            _ => None,
        })
        .expect("config")
    }

    fn message() -> PipelineMessage {
        PipelineMessage {
            file_name: "TAA_010124.csv".to_string(),
            folder_name: "asset_allocation_data/inbound".to_string(),
            file_version: Some(1),
            etag: "abc".to_string(),
            stage: Stage::Transform,
        }
    }

    fn provisioned() -> (MemoryObjectStore, MemoryCatalog) {
        let store = MemoryObjectStore::default();
        store.insert("asset_allocation_data/inbound/TAA_010124.csv", VALID.as_bytes());
        let catalog = MemoryCatalog::default();
        ensure_table(&catalog, &config().asset_alloc_table()).expect("data table");
        ensure_table(&catalog, &config().metadata_table()).expect("metadata table");
        (store, catalog)
    }

    #[test]
    fn writes_parquet_partition_and_metadata() {
        let (store, catalog) = provisioned();

        let next = handle_transform(message(), &config(), &store, &catalog, Utc::now())
            .expect("transform");

        assert_eq!(next.stage, Stage::MetadataUpdate);
        let converted = store
            .object("asset_allocation_data/outbound/asset_alloc_table/yyyy=2024/mm=01/dd=01/version_number=1/TAA_2024_01_01.parquet")
            .expect("converted object");
        assert!(converted.starts_with(b"PAR1"));
        assert!(store
            .object("asset_allocation_data/outbound/taa_saa_paa_metadata/TAA_2024_01_01_v1.parquet")
            .is_some());

        let partitions = catalog
            .list_partitions("asset_alloc_db", "asset_alloc_table")
            .expect("partitions");
        assert_eq!(partitions.len(), 1);
        assert_eq!(
            partitions[0].storage.location,
            "s3://alloc-bucket/asset_allocation_data/outbound/asset_alloc_table/yyyy=2024/mm=01/dd=01/version_number=1"
        );
    }

    #[test]
    fn rerun_updates_existing_partition() {
        let (store, catalog) = provisioned();
        handle_transform(message(), &config(), &store, &catalog, Utc::now()).expect("first");

        handle_transform(message(), &config(), &store, &catalog, Utc::now()).expect("second");

        let data_table = config().asset_alloc_table();
        let key = PartitionKey {
            year: 2024,
            month: 1,
            day: 1,
            version_number: 1,
        };
        let owner = PartitionOwner::new("asset_allocation_data/inbound/TAA_010124.csv", "abc");
        assert_eq!(
            upsert_partition(&catalog, &data_table, key, &owner).expect("upsert"),
            PartitionWrite::Updated
        );
        assert_eq!(
            catalog
                .list_partitions("asset_alloc_db", "asset_alloc_table")
                .expect("partitions")
                .len(),
            1
        );
    }

    #[test]
    fn missing_version_is_contract_error() {
        let (store, catalog) = provisioned();
        let mut unversioned = message();
        unversioned.file_version = None;

        let error = handle_transform(unversioned, &config(), &store, &catalog, Utc::now())
            .expect_err("no version");

        assert_eq!(error, StageError::Contract(ContractError::MissingFileVersion));
    }

    #[test]
    fn version_reserved_by_another_upload_is_not_overwritten() {
        let (store, catalog) = provisioned();
        let mut earlier = message();
        earlier.file_name = "TAA_010124_b.csv".to_string();
        store.insert("asset_allocation_data/inbound/TAA_010124_b.csv", VALID.as_bytes());
        handle_transform(earlier, &config(), &store, &catalog, Utc::now()).expect("owner");
        let before = store.keys();

        let error = handle_transform(message(), &config(), &store, &catalog, Utc::now())
            .expect_err("conflict");

        assert!(matches!(error, StageError::Catalog(CatalogError::Conflict(_))));
        assert_eq!(error.code(), "CatalogError");
        assert_eq!(store.keys(), before);
        let partitions = catalog
            .list_partitions("asset_alloc_db", "asset_alloc_table")
            .expect("partitions");
        assert_eq!(
            partitions[0].owner,
            Some(PartitionOwner::new(
                "asset_allocation_data/inbound/TAA_010124_b.csv",
                "abc"
            ))
        );
    }

    #[test]
    fn missing_table_fails_before_any_write() {
        let store = MemoryObjectStore::default();
        store.insert("asset_allocation_data/inbound/TAA_010124.csv", VALID.as_bytes());

        let error = handle_transform(
            message(),
            &config(),
            &store,
            &MemoryCatalog::default(),
            Utc::now(),
        )
        .expect_err("no table");

        assert_eq!(error.code(), "CatalogError");
        assert_eq!(store.keys(), vec!["asset_allocation_data/inbound/TAA_010124.csv"]);
    }
}
