#![allow(dead_code)]

use asset_alloc_core::contract::UploadEvent;
use asset_alloc_core::test_helpers::{MemoryCatalog, MemoryObjectStore, RecordingPublisher};
use asset_alloc_lambda::config::PipelineConfig;

pub const STAGING_PREFIX: &str = "asset_allocation_data/inbound";
pub const HEADER: &str = "pfg_ast_clss_nm,pfg_sblvl_1_nm,pfg_sblvl_1_5_nm,pfg_sblvl_2_nm,pfg_sblvl_3_nm,pfg_sblvl_4_nm,wal_nm,LEVEL,amount_type,amount";

/// Collaborators for one in-process pipeline run.
#[derive(Default)]
pub struct TestEnvironment {
    pub store: MemoryObjectStore,
    pub catalog: MemoryCatalog,
    pub publisher: RecordingPublisher,
}

impl TestEnvironment {
    pub fn with_upload(file_name: &str, body: &str) -> (Self, UploadEvent) {
        let environment = Self::default();
        let upload = environment.stage(file_name, body);
        (environment, upload)
    }

    pub fn stage(&self, file_name: &str, body: &str) -> UploadEvent {
        let key = format!("{STAGING_PREFIX}/{file_name}");
        self.store.insert(&key, body.as_bytes());
        upload_event(&key)
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig::from_lookup(|name| match name {
        "BUCKET_NAME" => Some("alloc-bucket".to_string()),
        "GLUE_DATABASE" => Some("asset_alloc_db".to_string()),
        "SOURCE_ID_SHORT" => Some("TAA".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn upload_event(key: &str) -> UploadEvent {
    UploadEvent {
        bucket: "alloc-bucket".to_string(),
        key: key.to_string(),
        etag: "9b2cf535f27731c974343645a3985328".to_string(),
        insertion_time: "2024-01-02T08:00:00Z".parse().expect("timestamp"),
    }
}

pub fn allocation_csv(rows: &[(&str, &str)]) -> String {
    let mut body = HEADER.to_string();
    for (category, amount) in rows {
        body.push_str(&format!(
            "\nEquity,US,Large,Growth,Tech,Software,1,2,{category},{amount}"
        ));
    }
    body.push('\n');
    body
}

pub fn balanced_csv() -> String {
    allocation_csv(&[
        ("invest_pct", "6.5"),
        ("invest_pct", "3.5"),
        ("taa_pct", "10"),
        ("saa_pct", "2.5"),
        ("saa_pct", "7.5"),
    ])
}
