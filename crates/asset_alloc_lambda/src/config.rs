use asset_alloc_core::catalog::{self, TableDescriptor};
use thiserror::Error;

pub const DEFAULT_ASSET_ALLOC_TABLE: &str = "asset_alloc_table";
pub const DEFAULT_ASSET_ALLOC_TABLE_LOCATION: &str =
    "asset_allocation_data/outbound/asset_alloc_table";
pub const DEFAULT_METADATA_TABLE: &str = "taa_saa_paa_metadata";
pub const DEFAULT_METADATA_TABLE_LOCATION: &str =
    "asset_allocation_data/outbound/taa_saa_paa_metadata";
pub const DEFAULT_STAGING_PREFIX: &str = "asset_allocation_data/inbound";
pub const DEFAULT_QUARANTINE_PREFIX: &str = "asset_allocation_data/error";
pub const DEFAULT_SOURCE_ID_SHORT: &str = "TAA";
pub const UPLOAD_SUFFIX: &str = ".csv";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
}

/// Runtime settings shared by every stage handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub bucket: String,
    pub glue_database: String,
    pub asset_alloc_table: String,
    pub asset_alloc_table_location: String,
    pub metadata_table: String,
    pub metadata_table_location: String,
    pub staging_prefix: String,
    pub quarantine_prefix: String,
    pub sns_topic_arn: Option<String>,
    pub state_machine_arn: Option<String>,
    pub source_id_short: String,
    pub region: Option<String>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name-to-value source. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));
        let or_default = |name: &str, default: &str| {
            optional(name).unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            bucket: required("BUCKET_NAME")?,
            glue_database: required("GLUE_DATABASE")?,
            asset_alloc_table: or_default("ASSET_ALLOC_TABLE", DEFAULT_ASSET_ALLOC_TABLE),
            asset_alloc_table_location: or_default(
                "ASSET_ALLOC_TABLE_LOCATION",
                DEFAULT_ASSET_ALLOC_TABLE_LOCATION,
            ),
            metadata_table: or_default("METADATA_TABLE", DEFAULT_METADATA_TABLE),
            metadata_table_location: or_default(
                "METADATA_TABLE_LOCATION",
                DEFAULT_METADATA_TABLE_LOCATION,
            ),
            staging_prefix: or_default("STAGING_PREFIX", DEFAULT_STAGING_PREFIX),
            quarantine_prefix: or_default("QUARANTINE_PREFIX", DEFAULT_QUARANTINE_PREFIX),
            sns_topic_arn: optional("SNS_TOPIC_ARN"),
            state_machine_arn: optional("STATE_MACHINE_ARN"),
            source_id_short: or_default("SOURCE_ID_SHORT", DEFAULT_SOURCE_ID_SHORT),
            region: optional("AWS_REGION"),
        })
    }

    pub fn asset_alloc_table(&self) -> TableDescriptor {
        catalog::asset_alloc_table(
            &self.glue_database,
            &self.asset_alloc_table,
            &self.bucket,
            &self.asset_alloc_table_location,
        )
    }

    pub fn metadata_table(&self) -> TableDescriptor {
        catalog::load_metadata_table(
            &self.glue_database,
            &self.metadata_table,
            &self.bucket,
            &self.metadata_table_location,
        )
    }
}
