use crate::catalog::PartitionKey;
use crate::file_date::file_prefix;

pub const CONVERTED_EXTENSION: &str = "parquet";

pub fn table_location(bucket: &str, base_location: &str) -> String {
    format!("s3://{bucket}/{}", base_location.trim_matches('/'))
}

/// Hive-style path segment for one partition, relative to the table location.
pub fn partition_suffix(key: &PartitionKey) -> String {
    format!(
        "yyyy={:04}/mm={:02}/dd={:02}/version_number={}",
        key.year, key.month, key.day, key.version_number
    )
}

pub fn partition_prefix(base_location: &str, key: &PartitionKey) -> String {
    format!(
        "{}/{}",
        base_location.trim_matches('/'),
        partition_suffix(key)
    )
}

/// Object key of the columnar copy of `file_name`, e.g.
/// `.../version_number=1/TAA_2024_01_01.parquet`.
pub fn converted_object_key(base_location: &str, key: &PartitionKey, file_name: &str) -> String {
    format!(
        "{}/{}_{:04}_{:02}_{:02}.{CONVERTED_EXTENSION}",
        partition_prefix(base_location, key),
        file_prefix(file_name),
        key.year,
        key.month,
        key.day,
    )
}

/// One object per load directly under the metadata table location.
pub fn load_metadata_object_key(base_location: &str, key: &PartitionKey, file_name: &str) -> String {
    format!(
        "{}/{}_{:04}_{:02}_{:02}_v{}.{CONVERTED_EXTENSION}",
        base_location.trim_matches('/'),
        file_prefix(file_name),
        key.year,
        key.month,
        key.day,
        key.version_number,
    )
}

pub fn quarantine_object_key(quarantine_prefix: &str, file_name: &str) -> String {
    let trimmed = quarantine_prefix.trim_matches('/');
    if trimmed.is_empty() {
        file_name.to_string()
    } else {
        format!("{trimmed}/{file_name}")
    }
}

/// Listing prefix for everything under a folder, always ending in `/` so a
/// sibling folder sharing the same leading characters is not matched.
pub fn folder_prefix(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
