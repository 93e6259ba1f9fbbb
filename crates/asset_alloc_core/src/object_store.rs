use thiserror::Error;

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store request failed: {0}")]
    Request(String),
}

/// Blob storage scoped to a single bucket.
pub trait ObjectStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StoreError>;
    fn head_object(&self, key: &str) -> Result<Option<ObjectSummary>, StoreError>;
    fn copy_object(&self, source_key: &str, destination_key: &str) -> Result<(), StoreError>;
    fn delete_object(&self, key: &str) -> Result<(), StoreError>;
}
