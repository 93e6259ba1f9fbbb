//! Moves a failed load's staged files out of the way.
//!
//! Each object is copied, verified by content digest, then deleted. A retry
//! after a crash between copy and delete finds identical content already at
//! the destination and only performs the delete.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::object_store::{ObjectStore, StoreError};
use crate::storage_keys::{file_name_of, folder_prefix, quarantine_object_key};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("listing '{prefix}' failed: {source}")]
    List { prefix: String, source: StoreError },
    #[error("copying '{key}' failed: {source}")]
    Copy { key: String, source: StoreError },
    #[error("copy of '{source_key}' to '{destination_key}' does not match the source")]
    VerificationFailed {
        source_key: String,
        destination_key: String,
    },
    #[error("deleting '{key}' failed: {source}")]
    Delete { key: String, source: StoreError },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuarantineReport {
    /// Destination keys, in listing order.
    pub moved: Vec<String>,
}

impl QuarantineReport {
    pub fn count_moved(&self) -> usize {
        self.moved.len()
    }
}

pub fn quarantine(
    store: &impl ObjectStore,
    staging_prefix: &str,
    quarantine_prefix: &str,
) -> Result<QuarantineReport, RecoveryError> {
    let prefix = folder_prefix(staging_prefix);
    let objects = store
        .list_objects(&prefix)
        .map_err(|source| RecoveryError::List {
            prefix: prefix.clone(),
            source,
        })?;

    let mut report = QuarantineReport::default();
    for object in objects.iter().filter(|object| !object.key.ends_with('/')) {
        let destination = quarantine_object_key(quarantine_prefix, file_name_of(&object.key));
        if destination == object.key {
            continue;
        }
        move_verified(store, &object.key, &destination)?;
        report.moved.push(destination);
    }

    info!(
        staging_prefix = %prefix,
        moved = report.count_moved(),
        "staged files quarantined"
    );
    Ok(report)
}

fn move_verified(
    store: &impl ObjectStore,
    source_key: &str,
    destination_key: &str,
) -> Result<(), RecoveryError> {
    let copy_error = |source| RecoveryError::Copy {
        key: source_key.to_string(),
        source,
    };

    let source_digest = digest(&store.get_object(source_key).map_err(copy_error)?);

    let already_copied = match store.head_object(destination_key).map_err(copy_error)? {
        Some(_) => digest(&store.get_object(destination_key).map_err(copy_error)?) == source_digest,
        None => false,
    };

    if already_copied {
        warn!(
            source_key,
            destination_key, "destination already holds this content, skipping copy"
        );
    } else {
        store
            .copy_object(source_key, destination_key)
            .map_err(copy_error)?;
        let copied_digest = digest(&store.get_object(destination_key).map_err(copy_error)?);
        if copied_digest != source_digest {
            return Err(RecoveryError::VerificationFailed {
                source_key: source_key.to_string(),
                destination_key: destination_key.to_string(),
            });
        }
    }

    store
        .delete_object(source_key)
        .map_err(|source| RecoveryError::Delete {
            key: source_key.to_string(),
            source,
        })
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
