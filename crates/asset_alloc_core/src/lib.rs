//! Asset allocation load pipeline domain primitives.
//!
//! This crate owns the stage contracts, file validation, catalog and
//! quarantine decision logic, and the pipeline state machine. It excludes
//! AWS SDK and Lambda runtime concerns; those live in `asset_alloc_lambda`
//! behind the traits defined here.

pub mod alert;
pub mod catalog;
pub mod contract;
pub mod error;
pub mod file_date;
pub mod object_store;
pub mod orchestrator;
pub mod quarantine;
pub mod storage_keys;
pub mod table;
pub mod validation;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
