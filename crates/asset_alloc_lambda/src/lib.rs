//! AWS-oriented adapters and handlers for the asset allocation load.
//!
//! This crate owns runtime integration details (Lambda stage handlers, the
//! S3/Glue/SNS/Step Functions adapters, Parquet encoding and environment
//! configuration) and re-exports the core domain crate as `runtime`.

pub mod adapters;
pub mod config;
pub mod converter;
pub mod handlers;
pub mod telemetry;

pub use asset_alloc_core as runtime;
