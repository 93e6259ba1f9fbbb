use std::time::Instant;

use asset_alloc_core::contract::PipelineMessage;
use asset_alloc_core::error::StageError;
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

/// JSON logs for CloudWatch, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_current_span(true)
        .with_ansi(false)
        .without_time()
        .try_init();
}

/// Runs one stage entry point inside a span carrying the file identity and
/// logs start, completion with duration, or failure with its error code.
pub fn run_stage<T>(
    stage: &'static str,
    message: &PipelineMessage,
    body: impl FnOnce() -> Result<T, StageError>,
) -> Result<T, StageError> {
    let span = info_span!(
        "stage",
        stage,
        file_name = %message.file_name,
        etag = %message.etag,
    );
    let _entered = span.enter();

    let started_at = Instant::now();
    info!("stage_started");

    let outcome = body();
    let duration_ms = started_at.elapsed().as_millis() as u64;
    match &outcome {
        Ok(_) => info!(duration_ms, "stage_completed"),
        Err(stage_error) => error!(
            duration_ms,
            code = stage_error.code(),
            error = %stage_error,
            "stage_failed"
        ),
    }
    outcome
}
