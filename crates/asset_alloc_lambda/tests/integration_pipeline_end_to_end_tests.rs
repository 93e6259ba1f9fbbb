mod support;

use asset_alloc_core::catalog::GlueCatalog;
use asset_alloc_core::contract::{PipelineMessage, Stage};
use asset_alloc_core::error::StageError;
use asset_alloc_core::orchestrator::PipelineState;
use asset_alloc_core::validation::ValidationReason;
use asset_alloc_lambda::handlers::infra_check::handle_infra_check;
use asset_alloc_lambda::handlers::pipeline::run_in_process;
use asset_alloc_lambda::handlers::transform::handle_transform;
use asset_alloc_lambda::handlers::validation::handle_validation;
use chrono::Utc;
use support::fixtures::{allocation_csv, balanced_csv, test_config, TestEnvironment};

const CONVERTED_V1: &str = "asset_allocation_data/outbound/asset_alloc_table/yyyy=2024/mm=01/dd=01/version_number=1/TAA_2024_01_01.parquet";
const CONVERTED_V2: &str = "asset_allocation_data/outbound/asset_alloc_table/yyyy=2024/mm=01/dd=01/version_number=2/TAA_2024_01_01.parquet";

#[test]
fn valid_upload_reaches_succeeded_with_partitioned_parquet() {
    let config = test_config();
    let (env, upload) = TestEnvironment::with_upload("TAA_010124.csv", &balanced_csv());

    let run = run_in_process(&upload, &config, &env.store, &env.catalog, &env.publisher);

    assert_eq!(run.state, PipelineState::Succeeded, "error: {:?}", run.error);
    assert_eq!(run.message.stage, Stage::MetadataUpdate);
    assert_eq!(run.message.file_version, Some(1));
    assert_eq!(
        run.transitions.iter().map(|t| t.to).collect::<Vec<_>>(),
        vec![
            PipelineState::Validated,
            PipelineState::InfraChecked,
            PipelineState::Converted,
            PipelineState::Succeeded,
        ]
    );

    let parquet = env.store.object(CONVERTED_V1).expect("converted parquet");
    assert!(parquet.starts_with(b"PAR1"));
    assert!(parquet.ends_with(b"PAR1"));
    assert!(env
        .store
        .object("asset_allocation_data/outbound/taa_saa_paa_metadata/TAA_2024_01_01_v1.parquet")
        .is_some());

    let partitions = env
        .catalog
        .list_partitions("asset_alloc_db", "asset_alloc_table")
        .expect("partitions");
    assert_eq!(partitions.len(), 1);
    assert!(partitions[0]
        .storage
        .location
        .ends_with("/yyyy=2024/mm=01/dd=01/version_number=1"));
    assert!(env.publisher.published().is_empty());
    assert!(env
        .store
        .object("asset_allocation_data/inbound/TAA_010124.csv")
        .is_some());
}

#[test]
fn reload_of_same_date_gets_next_version() {
    let config = test_config();
    let (env, first) = TestEnvironment::with_upload("TAA_010124.csv", &balanced_csv());
    assert!(run_in_process(&first, &config, &env.store, &env.catalog, &env.publisher).succeeded());

    let second = env.stage("TAA_010124.csv", &balanced_csv());
    let run = run_in_process(&second, &config, &env.store, &env.catalog, &env.publisher);

    assert!(run.succeeded());
    assert_eq!(run.message.file_version, Some(2));
    assert!(env.store.object(CONVERTED_V1).is_some());
    assert!(env.store.object(CONVERTED_V2).is_some());
    assert_eq!(
        env.catalog
            .list_partitions("asset_alloc_db", "asset_alloc_table")
            .expect("partitions")
            .len(),
        2
    );
}

#[test]
fn overlapping_uploads_for_same_date_keep_separate_versions() {
    let config = test_config();
    let (env, first) = TestEnvironment::with_upload("TAA_010124.csv", &balanced_csv());
    let second = env.stage(
        "TAA_010124_b.csv",
        &allocation_csv(&[("invest_pct", "10"), ("taa_pct", "10"), ("saa_pct", "10")]),
    );

    let checked = [first, second].map(|upload| {
        let validated = handle_validation(PipelineMessage::from_upload(&upload), &env.store)
            .expect("validation");
        handle_infra_check(validated, &config, &env.catalog, &env.publisher).expect("infra check")
    });
    assert_eq!(
        checked.iter().map(|message| message.file_version).collect::<Vec<_>>(),
        vec![Some(1), Some(2)]
    );

    for message in checked {
        handle_transform(message, &config, &env.store, &env.catalog, Utc::now())
            .expect("transform");
    }

    assert!(env.store.object(CONVERTED_V1).is_some());
    assert!(env.store.object(CONVERTED_V2).is_some());
    for version in [1, 2] {
        assert!(env
            .store
            .object(&format!(
                "asset_allocation_data/outbound/taa_saa_paa_metadata/TAA_2024_01_01_v{version}.parquet"
            ))
            .is_some());
    }
    let owners = env
        .catalog
        .list_partitions("asset_alloc_db", "asset_alloc_table")
        .expect("partitions")
        .into_iter()
        .map(|partition| (partition.key.version_number, partition.owner.map(|owner| owner.object_key)))
        .collect::<Vec<_>>();
    assert_eq!(
        owners,
        vec![
            (1, Some("asset_allocation_data/inbound/TAA_010124.csv".to_string())),
            (2, Some("asset_allocation_data/inbound/TAA_010124_b.csv".to_string())),
        ]
    );
    assert!(env.publisher.published().is_empty());
}

#[test]
fn impure_upload_fails_alerts_and_is_quarantined() {
    let config = test_config();
    let body = allocation_csv(&[
        ("invest_pct", "10"),
        ("taa_pct", "10"),
        ("saa_pct", "9.5"),
    ]);
    let (env, upload) = TestEnvironment::with_upload("TAA_010124.csv", &body);

    let run = run_in_process(&upload, &config, &env.store, &env.catalog, &env.publisher);

    assert_eq!(run.state, PipelineState::Failed);
    match run.error.as_ref() {
        Some(StageError::Validation(failure)) => {
            assert_eq!(failure.reason, ValidationReason::PurityFailure)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(run.message.stage, Stage::Validation);

    let published = env.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "Error-TAA Step Function");
    assert!(published[0].1.contains("purity_failure"));

    assert_eq!(
        env.store.keys(),
        vec!["asset_allocation_data/error/TAA_010124.csv".to_string()]
    );
    assert_eq!(
        env.store
            .object("asset_allocation_data/error/TAA_010124.csv")
            .expect("quarantined"),
        body.into_bytes()
    );
    assert!(env.catalog.table_ids().is_empty());
}

#[test]
fn missing_category_never_reaches_catalog() {
    let config = test_config();
    let body = allocation_csv(&[("invest_pct", "10"), ("taa_pct", "10")]);
    let (env, upload) = TestEnvironment::with_upload("TAA_010124.csv", &body);

    let run = run_in_process(&upload, &config, &env.store, &env.catalog, &env.publisher);

    assert_eq!(run.state, PipelineState::Failed);
    assert_eq!(run.error.as_ref().map(StageError::code), Some("ValidationError"));
    assert!(run.transitions.iter().all(|t| t.to == PipelineState::Failed));
    assert!(env.catalog.table_ids().is_empty());
}

#[test]
fn undated_file_fails_in_infra_check() {
    let config = test_config();
    let (env, upload) = TestEnvironment::with_upload("allocations.csv", &balanced_csv());

    let run = run_in_process(&upload, &config, &env.store, &env.catalog, &env.publisher);

    assert_eq!(run.state, PipelineState::Failed);
    assert_eq!(run.error.as_ref().map(StageError::code), Some("ConversionError"));
    assert_eq!(run.message.stage, Stage::InfraCheck);
    assert_eq!(run.quarantined.as_ref().map(|report| report.count_moved()), Some(1));
}
