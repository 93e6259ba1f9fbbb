//! Schema and business-rule checks for uploaded allocation files.
//!
//! Checks run in a fixed order and stop at the first failing rule:
//! required columns, required `amount_type` categories, then the per-category
//! purity total.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::{ContractError, PipelineMessage, Stage};
use crate::table::AllocationTable;

pub const REQUIRED_COLUMNS: [&str; 10] = [
    "pfg_ast_clss_nm",
    "pfg_sblvl_1_nm",
    "pfg_sblvl_1_5_nm",
    "pfg_sblvl_2_nm",
    "pfg_sblvl_3_nm",
    "pfg_sblvl_4_nm",
    "wal_nm",
    "LEVEL",
    "amount_type",
    "amount",
];

pub const CATEGORY_COLUMN: &str = "amount_type";
pub const AMOUNT_COLUMN: &str = "amount";
pub const REQUIRED_CATEGORIES: [&str; 3] = ["invest_pct", "taa_pct", "saa_pct"];

/// Every category must total exactly this after rounding to two decimals.
pub const PURITY_TARGET: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    SchemaMismatch,
    MissingCategory,
    PurityFailure,
}

impl ValidationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaMismatch => "schema_mismatch",
            Self::MissingCategory => "missing_category",
            Self::PurityFailure => "purity_failure",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{reason}: {}", .diff.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationFailure {
    pub reason: ValidationReason,
    pub diff: BTreeSet<String>,
}

impl ValidationFailure {
    fn new(reason: ValidationReason, diff: impl IntoIterator<Item = String>) -> Self {
        Self {
            reason,
            diff: diff.into_iter().collect(),
        }
    }
}

/// Rounded amount totals keyed by category, reported on success.
pub type CategoryTotals = BTreeMap<String, f64>;

pub type ValidationResult = Result<CategoryTotals, ValidationFailure>;

pub fn validate(table: &AllocationTable) -> ValidationResult {
    check_columns(table)?;
    check_categories(table)?;
    check_purity(table)
}

pub fn validate_csv(bytes: &[u8]) -> ValidationResult {
    let table = AllocationTable::from_csv_bytes(bytes).map_err(|error| {
        ValidationFailure::new(ValidationReason::SchemaMismatch, [error.to_string()])
    })?;
    validate(&table)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Failed(#[from] ValidationFailure),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Validates the uploaded file and, on success, hands the message on to the
/// infra check stage.
pub fn validate_upload(
    message: PipelineMessage,
    bytes: &[u8],
) -> Result<(PipelineMessage, CategoryTotals), ValidationError> {
    message.expect_stage(Stage::Validation)?;
    let totals = validate_csv(bytes)?;
    Ok((message.advance(Stage::InfraCheck)?, totals))
}

fn check_columns(table: &AllocationTable) -> Result<(), ValidationFailure> {
    let present = table.named_columns().collect::<BTreeSet<_>>();
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !present.contains(*column))
        .map(|column| (*column).to_string())
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        return Err(ValidationFailure::new(
            ValidationReason::SchemaMismatch,
            missing,
        ));
    }

    if table.is_empty() {
        return Err(ValidationFailure::new(
            ValidationReason::SchemaMismatch,
            ["no data rows".to_string()],
        ));
    }

    Ok(())
}

fn check_categories(table: &AllocationTable) -> Result<(), ValidationFailure> {
    let present = table
        .column(CATEGORY_COLUMN)
        .map(|values| values.collect::<BTreeSet<_>>())
        .unwrap_or_default();

    let missing = REQUIRED_CATEGORIES
        .iter()
        .filter(|category| !present.contains(*category))
        .map(|category| (*category).to_string())
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::new(
            ValidationReason::MissingCategory,
            missing,
        ))
    }
}

fn check_purity(table: &AllocationTable) -> ValidationResult {
    let (Some(categories), Some(amounts)) =
        (table.column(CATEGORY_COLUMN), table.column(AMOUNT_COLUMN))
    else {
        return Err(ValidationFailure::new(
            ValidationReason::SchemaMismatch,
            [CATEGORY_COLUMN.to_string(), AMOUNT_COLUMN.to_string()],
        ));
    };

    let mut sums: BTreeMap<&str, Option<f64>> = REQUIRED_CATEGORIES
        .iter()
        .map(|category| (*category, Some(0.0)))
        .collect();

    for (category, amount) in categories.zip(amounts) {
        let Some(sum) = sums.get_mut(category) else {
            continue;
        };
        if amount.is_empty() {
            continue;
        }
        *sum = match (amount.parse::<f64>(), *sum) {
            (Ok(value), Some(total)) if value.is_finite() => Some(total + value),
            _ => None,
        };
    }

    let mut totals = CategoryTotals::new();
    let mut failing = Vec::new();
    for (category, sum) in sums {
        match sum.map(round_to_cents) {
            Some(total) if total == PURITY_TARGET => {
                totals.insert(category.to_string(), total);
            }
            Some(total) => failing.push(format!("{category}={total:.2}")),
            None => failing.push(format!("{category}=non-numeric")),
        }
    }

    if failing.is_empty() {
        Ok(totals)
    } else {
        Err(ValidationFailure::new(
            ValidationReason::PurityFailure,
            failing,
        ))
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
