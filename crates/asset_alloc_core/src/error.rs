use thiserror::Error;

use crate::catalog::CatalogError;
use crate::contract::{ContractError, WorkflowError};
use crate::file_date::FileNameError;
use crate::object_store::StoreError;
use crate::quarantine::RecoveryError;
use crate::validation::{ValidationError, ValidationFailure};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error(transparent)]
    FileName(#[from] FileNameError),
    #[error("csv decode failed: {0}")]
    Csv(String),
    #[error("column '{column}' row {row}: cannot read '{value}' as {data_type}")]
    Coercion {
        column: String,
        row: usize,
        value: String,
        data_type: String,
    },
    #[error("parquet encode failed: {0}")]
    Encode(String),
}

/// Failure surfaced at a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StageError {
    /// Stable name written to the workflow `Error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Catalog(_) => "CatalogError",
            Self::Conversion(_) => "ConversionError",
            Self::Recovery(_) => "RecoveryError",
            Self::Contract(_) => "ContractError",
            Self::Store(_) => "StoreError",
        }
    }

    pub fn to_workflow_error(&self) -> WorkflowError {
        WorkflowError {
            error: self.code().to_string(),
            cause: self.to_string(),
        }
    }
}

impl From<ValidationError> for StageError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Failed(failure) => Self::Validation(failure),
            ValidationError::Contract(contract) => Self::Contract(contract),
        }
    }
}

impl From<FileNameError> for StageError {
    fn from(error: FileNameError) -> Self {
        Self::Conversion(ConversionError::FileName(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Stage;

    #[test]
    fn codes_are_stable() {
        let error = StageError::from(ContractError::UnexpectedStage {
            expected: Stage::Transform,
            actual: Stage::Validation,
        });
        assert_eq!(error.code(), "ContractError");

        let workflow = StageError::from(CatalogError::Transient("throttled".to_string()))
            .to_workflow_error();
        assert_eq!(workflow.error, "CatalogError");
        assert_eq!(workflow.cause, "catalog request failed: throttled");
    }

    #[test]
    fn validation_error_splits_into_stage_variants() {
        let contract = StageError::from(ValidationError::Contract(ContractError::NoEvent));
        assert_eq!(contract.code(), "ContractError");
    }
}
