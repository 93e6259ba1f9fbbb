use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business date embedded in an upload name such as `TAA_010124.csv`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileNameError {
    #[error("file name '{0}' has no '_'-delimited date token")]
    MissingDateToken(String),
    #[error("date token '{token}' in '{file_name}' is not MMDDYY")]
    InvalidDate { file_name: String, token: String },
}

impl FileDate {
    /// Reads the `MMDDYY` token that follows the first underscore of the
    /// file stem.
    pub fn from_file_name(file_name: &str) -> Result<Self, FileNameError> {
        let stem = file_name.split('.').next().unwrap_or_default();
        let token = stem
            .split('_')
            .nth(1)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| FileNameError::MissingDateToken(file_name.to_string()))?;

        if token.len() != 6 || !token.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(FileNameError::InvalidDate {
                file_name: file_name.to_string(),
                token: token.to_string(),
            });
        }

        let date = NaiveDate::parse_from_str(token, "%m%d%y").map_err(|_| {
            FileNameError::InvalidDate {
                file_name: file_name.to_string(),
                token: token.to_string(),
            }
        })?;

        Ok(Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        })
    }

    pub fn iso(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Leading token of the file stem (`TAA` for `TAA_010124.csv`), used to name
/// the converted object.
pub fn file_prefix(file_name: &str) -> &str {
    let stem = file_name.split('.').next().unwrap_or_default();
    stem.split('_').next().unwrap_or(stem)
}
