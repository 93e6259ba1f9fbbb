use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("alert publish failed: {0}")]
    Request(String),
}

/// Single-topic pub/sub sink for operator alerts.
pub trait AlertPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError>;
}

impl<T: AlertPublisher + ?Sized> AlertPublisher for &T {
    fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        (**self).publish(subject, message)
    }
}

pub fn failure_subject(source_id: &str) -> String {
    format!("Error-{source_id} Step Function")
}

pub fn info_subject(source_id: &str) -> String {
    format!("Info-{source_id} Step Function")
}

#[derive(Debug, Serialize)]
struct AlertBody<'a> {
    #[serde(rename = "Error")]
    error: &'a str,
    #[serde(rename = "Cause")]
    cause: &'a str,
    file_name: &'a str,
}

/// JSON alert body, shaped like the workflow's caught `Error` field.
pub fn alert_message(code: &str, cause: &str, file_name: &str) -> String {
    crate::contract::stable_contract_json(AlertBody {
        error: code,
        cause,
        file_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_carry_source_id() {
        assert_eq!(failure_subject("TAA"), "Error-TAA Step Function");
        assert_eq!(info_subject("TAA"), "Info-TAA Step Function");
    }

    #[test]
    fn message_is_error_shaped_json() {
        let message = alert_message("ValidationError", "purity_failure: saa_pct=9.50", "TAA_010124.csv");
        let value: serde_json::Value = serde_json::from_str(&message).expect("json");

        assert_eq!(value["Error"], "ValidationError");
        assert_eq!(value["Cause"], "purity_failure: saa_pct=9.50");
        assert_eq!(value["file_name"], "TAA_010124.csv");
    }
}
