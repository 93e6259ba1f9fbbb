use aws_sdk_sfn::error::DisplayErrorContext;
use thiserror::Error;

use super::block_on;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStart {
    Started { execution_arn: String },
    /// An execution with the same name already exists; the upload was seen
    /// before.
    AlreadyStarted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowStartError {
    #[error("start execution '{name}' failed: {message}")]
    Request { name: String, message: String },
}

pub trait WorkflowStarter {
    fn start_execution(&self, name: &str, input: &str) -> Result<ExecutionStart, WorkflowStartError>;
}

/// Step Functions state machine as a [`WorkflowStarter`].
#[derive(Clone)]
pub struct StepFunctionsStarter {
    state_machine_arn: String,
    client: aws_sdk_sfn::Client,
}

impl StepFunctionsStarter {
    pub fn new(state_machine_arn: impl Into<String>, client: aws_sdk_sfn::Client) -> Self {
        Self {
            state_machine_arn: state_machine_arn.into(),
            client,
        }
    }
}

impl WorkflowStarter for StepFunctionsStarter {
    fn start_execution(&self, name: &str, input: &str) -> Result<ExecutionStart, WorkflowStartError> {
        let request = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .name(name)
            .input(input);
        block_on(async move {
            match request.send().await {
                Ok(output) => Ok(ExecutionStart::Started {
                    execution_arn: output.execution_arn().to_string(),
                }),
                Err(error)
                    if error
                        .as_service_error()
                        .is_some_and(|service| service.is_execution_already_exists()) =>
                {
                    Ok(ExecutionStart::AlreadyStarted)
                }
                Err(error) => Err(WorkflowStartError::Request {
                    name: name.to_string(),
                    message: DisplayErrorContext(error).to_string(),
                }),
            }
        })
    }
}
