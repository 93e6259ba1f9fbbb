//! Linear pipeline state machine with one shared failure path.
//!
//! `triggered -> validated -> infra_checked -> converted -> succeeded`, and
//! `failed` from any stage. A failure publishes an alert, quarantines the
//! staged files and stops. Nothing is retried.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::alert::{alert_message, failure_subject, AlertPublisher, PublishError};
use crate::contract::{ContractError, PipelineMessage, Stage};
use crate::error::StageError;
use crate::quarantine::{QuarantineReport, RecoveryError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Triggered,
    Validated,
    InfraChecked,
    Converted,
    Succeeded,
    Failed,
}

impl PipelineState {
    /// State implied by a message's stage label, i.e. the work already done.
    pub fn resume_from(stage: Stage) -> Self {
        match stage {
            Stage::Validation => Self::Triggered,
            Stage::InfraCheck => Self::Validated,
            Stage::Transform => Self::InfraChecked,
            Stage::MetadataUpdate => Self::Converted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The three working stages plus the failure-path recovery step.
pub trait PipelineStages {
    fn validate(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError>;
    fn infra_check(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError>;
    fn convert(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError>;
    fn recover(&self, message: &PipelineMessage) -> Result<QuarantineReport, RecoveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub message: PipelineMessage,
    pub transitions: Vec<Transition>,
    pub error: Option<StageError>,
    pub quarantined: Option<QuarantineReport>,
    pub recovery_error: Option<RecoveryError>,
    pub alert_error: Option<PublishError>,
}

impl PipelineRun {
    fn start(message: PipelineMessage) -> Self {
        Self {
            state: PipelineState::resume_from(message.stage),
            message,
            transitions: Vec::new(),
            error: None,
            quarantined: None,
            recovery_error: None,
            alert_error: None,
        }
    }

    fn move_to(&mut self, to: PipelineState) {
        self.transitions.push(Transition {
            from: self.state,
            to,
        });
        self.state = to;
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }
}

pub struct Orchestrator<S, P> {
    stages: S,
    publisher: P,
    source_id: String,
}

impl<S, P> Orchestrator<S, P>
where
    S: PipelineStages,
    P: AlertPublisher,
{
    pub fn new(stages: S, publisher: P, source_id: impl Into<String>) -> Self {
        Self {
            stages,
            publisher,
            source_id: source_id.into(),
        }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Drives `message` from the state its stage label implies to a terminal
    /// state.
    pub fn run(&self, message: PipelineMessage) -> PipelineRun {
        let mut run = PipelineRun::start(message);

        while !run.state.is_terminal() {
            let current = run.message.clone();
            let (next_state, expected, outcome) = match run.state {
                PipelineState::Triggered => (
                    PipelineState::Validated,
                    Stage::InfraCheck,
                    self.stages.validate(current),
                ),
                PipelineState::Validated => (
                    PipelineState::InfraChecked,
                    Stage::Transform,
                    self.stages.infra_check(current),
                ),
                PipelineState::InfraChecked => (
                    PipelineState::Converted,
                    Stage::MetadataUpdate,
                    self.stages.convert(current),
                ),
                PipelineState::Converted => {
                    run.move_to(PipelineState::Succeeded);
                    info!(file_name = %run.message.file_name, "pipeline succeeded");
                    break;
                }
                PipelineState::Succeeded | PipelineState::Failed => break,
            };

            let next = outcome.and_then(|next| {
                if next.stage == expected {
                    Ok(next)
                } else {
                    Err(ContractError::UnexpectedStage {
                        expected,
                        actual: next.stage,
                    }
                    .into())
                }
            });

            match next {
                Ok(next) => {
                    run.message = next;
                    run.move_to(next_state);
                }
                Err(stage_error) => self.fail(&mut run, stage_error),
            }
        }

        run
    }

    fn fail(&self, run: &mut PipelineRun, stage_error: StageError) {
        error!(
            file_name = %run.message.file_name,
            state = ?run.state,
            code = stage_error.code(),
            error = %stage_error,
            "pipeline stage failed"
        );

        let body = alert_message(
            stage_error.code(),
            &stage_error.to_string(),
            &run.message.file_name,
        );
        if let Err(publish_error) = self
            .publisher
            .publish(&failure_subject(&self.source_id), &body)
        {
            warn!(error = %publish_error, "failure alert not delivered");
            run.alert_error = Some(publish_error);
        }

        match self.stages.recover(&run.message) {
            Ok(report) => run.quarantined = Some(report),
            Err(recovery_error) => {
                error!(error = %recovery_error, "quarantine failed");
                run.recovery_error = Some(recovery_error);
            }
        }

        run.error = Some(stage_error);
        run.move_to(PipelineState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::catalog::CatalogError;
    use crate::test_helpers::RecordingPublisher;
    use crate::validation::{ValidationFailure, ValidationReason};

    #[derive(Default)]
    struct ScriptedStages {
        fail_at: Option<Stage>,
        wrong_label_at: Option<Stage>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl ScriptedStages {
        fn step(
            &self,
            name: &'static str,
            message: PipelineMessage,
            next: Stage,
        ) -> Result<PipelineMessage, StageError> {
            self.calls.borrow_mut().push(name);
            if self.fail_at == Some(message.stage) {
                return Err(CatalogError::Transient("glue throttled".to_string()).into());
            }
            if self.wrong_label_at == Some(message.stage) {
                return Ok(message);
            }
            Ok(message.advance(next)?)
        }
    }

    impl PipelineStages for ScriptedStages {
        fn validate(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
            self.step("validate", message, Stage::InfraCheck)
        }

        fn infra_check(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
            self.step("infra_check", message, Stage::Transform)
                .map(|message| message.with_file_version(1))
        }

        fn convert(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
            self.step("convert", message, Stage::MetadataUpdate)
        }

        fn recover(&self, _message: &PipelineMessage) -> Result<QuarantineReport, RecoveryError> {
            self.calls.borrow_mut().push("recover");
            Ok(QuarantineReport {
                moved: vec!["error/TAA_010124.csv".to_string()],
            })
        }
    }

    fn message(stage: Stage) -> PipelineMessage {
        PipelineMessage {
            file_name: "TAA_010124.csv".to_string(),
            folder_name: "staging".to_string(),
            file_version: None,
            etag: "abc".to_string(),
            stage,
        }
    }

    #[test]
    fn happy_path_walks_every_state() {
        let orchestrator =
            Orchestrator::new(ScriptedStages::default(), RecordingPublisher::default(), "TAA");

        let run = orchestrator.run(message(Stage::Validation));

        assert!(run.succeeded());
        assert_eq!(
            run.transitions.iter().map(|t| t.to).collect::<Vec<_>>(),
            vec![
                PipelineState::Validated,
                PipelineState::InfraChecked,
                PipelineState::Converted,
                PipelineState::Succeeded,
            ]
        );
        assert_eq!(run.message.stage, Stage::MetadataUpdate);
        assert_eq!(run.message.file_version, Some(1));
        assert!(orchestrator.publisher().published().is_empty());
    }

    #[test]
    fn failure_alerts_then_quarantines() {
        let stages = ScriptedStages {
            fail_at: Some(Stage::InfraCheck),
            ..ScriptedStages::default()
        };
        let orchestrator = Orchestrator::new(stages, RecordingPublisher::default(), "TAA");

        let run = orchestrator.run(message(Stage::Validation));

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.error.as_ref().map(StageError::code), Some("CatalogError"));
        assert_eq!(run.quarantined.as_ref().map(QuarantineReport::count_moved), Some(1));
        assert_eq!(
            *orchestrator.stages().calls.borrow(),
            vec!["validate", "infra_check", "recover"]
        );
        let published = orchestrator.publisher().published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "Error-TAA Step Function");
        assert!(published[0].1.contains("glue throttled"));
    }

    #[test]
    fn wrong_stage_label_is_a_contract_failure() {
        let stages = ScriptedStages {
            wrong_label_at: Some(Stage::Transform),
            ..ScriptedStages::default()
        };
        let orchestrator = Orchestrator::new(stages, RecordingPublisher::default(), "TAA");

        let run = orchestrator.run(message(Stage::Validation));

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(
            run.error,
            Some(StageError::Contract(ContractError::UnexpectedStage {
                expected: Stage::MetadataUpdate,
                actual: Stage::Transform,
            }))
        );
    }

    #[test]
    fn resumes_from_stage_label() {
        let orchestrator =
            Orchestrator::new(ScriptedStages::default(), RecordingPublisher::default(), "TAA");

        let run = orchestrator.run(message(Stage::Transform));

        assert!(run.succeeded());
        assert_eq!(*orchestrator.stages().calls.borrow(), vec!["convert"]);
        assert_eq!(run.transitions[0].from, PipelineState::InfraChecked);
    }

    #[test]
    fn undelivered_alert_still_quarantines() {
        struct Rejecting;
        impl PipelineStages for Rejecting {
            fn validate(&self, _: PipelineMessage) -> Result<PipelineMessage, StageError> {
                Err(ValidationFailure {
                    reason: ValidationReason::PurityFailure,
                    diff: ["saa_pct=9.50".to_string()].into(),
                }
                .into())
            }
            fn infra_check(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
                Ok(message)
            }
            fn convert(&self, message: PipelineMessage) -> Result<PipelineMessage, StageError> {
                Ok(message)
            }
            fn recover(&self, _: &PipelineMessage) -> Result<QuarantineReport, RecoveryError> {
                Ok(QuarantineReport::default())
            }
        }

        let orchestrator = Orchestrator::new(Rejecting, RecordingPublisher::failing(), "TAA");
        let run = orchestrator.run(message(Stage::Validation));

        assert_eq!(run.state, PipelineState::Failed);
        assert!(run.alert_error.is_some());
        assert_eq!(run.quarantined, Some(QuarantineReport::default()));
        assert_eq!(run.error.as_ref().map(StageError::code), Some("ValidationError"));
    }
}
