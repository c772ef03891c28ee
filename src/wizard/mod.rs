//! Multi-step wizard engine
//!
//! A wizard walks an ordered list of steps. Each step commits a typed output
//! which is validated, then shallow-merged into the session's accumulated
//! context. Finishing the last step moves the session to `Submitting`, where
//! a [`crate::submit::SubmissionAdapter`] writes the mapped payload.

pub mod context;
pub mod output;
pub mod session;
pub mod step;
pub mod validation;

#[cfg(test)]
mod tests;

pub use context::{merge, AccumulatedContext};
pub use output::{StepKind, StepOutput, StepValidate};
pub use session::{NextOutcome, Phase, WizardSession};
pub use step::StepDefinition;
pub use validation::{ValidationErrors, Validator};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiError;
use crate::entities::PayloadError;

/// Whether the wizard creates a new entity or edits an existing one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WizardMode {
    #[default]
    Create,
    Edit { identifier: String },
}

impl WizardMode {
    pub fn is_edit(&self) -> bool {
        matches!(self, WizardMode::Edit { .. })
    }
}

/// Errors raised by wizard sessions
#[derive(Debug, Clone, Error)]
pub enum WizardError {
    #[error("wizard has no steps")]
    NoSteps,
    #[error("cannot {action} while the wizard is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("step '{step}' expects {expected} output, got {got}")]
    WrongStep {
        step: String,
        expected: StepKind,
        got: StepKind,
    },
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{0}' has not been reached yet")]
    StepNotReached(String),
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("could not build payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("submission failed: {0}")]
    Submission(ApiError),
    #[error("no conflict to resolve")]
    NoConflict,
}

impl WizardError {
    /// Field errors when this is a validation failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            WizardError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
