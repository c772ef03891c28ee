//! Step definitions

use serde_json::{Map, Value};

use super::context::AccumulatedContext;
use super::output::{StepKind, StepOutput};
use super::WizardError;

/// One screen of a wizard
///
/// Immutable once the wizard is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    name: String,
    title: String,
    accepts: StepKind,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, title: impl Into<String>, accepts: StepKind) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            accepts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn accepts(&self) -> StepKind {
        self.accepts
    }

    /// Check an output against this step and return the fields to merge
    pub fn check(
        &self,
        output: &StepOutput,
        context: &AccumulatedContext,
    ) -> Result<Map<String, Value>, WizardError> {
        if output.kind() != self.accepts {
            return Err(WizardError::WrongStep {
                step: self.name.clone(),
                expected: self.accepts,
                got: output.kind(),
            });
        }
        output.validate(context).map_err(WizardError::Validation)?;
        output
            .to_fields()
            .map_err(|e| WizardError::Payload(e.into()))
    }
}
