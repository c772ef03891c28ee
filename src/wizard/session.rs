//! Wizard session: cursor, accumulated context and submission lifecycle
//!
//! Phases: `Idle -> Step(0..k-1) -> Submitting -> Committed`. A failed
//! submission returns the session to the last step with its context intact
//! so the user can retry or resolve a conflict.

use std::fmt;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::context::AccumulatedContext;
use super::output::StepOutput;
use super::step::StepDefinition;
use super::validation::ValidationErrors;
use super::{WizardError, WizardMode};
use crate::api::ApiError;
use crate::entities::{PayloadError, WizardKind};
use crate::scope::Scope;
use crate::submit::{diff, DiffEntry, Resolution, SubmissionAdapter, SubmitRequest};

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Configured but not opened
    Idle,
    /// Showing the step at this index
    Step(usize),
    /// Last step committed, waiting for the adapter
    Submitting,
    /// Submission succeeded; terminal
    Committed,
    /// Closed without submitting; terminal
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Step(i) => write!(f, "at step {}", i),
            Phase::Submitting => write!(f, "submitting"),
            Phase::Committed => write!(f, "committed"),
            Phase::Closed => write!(f, "closed"),
        }
    }
}

/// Result of committing a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextOutcome {
    /// Moved to the step at `cursor`
    Advanced { cursor: usize },
    /// The last step was committed; call [`WizardSession::submit`]
    ReadyToSubmit,
}

/// One open wizard
///
/// All state is owned by the session; two sessions never share context.
#[derive(Debug, Clone)]
pub struct WizardSession {
    id: Uuid,
    kind: WizardKind,
    mode: WizardMode,
    scope: Scope,
    steps: Vec<StepDefinition>,
    phase: Phase,
    context: AccumulatedContext,
    /// Highest step index reached so far
    furthest: usize,
    last_failure: Option<ApiError>,
}

impl WizardSession {
    /// Configure a session with the kind's standard steps
    pub(crate) fn new(kind: WizardKind, mode: WizardMode, scope: Scope) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            mode,
            scope,
            steps: kind.steps(),
            phase: Phase::Idle,
            context: AccumulatedContext::new(),
            furthest: 0,
            last_failure: None,
        }
    }

    /// Configure a session with a custom step list
    pub fn with_steps(
        kind: WizardKind,
        mode: WizardMode,
        scope: Scope,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, WizardError> {
        if steps.is_empty() {
            return Err(WizardError::NoSteps);
        }
        let mut session = Self::new(kind, mode, scope);
        session.steps = steps;
        Ok(session)
    }

    /// Open a fresh create-mode session at the first step
    pub fn start(kind: WizardKind, scope: Scope) -> Self {
        let mut session = Self::new(kind, WizardMode::Create, scope);
        session.phase = Phase::Step(0);
        session.context = kind.seed();
        tracing::debug!(session = %session.id, wizard = %kind.title(), "wizard opened");
        session
    }

    /// Open an edit-mode session prefilled from an existing entity
    pub fn start_edit(kind: WizardKind, scope: Scope, entity: &Value) -> Result<Self, WizardError> {
        let context = kind.context_from_entity(entity)?;
        let identifier = kind
            .identifier(&context)
            .ok_or_else(|| PayloadError::MissingField("identifier".to_string()))?;
        let mut session = Self::new(kind, WizardMode::Edit { identifier }, scope);
        session.open(context)?;
        session.furthest = session.last_index();
        Ok(session)
    }

    /// Move from `Idle` to the first step, seeding the context
    pub fn open(&mut self, initial: AccumulatedContext) -> Result<(), WizardError> {
        if self.phase != Phase::Idle {
            return Err(self.invalid("open"));
        }
        let mut context = self.kind.seed();
        context.merge_in(initial.into_map());
        self.context = context;
        self.phase = Phase::Step(0);
        tracing::debug!(session = %self.id, wizard = %self.kind.title(), mode = ?self.mode, "wizard opened");
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> WizardKind {
        self.kind
    }

    pub fn mode(&self) -> &WizardMode {
        &self.mode
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &AccumulatedContext {
        &self.context
    }

    /// Most recent submission failure, cleared on success
    pub fn last_failure(&self) -> Option<&ApiError> {
        self.last_failure.as_ref()
    }

    /// Index of the current step while one is shown
    pub fn cursor(&self) -> Option<usize> {
        match self.phase {
            Phase::Step(i) => Some(i),
            _ => None,
        }
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.cursor().map(|i| &self.steps[i])
    }

    pub fn is_last_step(&self) -> bool {
        self.cursor() == Some(self.last_index())
    }

    fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    fn invalid(&self, action: &'static str) -> WizardError {
        WizardError::InvalidPhase {
            action,
            phase: self.phase,
        }
    }

    fn require_step(&self, action: &'static str) -> Result<usize, WizardError> {
        self.cursor().ok_or_else(|| self.invalid(action))
    }

    /// Validate and commit the current step's output
    ///
    /// On failure nothing changes: the cursor stays put and the context is
    /// untouched.
    pub fn next(&mut self, output: StepOutput) -> Result<NextOutcome, WizardError> {
        let cursor = self.require_step("advance")?;
        let step = &self.steps[cursor];
        let fields = step.check(&output, &self.context)?;
        self.check_identifier_unchanged(&fields)?;

        tracing::debug!(
            session = %self.id,
            step = step.name(),
            keys = fields.len(),
            "step committed"
        );
        self.context.merge_in(fields);

        if cursor < self.last_index() {
            let next = cursor + 1;
            self.phase = Phase::Step(next);
            self.furthest = self.furthest.max(next);
            Ok(NextOutcome::Advanced { cursor: next })
        } else {
            self.phase = Phase::Submitting;
            Ok(NextOutcome::ReadyToSubmit)
        }
    }

    /// Edit sessions cannot rename the entity they were opened for
    fn check_identifier_unchanged(&self, fields: &Map<String, Value>) -> Result<(), WizardError> {
        if let WizardMode::Edit { identifier } = &self.mode {
            if let Some(new_id) = fields.get("identifier").and_then(Value::as_str) {
                if new_id != identifier {
                    let mut errors = ValidationErrors::new();
                    errors.add("identifier", "Identifier cannot be changed while editing");
                    return Err(WizardError::Validation(errors));
                }
            }
        }
        Ok(())
    }

    /// Step back one screen, keeping everything already merged
    ///
    /// A no-op at the first step. From `Submitting` this returns to the last
    /// step.
    pub fn back(&mut self) -> Result<usize, WizardError> {
        let target = match self.phase {
            Phase::Step(i) => i.saturating_sub(1),
            Phase::Submitting => self.last_index(),
            _ => return Err(self.invalid("go back")),
        };
        self.phase = Phase::Step(target);
        Ok(target)
    }

    /// Jump to an already reached step by name
    pub fn go_to(&mut self, name: &str) -> Result<usize, WizardError> {
        self.require_step("jump")?;
        let index = self
            .steps
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| WizardError::UnknownStep(name.to_string()))?;
        if index > self.furthest {
            return Err(WizardError::StepNotReached(name.to_string()));
        }
        self.phase = Phase::Step(index);
        Ok(index)
    }

    /// Abandon the wizard, discarding everything collected
    pub fn close(&mut self) {
        if matches!(self.phase, Phase::Committed | Phase::Closed) {
            return;
        }
        tracing::debug!(session = %self.id, phase = %self.phase, "wizard closed");
        self.phase = Phase::Closed;
        self.context.clear();
        self.last_failure = None;
    }

    /// Payload the current context maps to
    pub fn payload(&self) -> Result<Value, WizardError> {
        Ok(self.kind.build_payload(&self.context, &self.scope)?)
    }

    fn submit_request(&self) -> Result<SubmitRequest, WizardError> {
        let payload = self.payload()?;
        let identifier = match &self.mode {
            WizardMode::Edit { identifier } => identifier.clone(),
            WizardMode::Create => self.kind.identifier(&self.context).unwrap_or_default(),
        };
        Ok(SubmitRequest {
            entity: self.kind.entity(),
            mode: self.mode.clone(),
            identifier,
            payload,
        })
    }

    /// Run the submission adapter for a session in `Submitting`
    ///
    /// Returns the entity the backend now holds. On failure the session goes
    /// back to the last step with its context intact.
    pub async fn submit<A>(&mut self, adapter: &A) -> Result<Value, WizardError>
    where
        A: SubmissionAdapter + ?Sized,
    {
        if self.phase != Phase::Submitting {
            return Err(self.invalid("submit"));
        }
        let request = match self.submit_request() {
            Ok(request) => request,
            Err(e) => {
                self.phase = Phase::Step(self.last_index());
                return Err(e);
            }
        };
        let result = adapter.submit(&request).await;
        self.finish(adapter.name(), result)
    }

    fn finish(
        &mut self,
        adapter: &str,
        result: Result<Value, ApiError>,
    ) -> Result<Value, WizardError> {
        match result {
            Ok(entity) => {
                tracing::info!(session = %self.id, adapter, wizard = %self.kind.title(), "wizard committed");
                self.phase = Phase::Committed;
                self.context.clear();
                self.last_failure = None;
                Ok(entity)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, adapter, error = %e, conflict = e.is_conflict(), "submission failed");
                self.phase = Phase::Step(self.last_index());
                self.last_failure = Some(e.clone());
                Err(WizardError::Submission(e))
            }
        }
    }

    /// Differences between the local payload and the server copy of the last conflict
    pub fn conflict_diff(&self) -> Option<Vec<DiffEntry>> {
        let remote = self.last_failure.as_ref()?.remote_entity()?;
        let local = self.payload().ok()?;
        Some(diff(&local, remote))
    }

    /// Settle the last conflict
    ///
    /// `KeepMine` overwrites the server copy and commits on success.
    /// `TakeTheirs` merges the server copy into the context, switches to edit
    /// mode and leaves the user on the last step to review; it returns `None`.
    pub async fn resolve_conflict<A>(
        &mut self,
        resolution: Resolution,
        adapter: &A,
    ) -> Result<Option<Value>, WizardError>
    where
        A: SubmissionAdapter + ?Sized,
    {
        let failure = match &self.last_failure {
            Some(failure) if failure.is_conflict() => failure.clone(),
            _ => return Err(WizardError::NoConflict),
        };
        if self.cursor() != Some(self.last_index()) {
            return Err(self.invalid("resolve a conflict"));
        }

        match resolution {
            Resolution::KeepMine => {
                let mut request = self.submit_request()?;
                request.mode = WizardMode::Edit {
                    identifier: request.identifier.clone(),
                };
                self.phase = Phase::Submitting;
                let result = adapter.update(&request).await;
                self.finish(adapter.name(), result).map(Some)
            }
            Resolution::TakeTheirs => {
                let remote = failure
                    .remote_entity()
                    .ok_or_else(|| WizardError::Submission(failure.clone()))?;
                let theirs = self.kind.context_from_entity(remote)?;
                if let Some(identifier) = self.kind.identifier(&theirs) {
                    self.mode = WizardMode::Edit { identifier };
                }
                self.context.merge_in(theirs.into_map());
                self.last_failure = None;
                tracing::debug!(session = %self.id, "server copy loaded after conflict");
                Ok(None)
            }
        }
    }
}
