//! Phase orchestration for deploy and teardown runs.
//!
//! A `PipelineRun` is a pure state machine: the command layer runs each
//! phase's external work, then reports the outcome here. Phases execute
//! strictly in declaration order. Each phase carries a failure policy that
//! decides whether its failure aborts the run or degrades it to a partial
//! success.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::error::{ObservError, Result};

// ---------------------------------------------------------------------------
// Phase names
// ---------------------------------------------------------------------------

pub const PLAN: &str = "infrastructure-plan";
pub const CONFIRM: &str = "user-confirmation";
pub const APPLY: &str = "infrastructure-apply";
pub const EXTRACT_OUTPUTS: &str = "extract-outputs";
pub const CONFIGURE_ACCESS: &str = "configure-cluster-access";
pub const VERIFY_ACCESS: &str = "verify-cluster-access";
pub const DEPLOY_OTEL: &str = "deploy-opentelemetry";
pub const DEPLOY_MICROSERVICES: &str = "deploy-microservices";
pub const WAIT_READY: &str = "wait-ready";
pub const NOTIFY: &str = "notify";
pub const DELETE_NAMESPACES: &str = "delete-workload-namespaces";
pub const DESTROY: &str = "infrastructure-destroy";
pub const STATE_CLEANUP: &str = "state-cleanup";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What a phase failure does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failure stops the pipeline.
    Abort,
    /// Failure is recorded as a warning and the run continues.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Pending,
    Running,
    Succeeded,
    /// The external operation found the world already in its target state.
    /// Success-equivalent for pipeline flow, reported distinctly.
    Settled,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Settled => "already settled",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    InProgress,
    Completed,
    Aborted,
}

/// Why an aborted pipeline stopped. Declining the confirmation prompt is
/// not a failure and is reported separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    PhaseFailed { phase: String },
    UserDeclined,
}

/// What the command layer reports after running a phase's work.
#[derive(Debug, Clone)]
pub enum PhaseOutcome {
    Success,
    /// Hard failure with an operator-facing diagnostic and, when known, the
    /// exact command to re-run after fixing the cause.
    Failed {
        diagnostic: String,
        retry_command: Option<String>,
    },
    /// The operation found the world already in its target state (resource
    /// already exists, or already gone). Treated as success.
    Conflict { diagnostic: String },
    /// The operation ran out of time. Downgraded to a warning where the
    /// policy allows continuing.
    TimedOut { diagnostic: String },
    /// The user declined the confirmation prompt.
    Declined,
}

/// Whether the pipeline should move to its next phase or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next,
    Halt,
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PhaseRecord {
    pub name: &'static str,
    pub policy: FailurePolicy,
    pub status: PhaseStatus,
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct PipelineRun {
    name: &'static str,
    state: PipelineState,
    phases: Vec<PhaseRecord>,
    cursor: usize,
    outputs: BTreeMap<String, String>,
    warnings: Vec<String>,
    abort: Option<AbortReason>,
    retry_command: Option<String>,
}

impl PipelineRun {
    fn new(name: &'static str, plan: &[(&'static str, FailurePolicy)]) -> Self {
        let phases = plan
            .iter()
            .map(|(name, policy)| PhaseRecord {
                name,
                policy: *policy,
                status: PhaseStatus::Pending,
                detail: None,
            })
            .collect();
        Self {
            name,
            state: PipelineState::NotStarted,
            phases,
            cursor: 0,
            outputs: BTreeMap::new(),
            warnings: Vec::new(),
            abort: None,
            retry_command: None,
        }
    }

    /// The deploy pipeline, in execution order.
    pub fn deploy() -> Self {
        Self::new(
            "deploy",
            &[
                (PLAN, FailurePolicy::Abort),
                (CONFIRM, FailurePolicy::Abort),
                (APPLY, FailurePolicy::Abort),
                (EXTRACT_OUTPUTS, FailurePolicy::Abort),
                (CONFIGURE_ACCESS, FailurePolicy::Abort),
                (VERIFY_ACCESS, FailurePolicy::Abort),
                (DEPLOY_OTEL, FailurePolicy::Abort),
                (DEPLOY_MICROSERVICES, FailurePolicy::Abort),
                (WAIT_READY, FailurePolicy::Continue),
                (NOTIFY, FailurePolicy::Continue),
            ],
        )
    }

    /// The teardown pipeline. Namespace deletion and state cleanup press on
    /// past failures so a half-broken cluster can still be destroyed.
    pub fn teardown() -> Self {
        Self::new(
            "teardown",
            &[
                (DELETE_NAMESPACES, FailurePolicy::Continue),
                (CONFIRM, FailurePolicy::Abort),
                (DESTROY, FailurePolicy::Abort),
                (STATE_CLEANUP, FailurePolicy::Continue),
            ],
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    /// The phase the cursor points at, if the run is not finished.
    pub fn current_phase(&self) -> Option<&'static str> {
        self.phases.get(self.cursor).map(|p| p.name)
    }

    /// Mark the current phase as running. Errors if the named phase is not
    /// the one the cursor points at, or the run is already over.
    pub fn begin(&mut self, phase: &str) -> Result<()> {
        match self.state {
            PipelineState::Completed | PipelineState::Aborted => {
                return Err(ObservError::PhaseOrder {
                    phase: phase.to_string(),
                    reason: "pipeline already finished".to_string(),
                });
            }
            PipelineState::NotStarted => self.state = PipelineState::InProgress,
            PipelineState::InProgress => {}
        }
        let current = self.phases.get(self.cursor).ok_or_else(|| ObservError::PhaseOrder {
            phase: phase.to_string(),
            reason: "no phases remaining".to_string(),
        })?;
        if current.name != phase {
            return Err(ObservError::PhaseOrder {
                phase: phase.to_string(),
                reason: format!("expected '{}' next", current.name),
            });
        }
        self.phases[self.cursor].status = PhaseStatus::Running;
        Ok(())
    }

    /// Record the outcome of the current phase and decide whether to
    /// continue. Must follow a `begin` for the same phase.
    pub fn finish(&mut self, phase: &str, outcome: PhaseOutcome) -> Result<Advance> {
        let current = self.phases.get(self.cursor).ok_or_else(|| ObservError::PhaseOrder {
            phase: phase.to_string(),
            reason: "no phase in progress".to_string(),
        })?;
        if current.name != phase || current.status != PhaseStatus::Running {
            return Err(ObservError::PhaseOrder {
                phase: phase.to_string(),
                reason: "phase was not started".to_string(),
            });
        }
        let policy = current.policy;

        match outcome {
            PhaseOutcome::Success => {
                self.phases[self.cursor].status = PhaseStatus::Succeeded;
                Ok(self.advance())
            }
            PhaseOutcome::Conflict { diagnostic } => {
                // Already in the target state. Success-equivalent for flow,
                // but the report must not present the no-op as a plain
                // success.
                warn!(phase, %diagnostic, "resource already in target state");
                self.phases[self.cursor].status = PhaseStatus::Settled;
                self.phases[self.cursor].detail = Some(diagnostic);
                Ok(self.advance())
            }
            PhaseOutcome::TimedOut { diagnostic } => {
                self.phases[self.cursor].status = PhaseStatus::Failed;
                self.phases[self.cursor].detail = Some(diagnostic.clone());
                match policy {
                    FailurePolicy::Continue => {
                        self.warnings.push(format!("{phase}: {diagnostic}"));
                        Ok(self.advance())
                    }
                    FailurePolicy::Abort => {
                        self.abort(AbortReason::PhaseFailed { phase: phase.to_string() });
                        Ok(Advance::Halt)
                    }
                }
            }
            PhaseOutcome::Failed { diagnostic, retry_command } => {
                self.phases[self.cursor].status = PhaseStatus::Failed;
                self.phases[self.cursor].detail = Some(diagnostic.clone());
                match policy {
                    FailurePolicy::Continue => {
                        self.warnings.push(format!("{phase}: {diagnostic}"));
                        Ok(self.advance())
                    }
                    FailurePolicy::Abort => {
                        self.retry_command = retry_command;
                        self.abort(AbortReason::PhaseFailed { phase: phase.to_string() });
                        Ok(Advance::Halt)
                    }
                }
            }
            PhaseOutcome::Declined => {
                self.phases[self.cursor].status = PhaseStatus::Skipped;
                self.abort(AbortReason::UserDeclined);
                Ok(Advance::Halt)
            }
        }
    }

    /// Skip a phase the operator toggled off. Only valid for the phase the
    /// cursor points at.
    pub fn skip(&mut self, phase: &str) -> Result<Advance> {
        self.begin(phase)?;
        self.phases[self.cursor].status = PhaseStatus::Skipped;
        Ok(self.advance())
    }

    fn advance(&mut self) -> Advance {
        self.cursor += 1;
        if self.cursor >= self.phases.len() {
            self.state = PipelineState::Completed;
            Advance::Halt
        } else {
            Advance::Next
        }
    }

    fn abort(&mut self, reason: AbortReason) {
        self.state = PipelineState::Aborted;
        self.abort = Some(reason);
    }

    /// Stash a value produced by one phase for use by later phases.
    pub fn record_output(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.outputs.insert(key.into(), value.into());
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn report(&self) -> PipelineReport {
        let outcome = match &self.abort {
            Some(AbortReason::UserDeclined) => PipelineOutcome::Declined,
            Some(AbortReason::PhaseFailed { .. }) => PipelineOutcome::Aborted,
            None if !self.warnings.is_empty() => PipelineOutcome::Partial,
            None => PipelineOutcome::Success,
        };
        let failed_phase = match &self.abort {
            Some(AbortReason::PhaseFailed { phase }) => Some(phase.clone()),
            _ => None,
        };
        PipelineReport {
            pipeline: self.name,
            outcome,
            failed_phase,
            retry_command: self.retry_command.clone(),
            warnings: self.warnings.clone(),
            phases: self.phases.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every phase succeeded.
    Success,
    /// The run completed but some continue-policy phases failed.
    Partial,
    /// The user declined the confirmation prompt.
    Declined,
    /// An abort-policy phase failed.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub pipeline: &'static str,
    pub outcome: PipelineOutcome,
    pub failed_phase: Option<String>,
    pub retry_command: Option<String>,
    pub warnings: Vec<String>,
    pub phases: Vec<PhaseRecord>,
}
