//! Execution state models

use crate::core::error::ProvisionError;
use crate::core::step::ActionKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Run has not started
    NotStarted,
    /// Steps are executing
    Running,
    /// Every step succeeded
    Succeeded,
    /// A step failed; no later step was executed
    Failed { step: String, cause: ProvisionError },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed { .. })
    }
}

/// Result of ensuring a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceState {
    Created,
    AlreadyExists,
}

/// Successful outcome of a single step
///
/// No-op outcomes such as [`NamespaceState::AlreadyExists`] are successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Namespace { state: NamespaceState },
    SecretApplied,
    ManifestApplied,
    ChartDeployed,
    Ready { attempts: u32 },
    ScriptCompleted,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Namespace {
                state: NamespaceState::Created,
            } => f.write_str("created"),
            StepOutcome::Namespace {
                state: NamespaceState::AlreadyExists,
            } => f.write_str("already exists"),
            StepOutcome::SecretApplied | StepOutcome::ManifestApplied => f.write_str("applied"),
            StepOutcome::ChartDeployed => f.write_str("deployed"),
            StepOutcome::Ready { attempts: 1 } => f.write_str("ready"),
            StepOutcome::Ready { attempts } => write!(f, "ready after {} attempts", attempts),
            StepOutcome::ScriptCompleted => f.write_str("completed"),
        }
    }
}

/// Report line for one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub action: ActionKind,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    /// Outcome recorded for a step, if it ran
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == step).map(|s| &s.outcome)
    }
}
