//! Pipeline run domain model

use crate::core::{
    context::Context,
    error::ProvisionError,
    state::{PipelineReport, RunStatus, StepReport},
    step::ProvisioningStep,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One execution of an ordered list of provisioning steps
///
/// Built once per invocation, consumed top to bottom and discarded once it
/// reaches a terminal status. There is no resumption: re-running relies on
/// every step being idempotent.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub name: String,

    /// Steps in execution order
    pub steps: Vec<ProvisioningStep>,

    /// Current status
    pub status: RunStatus,

    /// Reports of steps that completed, in order
    pub completed: Vec<StepReport>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    context: Context,
    extra_tools: Vec<String>,
}

impl PipelineRun {
    pub fn new(
        name: String,
        steps: Vec<ProvisioningStep>,
        context: Context,
        extra_tools: Vec<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            name,
            steps,
            status: RunStatus::NotStarted,
            completed: Vec::new(),
            started_at: None,
            finished_at: None,
            context,
            extra_tools,
        }
    }

    /// The validated context this run was built from
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&ProvisioningStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Every external tool the steps need, sorted and de-duplicated
    pub fn required_tools(&self) -> BTreeSet<String> {
        self.steps
            .iter()
            .flat_map(|s| s.action.required_tools())
            .chain(self.extra_tools.iter().cloned())
            .collect()
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn record(&mut self, report: StepReport) {
        self.completed.push(report);
    }

    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, step: &str, cause: ProvisionError) {
        self.status = RunStatus::Failed {
            step: step.to_string(),
            cause,
        };
        self.finished_at = Some(Utc::now());
    }

    /// Snapshot of the run for reporting
    pub fn report(&self) -> PipelineReport {
        let finished_at = self.finished_at.unwrap_or_else(Utc::now);
        PipelineReport {
            run_id: self.run_id,
            pipeline: self.name.clone(),
            status: self.status.clone(),
            started_at: self.started_at.unwrap_or(finished_at),
            finished_at,
            steps: self.completed.clone(),
        }
    }

    /// Fraction of steps completed (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed.len() as f64 / self.steps.len() as f64
    }
}
