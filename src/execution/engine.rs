//! Orchestrator - runs a provisioning pipeline top to bottom

use crate::{
    collaborators::Collaborators,
    core::{
        PipelineError, PipelineReport, PipelineRun, PrereqError, RunStatus, StepOutcome,
        StepReport,
    },
    execution::StepExecutor,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        total: usize,
        step: String,
        description: String,
    },
    StepSucceeded {
        step: String,
        outcome: StepOutcome,
        duration: Duration,
    },
    StepFailed {
        step: String,
        error: String,
    },
    PipelineFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Sequential, fail-fast pipeline orchestrator
pub struct Orchestrator {
    executor: StepExecutor,
    event_handlers: Vec<EventHandler>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            executor: StepExecutor::new(collaborators),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.add_event_handler(handler);
        self
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Verify every tool the run needs before anything is mutated
    pub async fn check_prerequisites(&self, tools: &BTreeSet<String>) -> Result<(), PrereqError> {
        self.executor.check_prerequisites(tools).await
    }

    /// Check prerequisites, then run the pipeline
    pub async fn provision(&self, run: &mut PipelineRun) -> Result<PipelineReport, PipelineError> {
        if run.status != RunStatus::NotStarted {
            return Err(PipelineError::AlreadyExecuted);
        }

        let tools = run.required_tools();
        info!("Checking {} prerequisite tools", tools.len());
        self.check_prerequisites(&tools).await?;

        self.run_pipeline(run).await
    }

    /// Execute every step in order, stopping at the first failure
    ///
    /// On failure the run's status records the failing step and its cause and
    /// no later step is executed.
    pub async fn run_pipeline(&self, run: &mut PipelineRun) -> Result<PipelineReport, PipelineError> {
        if run.status != RunStatus::NotStarted {
            warn!("Refusing to re-execute run {}", run.run_id);
            return Err(PipelineError::AlreadyExecuted);
        }

        let total = run.steps.len();
        info!("Starting pipeline {} ({}) with {} steps", run.name, run.run_id, total);
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id: run.run_id,
            pipeline_name: run.name.clone(),
            total_steps: total,
        });

        run.start();

        for index in 0..total {
            let step = run.steps[index].clone();
            let description = step.action.describe();

            info!("[{}/{}] {}: {}", index + 1, total, step.name, description);
            self.emit_event(ExecutionEvent::StepStarted {
                index,
                total,
                step: step.name.clone(),
                description,
            });

            let started = Instant::now();
            match self.executor.execute(&step).await {
                Ok(outcome) => {
                    let duration = started.elapsed();
                    info!("Step {} {} in {:?}", step.name, outcome, duration);
                    run.record(StepReport {
                        name: step.name.clone(),
                        action: step.action.kind(),
                        outcome: outcome.clone(),
                        duration_ms: duration.as_millis() as u64,
                    });
                    self.emit_event(ExecutionEvent::StepSucceeded {
                        step: step.name,
                        outcome,
                        duration,
                    });
                }
                Err(cause) => {
                    error!("Step {} failed: {}", step.name, cause);
                    run.fail(&step.name, cause.clone());
                    self.emit_event(ExecutionEvent::StepFailed {
                        step: step.name.clone(),
                        error: cause.to_string(),
                    });
                    self.emit_event(ExecutionEvent::PipelineFinished {
                        run_id: run.run_id,
                        status: run.status.clone(),
                    });
                    return Err(PipelineError::StepFailed {
                        step: step.name,
                        source: cause,
                    });
                }
            }
        }

        run.succeed();
        info!("Pipeline {} succeeded", run.name);
        self.emit_event(ExecutionEvent::PipelineFinished {
            run_id: run.run_id,
            status: run.status.clone(),
        });

        Ok(run.report())
    }
}
