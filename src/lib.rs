//! provisioner - readiness-gated, idempotent cluster provisioning pipelines

pub mod cli;
pub mod collaborators;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use collaborators::{ChartInstaller, ClusterApi, CollaboratorError, Collaborators, EnvSource, ScriptRunner, ToolProbe};
pub use core::{Context, Overrides, PipelineError, PipelineReport, PipelineRun, ProvisionError, RunStatus};
pub use execution::{ExecutionEvent, Orchestrator};
