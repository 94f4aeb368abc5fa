//! Error types for provisioning runs

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Invalid or missing input, caught before any external call is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid config '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("malformed pipeline file: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// One or more external tools could not be invoked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required tools: {}", missing.join(", "))]
pub struct PrereqError {
    /// Every missing tool, sorted
    pub missing: Vec<String>,
}

/// Failure of a single provisioning action against a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisionError {
    #[error("apply failed for {target}: {cause}")]
    ApplyError { target: String, cause: String },

    #[error("chart release '{release}' failed: {cause}")]
    ChartError { release: String, cause: String },

    #[error(
        "{resource} not ready after {}s{}",
        .timeout.as_secs(),
        .cause.as_ref().map(|c| format!(": {}", c)).unwrap_or_default()
    )]
    TimeoutError {
        resource: String,
        timeout: Duration,
        /// Last error reported while waiting, if the final attempt failed
        cause: Option<String>,
    },

    #[error("namespace '{namespace}' not usable after {attempts} attempts")]
    NotReadyError { namespace: String, attempts: u32 },

    #[error("script '{command}' failed: {cause}")]
    ScriptError { command: String, cause: String },
}

/// Error returned from a full pipeline invocation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prereq(#[from] PrereqError),

    #[error("step '{step}' failed")]
    StepFailed {
        step: String,
        #[source]
        source: ProvisionError,
    },

    #[error("pipeline run has already been executed")]
    AlreadyExecuted,
}

impl PipelineError {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::Prereq(_) => 3,
            PipelineError::StepFailed { .. } => 4,
            PipelineError::AlreadyExecuted => 1,
        }
    }
}
