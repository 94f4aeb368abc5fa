//! External collaborators the orchestrator drives
//!
//! The orchestrator core never shells out directly. It talks to these traits,
//! which have subprocess-backed implementations for production use and are
//! replaced by in-memory fakes in tests.

pub mod command;
pub mod env;
pub mod helm;
pub mod kubectl;
pub mod probe;
pub mod script;

use crate::core::{ChartRelease, ManifestSpec, ScriptInvocation, SecretSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use command::ToolCommand;
pub use env::{ChainedEnv, EnvSource, MapEnv, ProcessEnv};
pub use helm::HelmClient;
pub use kubectl::KubectlClient;
pub use probe::PathProbe;
pub use script::SubprocessRunner;

/// Error types for collaborator calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    #[error("failed to run {command}: {message}")]
    Spawn { command: String, message: String },

    #[error("timeout after {} seconds", .0.as_secs())]
    Timeout(Duration),
}

/// Cluster-state API: query, upsert and wait semantics only
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool, CollaboratorError>;

    async fn create_namespace(&self, name: &str) -> Result<(), CollaboratorError>;

    /// Whether the current identity may perform `verb` on `resource` in `namespace`
    async fn can_i(&self, verb: &str, resource: &str, namespace: &str) -> Result<bool, CollaboratorError>;

    /// Create or update a secret so that it matches `secret`
    async fn apply_secret(&self, secret: &SecretSpec) -> Result<(), CollaboratorError>;

    async fn apply_manifest(&self, manifest: &ManifestSpec) -> Result<(), CollaboratorError>;

    /// Block until `condition` holds on `resource`; `Ok(false)` when `timeout` elapses first
    async fn wait_for_condition(
        &self,
        resource: &str,
        condition: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<bool, CollaboratorError>;
}

/// Chart-installer API
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Install the release, or upgrade it if it already exists
    async fn install_or_upgrade(&self, release: &ChartRelease) -> Result<(), CollaboratorError>;
}

/// Tool-availability probe
#[async_trait]
pub trait ToolProbe: Send + Sync {
    async fn is_invocable(&self, tool: &str) -> bool;
}

/// Runs external scripts and commands
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run to completion and return stdout
    async fn run(&self, script: &ScriptInvocation) -> Result<String, CollaboratorError>;
}

/// The full set of collaborators an orchestrator needs
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterApi>,
    pub charts: Arc<dyn ChartInstaller>,
    pub tools: Arc<dyn ToolProbe>,
    pub scripts: Arc<dyn ScriptRunner>,
}

impl Collaborators {
    /// Subprocess-backed collaborators using the given binaries
    pub fn subprocess(kubectl: KubectlClient, helm: HelmClient) -> Self {
        Self {
            cluster: Arc::new(kubectl),
            charts: Arc::new(helm),
            tools: Arc::new(PathProbe),
            scripts: Arc::new(SubprocessRunner),
        }
    }
}
