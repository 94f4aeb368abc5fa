//! Step executor - the individual provisioning operations

use crate::{
    collaborators::{CollaboratorError, Collaborators},
    core::{
        ChartRelease, ManifestSpec, NamespaceState, PrereqError, ProvisionError,
        ProvisioningStep, RetryPolicy, ScriptInvocation, SecretSpec, StepAction, StepOutcome,
    },
    execution::readiness::{poll_until, poll_until_deadline, PollExhausted},
};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Verb and resource used to confirm a new namespace is usable
pub const NAMESPACE_PROBE: (&str, &str) = ("create", "pods");

/// Slack given to `kubectl wait` on top of its own timeout
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Executes provisioning operations against the collaborators
#[derive(Clone)]
pub struct StepExecutor {
    collaborators: Collaborators,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Execute a single step and return its outcome
    pub async fn execute(&self, step: &ProvisioningStep) -> Result<StepOutcome, ProvisionError> {
        let retry = step.retry.unwrap_or_default();

        match &step.action {
            StepAction::EnsureNamespace { namespace } => self
                .ensure_namespace(namespace, &retry)
                .await
                .map(|state| StepOutcome::Namespace { state }),
            StepAction::ApplyManifest(manifest) => self
                .apply_manifest(manifest)
                .await
                .map(|_| StepOutcome::ManifestApplied),
            StepAction::InstallOrUpgradeChart(release) => self
                .install_or_upgrade_chart(release)
                .await
                .map(|_| StepOutcome::ChartDeployed),
            StepAction::CreateOrUpdateSecret(secret) => self
                .create_or_update_secret(secret)
                .await
                .map(|_| StepOutcome::SecretApplied),
            StepAction::WaitForReady {
                deployment,
                namespace,
                timeout,
            } => self
                .wait_for_deployment_ready(deployment, namespace, *timeout, step.retry.as_ref())
                .await
                .map(|attempts| StepOutcome::Ready { attempts }),
            StepAction::RunExternalScript(script) => self
                .run_external_script(script)
                .await
                .map(|_| StepOutcome::ScriptCompleted),
        }
    }

    /// Verify every tool is invocable, reporting all missing ones together
    pub async fn check_prerequisites(&self, tools: &BTreeSet<String>) -> Result<(), PrereqError> {
        let mut missing = Vec::new();

        for tool in tools {
            if self.collaborators.tools.is_invocable(tool).await {
                debug!("Prerequisite {} found", tool);
            } else {
                warn!("Prerequisite {} not found", tool);
                missing.push(tool.clone());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PrereqError { missing })
        }
    }

    /// Create the namespace if absent, then wait until it is usable
    pub async fn ensure_namespace(
        &self,
        name: &str,
        policy: &RetryPolicy,
    ) -> Result<NamespaceState, ProvisionError> {
        let cluster = self.collaborators.cluster.as_ref();
        let target = format!("namespace/{}", name);

        let exists = cluster
            .namespace_exists(name)
            .await
            .map_err(|e| apply_error(&target, e))?;
        if exists {
            info!("Namespace {} already exists", name);
            return Ok(NamespaceState::AlreadyExists);
        }

        info!("Creating namespace {}", name);
        cluster
            .create_namespace(name)
            .await
            .map_err(|e| apply_error(&target, e))?;

        let (verb, resource) = NAMESPACE_PROBE;
        let operation = format!("can-i {} {} -n {}", verb, resource, name);
        match poll_until(policy, &operation, move || cluster.can_i(verb, resource, name)).await {
            Ok(attempts) => {
                debug!("Namespace {} usable after {} attempts", name, attempts);
                Ok(NamespaceState::Created)
            }
            Err(PollExhausted { attempts, last_error }) => {
                if let Some(e) = last_error {
                    warn!("Last readiness check for namespace {} failed: {}", name, e);
                }
                Err(ProvisionError::NotReadyError {
                    namespace: name.to_string(),
                    attempts,
                })
            }
        }
    }

    /// Upsert a secret so repeated calls converge
    pub async fn create_or_update_secret(&self, secret: &SecretSpec) -> Result<(), ProvisionError> {
        let target = format!("secret/{} -n {}", secret.name, secret.namespace);
        info!("Applying {}", target);
        self.collaborators
            .cluster
            .apply_secret(secret)
            .await
            .map_err(|e| apply_error(&target, e))
    }

    /// Declaratively apply a manifest file or URL
    pub async fn apply_manifest(&self, manifest: &ManifestSpec) -> Result<(), ProvisionError> {
        info!("Applying manifest {}", manifest.source);
        self.collaborators
            .cluster
            .apply_manifest(manifest)
            .await
            .map_err(|e| apply_error(&manifest.source, e))
    }

    /// Install or upgrade a chart release, bounded by the release timeout
    pub async fn install_or_upgrade_chart(&self, release: &ChartRelease) -> Result<(), ProvisionError> {
        info!(
            "Installing or upgrading {} from {} in {} (timeout {}s)",
            release.release,
            release.chart,
            release.namespace,
            release.timeout.as_secs()
        );

        let chart_error = |cause: String| ProvisionError::ChartError {
            release: release.release.clone(),
            cause,
        };

        match timeout(release.timeout, self.collaborators.charts.install_or_upgrade(release)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Chart release {} failed: {}", release.release, e);
                Err(chart_error(e.to_string()))
            }
            Err(_) => {
                error!("Chart release {} timed out after {}s", release.release, release.timeout.as_secs());
                Err(chart_error(format!(
                    "timed out after {} seconds",
                    release.timeout.as_secs()
                )))
            }
        }
    }

    /// Block until the deployment reports Available, or time out
    ///
    /// With a retry policy the wait is re-issued up to the attempt ceiling,
    /// which covers deployments that do not exist yet when the step starts.
    /// Every attempt shares one deadline and no attempt starts after it, so
    /// the step never blocks much longer than `wait`.
    pub async fn wait_for_deployment_ready(
        &self,
        deployment: &str,
        namespace: &str,
        wait: Duration,
        retry: Option<&RetryPolicy>,
    ) -> Result<u32, ProvisionError> {
        let resource = format!("deployment/{}", deployment);
        info!("Waiting up to {}s for {} in {}", wait.as_secs(), resource, namespace);

        let cluster = self.collaborators.cluster.as_ref();
        let target = resource.as_str();
        let deadline = Instant::now() + wait;
        let probe = move || async move {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match timeout(
                remaining + WAIT_GRACE,
                cluster.wait_for_condition(target, "Available", namespace, remaining),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout(remaining)),
            }
        };

        let policy = retry.copied().unwrap_or_else(|| RetryPolicy::fixed(1, Duration::ZERO));
        poll_until_deadline(&policy, &format!("wait {}", resource), deadline, probe)
            .await
            .map_err(|PollExhausted { last_error, .. }| {
                let err = ProvisionError::TimeoutError {
                    resource: format!("{} -n {}", resource, namespace),
                    timeout: wait,
                    cause: last_error.map(|e| e.to_string()),
                };
                error!("{}", err);
                err
            })
    }

    /// Run an external command as a step
    pub async fn run_external_script(&self, script: &ScriptInvocation) -> Result<(), ProvisionError> {
        info!("Running {}", script.command);
        let output = self
            .collaborators
            .scripts
            .run(script)
            .await
            .map_err(|e| ProvisionError::ScriptError {
                command: script.command.clone(),
                cause: e.to_string(),
            })?;
        debug!("Output of {}: {}", script.command, output.trim());
        Ok(())
    }
}

fn apply_error(target: &str, e: CollaboratorError) -> ProvisionError {
    error!("Apply failed for {}: {}", target, e);
    ProvisionError::ApplyError {
        target: target.to_string(),
        cause: e.to_string(),
    }
}
