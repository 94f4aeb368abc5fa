//! kubectl-backed cluster-state API

use crate::collaborators::{ClusterApi, CollaboratorError, ToolCommand};
use crate::core::{ManifestSpec, SecretSpec};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Cluster client that shells out to `kubectl`
#[derive(Debug, Clone)]
pub struct KubectlClient {
    /// Path to kubectl executable
    binary: String,

    /// Optional kubeconfig passed as `--kubeconfig`
    kubeconfig: Option<String>,

    /// Wall-clock limit for a single kubectl call
    request_timeout: Duration,
}

/// Default limit for one kubectl call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new("kubectl".to_string())
    }
}

impl KubectlClient {
    pub fn new(binary: String) -> Self {
        Self {
            binary,
            kubeconfig: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<String>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_request_timeout(mut self, limit: Duration) -> Self {
        self.request_timeout = limit;
        self
    }

    fn command<I, S>(&self, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = ToolCommand::new(&self.binary).timeout(self.request_timeout);
        let cmd = match &self.kubeconfig {
            Some(path) => cmd.args(["--kubeconfig".to_string(), path.clone()]),
            None => cmd,
        };
        cmd.args(args)
    }

    pub fn namespace_command(&self, name: &str) -> ToolCommand {
        self.command(["get", "namespace", name, "-o", "name"])
    }

    pub fn can_i_command(&self, verb: &str, resource: &str, namespace: &str) -> ToolCommand {
        self.command(["auth", "can-i", verb, resource, "-n", namespace])
    }

    pub fn apply_manifest_command(&self, manifest: &ManifestSpec) -> ToolCommand {
        let cmd = self.command(["apply", "-f", manifest.source.as_str()]);
        match &manifest.namespace {
            Some(ns) => cmd.args(["-n", ns.as_str()]),
            None => cmd,
        }
    }

    pub fn wait_command(
        &self,
        resource: &str,
        condition: &str,
        namespace: &str,
        timeout: Duration,
    ) -> ToolCommand {
        self.command([
            "wait".to_string(),
            format!("--for=condition={}", condition),
            resource.to_string(),
            "-n".to_string(),
            namespace.to_string(),
            format!("--timeout={}s", timeout.as_secs()),
        ])
        // kubectl enforces the wait itself; the request limit covers the rest
        .timeout(timeout.saturating_add(self.request_timeout))
    }
}

/// Desired state of a secret as a manifest for `kubectl apply -f -`
pub fn render_secret(secret: &SecretSpec) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {
            "name": secret.name,
            "namespace": secret.namespace,
        },
        "stringData": secret.data,
    })
}

#[async_trait]
impl ClusterApi for KubectlClient {
    async fn namespace_exists(&self, name: &str) -> Result<bool, CollaboratorError> {
        let cmd = self.namespace_command(name);
        let output = cmd.output().await?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("NotFound") || stderr.contains("not found") {
            debug!("Namespace {} not found", name);
            return Ok(false);
        }

        Err(CollaboratorError::CommandFailed {
            command: cmd.display(),
            message: stderr.trim().to_string(),
        })
    }

    async fn create_namespace(&self, name: &str) -> Result<(), CollaboratorError> {
        let cmd = self.command(["create", "namespace", name]);
        let output = cmd.output().await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        // Lost a race with a concurrent creator: desired state holds
        if output.status.success() || stderr.contains("AlreadyExists") {
            return Ok(());
        }

        Err(CollaboratorError::CommandFailed {
            command: cmd.display(),
            message: stderr.trim().to_string(),
        })
    }

    async fn can_i(&self, verb: &str, resource: &str, namespace: &str) -> Result<bool, CollaboratorError> {
        let cmd = self.can_i_command(verb, resource, namespace);
        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match stdout.trim() {
            "yes" => Ok(true),
            answer if answer.starts_with("no") => Ok(false),
            _ => Err(CollaboratorError::CommandFailed {
                command: cmd.display(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn apply_secret(&self, secret: &SecretSpec) -> Result<(), CollaboratorError> {
        let manifest = render_secret(secret);
        self.command(["apply", "-f", "-"])
            .stdin(manifest.to_string().into_bytes())
            .run()
            .await?;
        Ok(())
    }

    async fn apply_manifest(&self, manifest: &ManifestSpec) -> Result<(), CollaboratorError> {
        self.apply_manifest_command(manifest).run().await?;
        Ok(())
    }

    async fn wait_for_condition(
        &self,
        resource: &str,
        condition: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<bool, CollaboratorError> {
        let cmd = self.wait_command(resource, condition, namespace, timeout);
        let output = cmd.output().await?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timed out") {
            return Ok(false);
        }

        Err(CollaboratorError::CommandFailed {
            command: cmd.display(),
            message: stderr.trim().to_string(),
        })
    }
}
