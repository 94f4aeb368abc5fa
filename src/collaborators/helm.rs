//! Helm-backed chart installer

use crate::collaborators::{ChartInstaller, CollaboratorError, ToolCommand};
use crate::core::ChartRelease;
use async_trait::async_trait;

/// Chart installer that shells out to `helm`
#[derive(Debug, Clone)]
pub struct HelmClient {
    /// Path to helm executable
    binary: String,

    kubeconfig: Option<String>,
}

impl Default for HelmClient {
    fn default() -> Self {
        Self::new("helm".to_string())
    }
}

impl HelmClient {
    pub fn new(binary: String) -> Self {
        Self {
            binary,
            kubeconfig: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<String>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// `helm upgrade --install`, which creates or upgrades the release in one call
    pub fn upgrade_install_command(&self, release: &ChartRelease) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.binary).args([
            "upgrade",
            "--install",
            release.release.as_str(),
            release.chart.as_str(),
            "--namespace",
            release.namespace.as_str(),
        ]);

        if let Some(path) = &self.kubeconfig {
            cmd = cmd.args(["--kubeconfig", path.as_str()]);
        }
        if let Some(version) = &release.version {
            cmd = cmd.args(["--version", version.as_str()]);
        }
        for file in &release.values_files {
            cmd = cmd.args(["--values", file.as_str()]);
        }
        for (key, value) in &release.values {
            cmd = cmd.arg("--set").arg(format!("{}={}", key, escape_set_value(value)));
        }

        cmd.arg("--wait")
            .arg("--timeout")
            .arg(format!("{}s", release.timeout.as_secs()))
    }
}

/// Escape a value so helm's `--set` parser takes it literally
///
/// `,` separates assignments and a leading `{` starts a list.
pub fn escape_set_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' | ',' => escaped.push('\\'),
            '{' if i == 0 => escaped.push('\\'),
            _ => {}
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ChartInstaller for HelmClient {
    async fn install_or_upgrade(&self, release: &ChartRelease) -> Result<(), CollaboratorError> {
        self.upgrade_install_command(release).run().await?;
        Ok(())
    }
}
