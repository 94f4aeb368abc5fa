//! External script runner - runs a command as a provisioning step

use crate::collaborators::{CollaboratorError, ScriptRunner, ToolCommand};
use crate::core::ScriptInvocation;
use async_trait::async_trait;
use tracing::debug;

/// Runs scripts as child processes
///
/// The child is killed if the step's timeout elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn command(script: &ScriptInvocation) -> ToolCommand {
        ToolCommand::new(&script.command)
            .args(script.args.iter().cloned())
            .envs(&script.env)
            .current_dir(script.working_dir.clone())
            .timeout(script.timeout)
    }
}

#[async_trait]
impl ScriptRunner for SubprocessRunner {
    async fn run(&self, script: &ScriptInvocation) -> Result<String, CollaboratorError> {
        let output = Self::command(script).run().await?;
        debug!("{} returned {} bytes of output", script.command, output.len());
        Ok(output)
    }
}
