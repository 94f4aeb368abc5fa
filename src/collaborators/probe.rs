//! Tool-availability probe

use crate::collaborators::{ToolCommand, ToolProbe};
use async_trait::async_trait;
use tracing::debug;

/// Checks tools with `which`, the way an operator would at a shell
#[derive(Debug, Clone, Copy, Default)]
pub struct PathProbe;

#[async_trait]
impl ToolProbe for PathProbe {
    async fn is_invocable(&self, tool: &str) -> bool {
        let found = match ToolCommand::new("which").arg(tool).output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("Probe for {} failed: {}", tool, e);
                false
            }
        };
        debug!("Tool {} {}", tool, if found { "found" } else { "missing" });
        found
    }
}
