//! Subprocess invocation shared by the CLI-backed collaborators

use crate::collaborators::CollaboratorError;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A fully described external command
#[derive(Debug, Clone, Default)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
    env: BTreeMap<String, String>,
    current_dir: Option<String>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bytes written to the child's stdin
    ///
    /// Secret payloads go through stdin so they never appear in argv.
    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: Option<String>) -> Self {
        self.current_dir = dir;
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// Command line as a user would type it
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run and capture output regardless of exit status
    pub async fn output(&self) -> Result<Output, CollaboratorError> {
        debug!("Running: {}", self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| CollaboratorError::Spawn {
            command: self.display(),
            message: e.to_string(),
        })?;

        // Feed stdin while draining stdout and stderr so neither side can stall
        let input = self.stdin.clone();
        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(input), Some(mut pipe)) = (input, pipe) {
                pipe.write_all(&input).await?;
                // Close stdin so the child sees EOF
                drop(pipe);
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async move { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match self.timeout {
            Some(limit) => timeout(limit, exchange)
                .await
                .map_err(|_| CollaboratorError::Timeout(limit))?,
            None => exchange.await,
        };

        let output = output.map_err(|e| CollaboratorError::Spawn {
            command: self.display(),
            message: e.to_string(),
        })?;

        match fed {
            Ok(()) => {}
            // Child exited without reading all of its input; its exit status decides
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("{} closed stdin early", self.program);
            }
            Err(e) => {
                return Err(CollaboratorError::Spawn {
                    command: self.display(),
                    message: format!("failed to write stdin: {}", e),
                })
            }
        }

        Ok(output)
    }

    /// Run, requiring a zero exit status, and return stdout
    pub async fn run(&self) -> Result<String, CollaboratorError> {
        let output = self.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.program, exit_code, stderr.trim());
            return Err(CollaboratorError::CommandFailed {
                command: self.display(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
