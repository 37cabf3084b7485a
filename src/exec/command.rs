// src/exec/command.rs

//! Shell-command operations used by file-defined pipelines.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::exec::operation::{Operation, OperationFuture};
use crate::types::Value;

/// Runs a command through the platform shell.
///
/// - The input value, if any, is written to stdin as JSON; stdin is closed
///   right after.
/// - Stdout is parsed as JSON. Output that is not valid JSON becomes a JSON
///   string of the trimmed text; empty output becomes `null`.
/// - A non-zero exit status is an error carrying the exit code and the last
///   stderr line.
/// - The child is spawned with `kill_on_drop`, so a timed-out attempt kills
///   the process.
#[derive(Debug, Clone)]
pub struct CommandOperation {
    cmd: String,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandOperation {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn shell_command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, input: Option<Value>) -> anyhow::Result<Value> {
        debug!(cmd = %self.cmd, "starting command");

        let mut child = self
            .shell_command()
            .spawn()
            .with_context(|| format!("spawning process for command '{}'", self.cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = match input {
                Some(value) => serde_json::to_vec(&value).context("encoding task input as JSON")?,
                None => Vec::new(),
            };
            // Written from a separate task so a child that never reads stdin
            // cannot block us on a full pipe.
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(error = %e, "child closed stdin before reading input");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for command '{}'", self.cmd))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(cmd = %self.cmd, "stderr: {}", line);
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            warn!(cmd = %self.cmd, exit_code = code, "command exited unsuccessfully");
            return Err(if last_line.is_empty() {
                anyhow!("command exited with code {code}")
            } else {
                anyhow!("command exited with code {code}: {last_line}")
            });
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Operation for CommandOperation {
    fn invoke(&self, input: Option<Value>) -> OperationFuture<'_> {
        Box::pin(self.run(input))
    }

    fn describe(&self) -> String {
        self.cmd.clone()
    }
}

fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
