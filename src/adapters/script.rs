//! Upgrade adapter that runs an external script per content.
//!
//! The script receives one JSON document on stdin:
//! `{"from": "H5P.Quiz 1.0", "to": "H5P.Quiz 1.1", "params": {..}, "metadata": {..}}`
//! and must print `{"params": {..}, "metadata": {..}}` on stdout. `metadata`
//! may be omitted to keep the stored metadata.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::ParamsUpgrader;
use crate::core::{PendingContent, UpgradedContent};
use crate::domain::{ContentMetadata, LibraryVersion};

#[derive(Debug, Serialize)]
struct ScriptInput<'a> {
    from: String,
    to: String,
    params: serde_json::Value,
    metadata: &'a ContentMetadata,
}

#[derive(Debug, Deserialize)]
struct ScriptOutput {
    params: serde_json::Value,
    #[serde(default)]
    metadata: Option<ContentMetadata>,
}

/// Runs `program args...` once per content
pub struct ScriptUpgrader {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ScriptUpgrader {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Build from a shell-style command line split on whitespace
    pub fn from_command_line(command: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().context("Upgrade script command is empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn run_script(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn upgrade script '{}'", self.program))?;

        // Feed stdin while stdout and stderr drain, all under one deadline
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(input).await {
                // The script exited or closed stdin without reading everything
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!("Upgrade script closed stdin early");
                    Ok(())
                }
                other => other,
            }
        };

        let (written, output) = timeout(self.timeout, async move {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .with_context(|| {
            format!(
                "Upgrade script '{}' timed out after {:?}",
                self.program, self.timeout
            )
        })?;

        written.context("Failed to write to upgrade script stdin")?;
        let output =
            output.with_context(|| format!("Failed to wait for upgrade script '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Upgrade script '{}' failed with exit code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl ParamsUpgrader for ScriptUpgrader {
    fn name(&self) -> &str {
        "script"
    }

    async fn upgrade(
        &self,
        from: &LibraryVersion,
        to: &LibraryVersion,
        content: &PendingContent,
    ) -> Result<UpgradedContent> {
        let params: serde_json::Value = serde_json::from_str(&content.params)
            .with_context(|| format!("Content {} has invalid parameters", content.id))?;

        let input = serde_json::to_vec(&ScriptInput {
            from: from.key.to_string(),
            to: to.key.to_string(),
            params,
            metadata: &content.metadata,
        })?;

        let stdout = self.run_script(&input).await?;
        let output: ScriptOutput = serde_json::from_slice(&stdout).with_context(|| {
            format!("Upgrade script returned invalid JSON for content {}", content.id)
        })?;

        Ok(UpgradedContent {
            content_id: content.id,
            params: output.params.to_string(),
            metadata: output.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line() {
        let upgrader =
            ScriptUpgrader::from_command_line("node upgrade.js --strict", Duration::from_secs(5))
                .unwrap();
        assert_eq!(upgrader.program, "node");
        assert_eq!(upgrader.args, vec!["upgrade.js", "--strict"]);
        assert_eq!(upgrader.name(), "script");
    }

    #[test]
    fn test_empty_command_line_rejected() {
        assert!(ScriptUpgrader::from_command_line("  ", Duration::from_secs(5)).is_err());
    }

    // Process-level behavior is covered in tests/script_upgrader.rs
}
