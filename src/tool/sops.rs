//! Process-backed SOPS invocation.

use super::CryptoTool;
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Exit status SOPS uses to report that the file was left unchanged.
/// Benign for every call shape; treated as success.
const FILE_HAS_NOT_BEEN_MODIFIED: i32 = 200;

/// Invokes the configured SOPS executable, forwarding a configured
/// environment map (key-material locations and the like) merged over the
/// process environment.
#[derive(Debug, Clone)]
pub struct SopsTool {
    program: String,
    env: HashMap<String, String>,
}

impl SopsTool {
    pub fn new(program: impl Into<String>) -> Self {
        SopsTool {
            program: program.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.envs(&self.env);
        command
    }

    async fn run(&self, mut command: Command) -> Result<Output, ToolError> {
        let output = command.output().await.map_err(|source| ToolError::Launch {
            program: self.program.clone(),
            source,
        })?;
        if output.status.success() || output.status.code() == Some(FILE_HAS_NOT_BEEN_MODIFIED) {
            return Ok(output);
        }
        Err(ToolError::Failed {
            program: self.program.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl CryptoTool for SopsTool {
    async fn decrypt_raw(&self, document: &Path) -> Result<Vec<u8>, ToolError> {
        debug!(document = %document.display(), "decrypting to raw plaintext");
        let mut command = self.command();
        command.arg("--decrypt").arg(document);
        Ok(self.run(command).await?.stdout)
    }

    async fn decrypt_structured(&self, document: &Path) -> Result<Vec<u8>, ToolError> {
        debug!(document = %document.display(), "decrypting to structured output");
        let mut command = self.command();
        command
            .arg("--decrypt")
            .arg("--output-type")
            .arg("json")
            .arg(document);
        Ok(self.run(command).await?.stdout)
    }

    async fn set_value(
        &self,
        document: &Path,
        expression: &str,
        value: &Value,
    ) -> Result<(), ToolError> {
        debug!(document = %document.display(), expression, "applying set mutation");
        let assignment = format!("{} {}", expression, value);
        let mut command = self.command();
        command.arg("--set").arg(assignment).arg(document);
        self.run(command).await?;
        Ok(())
    }

    async fn replace_plaintext(&self, document: &Path, plaintext: &[u8]) -> Result<(), ToolError> {
        debug!(
            document = %document.display(),
            bytes = plaintext.len(),
            "re-encrypting replacement plaintext"
        );
        // SOPS has no direct "encrypt this plaintext into that file" call.
        // Stage the plaintext and hand SOPS an editor that copies it over
        // the decrypted temp file SOPS opens for editing.
        let staged = tempfile::NamedTempFile::new()?;
        tokio::fs::write(staged.path(), plaintext).await?;
        let mut command = self.command();
        command
            .env("EDITOR", format!("cp {}", staged.path().display()))
            .arg(document);
        self.run(command).await?;
        Ok(())
    }
}
