//! Text generation abstraction.
//!
//! The [`Generator`] trait decouples the pipeline from the model backend. The
//! crate ships [`CommandGenerator`], which pipes the prompt into a local CLI;
//! tests use scripted generators that return canned responses.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Generation failed in a way the pipeline cannot recover from locally.
///
/// Surfaces to the caller unchanged; recover it with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation provider `{}` failed: {}", self.provider, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Abstraction over text generation backends.
pub trait Generator {
    /// Produce a response for the prompts. Failures carry a [`ProviderError`].
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Generator that runs a configured command, feeding the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl CommandGenerator {
    fn provider_name(&self) -> String {
        self.command.first().cloned().unwrap_or_default()
    }

    fn fail(&self, message: impl Into<String>) -> anyhow::Error {
        ProviderError::new(self.provider_name(), message).into()
    }
}

impl Generator for CommandGenerator {
    #[instrument(
        skip_all,
        fields(provider = %self.provider_name(), timeout_secs = self.timeout.as_secs())
    )]
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(self.fail("generator.command is empty"));
        };
        info!("requesting generation");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let prompt = format!("{system_prompt}\n\n{user_prompt}\n");

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|e| self.fail(format!("{e:#}")))?;

        if output.timed_out {
            warn!("generator timed out");
            return Err(self.fail(format!("timed out after {:?}", self.timeout)));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(self.fail(format!(
                "exited with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            )));
        }
        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(self.fail("returned an empty response"));
        }
        debug!(bytes = text.len(), "generation complete");
        Ok(text)
    }
}
