//! Host shell adapter.
//!
//! The [`Shell`] trait decouples command execution from the host shell so the
//! executor and remediation loop can be driven by scripted shells in tests.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::command::has_failure_signature;
use crate::io::process::run_command_with_timeout;

/// What a shell reported for one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Exit status 0, not killed, and no failure signature on stderr.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !has_failure_signature(&self.stderr)
    }

    /// Error text handed to remediation: stderr, or stdout when stderr is empty.
    pub fn error_text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }
}

/// Abstraction over command execution backends.
pub trait Shell {
    /// Run `command` verbatim with `workdir` as the current directory.
    fn run(&self, command: &str, workdir: &Path) -> Result<ShellOutput>;
}

/// Shell that spawns `<program> -c <command>` on the host.
#[derive(Debug, Clone)]
pub struct SystemShell {
    pub program: String,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Shell for SystemShell {
    #[instrument(skip_all, fields(program = %self.program, workdir = %workdir.display()))]
    fn run(&self, command: &str, workdir: &Path) -> Result<ShellOutput> {
        debug!(command, "running shell command");
        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg(command)
            .current_dir(workdir)
            // Keeps package managers and test runners out of interactive mode.
            .env("CI", "1");

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run `{command}` with {}", self.program))?;

        if output.timed_out {
            warn!(command, timeout_secs = self.timeout.as_secs(), "shell command timed out");
        }
        Ok(ShellOutput {
            exit_code: output.status.code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_clean_stderr() {
        assert!(ShellOutput::success("ok").succeeded());
        let noisy = ShellOutput {
            exit_code: Some(0),
            stderr: "Error: something broke".to_string(),
            ..ShellOutput::default()
        };
        assert!(!noisy.succeeded());
        assert!(!ShellOutput::failure(1, "").succeeded());
    }

    #[test]
    fn error_text_falls_back_to_stdout() {
        let out = ShellOutput {
            exit_code: Some(1),
            stdout: "1 problem".to_string(),
            ..ShellOutput::default()
        };
        assert_eq!(out.error_text(), "1 problem");
    }

    #[cfg(unix)]
    #[test]
    fn system_shell_runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let shell = SystemShell {
            program: "sh".to_string(),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        };
        let out = shell.run("cat marker.txt; echo \" $CI\"", temp.path()).expect("run");
        assert!(out.succeeded());
        assert_eq!(out.stdout, "here 1\n");
    }
}
