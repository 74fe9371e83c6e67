//! Command execution with safety gating, deduplication and recording.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::command::{cd_target, split_commands, unsafe_reason};
use crate::core::types::{ExecutionRecord, IssueKind, SkipReason};
use crate::io::operator::Operator;
use crate::io::shell::{Shell, ShellOutput};
use crate::session::{SessionEvent, SessionTracker};

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded(ShellOutput),
    Failed(ShellOutput),
    Skipped(SkipReason),
}

impl CommandOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CommandOutcome::Failed(_))
    }
}

/// Runs commands for one session.
///
/// Owns the session working directory and the set of command strings already
/// handed to the shell; a string in that set is never run again verbatim
/// except through [`CommandExecutor::retry`].
#[derive(Debug)]
pub struct CommandExecutor {
    project_root: PathBuf,
    workdir: PathBuf,
    auto_approve: bool,
    executed: HashSet<String>,
    retried: HashSet<String>,
}

impl CommandExecutor {
    pub fn new(
        project_root: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        auto_approve: bool,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            workdir: workdir.into(),
            auto_approve,
            executed: HashSet::new(),
            retried: HashSet::new(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn has_executed(&self, command: &str) -> bool {
        self.executed.contains(command.trim())
    }

    /// Split `block` and run each command in order.
    pub fn execute<S: Shell, O: Operator>(
        &mut self,
        block: &str,
        shell: &S,
        operator: &O,
        tracker: &mut SessionTracker,
    ) -> Vec<(String, CommandOutcome)> {
        split_commands(block)
            .into_iter()
            .map(|command| {
                let outcome = self.execute_line(&command, shell, operator, tracker);
                (command, outcome)
            })
            .collect()
    }

    /// Gate, confirm and run a single command.
    #[instrument(skip_all, fields(command = command.trim()))]
    pub fn execute_line<S: Shell, O: Operator>(
        &mut self,
        command: &str,
        shell: &S,
        operator: &O,
        tracker: &mut SessionTracker,
    ) -> CommandOutcome {
        let command = command.trim();
        if let Some(reason) = unsafe_reason(command) {
            warn!(%reason, issue = ?IssueKind::CommandSkippedUnsafe, "skipping unsafe command");
            return skip(command, reason, tracker);
        }
        if let Some(target) = cd_target(command) {
            return self.change_directory(command, target, tracker);
        }
        if self.executed.contains(command) {
            info!("command already executed this session, skipping");
            return skip(command, SkipReason::Duplicate, tracker);
        }
        if !self.auto_approve {
            let approved = operator
                .confirm(&format!("Run `{command}`?"))
                .unwrap_or_else(|e| {
                    warn!(
                        err = %format!("{e:#}"),
                        "confirmation unavailable, treating as declined"
                    );
                    false
                });
            if !approved {
                return skip(command, SkipReason::Declined, tracker);
            }
        }
        self.executed.insert(command.to_string());
        self.run(command, shell, tracker)
    }

    /// Re-run an already executed command once per session.
    ///
    /// Returns `None` when this command was retried before.
    pub fn retry<S: Shell>(
        &mut self,
        command: &str,
        shell: &S,
        tracker: &mut SessionTracker,
    ) -> Option<CommandOutcome> {
        let command = command.trim();
        if !self.retried.insert(command.to_string()) {
            return None;
        }
        info!(command, "retrying command after fix");
        self.executed.insert(command.to_string());
        Some(self.run(command, shell, tracker))
    }

    fn run<S: Shell>(
        &self,
        command: &str,
        shell: &S,
        tracker: &mut SessionTracker,
    ) -> CommandOutcome {
        info!(command, workdir = %self.workdir.display(), "running command");
        let output = shell.run(command, &self.workdir).unwrap_or_else(|e| ShellOutput {
            exit_code: None,
            stderr: format!("error: {e:#}"),
            ..ShellOutput::default()
        });
        let success = output.succeeded();
        tracker.record(SessionEvent::Command(ExecutionRecord {
            command: command.to_string(),
            success,
            timestamp: Utc::now(),
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
        }));
        if success {
            CommandOutcome::Succeeded(output)
        } else {
            warn!(
                command,
                exit_code = ?output.exit_code,
                issue = ?IssueKind::CommandFailed,
                "command failed"
            );
            CommandOutcome::Failed(output)
        }
    }

    /// Move the session working directory; it may not leave the project root.
    fn change_directory(
        &mut self,
        command: &str,
        target: &str,
        tracker: &mut SessionTracker,
    ) -> CommandOutcome {
        let candidate = self.workdir.join(target);
        let resolved = fs::canonicalize(&candidate).ok().filter(|p| p.is_dir());
        let root =
            fs::canonicalize(&self.project_root).unwrap_or_else(|_| self.project_root.clone());
        let output = match resolved {
            Some(dir) if dir.starts_with(&root) => {
                info!(workdir = %dir.display(), "changed working directory");
                self.workdir = dir;
                ShellOutput::success("")
            }
            Some(dir) => ShellOutput::failure(
                1,
                format!("error: cd: {} is outside the project root", dir.display()),
            ),
            None => ShellOutput::failure(1, format!("cd: {target}: No such file or directory")),
        };
        let success = output.succeeded();
        tracker.record(SessionEvent::Command(ExecutionRecord {
            command: command.to_string(),
            success,
            timestamp: Utc::now(),
            stdout: String::new(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
        }));
        if success {
            CommandOutcome::Succeeded(output)
        } else {
            warn!(command, "cd failed");
            CommandOutcome::Failed(output)
        }
    }
}

fn skip(command: &str, reason: SkipReason, tracker: &mut SessionTracker) -> CommandOutcome {
    tracker.record(SessionEvent::CommandSkipped {
        command: command.to_string(),
        reason: reason.clone(),
    });
    CommandOutcome::Skipped(reason)
}
