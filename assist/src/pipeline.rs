//! End-to-end application of a model response to a project.
//!
//! [`run_assist_pipeline`] owns one [`AssistSession`] for the duration of a
//! call: parse, classify, resolve placeholders, write files, then run commands
//! and remediate failures. Nothing outlives the call except what was written
//! to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::classify_all;
use crate::core::command::split_commands;
use crate::core::filename::infer_filenames;
use crate::core::parser::{parse_artifacts, prose_text};
use crate::core::types::{
    Artifact, ArtifactKind, ClassifiedArtifact, FileOutcome, IssueKind, SessionStats,
};
use crate::executor::{CommandExecutor, CommandOutcome};
use crate::io::config::AssistConfig;
use crate::io::generator::Generator;
use crate::io::operator::Operator;
use crate::io::prompt::{PromptBuilder, list_directory};
use crate::io::secrets::SecretsStore;
use crate::io::shell::Shell;
use crate::materialize::FileMaterializer;
use crate::remediation::{FailureContext, remediate};
use crate::resolver::PlaceholderResolver;
use crate::session::{SessionEvent, SessionTracker};

/// Where the response is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub project_root: PathBuf,
    /// Starting working directory; must be inside `project_root`.
    pub workdir: PathBuf,
    /// Optional free-text description included in generation prompts.
    pub description: Option<String>,
}

impl ProjectContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            workdir: project_root.clone(),
            project_root,
            description: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// External collaborators of one pipeline call.
pub struct Collaborators<'a, S, G, O> {
    pub shell: &'a S,
    pub generator: &'a G,
    pub operator: &'a O,
}

/// All mutable state of one pipeline invocation.
#[derive(Debug)]
pub struct AssistSession {
    pub(crate) config: AssistConfig,
    pub(crate) tracker: SessionTracker,
    pub(crate) resolver: PlaceholderResolver,
    pub(crate) executor: CommandExecutor,
    pub(crate) prompts: PromptBuilder,
    project_root: PathBuf,
    description: Option<String>,
}

impl AssistSession {
    /// Start a session rooted at `project`.
    pub fn open(project: &ProjectContext, config: &AssistConfig) -> Result<Self> {
        config.validate()?;
        let project_root = fs::canonicalize(&project.project_root)
            .with_context(|| format!("resolve project root {}", project.project_root.display()))?;
        let workdir = fs::canonicalize(&project.workdir)
            .with_context(|| format!("resolve working directory {}", project.workdir.display()))?;
        if !workdir.starts_with(&project_root) {
            anyhow::bail!(
                "working directory {} is outside project root {}",
                workdir.display(),
                project_root.display()
            );
        }

        let secrets_path = project_root.join(&config.secrets_path);
        let store = SecretsStore::open(&secrets_path).unwrap_or_else(|e| {
            warn!(
                path = %secrets_path.display(),
                err = %format!("{e:#}"),
                "secrets store unreadable, starting empty"
            );
            SecretsStore::empty(&secrets_path)
        });

        Ok(Self {
            config: config.clone(),
            tracker: SessionTracker::start(),
            resolver: PlaceholderResolver::new(store),
            executor: CommandExecutor::new(&project_root, workdir, config.auto_approve),
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
            project_root,
            description: project.description.clone(),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Listing of the current working directory for prompts.
    pub(crate) fn workdir_listing(&self) -> String {
        list_directory(self.executor.workdir()).unwrap_or_else(|e| {
            debug!(err = %format!("{e:#}"), "workdir listing unavailable");
            String::new()
        })
    }

    pub(crate) fn system_prompt(&self) -> Result<String> {
        let workdir = self.executor.workdir().display().to_string();
        self.prompts.build_system(
            Some(&workdir),
            &self.workdir_listing(),
            self.description.as_deref(),
        )
    }

    /// Resolve placeholders across `text`, then parse and classify its blocks
    /// and substitute current bindings according to each block's kind.
    pub(crate) fn prepare<O: Operator>(
        &mut self,
        text: &str,
        operator: &O,
    ) -> Vec<ClassifiedArtifact> {
        self.resolver.resolve(text, operator, &mut self.tracker);
        classify_all(parse_artifacts(text).collect::<Vec<_>>())
            .into_iter()
            .map(|classified| {
                let content = self
                    .resolver
                    .apply_to(classified.kind, &classified.artifact.content);
                ClassifiedArtifact {
                    artifact: Artifact {
                        content,
                        ..classified.artifact
                    },
                    kind: classified.kind,
                }
            })
            .collect()
    }

    /// Write every file artifact, in order, under its inferred name.
    pub(crate) fn write_files(
        &mut self,
        text: &str,
        artifacts: &[ClassifiedArtifact],
    ) -> Vec<FileOutcome> {
        let names = infer_filenames(&prose_text(text), artifacts);
        let workdir = self.executor.workdir().to_path_buf();
        let materializer = FileMaterializer::new(&self.project_root, &workdir);
        let mut outcomes = Vec::new();
        let mut touched_store = false;

        for (classified, name) in artifacts.iter().zip(names) {
            let Some(name) = name else { continue };
            let outcome = materializer.materialize(&classified.artifact, &name);
            touched_store |= workdir.join(&outcome.path) == self.resolver.store().path();
            self.tracker.record(SessionEvent::File(outcome.clone()));
            outcomes.push(outcome);
        }
        if touched_store {
            self.resolver.sync_store();
        }
        outcomes
    }

    /// Apply a response: files first, then commands, remediating each failure.
    #[instrument(skip_all)]
    pub fn apply_response<S: Shell, G: Generator, O: Operator>(
        &mut self,
        response: &str,
        deps: &Collaborators<'_, S, G, O>,
    ) -> Result<()> {
        let artifacts = self.prepare(response, deps.operator);
        if artifacts.is_empty() {
            debug!(issue = ?IssueKind::ParseNoop, "response has no code blocks");
            return Ok(());
        }
        info!(
            files = artifacts.iter().filter(|a| a.kind == ArtifactKind::FileContent).count(),
            commands = artifacts.iter().filter(|a| a.kind == ArtifactKind::Command).count(),
            "applying response"
        );

        self.write_files(response, &artifacts);

        for classified in artifacts.iter().filter(|a| a.kind == ArtifactKind::Command) {
            for command in split_commands(&classified.artifact.content) {
                let outcome =
                    self.executor
                        .execute_line(&command, deps.shell, deps.operator, &mut self.tracker);
                if let CommandOutcome::Failed(output) = outcome {
                    remediate(self, deps, FailureContext::from_output(&command, &output))?;
                }
            }
        }
        Ok(())
    }

    /// Stamp the end time and return the final counters.
    pub fn finish(&mut self) -> SessionStats {
        self.tracker.finish()
    }
}

/// Apply `response` to `project` and return the session counters.
///
/// Only a generation provider failure (or an invalid project/config) is
/// returned as an error; every other problem is recorded in the stats.
#[instrument(skip_all, fields(project_root = %project.project_root.display()))]
pub fn run_assist_pipeline<S: Shell, G: Generator, O: Operator>(
    response: &str,
    project: &ProjectContext,
    deps: &Collaborators<'_, S, G, O>,
    config: &AssistConfig,
) -> Result<SessionStats> {
    let mut session = AssistSession::open(project, config)?;
    session.apply_response(response, deps)?;
    let stats = session.finish();
    if stats.has_unresolved() {
        warn!(unresolved = stats.errors.unresolved, "some errors remain unresolved");
    }
    info!(
        succeeded = stats.commands.succeeded,
        failed = stats.commands.failed,
        skipped = stats.commands.skipped,
        files_created = stats.files.created,
        files_updated = stats.files.updated,
        "session finished"
    );
    Ok(stats)
}

/// Generate a response for `request` and apply it.
#[instrument(skip_all)]
pub fn ask_and_apply<S: Shell, G: Generator, O: Operator>(
    request: &str,
    project: &ProjectContext,
    deps: &Collaborators<'_, S, G, O>,
    config: &AssistConfig,
) -> Result<SessionStats> {
    let mut session = AssistSession::open(project, config)?;
    let system = session.system_prompt()?;
    let response = deps.generator.generate(&system, request)?;
    session.apply_response(&response, deps)?;
    Ok(session.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FileStatus;
    use crate::test_support::{ScriptedGenerator, ScriptedOperator, ScriptedShell, TestProject};

    #[test]
    fn files_are_written_before_commands_run() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new();
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let response = concat!(
            "Run this:\n```bash\nnode index.js\n```\n",
            "Then create `index.js`:\n```javascript\nconsole.log(1)\n```\n",
        );

        let mut session = AssistSession::open(&project.context(), &project.config).expect("open");
        session.apply_response(response, &deps).expect("apply");

        assert_eq!(project.read("index.js"), "console.log(1)\n");
        assert_eq!(shell.calls(), vec!["node index.js"]);
        assert_eq!(session.tracker().files()[0].status, FileStatus::Created);
    }

    #[test]
    fn prose_only_response_is_a_no_op() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new();
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let stats = run_assist_pipeline(
            "Nothing to do here.",
            &project.context(),
            &deps,
            &project.config,
        )
        .expect("run");
        assert_eq!(stats.commands.succeeded + stats.commands.failed + stats.commands.skipped, 0);
        assert!(stats.ended_at.is_some());
    }

    #[test]
    fn workdir_outside_root_is_rejected() {
        let project = TestProject::new();
        let other = tempfile::tempdir().expect("tempdir");
        let context = project.context().with_workdir(other.path());
        assert!(AssistSession::open(&context, &project.config).is_err());
    }

    #[test]
    fn ask_feeds_generated_response_into_pipeline() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new().respond("```bash\nnpm init -y\n```");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let stats = ask_and_apply(
            "set up a node project",
            &project.context(),
            &deps,
            &project.config,
        )
        .expect("ask");
        assert_eq!(stats.commands.succeeded, 1);
        let prompts = generator.prompts();
        assert_eq!(prompts[0].1, "set up a node project");
        assert!(prompts[0].0.contains("### Response Contract"));
    }
}
