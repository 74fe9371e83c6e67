//! Bounded error resolution for failed commands.
//!
//! A failure starts a chain that asks the generator for one fix per round,
//! applies it through the normal file and command paths, and re-checks. A
//! repeated fix, an empty fix or the round cap hands the chain to the
//! deterministic [`fallback`] strategies, which never call the generator.

pub mod fallback;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::core::command::{dependency_install, split_commands};
use crate::core::signature::{ErrorSignature, classify_error, reports_zero_issues};
use crate::core::types::{
    ArtifactKind, ClassifiedArtifact, FileOutcome, FileStatus, IssueKind, RemediationAttempt,
};
use crate::executor::CommandOutcome;
use crate::io::files::{create_missing_path, remove_path, write_file};
use crate::io::generator::Generator;
use crate::io::operator::Operator;
use crate::io::prompt::RemediationInputs;
use crate::io::shell::{Shell, ShellOutput};
use crate::pipeline::{AssistSession, Collaborators};
use crate::session::SessionEvent;

use self::fallback::{FallbackInput, FallbackStep, plan_fallback};

/// The failing command and what it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub command: String,
    pub error_text: String,
    pub exit_code: Option<i32>,
}

impl FailureContext {
    pub fn from_output(command: &str, output: &ShellOutput) -> Self {
        Self {
            command: command.trim().to_string(),
            error_text: output.error_text(),
            exit_code: output.exit_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationState {
    Idle,
    AwaitingFix,
    ApplyingFix,
    Retrying,
    Resolved,
    Exhausted,
}

/// How a chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Exhausted,
}

/// Why generation was abandoned for the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    RoundCap,
    RepeatedFix,
    EmptyFix,
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Escalation::RoundCap => f.write_str("round cap reached"),
            Escalation::RepeatedFix => f.write_str("fix already attempted"),
            Escalation::EmptyFix => f.write_str("fix response had no code blocks"),
        }
    }
}

/// State of one remediation chain.
#[derive(Debug)]
pub struct RemediationChain {
    /// The command whose failure started the chain; the retry target.
    pub original: FailureContext,
    /// The most recent failure, fed into the next round.
    pub current: FailureContext,
    pub state: RemediationState,
    pub round: u32,
    pub attempts: Vec<RemediationAttempt>,
    hashes: HashSet<String>,
    summaries: Vec<String>,
}

impl RemediationChain {
    pub fn new(failure: FailureContext) -> Self {
        Self {
            current: failure.clone(),
            original: failure,
            state: RemediationState::Idle,
            round: 0,
            attempts: Vec::new(),
            hashes: HashSet::new(),
            summaries: Vec::new(),
        }
    }

    pub fn transition(&mut self, next: RemediationState) {
        info!(from = ?self.state, to = ?next, round = self.round, "remediation transition");
        self.state = next;
    }

    /// Register a proposed fix. Returns `false` when the same fix was seen before.
    pub fn record_fix(&mut self, hash: &str, summary: String) -> bool {
        self.attempts.push(RemediationAttempt {
            failing_context: self.current.command.clone(),
            error_text: self.current.error_text.clone(),
            proposed_fix_hash: hash.to_string(),
        });
        if !self.hashes.insert(hash.to_string()) {
            return false;
        }
        self.summaries.push(summary);
        true
    }
}

/// Content hash of a fix: SHA-256 over kind, language and content of every
/// block, first 8 bytes as 16 hex chars.
pub fn fix_hash(artifacts: &[ClassifiedArtifact]) -> String {
    let mut hasher = Sha256::new();
    for classified in artifacts {
        let kind = match classified.kind {
            ArtifactKind::Command => "command",
            ArtifactKind::FileContent => "file",
        };
        hasher.update(kind.as_bytes());
        hasher.update(b"\0");
        hasher.update(classified.artifact.language.as_bytes());
        hasher.update(b"\0");
        hasher.update(classified.artifact.content.trim().as_bytes());
        hasher.update(b"\0");
    }
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// One-line description of a fix for the "previous attempts" prompt section.
pub fn summarize_fix(artifacts: &[ClassifiedArtifact]) -> String {
    let mut parts = Vec::new();
    for classified in artifacts {
        match classified.kind {
            ArtifactKind::Command => {
                let commands = split_commands(&classified.artifact.content);
                if !commands.is_empty() {
                    parts.push(format!("ran `{}`", commands.join(" && ")));
                }
            }
            ArtifactKind::FileContent => {
                let language = match classified.artifact.language.as_str() {
                    "" => "text",
                    other => other,
                };
                parts.push(format!("wrote a {language} file"));
            }
        }
    }
    if parts.is_empty() {
        "empty fix".to_string()
    } else {
        parts.join("; ")
    }
}

/// Whether a successful fix command shows the original failure is gone.
pub fn fix_resolves(original: &str, command: &str, output: &ShellOutput) -> bool {
    let original = original.trim();
    (!original.is_empty() && command.contains(original))
        || reports_zero_issues(&output.stdout)
        || reports_zero_issues(&output.stderr)
        || output.stderr.trim().is_empty()
}

#[derive(Debug)]
enum FixResult {
    Resolved,
    Failed(FailureContext),
    Ineffective,
}

/// Drive one failure to `Resolved` or `Exhausted`.
///
/// Only generation errors are returned; everything else ends the chain.
#[instrument(skip_all, fields(command = %failure.command))]
pub fn remediate<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    failure: FailureContext,
) -> Result<Resolution> {
    session.tracker.record(SessionEvent::ErrorDetected);
    let mut chain = RemediationChain::new(failure);
    let resolution = run_chain(session, deps, &mut chain)?;

    match resolution {
        Resolution::Resolved => {
            chain.transition(RemediationState::Resolved);
            info!(rounds = chain.round, "error resolved");
            session.tracker.record(SessionEvent::ErrorResolved);
        }
        Resolution::Exhausted => {
            chain.transition(RemediationState::Exhausted);
            warn!(
                command = %chain.original.command,
                rounds = chain.round,
                issue = ?IssueKind::RemediationExhausted,
                "error could not be resolved"
            );
            session.tracker.record(SessionEvent::ErrorUnresolved);
        }
    }
    Ok(resolution)
}

fn run_chain<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    chain: &mut RemediationChain,
) -> Result<Resolution> {
    loop {
        if chain.round >= session.config.max_remediation_rounds {
            return Ok(escalate(session, deps, chain, Escalation::RoundCap));
        }
        chain.round += 1;
        chain.transition(RemediationState::AwaitingFix);

        let user_prompt = remediation_prompt(session, chain)?;
        let system_prompt = session.system_prompt()?;
        let response = deps.generator.generate(&system_prompt, &user_prompt)?;

        let artifacts = session.prepare(&response, deps.operator);
        if artifacts.is_empty() {
            return Ok(escalate(session, deps, chain, Escalation::EmptyFix));
        }
        let hash = fix_hash(&artifacts);
        if !chain.record_fix(&hash, summarize_fix(&artifacts)) {
            return Ok(escalate(session, deps, chain, Escalation::RepeatedFix));
        }

        chain.transition(RemediationState::ApplyingFix);
        match apply_fix(session, deps, &response, &artifacts, &chain.original.command) {
            FixResult::Resolved => match retry_original(session, deps, chain) {
                None => return Ok(Resolution::Resolved),
                Some(failure) => chain.current = failure,
            },
            FixResult::Failed(failure) => {
                info!(command = %failure.command, "fix command failed, feeding next round");
                chain.current = failure;
            }
            FixResult::Ineffective => info!(hash = %hash, "fix had no effect"),
        }
    }
}

fn remediation_prompt(session: &AssistSession, chain: &RemediationChain) -> Result<String> {
    let signature = classify_error(&chain.current.command, &chain.current.error_text);
    session.prompts.build_remediation(&RemediationInputs {
        command: chain.current.command.clone(),
        error_text: chain.current.error_text.clone(),
        exit_code: chain.current.exit_code,
        workdir: session.executor.workdir().display().to_string(),
        listing: session.workdir_listing(),
        attempt: chain.round,
        max_attempts: session.config.max_remediation_rounds,
        config_conflict: signature == ErrorSignature::LintConfigConflict,
        previous: chain.summaries.clone(),
    })
}

/// Write the fix's files, then run its commands until one fails.
fn apply_fix<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    response: &str,
    artifacts: &[ClassifiedArtifact],
    original: &str,
) -> FixResult {
    let files = session.write_files(response, artifacts);
    let files_ok = !files.is_empty() && files.iter().all(|f| f.status != FileStatus::Failed);
    let has_commands = artifacts.iter().any(|a| a.kind == ArtifactKind::Command);

    let mut resolved = false;
    for classified in artifacts.iter().filter(|a| a.kind == ArtifactKind::Command) {
        for command in split_commands(&classified.artifact.content) {
            let outcome = session.executor.execute_line(
                &command,
                deps.shell,
                deps.operator,
                &mut session.tracker,
            );
            match outcome {
                CommandOutcome::Succeeded(output) => {
                    resolved |= fix_resolves(original, &command, &output);
                }
                CommandOutcome::Failed(output) => {
                    return FixResult::Failed(FailureContext::from_output(&command, &output));
                }
                CommandOutcome::Skipped(reason) => {
                    info!(command = %command, %reason, "fix command skipped");
                }
            }
        }
    }

    if resolved || (!has_commands && files_ok) {
        FixResult::Resolved
    } else {
        FixResult::Ineffective
    }
}

/// Re-run the original command once when it installs dependencies.
///
/// Returns the new failure when the retry fails.
fn retry_original<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    chain: &mut RemediationChain,
) -> Option<FailureContext> {
    dependency_install(&chain.original.command)?;
    chain.transition(RemediationState::Retrying);
    match session
        .executor
        .retry(&chain.original.command, deps.shell, &mut session.tracker)?
    {
        CommandOutcome::Failed(output) => {
            Some(FailureContext::from_output(&chain.original.command, &output))
        }
        _ => None,
    }
}

/// Run the fallback chain for the current failure. Terminal: never generates.
fn escalate<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    chain: &mut RemediationChain,
    reason: Escalation,
) -> Resolution {
    info!(%reason, round = chain.round, "escalating to fallback strategies");
    if !run_fallback(session, deps, chain) {
        return Resolution::Exhausted;
    }
    match retry_original(session, deps, chain) {
        None => Resolution::Resolved,
        Some(failure) => {
            chain.current = failure;
            Resolution::Exhausted
        }
    }
}

fn run_fallback<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    chain: &mut RemediationChain,
) -> bool {
    let signature = classify_error(&chain.current.command, &chain.current.error_text);
    let workdir = session.executor.workdir().to_path_buf();
    let plan = plan_fallback(&FallbackInput {
        command: &chain.current.command,
        signature: &signature,
        workdir: &workdir,
        project_root: session.project_root(),
    });
    let Some(plan) = plan else {
        info!(?signature, "no fallback strategy applies");
        return false;
    };

    info!(strategy = plan.strategy, steps = plan.steps.len(), ?signature, "running fallback");
    chain.transition(RemediationState::ApplyingFix);
    for step in plan.steps {
        if !run_step(session, deps, &workdir, step) {
            warn!(strategy = plan.strategy, "fallback step failed");
            return false;
        }
    }
    true
}

fn run_step<S: Shell, G: Generator, O: Operator>(
    session: &mut AssistSession,
    deps: &Collaborators<'_, S, G, O>,
    workdir: &Path,
    step: FallbackStep,
) -> bool {
    match step {
        FallbackStep::Run(command) => matches!(
            session
                .executor
                .execute_line(&command, deps.shell, deps.operator, &mut session.tracker),
            CommandOutcome::Succeeded(_)
        ),
        FallbackStep::Remove(relative) => match remove_path(&workdir.join(&relative)) {
            Ok(()) => {
                info!(path = %relative.display(), "removed");
                true
            }
            Err(e) => {
                warn!(err = %format!("{e:#}"), "fallback remove failed");
                false
            }
        },
        FallbackStep::Rename { from, to } => {
            match fs::rename(workdir.join(&from), workdir.join(&to)) {
                Ok(()) => {
                    info!(from = %from.display(), to = %to.display(), "renamed");
                    true
                }
                Err(e) => {
                    warn!(from = %from.display(), err = %e, "fallback rename failed");
                    false
                }
            }
        }
        FallbackStep::WriteFile { path, content } => {
            let display = path.to_string_lossy().into_owned();
            let outcome = match write_file(&workdir.join(&path), &content) {
                Ok(status) => FileOutcome {
                    path: display,
                    status,
                    error: None,
                },
                Err(e) => FileOutcome {
                    path: display,
                    status: FileStatus::Failed,
                    error: Some(format!("{e:#}")),
                },
            };
            let ok = outcome.status != FileStatus::Failed;
            session.tracker.record(SessionEvent::File(outcome));
            ok
        }
        FallbackStep::CreatePath(relative) => match create_missing_path(&workdir.join(&relative)) {
            Ok(created) => {
                info!(path = %relative.display(), created, "created missing path");
                true
            }
            Err(e) => {
                warn!(err = %format!("{e:#}"), "fallback create failed");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Artifact;
    use crate::test_support::{ScriptedGenerator, ScriptedOperator, ScriptedShell, TestProject};

    fn command(content: &str) -> ClassifiedArtifact {
        ClassifiedArtifact {
            artifact: Artifact::new("bash", content),
            kind: ArtifactKind::Command,
        }
    }

    fn failure(command: &str, stderr: &str) -> FailureContext {
        FailureContext::from_output(command, &ShellOutput::failure(1, stderr))
    }

    #[test]
    fn fix_hash_is_stable_and_content_sensitive() {
        let a = fix_hash(&[command("npm install")]);
        assert_eq!(a.len(), 16);
        assert_eq!(a, fix_hash(&[command("npm install\n")]));
        assert_ne!(a, fix_hash(&[command("npm ci")]));
        let as_file = ClassifiedArtifact {
            artifact: Artifact::new("bash", "npm install"),
            kind: ArtifactKind::FileContent,
        };
        assert_ne!(a, fix_hash(&[as_file]));
    }

    #[test]
    fn repeated_fix_is_rejected() {
        let mut chain = RemediationChain::new(failure("npm test", "Error: boom"));
        assert!(chain.record_fix("abc", "ran `x`".to_string()));
        assert!(!chain.record_fix("abc", "ran `x`".to_string()));
        assert_eq!(chain.attempts.len(), 2);
        assert_eq!(chain.summaries, vec!["ran `x`"]);
    }

    #[test]
    fn resolution_signals() {
        let noisy = ShellOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: "warning: deprecated".to_string(),
            timed_out: false,
        };
        assert!(!fix_resolves("npm test", "npm install jest", &noisy));
        assert!(fix_resolves("npm test", "npm test -- --ci", &noisy));
        let clean = ShellOutput {
            stdout: "✖ 0 problems".to_string(),
            ..noisy.clone()
        };
        assert!(fix_resolves("npx eslint .", "npx eslint --fix .", &clean));
        assert!(fix_resolves("make", "touch a", &ShellOutput::success("")));
    }

    #[test]
    fn summaries_describe_commands_and_files() {
        let file = ClassifiedArtifact {
            artifact: Artifact::new("json", "{}"),
            kind: ArtifactKind::FileContent,
        };
        assert_eq!(
            summarize_fix(&[command("npm i\nnpm test"), file]),
            "ran `npm i && npm test`; wrote a json file"
        );
    }

    #[test]
    fn successful_fix_resolves_and_retries_install() {
        let project = TestProject::new();
        let shell = ScriptedShell::new().on(
            "npm install",
            [
                ShellOutput::failure(1, "npm ERR! code ERESOLVE"),
                ShellOutput::success("added 1 package"),
            ],
        );
        let generator = ScriptedGenerator::new()
            .respond("```bash\nnpm config set legacy-peer-deps true\n```");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let mut session = AssistSession::open(&project.context(), &project.config).expect("open");
        let outcome = session
            .executor
            .execute_line("npm install", &shell, &operator, &mut session.tracker);
        let CommandOutcome::Failed(output) = outcome else {
            panic!("expected failure");
        };

        let failure = FailureContext::from_output("npm install", &output);
        let resolution = remediate(&mut session, &deps, failure).expect("remediate");
        assert_eq!(resolution, Resolution::Resolved);
        assert_eq!(
            shell.calls(),
            vec!["npm install", "npm config set legacy-peer-deps true", "npm install"]
        );
        let stats = session.finish();
        assert_eq!(stats.errors.detected, 1);
        assert_eq!(stats.errors.resolved, 1);
    }

    #[test]
    fn round_cap_exhausts_without_fallback() {
        let project = TestProject::new();
        let shell = ScriptedShell::new()
            .on("make check", [ShellOutput::failure(2, "Error: first")])
            .on("make fix-1", [ShellOutput::failure(2, "Error: still broken")])
            .on("make fix-2", [ShellOutput::failure(2, "Error: still broken")]);
        let generator = ScriptedGenerator::new()
            .respond("```bash\nmake fix-1\n```")
            .respond("```bash\nmake fix-2\n```");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let mut config = project.config.clone();
        config.max_remediation_rounds = 2;
        let mut session = AssistSession::open(&project.context(), &config).expect("open");

        let first = failure("make check", "Error: first");
        let resolution = remediate(&mut session, &deps, first).expect("remediate");
        assert_eq!(resolution, Resolution::Exhausted);
        assert_eq!(generator.calls(), 2);
        assert!(generator.prompts()[1].1.contains("attempt 2 of 2"));
        assert!(generator.prompts()[1].1.contains("ran `make fix-1`"));
        assert_eq!(session.finish().errors.unresolved, 1);
    }

    #[test]
    fn file_only_fix_resolves() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new()
            .respond("Create `config.json`:\n```json\n{\"debug\": false}\n```");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let mut session = AssistSession::open(&project.context(), &project.config).expect("open");
        let resolution = remediate(
            &mut session,
            &deps,
            failure("node app.js", "Error: config.json is invalid"),
        )
        .expect("remediate");
        assert_eq!(resolution, Resolution::Resolved);
        assert_eq!(project.read("config.json"), "{\"debug\": false}\n");
        assert!(shell.calls().is_empty());
    }

    #[test]
    fn empty_fix_falls_back_to_missing_path() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new().respond("I am not sure what to do.");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let mut session = AssistSession::open(&project.context(), &project.config).expect("open");
        let resolution = remediate(
            &mut session,
            &deps,
            failure("cat logs/app.log", "cat: logs/app.log: No such file or directory"),
        )
        .expect("remediate");
        assert_eq!(resolution, Resolution::Resolved);
        assert!(project.exists("logs/app.log"));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn generator_failure_propagates() {
        let project = TestProject::new();
        let shell = ScriptedShell::new();
        let generator = ScriptedGenerator::new().fail("quota exceeded");
        let operator = ScriptedOperator::new();
        let deps = Collaborators {
            shell: &shell,
            generator: &generator,
            operator: &operator,
        };
        let mut session = AssistSession::open(&project.context(), &project.config).expect("open");
        let err =
            remediate(&mut session, &deps, failure("npm test", "Error: x")).expect_err("provider");
        assert!(err.downcast_ref::<crate::io::generator::ProviderError>().is_some());
    }
}
