//! Scripted collaborators and fixtures for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::config::AssistConfig;
use crate::io::generator::{Generator, ProviderError};
use crate::io::operator::Operator;
use crate::io::shell::{Shell, ShellOutput};
use crate::pipeline::ProjectContext;

/// Shell that answers from per-command scripts and records every call.
///
/// Each command pops its next scripted output; the last one repeats. Unknown
/// commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedShell {
    scripts: RefCell<HashMap<String, VecDeque<ShellOutput>>>,
    calls: RefCell<Vec<(String, PathBuf)>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `outputs` for `command`, in order.
    pub fn on(self, command: &str, outputs: impl IntoIterator<Item = ShellOutput>) -> Self {
        self.scripts
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .extend(outputs);
        self
    }

    /// Commands passed to the shell, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Working directory of every call, in order.
    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.calls.borrow().iter().map(|(_, w)| w.clone()).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.borrow().iter().filter(|(c, _)| c == command).count()
    }
}

impl Shell for ScriptedShell {
    fn run(&self, command: &str, workdir: &Path) -> Result<ShellOutput> {
        self.calls
            .borrow_mut()
            .push((command.to_string(), workdir.to_path_buf()));
        let mut scripts = self.scripts.borrow_mut();
        let Some(queue) = scripts.get_mut(command) else {
            return Ok(ShellOutput::success(""));
        };
        let output = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(output.unwrap_or_else(|| ShellOutput::success("")))
    }
}

/// Generator that replays canned responses; the last one repeats.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<Result<String, ProviderError>>>,
    prompts: RefCell<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(ProviderError::new("scripted", message)));
        self
    }

    /// `(system, user)` prompt pairs received so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts
            .borrow_mut()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        let mut responses = self.responses.borrow_mut();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(e.into()),
            None => Err(ProviderError::new("scripted", "no scripted response").into()),
        }
    }
}

/// Operator that answers from queues. Empty queues fail like a closed terminal,
/// except confirmations, which fall back to `confirm_default`.
pub struct ScriptedOperator {
    secrets: RefCell<VecDeque<String>>,
    texts: RefCell<VecDeque<String>>,
    confirms: RefCell<VecDeque<bool>>,
    confirm_default: bool,
    secret_prompts: Cell<usize>,
    text_prompts: Cell<usize>,
    confirmations: RefCell<Vec<String>>,
}

impl Default for ScriptedOperator {
    fn default() -> Self {
        Self {
            secrets: RefCell::default(),
            texts: RefCell::default(),
            confirms: RefCell::default(),
            confirm_default: true,
            secret_prompts: Cell::new(0),
            text_prompts: Cell::new(0),
            confirmations: RefCell::default(),
        }
    }
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets
            .borrow_mut()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_texts<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.texts
            .borrow_mut()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_confirms(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirms.borrow_mut().extend(answers);
        self
    }

    pub fn declining_by_default(mut self) -> Self {
        self.confirm_default = false;
        self
    }

    pub fn secret_prompts(&self) -> usize {
        self.secret_prompts.get()
    }

    pub fn text_prompts(&self) -> usize {
        self.text_prompts.get()
    }

    /// Questions asked through `confirm`, in order.
    pub fn confirmations(&self) -> Vec<String> {
        self.confirmations.borrow().clone()
    }
}

impl Operator for ScriptedOperator {
    fn prompt_secret(&self, _prompt: &str) -> Result<String> {
        self.secret_prompts.set(self.secret_prompts.get() + 1);
        self.secrets
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted secret"))
    }

    fn prompt_text(&self, _prompt: &str) -> Result<String> {
        self.text_prompts.set(self.text_prompts.get() + 1);
        self.texts
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted text"))
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        self.confirmations.borrow_mut().push(question.to_string());
        Ok(self
            .confirms
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.confirm_default))
    }
}

/// Temporary project directory with a config that runs unattended.
pub struct TestProject {
    dir: TempDir,
    pub config: AssistConfig,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            config: AssistConfig {
                auto_approve: true,
                ..AssistConfig::default()
            },
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn context(&self) -> ProjectContext {
        ProjectContext::new(self.root())
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, contents).expect("write fixture");
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).expect("read fixture")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
