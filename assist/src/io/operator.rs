//! Interactive operator prompts.

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};

/// Source of operator input (secrets, free text, confirmations).
pub trait Operator {
    /// Ask for a value without echoing it.
    fn prompt_secret(&self, prompt: &str) -> Result<String>;
    /// Ask for a visible value.
    fn prompt_text(&self, prompt: &str) -> Result<String>;
    /// Ask a yes/no question.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Operator backed by the controlling terminal.
pub struct TerminalOperator {
    theme: ColorfulTheme,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for TerminalOperator {
    fn prompt_secret(&self, prompt: &str) -> Result<String> {
        Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .context("read hidden input")
    }

    fn prompt_text(&self, prompt: &str) -> Result<String> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .context("read input")
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(true)
            .interact()
            .context("read confirmation")
    }
}
