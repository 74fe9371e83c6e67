//! Prompt builder for generation and remediation requests.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const REMEDIATION_TEMPLATE: &str = include_str!("prompts/remediation.md");

/// Directory entries never worth listing in a prompt.
const LISTING_SKIP: &[&str] = &["node_modules", ".git", "target", "dist", ".next", "__pycache__"];
const LISTING_LIMIT: usize = 40;

/// Everything the remediation prompt needs about one failure.
#[derive(Debug, Clone, Default)]
pub struct RemediationInputs {
    pub command: String,
    pub error_text: String,
    pub exit_code: Option<i32>,
    pub workdir: String,
    pub listing: String,
    /// 1-based round number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Set when the error comes from mixed configuration conventions.
    pub config_conflict: bool,
    /// Short descriptions of fixes already tried in this chain.
    pub previous: Vec<String>,
}

/// A section of rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output at `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
    });

    let markers: Vec<_> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, end, key, required)) in markers.iter().enumerate() {
        let next_start = markers
            .get(i + 1)
            .map(|(start, ..)| *start)
            .unwrap_or(rendered.len());
        let content = rendered[*end..next_start].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop droppable sections (listing, then history, then project notes) and
/// finally truncate the last section until the total fits `budget`.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in ["workspace", "history", "project"] {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(last) = sections.last_mut() else {
        return;
    };
    let other_len = total - last.content.len();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    let marker = "\n[truncated]";
    let keep = floor_char_boundary(&last.content, allowed.saturating_sub(marker.len()));
    last.content.truncate(keep);
    if allowed > marker.len() {
        last.content.push_str(marker);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn join_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn environment() -> Result<Environment<'static>> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("remediation", REMEDIATION_TEMPLATE)
            .context("load remediation template")?;
        Ok(env)
    }

    fn finish(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        join_sections(&sections)
    }

    /// System prompt describing how responses are applied.
    pub fn build_system(
        &self,
        workdir: Option<&str>,
        listing: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let env = Self::environment()?;
        let rendered = env.get_template("system")?.render(context! {
            workdir => workdir,
            listing => (!listing.trim().is_empty()).then(|| listing.trim()),
            description => description.map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(self.finish(&rendered))
    }

    /// User prompt asking for exactly one fix for a failed command.
    pub fn build_remediation(&self, input: &RemediationInputs) -> Result<String> {
        let env = Self::environment()?;
        let rendered = env.get_template("remediation")?.render(context! {
            command => input.command.trim(),
            error_text => input.error_text.trim(),
            exit_code => input.exit_code,
            workdir => (!input.workdir.is_empty()).then_some(input.workdir.as_str()),
            listing => (!input.listing.trim().is_empty()).then(|| input.listing.trim()),
            attempt => input.attempt,
            max_attempts => input.max_attempts,
            config_conflict => input.config_conflict,
            previous => &input.previous,
        })?;
        Ok(self.finish(&rendered))
    }
}

/// Sorted, bounded listing of `dir`'s top-level entries (directories end in `/`).
pub fn list_directory(dir: &Path) -> Result<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if LISTING_SKIP.contains(&name.as_str()) {
                return None;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            Some(if is_dir { format!("{name}/") } else { name })
        })
        .collect();
    names.sort();
    let hidden = names.len().saturating_sub(LISTING_LIMIT);
    names.truncate(LISTING_LIMIT);
    let mut listing = names
        .iter()
        .map(|n| format!("- {n}"))
        .collect::<Vec<_>>()
        .join("\n");
    if hidden > 0 {
        listing.push_str(&format!("\n- ... ({hidden} more)"));
    }
    Ok(listing)
}
