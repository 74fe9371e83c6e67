//! Deterministic classification of artifacts into commands and file content.

use crate::core::env_format::looks_like_env;
use crate::core::types::{Artifact, ArtifactKind, ClassifiedArtifact};

const SHELL_TAGS: &[&str] = &["bash", "shell", "sh", "zsh", "console", "terminal"];
const PLAIN_TAGS: &[&str] = &["", "text", "plaintext", "txt"];

/// Leading tokens that mark a plain block as shell input.
const SHELL_VERBS: &[&str] = &[
    "npm ", "npx ", "node ", "cd ", "mkdir ", "yarn ", "pnpm ", "git ", "touch ",
];

/// Classify an artifact from its language tag and content.
///
/// - Shell-family tag => `Command`. An empty tag counts as shell unless the
///   content is an env fragment or a JSON document.
/// - Plain or untagged block whose first non-blank line starts with a shell verb
///   => `Command`.
/// - Otherwise => `FileContent`.
pub fn classify(artifact: &Artifact) -> ArtifactKind {
    let tag = artifact.language.trim().to_ascii_lowercase();
    if SHELL_TAGS.contains(&tag.as_str()) {
        return ArtifactKind::Command;
    }
    if !PLAIN_TAGS.contains(&tag.as_str()) {
        return ArtifactKind::FileContent;
    }
    if starts_with_shell_verb(&artifact.content) {
        return ArtifactKind::Command;
    }
    if tag.is_empty() && !looks_like_env(&artifact.content) && !looks_like_json(&artifact.content)
    {
        return ArtifactKind::Command;
    }
    ArtifactKind::FileContent
}

/// Classify and pair in one step.
pub fn classify_all(artifacts: impl IntoIterator<Item = Artifact>) -> Vec<ClassifiedArtifact> {
    artifacts
        .into_iter()
        .map(|artifact| ClassifiedArtifact {
            kind: classify(&artifact),
            artifact,
        })
        .collect()
}

fn starts_with_shell_verb(content: &str) -> bool {
    let Some(first) = content.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    let mut first = first.strip_prefix("$ ").unwrap_or(first);
    // `NODE_ENV=production npm start`
    while let Some((head, rest)) = first.split_once(char::is_whitespace)
        && is_assignment(head)
    {
        first = rest.trim_start();
    }
    SHELL_VERBS.iter().any(|verb| first.starts_with(verb))
}

fn is_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn looks_like_json(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}
