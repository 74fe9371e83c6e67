//! Flat `KEY=VALUE` secrets store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::config::write_atomic;

/// Secrets persisted in a dotenv-style file.
///
/// Reads go through `dotenvy`; writes replace or append one line per key and
/// leave every other line untouched.
#[derive(Debug, Clone)]
pub struct SecretsStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl SecretsStore {
    /// Store at `path` with nothing loaded.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: BTreeMap::new(),
        }
    }

    /// Load the store, treating a missing file as empty.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self::empty(path);
        if !path.exists() {
            return Ok(store);
        }
        let entries =
            dotenvy::from_path_iter(path).with_context(|| format!("open {}", path.display()))?;
        for entry in entries {
            let (key, value) = entry.with_context(|| format!("parse {}", path.display()))?;
            store.values.insert(key, value);
        }
        debug!(keys = store.values.len(), "loaded secrets store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Set `key` in memory and on disk, creating the file if needed.
    #[instrument(skip_all, fields(path = %self.path.display(), key))]
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        let line = format!("{key}={}", quote_value(value));

        let mut replaced = false;
        let mut lines: Vec<String> = existing
            .lines()
            .map(|current| {
                if !replaced && assigns_key(current, key) {
                    replaced = true;
                    line.clone()
                } else {
                    current.to_string()
                }
            })
            .collect();
        if !replaced {
            lines.push(line);
        }
        let mut contents = lines.join("\n");
        contents.push('\n');

        write_atomic(&self.path, &contents)?;
        self.values.insert(key.to_string(), value.to_string());
        debug!(replaced, "secret stored");
        Ok(())
    }
}

fn assigns_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    let body = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
    body.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"").replace('$', "\\$");
    format!("\"{escaped}\"")
}
