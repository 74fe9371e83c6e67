//! Environment-file (`KEY=VALUE`) detection and normalization.

use std::sync::LazyLock;

use regex::Regex;

/// A whole assignment line: one value token (quoted, bracketed or bare) and an
/// optional trailing ` # comment`. `KEY=value cmd` is a command, not a pair.
static ENV_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?:export\s+)?[A-Za-z_][A-Za-z0-9_.]*\s*[=:]\s*",
        r#"(?:"(?:[^"\\]|\\.)*"|'[^']*'|\[[^\]\n]*\]|<[^>\n]*>|[^\s"']*)"#,
        r"(?:\s+#.*)?\s*$",
    ))
    .expect("env line regex")
});

/// True if every non-blank, non-comment line is a single `KEY=value` (or
/// `KEY: value`) pair.
pub fn looks_like_env(content: &str) -> bool {
    let mut saw_pair = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !ENV_LINE_RE.is_match(trimmed) {
            return false;
        }
        saw_pair = true;
    }
    saw_pair
}

/// True for `.env`, `.env.local`, `production.env` and similar names.
pub fn is_env_filename(name: &str) -> bool {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base == ".env" || base.starts_with(".env.") || base.ends_with(".env")
}

/// Coerce each assignment line into `KEY=VALUE` form.
///
/// Comments and blank lines pass through unchanged. A single layer of matching
/// quotes is stripped and trailing inline comments are dropped.
pub fn normalize_env(content: &str) -> String {
    content
        .lines()
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return line.to_string();
    }
    let body = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
    let Some(sep) = separator_index(body) else {
        return line.to_string();
    };
    let key = body[..sep].trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return line.to_string();
    }
    let value = clean_value(body[sep + 1..].trim());
    format!("{key}={value}")
}

/// `=` wins over `:` so URLs in values do not split the key.
fn separator_index(body: &str) -> Option<usize> {
    match (body.find('='), body.find(':')) {
        (Some(eq), _) => Some(eq),
        (None, Some(colon)) => Some(colon),
        (None, None) => None,
    }
}

fn clean_value(raw: &str) -> String {
    let mut chars = raw.chars();
    if let Some(quote @ ('"' | '\'')) = chars.next()
        && let Some(end) = raw[1..].find(quote)
    {
        return raw[1..1 + end].to_string();
    }
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_string(),
        None => raw.to_string(),
    }
}
