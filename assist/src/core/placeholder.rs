//! Placeholder catalog, detection and substitution.
//!
//! Everything here is pure. Prompting and persistence live in
//! [`crate::resolver`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::core::env_format::looks_like_env;
use crate::core::types::PlaceholderKind;

/// Bound values keyed by kind. Ordered for deterministic substitution.
pub type Bindings = BTreeMap<PlaceholderKind, String>;

struct Catalog {
    patterns: Vec<(PlaceholderKind, Vec<Regex>)>,
    generic: Vec<Regex>,
}

static CATALOG: LazyLock<Catalog> = LazyLock::new(|| Catalog {
    patterns: PlaceholderKind::ALL
        .iter()
        .map(|kind| (*kind, compile(kind_patterns(*kind))))
        .collect(),
    generic: compile(&[
        r"\[Your[A-Z][A-Za-z0-9 _-]*\]",
        r"<YOUR_[A-Z0-9_]+>",
        r"\bYOUR_[A-Z0-9_]+_HERE\b",
    ]),
});

fn kind_patterns(kind: PlaceholderKind) -> &'static [&'static str] {
    match kind {
        PlaceholderKind::PrivateKey => &[
            r"(?i)\[your[ _-]?(?:wallet[ _-]?)?private[ _-]?key[A-Za-z0-9 _-]*\]",
            r"(?i)<your[ _-]?private[ _-]?key[A-Za-z0-9_-]*>",
            r"(?i)\byour[_-]private[_-]key(?:[_-]here)?\b",
        ],
        PlaceholderKind::ApiKey => &[
            r"(?i)\[your[ _-]?api[ _-]?key[A-Za-z0-9 _-]*\]",
            r"(?i)<your[ _-]?api[ _-]?key[A-Za-z0-9_-]*>",
            r"(?i)\byour[_-]api[_-]key(?:[_-]here)?\b",
        ],
        PlaceholderKind::WalletAddress => &[
            r"(?i)\[your[ _-]?(?:wallet[ _-]?|public[ _-]?)*address[A-Za-z0-9 _-]*\]",
            r"(?i)<your[ _-]?(?:wallet[ _-]?)?address[A-Za-z0-9_-]*>",
            r"(?i)\byour[_-](?:wallet[_-])?address(?:[_-]here)?\b",
        ],
        PlaceholderKind::RpcEndpoint => &[
            r"(?i)\[your[ _-]?rpc[ _-]?(?:url|endpoint)[A-Za-z0-9 _-]*\]",
            r"(?i)<your[ _-]?rpc[ _-]?(?:url|endpoint)[A-Za-z0-9_-]*>",
            r"(?i)\byour[_-]rpc[_-](?:url|endpoint)(?:[_-]here)?\b",
        ],
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("placeholder catalog regex"))
        .collect()
}

fn patterns_for(kind: PlaceholderKind) -> &'static [Regex] {
    CATALOG
        .patterns
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, patterns)| patterns.as_slice())
        .unwrap_or(&[])
}

/// Kinds with at least one catalog match in `text`.
pub fn detect_kinds(text: &str) -> BTreeSet<PlaceholderKind> {
    CATALOG
        .patterns
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Replace every placeholder of each bound kind with its value.
///
/// Unbound kinds are left untouched, and the function is idempotent.
pub fn substitute(text: &str, bindings: &Bindings) -> String {
    let mut out = text.to_string();
    for (kind, value) in bindings {
        for re in patterns_for(*kind) {
            out = re.replace_all(&out, NoExpand(value)).into_owned();
        }
    }
    out
}

/// [`substitute`] for file content. When the result is an env fragment,
/// `VAR=...` lines for bound variable names become `VAR=value`.
pub fn substitute_env(text: &str, bindings: &Bindings) -> String {
    let out = substitute(text, bindings);
    if looks_like_env(&out) {
        rewrite_env_lines(&out, bindings)
    } else {
        out
    }
}

fn rewrite_env_lines(text: &str, bindings: &Bindings) -> String {
    let trailing_newline = text.ends_with('\n');
    let mut lines: Vec<String> = text
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let body = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            for (kind, value) in bindings {
                let var = kind.env_var();
                if let Some(rest) = body.strip_prefix(var)
                    && rest.trim_start().starts_with('=')
                {
                    return format!("{var}={value}");
                }
            }
            line.to_string()
        })
        .collect();
    if trailing_newline {
        lines.push(String::new());
    }
    lines.join("\n")
}

/// First placeholder-shaped token still present in `text`, if any.
pub fn find_unresolved(text: &str) -> Option<String> {
    CATALOG
        .patterns
        .iter()
        .flat_map(|(_, patterns)| patterns.iter())
        .chain(CATALOG.generic.iter())
        .filter_map(|re| re.find(text))
        .min_by_key(|m| m.start())
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(PlaceholderKind, &str)]) -> Bindings {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn detects_each_kind() {
        let text = concat!(
            "const key = \"[YourPrivateKeyArray]\";\n",
            "const api = 'your_api_key_here';\n",
            "const to = '<YOUR_WALLET_ADDRESS>';\n",
            "const rpc = '[Your RPC URL]';",
        );
        let kinds = detect_kinds(text);
        assert_eq!(
            kinds.into_iter().collect::<Vec<_>>(),
            PlaceholderKind::ALL.to_vec()
        );
    }

    #[test]
    fn no_false_positive_on_ordinary_text() {
        assert!(detect_kinds("const apiKey = process.env.API_KEY;").is_empty());
        assert_eq!(find_unresolved("npm install ethers"), None);
    }

    #[test]
    fn substitutes_bound_kinds_only() {
        let text = "key=[YourPrivateKey] api=your_api_key_here";
        let out = substitute(text, &bindings(&[(PlaceholderKind::PrivateKey, "abc123")]));
        assert_eq!(out, "key=abc123 api=your_api_key_here");
    }

    #[test]
    fn env_fragment_lines_are_rewritten() {
        let text = "PRIVATE_KEY=[YourPrivateKeyArray]\nAPI_KEY=changeme\nOTHER=1";
        let out = substitute_env(
            text,
            &bindings(&[
                (PlaceholderKind::PrivateKey, "abc123"),
                (PlaceholderKind::ApiKey, "k"),
            ]),
        );
        assert_eq!(out, "PRIVATE_KEY=abc123\nAPI_KEY=k\nOTHER=1");
    }

    #[test]
    fn substitution_is_idempotent() {
        let b = bindings(&[(PlaceholderKind::RpcEndpoint, "https://rpc.example.com")]);
        let once = substitute_env("RPC_URL=[YourRpcUrl]\n", &b);
        let twice = substitute_env(&once, &b);
        assert_eq!(once, twice);
        assert_eq!(once, "RPC_URL=https://rpc.example.com\n");
    }

    #[test]
    fn command_with_inline_assignment_keeps_its_tail() {
        let b = bindings(&[(PlaceholderKind::ApiKey, "k")]);
        let command = "API_KEY=[YourApiKey] node deploy.js";
        assert_eq!(substitute(command, &b), "API_KEY=k node deploy.js");
        assert_eq!(substitute_env(command, &b), "API_KEY=k node deploy.js");
    }

    #[test]
    fn values_with_dollar_signs_are_literal() {
        let out = substitute(
            "[YourApiKey]",
            &bindings(&[(PlaceholderKind::ApiKey, "a$1b")]),
        );
        assert_eq!(out, "a$1b");
    }

    #[test]
    fn finds_generic_unresolved_tokens() {
        assert_eq!(
            find_unresolved("deploy --token [YourDeployToken]"),
            Some("[YourDeployToken]".to_string())
        );
        assert_eq!(
            find_unresolved("x <YOUR_SECRET> y"),
            Some("<YOUR_SECRET>".to_string())
        );
    }
}
