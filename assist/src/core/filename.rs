//! Target filename inference and path containment.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::env_format::looks_like_env;
use crate::core::types::{Artifact, ArtifactKind, ClassifiedArtifact};

const KNOWN_EXTENSIONS: &str = concat!(
    "js|jsx|mjs|cjs|ts|tsx|json|sol|py|rs|go|rb|java|kt|swift|c|h|cpp|hpp|cs|php",
    "|sh|bash|zsh|toml|yaml|yml|md|html|htm|css|scss|sql|graphql|txt|xml|ini|cfg",
    "|conf|lock|env|vue|svelte",
);

/// Names like `Node.js` that look like files in prose but never are.
const NOT_FILENAMES: &[&str] = &[
    "node.js", "next.js", "nuxt.js", "vue.js", "react.js", "express.js", "three.js", "d3.js",
    "chart.js", "ethers.js", "web3.js", "nest.js", "deno.js", "socket.io",
];

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        concat!(
            r"(?:^|[\s`'\x22(*:])",
            r"((?:\.?[\w@-]+/)*",
            r"(?:[\w@.-]*\.(?:{exts})|\.env(?:\.[\w-]+)?|Dockerfile|Makefile|Procfile))",
            r"(?:$|[\s`'\x22),;:*]|\.(?:\s|$))",
        ),
        exts = KNOWN_EXTENSIONS
    ))
    .expect("filename mention regex")
});

/// Filenames explicitly mentioned in prose, in order of first appearance.
pub fn explicit_mentions(prose: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for line in prose.lines() {
        // Overlapping delimiters: scan with a moving start so adjacent mentions are found.
        let mut start = 0;
        while let Some(caps) = MENTION_RE.captures_at(line, start) {
            let Some(m) = caps.get(1) else { break };
            let name = m.as_str().trim_end_matches('.');
            if is_plausible_filename(name) && !seen.iter().any(|s: &String| s == name) {
                seen.push(name.to_string());
            }
            start = m.end();
        }
    }
    seen
}

fn is_plausible_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if NOT_FILENAMES.contains(&lower.as_str()) {
        return false;
    }
    // Version numbers and domains such as `v1.2` or `example.com` never match the
    // extension list, but `e.g.` style abbreviations can end in a known extension.
    !lower.starts_with("e.g") && !lower.starts_with("i.e")
}

/// Infer a target filename for every file-kind artifact.
///
/// The i-th file artifact takes the i-th explicit mention from `prose`; the rest
/// fall back to a name derived from the language tag and ordinal position.
/// Command artifacts get `None`.
pub fn infer_filenames(prose: &str, artifacts: &[ClassifiedArtifact]) -> Vec<Option<String>> {
    let mentions = explicit_mentions(prose);
    let mut ordinal = 0usize;
    artifacts
        .iter()
        .map(|classified| {
            if classified.kind != ArtifactKind::FileContent {
                return None;
            }
            let name = mentions
                .get(ordinal)
                .cloned()
                .unwrap_or_else(|| fallback_filename(&classified.artifact, ordinal + 1));
            ordinal += 1;
            Some(name)
        })
        .collect()
}

/// Deterministic name from language tag and 1-based ordinal among file artifacts.
pub fn fallback_filename(artifact: &Artifact, ordinal: usize) -> String {
    let tag = artifact.language.trim().to_ascii_lowercase();
    if matches!(tag.as_str(), "" | "text" | "plaintext" | "txt" | "env" | "dotenv")
        && looks_like_env(&artifact.content)
    {
        return ".env".to_string();
    }
    if (tag == "json" || tag.is_empty()) && looks_like_npm_manifest(&artifact.content) {
        return "package.json".to_string();
    }
    match language_extension(&tag) {
        Some((ext, true)) => format!("script_{ordinal}.{ext}"),
        Some((ext, false)) => format!("file_{ordinal}.{ext}"),
        None => format!("file_{ordinal}.txt"),
    }
}

/// Conventional extension for a language tag, and whether it is a script language.
fn language_extension(tag: &str) -> Option<(&'static str, bool)> {
    let mapped = match tag {
        "javascript" | "js" | "node" => ("js", true),
        "jsx" => ("jsx", true),
        "typescript" | "ts" => ("ts", true),
        "tsx" => ("tsx", true),
        "python" | "py" => ("py", true),
        "solidity" | "sol" => ("sol", true),
        "rust" | "rs" => ("rs", true),
        "go" | "golang" => ("go", true),
        "ruby" | "rb" => ("rb", true),
        "bash" | "sh" | "shell" | "zsh" => ("sh", true),
        "json" => ("json", false),
        "yaml" | "yml" => ("yaml", false),
        "toml" => ("toml", false),
        "html" => ("html", false),
        "css" => ("css", false),
        "markdown" | "md" => ("md", false),
        "sql" => ("sql", false),
        "xml" => ("xml", false),
        _ => return None,
    };
    Some(mapped)
}

fn looks_like_npm_manifest(content: &str) -> bool {
    let trimmed = content.trim_start();
    trimmed.starts_with('{')
        && content.contains("\"name\"")
        && (content.contains("\"dependencies\"") || content.contains("\"scripts\""))
}

/// Outcome of containing a requested path inside the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainedPath {
    /// Path relative to the working directory.
    pub relative: PathBuf,
    /// Set when the requested path was rewritten to its base name.
    pub violation: Option<String>,
}

/// Keep `requested` inside the working directory.
///
/// Absolute paths and paths escaping upward are reduced to their base name.
/// `workdir_prefix` is the working directory relative to the project root; a
/// requested path that starts with it is re-anchored by stripping the prefix.
pub fn contain_path(requested: &str, workdir_prefix: Option<&Path>) -> ContainedPath {
    let requested_path = Path::new(requested.trim());
    let escapes = requested_path.is_absolute()
        || requested_path.has_root()
        || normalize_relative(requested_path).is_none();

    if escapes {
        let base = requested_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("untitled"));
        return ContainedPath {
            relative: base,
            violation: Some(format!(
                "path {requested} escapes the working directory; writing {} instead",
                requested_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            )),
        };
    }

    let mut relative = normalize_relative(requested_path).unwrap_or_default();
    if let Some(prefix) = workdir_prefix.filter(|p| !p.as_os_str().is_empty())
        && let Ok(stripped) = relative.strip_prefix(prefix)
        && !stripped.as_os_str().is_empty()
    {
        relative = stripped.to_path_buf();
    }
    if relative.as_os_str().is_empty() {
        relative = PathBuf::from("untitled");
    }
    ContainedPath {
        relative,
        violation: None,
    }
}

/// Lexically normalize a relative path; `None` if it climbs above its start.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}
