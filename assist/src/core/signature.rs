//! Classification of command failures for the deterministic fallback chain.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::command::package_manager_of;

/// Recognized failure shape of a command's error output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSignature {
    /// ESLint flat/legacy configuration mismatch.
    LintConfigConflict,
    /// `EACCES` or another permission failure.
    PermissionDenied,
    /// The package manager could not find `package.json`.
    MissingManifest,
    /// A module import could not be resolved; holds the installable package.
    MissingModule { package: String },
    /// A file or directory does not exist.
    MissingPath { path: String },
    /// A package-manager failure with no more specific shape.
    DependencyFailure,
    Unknown,
}

static MISSING_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Cannot find module|Can't resolve|Cannot find package) ['"]([^'"]+)['"]"#)
        .expect("missing module regex")
});

static ENOENT_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ENOENT: no such file or directory, \w+ '([^']+)'").expect("enoent path regex")
});

static NO_SUCH_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[\s:])'?([^\s':]+)'?: No such file or directory")
        .expect("no such file regex")
});

static ZERO_ISSUES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:0 problems|0 errors|found 0 vulnerabilities|0 issues",
        r"|no problems found|no errors found)\b",
    ))
    .expect("zero issues regex")
});

/// Classify a failure from the failing command and its combined error text.
///
/// Checks run from the most specific shape to the least specific one.
pub fn classify_error(command: &str, error_text: &str) -> ErrorSignature {
    if is_lint_config_conflict(command, error_text) {
        return ErrorSignature::LintConfigConflict;
    }
    if error_text.contains("EACCES")
        || error_text.to_ascii_lowercase().contains("permission denied")
    {
        return ErrorSignature::PermissionDenied;
    }
    if is_missing_manifest(error_text) {
        return ErrorSignature::MissingManifest;
    }
    if let Some(package) = missing_package(error_text) {
        return ErrorSignature::MissingModule { package };
    }
    if let Some(path) = missing_path(error_text) {
        return ErrorSignature::MissingPath { path };
    }
    if package_manager_of(command).is_some() || error_text.contains("npm ERR!") {
        return ErrorSignature::DependencyFailure;
    }
    ErrorSignature::Unknown
}

fn is_lint_config_conflict(command: &str, error_text: &str) -> bool {
    let lower = error_text.to_ascii_lowercase();
    let mentions_eslint =
        lower.contains("eslint") || command.contains("eslint") || command.contains("lint");
    mentions_eslint
        && (lower.contains("eslint.config")
            || lower.contains(".eslintrc")
            || lower.contains("flat config")
            || lower.contains("eslint_use_flat_config")
            || lower.contains("invalid option '--ext'"))
}

fn is_missing_manifest(error_text: &str) -> bool {
    let lower = error_text.to_ascii_lowercase();
    lower.contains("package.json")
        && (lower.contains("enoent")
            || lower.contains("no such file")
            || lower.contains("could not read"))
}

/// Installable package name for an unresolved module import.
///
/// Relative imports and Node built-ins yield `None`. Deep imports are reduced to
/// the package root, keeping `@scope/name` together.
pub fn missing_package(error_text: &str) -> Option<String> {
    let specifier = MISSING_MODULE_RE.captures(error_text)?.get(1)?.as_str();
    package_root(specifier)
}

fn package_root(specifier: &str) -> Option<String> {
    if specifier.starts_with(['.', '/']) || specifier.starts_with("node:") || specifier.is_empty() {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if let Some(scope) = first.strip_prefix('@') {
        let name = parts.next().filter(|n| !n.is_empty())?;
        return Some(format!("@{scope}/{name}"));
    }
    Some(first.to_string())
}

/// Path named by an `ENOENT` / `No such file or directory` message.
pub fn missing_path(error_text: &str) -> Option<String> {
    ENOENT_PATH_RE
        .captures(error_text)
        .or_else(|| NO_SUCH_FILE_RE.captures(error_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True if tool output reports that nothing is left to fix.
pub fn reports_zero_issues(output: &str) -> bool {
    ZERO_ISSUES_RE.is_match(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_wins_for_npm_install() {
        let err = "Error: Cannot find module 'left-pad'\nRequire stack:\n- /app/index.js";
        assert_eq!(
            classify_error("npm install", err),
            ErrorSignature::MissingModule {
                package: "left-pad".to_string()
            }
        );
    }

    #[test]
    fn package_roots() {
        assert_eq!(
            missing_package(
                "Module not found: Error: Can't resolve \
                 '@openzeppelin/contracts/token/ERC20/ERC20.sol'"
            ),
            Some("@openzeppelin/contracts".to_string())
        );
        assert_eq!(
            missing_package("Cannot find module 'lodash/fp'"),
            Some("lodash".to_string())
        );
        assert_eq!(missing_package("Cannot find module './util'"), None);
        assert_eq!(missing_package("Cannot find module 'node:fs'"), None);
    }

    #[test]
    fn permission_and_manifest() {
        assert_eq!(
            classify_error(
                "npm i -g x",
                "npm ERR! Error: EACCES: permission denied, mkdir '/usr/lib/node_modules'"
            ),
            ErrorSignature::PermissionDenied
        );
        assert_eq!(
            classify_error(
                "npm run build",
                "npm ERR! enoent ENOENT: no such file or directory, open '/app/package.json'"
            ),
            ErrorSignature::MissingManifest
        );
    }

    #[test]
    fn lint_config_conflicts() {
        let err = "ESLint couldn't find an eslint.config.(js|mjs|cjs) file.";
        assert_eq!(classify_error("npx eslint .", err), ErrorSignature::LintConfigConflict);
    }

    #[test]
    fn missing_paths() {
        assert_eq!(
            missing_path("Error: ENOENT: no such file or directory, open 'contracts/Token.sol'"),
            Some("contracts/Token.sol".to_string())
        );
        assert_eq!(
            missing_path("cat: build/out.txt: No such file or directory"),
            Some("build/out.txt".to_string())
        );
        assert_eq!(
            classify_error(
                "node scripts/run.js",
                "Error: ENOENT: no such file or directory, scandir 'data'"
            ),
            ErrorSignature::MissingPath {
                path: "data".to_string()
            }
        );
    }

    #[test]
    fn generic_package_manager_failures() {
        assert_eq!(
            classify_error("npm install", "npm ERR! code ERESOLVE"),
            ErrorSignature::DependencyFailure
        );
        assert_eq!(classify_error("make", "boom"), ErrorSignature::Unknown);
    }

    #[test]
    fn zero_issue_reports() {
        assert!(reports_zero_issues("✔ 0 problems (0 errors, 0 warnings)"));
        assert!(reports_zero_issues("found 0 vulnerabilities"));
        assert!(!reports_zero_issues("10 problems (3 errors, 7 warnings)"));
    }
}
