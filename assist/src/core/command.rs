//! Command block splitting, safety gating and outcome sniffing.

use crate::core::placeholder::find_unresolved;
use crate::core::types::SkipReason;

/// Tokens in stderr that mark a run as failed even with a zero exit status.
pub const FAILURE_SIGNATURES: &[&str] = &["Error:", "error:", "fatal:"];

/// Split a command block into independent commands.
///
/// Blank lines and `#` comments are dropped, a leading `$ ` prompt marker is
/// removed, and lines ending in `\` are joined with the following line.
pub fn split_commands(block: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut pending = String::new();

    for raw in block.lines() {
        let line = raw.trim();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        let line = if pending.is_empty() {
            line.strip_prefix("$ ").unwrap_or(line)
        } else {
            line
        };
        match line.strip_suffix('\\') {
            Some(head) => {
                push_part(&mut pending, head);
            }
            None => {
                push_part(&mut pending, line);
                commands.push(std::mem::take(&mut pending));
            }
        }
    }
    if !pending.is_empty() {
        commands.push(pending);
    }
    commands.retain(|c| !c.is_empty());
    commands
}

fn push_part(pending: &mut String, part: &str) {
    let part = part.trim();
    if part.is_empty() {
        return;
    }
    if !pending.is_empty() {
        pending.push(' ');
    }
    pending.push_str(part);
}

/// Reason a command must not run, if any.
///
/// Quoted and backticked text is gated as a command of its own, so
/// `sh -c 'sudo whoami'` is caught like `sudo whoami`.
pub fn unsafe_reason(command: &str) -> Option<SkipReason> {
    for segment in segments(command) {
        let tokens = command_tokens(segment);
        if tokens.iter().any(|t| is_program(t, "sudo") || is_program(t, "doas"))
            || tokens.first().is_some_and(|t| is_program(t, "su"))
        {
            return Some(SkipReason::Elevation);
        }
        if is_recursive_force_rm(&tokens) {
            return Some(SkipReason::RecursiveDelete);
        }
    }
    find_unresolved(command).map(SkipReason::UnresolvedPlaceholder)
}

/// Split on shell control operators (`;`, `&&`, `||`, `|`, `&`), subshells
/// and quote boundaries.
fn segments(command: &str) -> impl Iterator<Item = &str> {
    command
        .split([';', '|', '&', '\n', '(', ')', '`', '\'', '"'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `sudo`, `\sudo` and `/usr/bin/sudo` all name the `sudo` program.
fn is_program(token: &str, name: &str) -> bool {
    let token = token.trim_start_matches('\\');
    token == name || (token.contains('/') && token.rsplit('/').next() == Some(name))
}

/// Whitespace tokens with leading `VAR=value` assignments removed.
fn command_tokens(segment: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = segment.split_whitespace().collect();
    while let Some(first) = tokens.first() {
        let is_assignment = first.split_once('=').is_some_and(|(name, _)| {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !is_assignment {
            break;
        }
        tokens.remove(0);
    }
    tokens
}

fn is_recursive_force_rm(tokens: &[&str]) -> bool {
    let Some(position) = tokens
        .iter()
        .position(|t| is_program(t, "rm"))
    else {
        return false;
    };
    let mut recursive = false;
    let mut force = false;
    for token in &tokens[position + 1..] {
        match *token {
            "--recursive" => recursive = true,
            "--force" => force = true,
            t if t.starts_with('-') && !t.starts_with("--") => {
                recursive |= t.contains('r') || t.contains('R');
                force |= t.contains('f');
            }
            _ => {}
        }
    }
    recursive && force
}

/// True if stderr carries a failure signature.
pub fn has_failure_signature(stderr: &str) -> bool {
    FAILURE_SIGNATURES.iter().any(|sig| stderr.contains(sig))
}

/// Target of a bare `cd <dir>` command.
pub fn cd_target(command: &str) -> Option<&str> {
    let rest = command.trim().strip_prefix("cd ")?.trim();
    if rest.is_empty() || rest.contains(['&', ';', '|']) {
        return None;
    }
    Some(rest.trim_matches(|c| c == '"' || c == '\''))
}

/// Package manager used by a dependency-installation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Pip,
    Cargo,
}

/// Detect dependency-installation commands (`npm install`, `yarn add`, ...).
pub fn dependency_install(command: &str) -> Option<PackageManager> {
    let tokens = command_tokens(command.trim());
    let (tool, sub) = (tokens.first().copied()?, tokens.get(1).copied());
    match (tool, sub) {
        ("npm", Some("install" | "i" | "ci" | "add")) => Some(PackageManager::Npm),
        ("yarn", None | Some("add" | "install")) => Some(PackageManager::Yarn),
        ("pnpm", Some("install" | "i" | "add")) => Some(PackageManager::Pnpm),
        ("pip" | "pip3", Some("install")) => Some(PackageManager::Pip),
        ("cargo", Some("add" | "fetch")) => Some(PackageManager::Cargo),
        _ => None,
    }
}

/// Package manager named by the first token of a command, if any.
pub fn package_manager_of(command: &str) -> Option<PackageManager> {
    let tokens = command_tokens(command.trim());
    match tokens.first().copied()? {
        "npm" | "npx" => Some(PackageManager::Npm),
        "yarn" => Some(PackageManager::Yarn),
        "pnpm" => Some(PackageManager::Pnpm),
        "pip" | "pip3" => Some(PackageManager::Pip),
        "cargo" => Some(PackageManager::Cargo),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_and_skips_comments() {
        let block = "# install deps\nnpm install\n\n$ npx hardhat compile\n";
        assert_eq!(
            split_commands(block),
            vec!["npm install", "npx hardhat compile"]
        );
    }

    #[test]
    fn joins_continuations() {
        let block = "docker run \\\n  -p 3000:3000 \\\n  app\necho done \\";
        assert_eq!(
            split_commands(block),
            vec!["docker run -p 3000:3000 app", "echo done"]
        );
    }

    #[test]
    fn gates_elevation_and_recursive_delete() {
        assert_eq!(unsafe_reason("sudo rm -rf /"), Some(SkipReason::Elevation));
        assert_eq!(
            unsafe_reason("npm run build && sudo npm i -g x"),
            Some(SkipReason::Elevation)
        );
        assert_eq!(unsafe_reason("rm -rf node_modules"), Some(SkipReason::RecursiveDelete));
        assert_eq!(unsafe_reason("rm -r -f build"), Some(SkipReason::RecursiveDelete));
        assert_eq!(
            unsafe_reason("rm --recursive --force dist"),
            Some(SkipReason::RecursiveDelete)
        );
        assert_eq!(unsafe_reason("rm -r build"), None);
        assert_eq!(unsafe_reason("rm -f file.txt"), None);
        assert_eq!(unsafe_reason("npm cache clean --force"), None);
        assert_eq!(unsafe_reason("echo superuser"), None);
    }

    #[test]
    fn gates_quoted_and_backticked_commands() {
        assert_eq!(unsafe_reason("sh -c 'sudo whoami'"), Some(SkipReason::Elevation));
        assert_eq!(unsafe_reason("bash -c \"sudo whoami\""), Some(SkipReason::Elevation));
        assert_eq!(unsafe_reason("echo `sudo id`"), Some(SkipReason::Elevation));
        assert_eq!(unsafe_reason("sh -c 'su root'"), Some(SkipReason::Elevation));
        assert_eq!(unsafe_reason("/usr/bin/sudo ls"), Some(SkipReason::Elevation));
        assert_eq!(unsafe_reason("sh -c 'rm -rf /'"), Some(SkipReason::RecursiveDelete));
        assert_eq!(unsafe_reason("git commit -m \"bump deps\""), None);
    }

    #[test]
    fn gates_unresolved_placeholders() {
        assert_eq!(
            unsafe_reason("node deploy.js --key [YourPrivateKey]"),
            Some(SkipReason::UnresolvedPlaceholder("[YourPrivateKey]".to_string()))
        );
    }

    #[test]
    fn failure_signatures() {
        assert!(has_failure_signature("npm ERR! Error: Cannot find module"));
        assert!(has_failure_signature("fatal: not a git repository"));
        assert!(!has_failure_signature("npm WARN deprecated"));
    }

    #[test]
    fn detects_cd_and_dependency_installs() {
        assert_eq!(cd_target("cd my-app"), Some("my-app"));
        assert_eq!(cd_target("cd app && npm i"), None);
        assert_eq!(dependency_install("npm install"), Some(PackageManager::Npm));
        assert_eq!(dependency_install("yarn"), Some(PackageManager::Yarn));
        assert_eq!(dependency_install("npm run build"), None);
        assert_eq!(package_manager_of("pnpm add x"), Some(PackageManager::Pnpm));
    }
}
