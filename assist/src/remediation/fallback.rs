//! Deterministic fallback strategies for failures generation could not fix.
//!
//! Strategies are tried in order and the first one that applies wins, even
//! when it has nothing left to do.
//! Planning only inspects the filesystem; the remediation driver performs the
//! steps so commands still pass through the executor.

use std::path::{Path, PathBuf};

use crate::core::command::{PackageManager, package_manager_of};
use crate::core::filename::contain_path;
use crate::core::signature::ErrorSignature;

const FLAT_ESLINT_CONFIGS: &[&str] = &[
    "eslint.config.js",
    "eslint.config.mjs",
    "eslint.config.cjs",
    "eslint.config.ts",
];

const LEGACY_ESLINT_CONFIGS: &[&str] = &[
    ".eslintrc",
    ".eslintrc.js",
    ".eslintrc.cjs",
    ".eslintrc.json",
    ".eslintrc.yml",
    ".eslintrc.yaml",
];

const MINIMAL_FLAT_CONFIG: &str = r#"export default [
  {
    files: ["**/*.{js,mjs,cjs,jsx,ts,tsx}"],
    ignores: ["node_modules/**", "dist/**", "build/**"],
    rules: {},
  },
];
"#;

/// One action of a fallback plan. Paths are relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStep {
    Run(String),
    Remove(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    WriteFile { path: PathBuf, content: String },
    /// A directory, or an empty file when the path has an extension.
    CreatePath(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    pub strategy: &'static str,
    pub steps: Vec<FallbackStep>,
}

/// What a strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct FallbackInput<'a> {
    pub command: &'a str,
    pub signature: &'a ErrorSignature,
    pub workdir: &'a Path,
    pub project_root: &'a Path,
}

struct Strategy {
    name: &'static str,
    applies: fn(&FallbackInput<'_>) -> bool,
    plan: fn(&FallbackInput<'_>) -> Vec<FallbackStep>,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "lint-config",
        applies: applies_to_lint,
        plan: plan_lint_config,
    },
    Strategy {
        name: "dependency-manager",
        applies: applies_to_dependencies,
        plan: plan_dependencies,
    },
    Strategy {
        name: "missing-path",
        applies: applies_to_missing_path,
        plan: plan_missing_path,
    },
];

/// First applicable strategy's plan, or `None` when nothing applies or the
/// applicable strategy has no steps left.
pub fn plan_fallback(input: &FallbackInput<'_>) -> Option<FallbackPlan> {
    let strategy = STRATEGIES.iter().find(|strategy| (strategy.applies)(input))?;
    let steps = (strategy.plan)(input);
    if steps.is_empty() {
        return None;
    }
    Some(FallbackPlan {
        strategy: strategy.name,
        steps,
    })
}

fn applies_to_lint(input: &FallbackInput<'_>) -> bool {
    *input.signature == ErrorSignature::LintConfigConflict
}

/// Pick one ESLint convention from what exists and never mix them.
fn plan_lint_config(input: &FallbackInput<'_>) -> Vec<FallbackStep> {
    let present = |names: &[&'static str]| -> Vec<&'static str> {
        names
            .iter()
            .copied()
            .filter(|name| input.workdir.join(name).exists())
            .collect()
    };
    let flat = present(FLAT_ESLINT_CONFIGS);
    let legacy = present(LEGACY_ESLINT_CONFIGS);

    if flat.is_empty() && !legacy.is_empty() {
        let command = input.command.trim();
        if command.contains("ESLINT_USE_FLAT_CONFIG=false") {
            return Vec::new();
        }
        return vec![FallbackStep::Run(format!("ESLINT_USE_FLAT_CONFIG=false {command}"))];
    }

    let mut steps = Vec::new();
    if flat.is_empty() {
        steps.push(FallbackStep::WriteFile {
            path: PathBuf::from("eslint.config.mjs"),
            content: MINIMAL_FLAT_CONFIG.to_string(),
        });
    }
    steps.extend(legacy.into_iter().map(|name| FallbackStep::Rename {
        from: PathBuf::from(name),
        to: PathBuf::from(format!("{name}.bak")),
    }));
    steps
}

fn applies_to_dependencies(input: &FallbackInput<'_>) -> bool {
    let manager = package_manager_of(input.command);
    let js_manager = matches!(
        manager,
        Some(PackageManager::Npm | PackageManager::Yarn | PackageManager::Pnpm)
    );
    match input.signature {
        ErrorSignature::PermissionDenied | ErrorSignature::DependencyFailure => {
            manager == Some(PackageManager::Npm)
        }
        ErrorSignature::MissingManifest => true,
        ErrorSignature::MissingModule { .. } => js_manager || manager.is_none(),
        _ => false,
    }
}

fn plan_dependencies(input: &FallbackInput<'_>) -> Vec<FallbackStep> {
    match input.signature {
        ErrorSignature::PermissionDenied => vec![FallbackStep::Run(
            "npm config set prefix \"$HOME/.npm-global\"".to_string(),
        )],
        ErrorSignature::MissingManifest => vec![FallbackStep::Run("npm init -y".to_string())],
        ErrorSignature::MissingModule { package } => {
            let install = match package_manager_of(input.command) {
                Some(PackageManager::Yarn) => format!("yarn add {package}"),
                Some(PackageManager::Pnpm) => format!("pnpm add {package}"),
                _ => format!("npm install {package} --save"),
            };
            vec![FallbackStep::Run(install)]
        }
        ErrorSignature::DependencyFailure => vec![
            FallbackStep::Run("npm cache clean --force".to_string()),
            FallbackStep::Remove(PathBuf::from("node_modules")),
            FallbackStep::Remove(PathBuf::from("package-lock.json")),
            FallbackStep::Run("npm install --prefer-online".to_string()),
        ],
        _ => Vec::new(),
    }
}

fn applies_to_missing_path(input: &FallbackInput<'_>) -> bool {
    matches!(input.signature, ErrorSignature::MissingPath { .. })
}

fn plan_missing_path(input: &FallbackInput<'_>) -> Vec<FallbackStep> {
    let ErrorSignature::MissingPath { path } = input.signature else {
        return Vec::new();
    };
    let requested = Path::new(path);
    let relative = match requested.strip_prefix(input.workdir) {
        Ok(inside) => inside.to_string_lossy().into_owned(),
        Err(_) => path.clone(),
    };
    let prefix = input.workdir.strip_prefix(input.project_root).ok();
    let contained = contain_path(&relative, prefix);
    vec![FallbackStep::CreatePath(contained.relative)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(command: &str, signature: ErrorSignature, workdir: &Path) -> Option<FallbackPlan> {
        plan_fallback(&FallbackInput {
            command,
            signature: &signature,
            workdir,
            project_root: workdir,
        })
    }

    #[test]
    fn missing_module_installs_the_package() {
        let temp = tempfile::tempdir().expect("tempdir");
        let signature = ErrorSignature::MissingModule {
            package: "left-pad".to_string(),
        };
        let npm = plan("npm install", signature.clone(), temp.path()).expect("plan");
        assert_eq!(npm.strategy, "dependency-manager");
        assert_eq!(npm.steps, vec![FallbackStep::Run("npm install left-pad --save".to_string())]);

        let yarn = plan("yarn build", signature, temp.path()).expect("plan");
        assert_eq!(yarn.steps, vec![FallbackStep::Run("yarn add left-pad".to_string())]);
    }

    #[test]
    fn cache_clear_sequence_for_generic_npm_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reset = plan("npm ci", ErrorSignature::DependencyFailure, temp.path()).expect("plan");
        assert_eq!(reset.steps.len(), 4);
        assert_eq!(reset.steps[0], FallbackStep::Run("npm cache clean --force".to_string()));
        assert_eq!(reset.steps[3], FallbackStep::Run("npm install --prefer-online".to_string()));
        assert!(plan("make", ErrorSignature::DependencyFailure, temp.path()).is_none());
    }

    #[test]
    fn permission_and_manifest_fixes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let perm =
            plan("npm install -g x", ErrorSignature::PermissionDenied, temp.path()).expect("plan");
        assert_eq!(
            perm.steps,
            vec![FallbackStep::Run("npm config set prefix \"$HOME/.npm-global\"".to_string())]
        );
        let manifest =
            plan("npm run build", ErrorSignature::MissingManifest, temp.path()).expect("plan");
        assert_eq!(manifest.steps, vec![FallbackStep::Run("npm init -y".to_string())]);
    }

    #[test]
    fn lint_prefers_flat_when_no_config_exists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan =
            plan("npx eslint .", ErrorSignature::LintConfigConflict, temp.path()).expect("plan");
        assert!(matches!(
            &plan.steps[0],
            FallbackStep::WriteFile { path, content }
                if path == Path::new("eslint.config.mjs") && content.starts_with("export default")
        ));
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn lint_flat_config_retires_legacy_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("eslint.config.mjs"), "export default [];")
            .expect("write");
        std::fs::write(temp.path().join(".eslintrc.json"), "{}").expect("write");
        let retire =
            plan("npm run lint", ErrorSignature::LintConfigConflict, temp.path()).expect("plan");
        assert_eq!(
            retire.steps,
            vec![FallbackStep::Rename {
                from: PathBuf::from(".eslintrc.json"),
                to: PathBuf::from(".eslintrc.json.bak"),
            }]
        );
    }

    #[test]
    fn lint_legacy_only_reruns_with_legacy_mode() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join(".eslintrc.js"), "module.exports = {};").expect("write");
        let rerun =
            plan("npx eslint src", ErrorSignature::LintConfigConflict, temp.path()).expect("plan");
        assert_eq!(
            rerun.steps,
            vec![FallbackStep::Run("ESLINT_USE_FLAT_CONFIG=false npx eslint src".to_string())]
        );
    }

    #[test]
    fn exhausted_lint_fallback_does_not_fall_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join(".eslintrc.js"), "module.exports = {};").expect("write");
        let command = "ESLINT_USE_FLAT_CONFIG=false npx eslint src";
        assert!(plan(command, ErrorSignature::LintConfigConflict, temp.path()).is_none());
    }

    #[test]
    fn missing_path_is_contained() {
        let temp = tempfile::tempdir().expect("tempdir");
        let absolute = temp.path().join("data/out.json").to_string_lossy().into_owned();
        let signature = ErrorSignature::MissingPath { path: absolute };
        let inside = plan("node run.js", signature, temp.path()).expect("plan");
        assert_eq!(
            inside.steps,
            vec![FallbackStep::CreatePath(PathBuf::from("data/out.json"))]
        );

        let outside = plan(
            "node run.js",
            ErrorSignature::MissingPath {
                path: "/etc/app/config".to_string(),
            },
            temp.path(),
        )
        .expect("plan");
        assert_eq!(outside.steps, vec![FallbackStep::CreatePath(PathBuf::from("config"))]);
    }

    #[test]
    fn unknown_failures_have_no_fallback() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(plan("make", ErrorSignature::Unknown, temp.path()).is_none());
    }
}
