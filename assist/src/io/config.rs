//! Assist configuration stored under `.assist/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Project-relative location of the configuration file.
pub const CONFIG_RELATIVE_PATH: &str = ".assist/config.toml";

/// Assist configuration (TOML).
///
/// Meant to be edited by hand. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistConfig {
    /// Secrets store path, relative to the project root.
    pub secrets_path: PathBuf,

    /// Run commands without asking the operator first.
    pub auto_approve: bool,

    /// Generated fix rounds per failing command before the fallback chain runs.
    pub max_remediation_rounds: u32,

    /// Wall-clock limit for a single shell command.
    pub command_timeout_secs: u64,

    /// Keep at most this many bytes of each command's stdout/stderr.
    pub output_limit_bytes: usize,

    /// Byte budget for rendered remediation prompts.
    pub prompt_budget_bytes: usize,

    pub shell: ShellConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Program invoked as `<program> -c <command>`.
    pub program: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints the response (e.g. `["llm"]`).
    pub command: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 5 * 60,
        }
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            secrets_path: PathBuf::from(".env"),
            auto_approve: false,
            max_remediation_rounds: 3,
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 24_000,
            shell: ShellConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl AssistConfig {
    pub fn validate(&self) -> Result<()> {
        if self.secrets_path.as_os_str().is_empty() || self.secrets_path.is_absolute() {
            return Err(anyhow!("secrets_path must be a non-empty relative path"));
        }
        if self.max_remediation_rounds == 0 {
            return Err(anyhow!("max_remediation_rounds must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.shell.program.trim().is_empty() {
            return Err(anyhow!("shell.program must be non-empty"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AssistConfig::default()`.
pub fn load_config(path: &Path) -> Result<AssistConfig> {
    if !path.exists() {
        let cfg = AssistConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AssistConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AssistConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AssistConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".assist").join("config.toml");
        let cfg = AssistConfig {
            auto_approve: true,
            max_remediation_rounds: 5,
            ..AssistConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let toml = "auto_approve = true\n[generator]\ncommand = [\"codex\", \"exec\", \"-\"]\n";
        fs::write(&path, toml).expect("write");
        let cfg = load_config(&path).expect("load");
        assert!(cfg.auto_approve);
        assert_eq!(cfg.generator.command, vec!["codex", "exec", "-"]);
        assert_eq!(cfg.generator.timeout_secs, 300);
        assert_eq!(cfg.max_remediation_rounds, 3);
    }

    #[test]
    fn rejects_zero_rounds_and_absolute_secrets() {
        let cfg = AssistConfig {
            max_remediation_rounds: 0,
            ..AssistConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = AssistConfig {
            secrets_path: PathBuf::from("/etc/secrets"),
            ..AssistConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
