//! Command-line entry point for the assist pipeline.
//!
//! `apply` runs an existing model response against the project, `ask` sends a
//! request to the configured generator first. Stable exit codes live in
//! [`assist::exit_codes`].

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use assist::core::types::SessionStats;
use assist::exit_codes;
use assist::io::config::{AssistConfig, CONFIG_RELATIVE_PATH, load_config, write_config};
use assist::io::generator::{CommandGenerator, ProviderError};
use assist::io::operator::TerminalOperator;
use assist::io::shell::SystemShell;
use assist::logging;
use assist::pipeline::{Collaborators, ProjectContext, ask_and_apply, run_assist_pipeline};

#[derive(Parser)]
#[command(
    name = "assist",
    version,
    about = "Apply model responses to a project: write files, run commands, fix failures"
)]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.assist/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing configuration.
        #[arg(short, long)]
        force: bool,
    },
    /// Apply a saved model response (`-` reads stdin).
    Apply {
        input: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Generate a response for `prompt` and apply it.
    Ask {
        prompt: String,
        /// Short project description included in the generation prompt.
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
struct RunArgs {
    /// Run commands without confirmation.
    #[arg(short, long)]
    yes: bool,
    /// Print the session summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<ProviderError>().is_some() {
                eprintln!(
                    "hint: check the `[generator]` command in {CONFIG_RELATIVE_PATH} \
                     and its credentials"
                );
                exit_codes::PROVIDER
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Apply { input, run } => {
            let response = read_input(&input)?;
            let project = ProjectContext::new(&root);
            cmd_run(&root, run, |deps, config| {
                run_assist_pipeline(&response, &project, deps, config)
            })
        }
        Command::Ask {
            prompt,
            description,
            run,
        } => {
            if prompt.trim().is_empty() {
                bail!("prompt must not be empty");
            }
            let mut project = ProjectContext::new(&root);
            if let Some(description) = description {
                project = project.with_description(description);
            }
            cmd_run(&root, run, |deps, config| {
                ask_and_apply(&prompt, &project, deps, config)
            })
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = root.join(CONFIG_RELATIVE_PATH);
    if path.exists() && !force {
        eprintln!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&path, &AssistConfig::default())?;
    eprintln!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

type Deps<'a> = Collaborators<'a, SystemShell, CommandGenerator, TerminalOperator>;

fn cmd_run<F>(root: &Path, args: RunArgs, pipeline: F) -> Result<i32>
where
    F: FnOnce(&Deps<'_>, &AssistConfig) -> Result<SessionStats>,
{
    let mut config = load_config(&root.join(CONFIG_RELATIVE_PATH))?;
    if args.yes {
        config.auto_approve = true;
    }
    config.validate()?;

    let shell = SystemShell {
        program: config.shell.program.clone(),
        timeout: Duration::from_secs(config.command_timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
    };
    let generator = CommandGenerator {
        command: config.generator.command.clone(),
        timeout: Duration::from_secs(config.generator.timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
    };
    let operator = TerminalOperator::new();
    let deps = Collaborators {
        shell: &shell,
        generator: &generator,
        operator: &operator,
    };

    let stats = pipeline(&deps, &config)?;
    report(&stats, args.json)?;
    Ok(if stats.has_unresolved() {
        exit_codes::UNRESOLVED
    } else {
        exit_codes::OK
    })
}

fn report(stats: &SessionStats, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(stats).context("serialize session stats")?;
        println!("{payload}");
        return Ok(());
    }
    eprintln!(
        "commands: {} succeeded, {} failed, {} skipped",
        stats.commands.succeeded, stats.commands.failed, stats.commands.skipped
    );
    eprintln!(
        "files: {} created, {} updated, {} failed",
        stats.files.created, stats.files.updated, stats.files.failed
    );
    eprintln!(
        "errors: {} detected, {} resolved, {} unresolved",
        stats.errors.detected, stats.errors.resolved, stats.errors.unresolved
    );
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read response from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(input).with_context(|| format!("read response {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_apply_with_flags() {
        let cli = Cli::parse_from(["assist", "--root", "/tmp/p", "apply", "-", "--yes", "--json"]);
        assert_eq!(cli.root, PathBuf::from("/tmp/p"));
        let Command::Apply { input, run } = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(input, "-");
        assert!(run.yes && run.json);
    }

    #[test]
    fn parse_ask_with_description() {
        let cli = Cli::parse_from(["assist", "ask", "add a test", "--description", "node api"]);
        let Command::Ask {
            prompt, description, ..
        } = cli.command
        else {
            panic!("expected ask");
        };
        assert_eq!(prompt, "add a test");
        assert_eq!(description.as_deref(), Some("node api"));
    }

    #[test]
    fn init_writes_default_config_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(cmd_init(temp.path(), false).expect("init"), exit_codes::OK);
        let path = temp.path().join(CONFIG_RELATIVE_PATH);
        let written = load_config(&path).expect("load");
        assert_eq!(written, AssistConfig::default());

        fs::write(&path, "auto_approve = true\n").expect("write");
        cmd_init(temp.path(), false).expect("init");
        assert!(load_config(&path).expect("load").auto_approve);
    }
}
