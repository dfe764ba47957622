//! `ai`: sandboxed planning, Q&A and test-writing agent.
//!
//! Runs inside a project root (`--root`, default: the current directory) and
//! reads `.ai/config.toml` from it when present.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use agentbox::agent::prompt::{PlanPrompt, TestWritePrompt};
use agentbox::cancel::CancelToken;
use agentbox::exit_codes;
use agentbox::io::config::{AgentConfig, default_config_path, load_config, write_config};
use agentbox::io::openai::OpenAiOracle;
use agentbox::logging;
use agentbox::report::RunReport;
use agentbox::run::{RunOptions, RunRequest, run_use_case};
use agentbox::usecase::{Placement, PlanMode, RiskLevel, TestFramework, USE_CASES};

#[derive(Parser, Debug)]
#[command(name = "ai", version, about = "Sandboxed agent for planning, questions and tests")]
struct Cli {
    /// Project root the agent is confined to.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (default: <root>/.ai/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug diagnostics on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a prioritized todo plan for an objective.
    Plan {
        objective: String,
        #[arg(long, value_enum, default_value_t = PlanMode::Plan)]
        mode: PlanMode,
        #[arg(long, value_enum, default_value_t = RiskLevel::Moderate)]
        risk: RiskLevel,
        /// Tree depth for exploration (default: config `exploration_depth`).
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
        depth: Option<u32>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Answer a question about the project.
    Ask {
        question: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write tests for a file or directory.
    Testwrite {
        target: String,
        #[arg(long, value_enum, default_value_t = TestFramework::Pytest)]
        framework: TestFramework,
        #[arg(long, value_enum, default_value_t = Placement::NewFile)]
        placement: Placement,
        /// Allow the agent to write files inside the project.
        #[arg(long)]
        write: bool,
        /// Check writes against the sandbox but do not touch the filesystem.
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List the available use cases and their sandbox settings.
    Usecases,
    /// Write a default config to `.ai/config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Files to read first (repeatable).
    #[arg(long = "file")]
    files: Vec<String>,
    /// Iteration budget (default: config `max_iterations`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
    max_iterations: Option<u32>,
    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&cli.root));
    match cli.command {
        Command::Usecases => {
            cmd_usecases();
            Ok(exit_codes::OK)
        }
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Plan {
            objective,
            mode,
            risk,
            depth,
            common,
        } => {
            let cfg = load_config(&config_path)?;
            let request = RunRequest::Plan(PlanPrompt {
                objective,
                mode,
                risk,
                depth: depth.unwrap_or(cfg.run.exploration_depth),
                context_files: common.files.clone(),
            });
            let options = RunOptions {
                max_iterations: common.max_iterations,
                depth,
                ..RunOptions::default()
            };
            cmd_agent(&cli.root, &cfg, request, &options, common.json)
        }
        Command::Ask { question, common } => {
            let cfg = load_config(&config_path)?;
            let request = RunRequest::Ask {
                question,
                context_files: common.files.clone(),
            };
            let options = RunOptions {
                max_iterations: common.max_iterations,
                ..RunOptions::default()
            };
            cmd_agent(&cli.root, &cfg, request, &options, common.json)
        }
        Command::Testwrite {
            target,
            framework,
            placement,
            write,
            dry_run,
            common,
        } => {
            let cfg = load_config(&config_path)?;
            let request = RunRequest::TestWrite(TestWritePrompt {
                target,
                framework,
                placement,
                context_files: common.files.clone(),
                writes: write,
            });
            let options = RunOptions {
                max_iterations: common.max_iterations,
                user_consent: write,
                dry_run,
                ..RunOptions::default()
            };
            cmd_agent(&cli.root, &cfg, request, &options, common.json)
        }
    }
}

fn cmd_agent(
    root: &Path,
    cfg: &AgentConfig,
    request: RunRequest,
    options: &RunOptions,
    json: bool,
) -> Result<i32> {
    if request.objective().trim().is_empty() {
        bail!("the objective must not be empty");
    }
    let oracle = OpenAiOracle::from_config(&cfg.oracle).context("configure oracle")?;
    let cancel = CancelToken::new();
    cancel.install_sigint().context("install Ctrl-C handler")?;

    let (report, termination) = run_use_case(root, request, cfg, options, &oracle, &cancel)?;
    print_report(&report, json)?;
    Ok(exit_codes::for_termination(&termination))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("serialize report")?;
        println!("{text}");
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

fn cmd_usecases() {
    for use_case in USE_CASES {
        let writes = if use_case.allows_writes {
            "writes"
        } else {
            "read-only"
        };
        println!(
            "{:<13} {:<8} {:<10} {}",
            use_case.id,
            use_case.mode.as_str(),
            writes,
            use_case.summary
        );
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &AgentConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_defaults_and_explore_mode() {
        let cli = Cli::try_parse_from(["ai", "plan", "add caching"]).expect("parse");
        match cli.command {
            Command::Plan {
                mode, risk, depth, ..
            } => {
                assert_eq!(mode, PlanMode::Plan);
                assert_eq!(risk, RiskLevel::Moderate);
                assert_eq!(depth, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["ai", "plan", "x", "--mode", "explore+plan", "--file", "a.rs"])
            .expect("parse");
        match cli.command {
            Command::Plan { mode, common, .. } => {
                assert_eq!(mode, PlanMode::ExplorePlan);
                assert_eq!(common.files, vec!["a.rs".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn iteration_budget_is_range_checked() {
        assert!(Cli::try_parse_from(["ai", "ask", "why?", "--max-iterations", "0"]).is_err());
        assert!(Cli::try_parse_from(["ai", "ask", "why?", "--max-iterations", "51"]).is_err());
        assert!(Cli::try_parse_from(["ai", "ask", "why?", "--max-iterations", "50"]).is_ok());
    }

    #[test]
    fn testwrite_flags() {
        let cli = Cli::try_parse_from([
            "ai",
            "--root",
            "/tmp/project",
            "testwrite",
            "app.py",
            "--write",
            "--dry-run",
            "--framework",
            "unittest",
        ])
        .expect("parse");
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        match cli.command {
            Command::Testwrite {
                write,
                dry_run,
                framework,
                placement,
                ..
            } => {
                assert!(write && dry_run);
                assert_eq!(framework, TestFramework::Unittest);
                assert_eq!(placement, Placement::NewFile);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
