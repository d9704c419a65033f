use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rstrustflow::{ComplianceEngine, ConfigManager, Decision, GateDecision, RuleLoader};

/// 部署闸门阻断时的退出码
const EXIT_BLOCKED: u8 = 2;

#[derive(Parser)]
#[command(name = "rstrustflow")]
#[command(about = "Constitution-based compliance checks for smart-contract source")]
#[command(version)]
struct Cli {
    /// Emit debug logs (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a contract and print its compliance report
    Check {
        #[arg(short, long)]
        constitution: PathBuf,

        #[arg(long)]
        contract_id: String,

        /// Per-matcher time budget in milliseconds
        #[arg(long, default_value_t = 2000)]
        budget_ms: u64,

        /// Run matchers sequentially on the main thread
        #[arg(long)]
        sequential: bool,

        /// Print compact single-line JSON
        #[arg(long)]
        compact: bool,

        source: PathBuf,
    },

    /// Validate a constitution document without analyzing anything
    Validate {
        constitution: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "rstrustflow=debug" } else { "rstrustflow=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check {
            constitution,
            contract_id,
            budget_ms,
            sequential,
            compact,
            source,
        } => {
            let config = ConfigManager::custom()
                .constitution_path(constitution.clone())
                .matcher_budget(Duration::from_millis(budget_ms))
                .verbose(cli.verbose)
                .build();
            let engine = ComplianceEngine::new(config)
                .await
                .with_context(|| format!("failed to load constitution {}", constitution.display()))?;

            let text = tokio::fs::read_to_string(&source)
                .await
                .with_context(|| format!("failed to read contract source {}", source.display()))?;

            let report = if sequential {
                engine.analyze(&contract_id, &text)
            } else {
                engine.analyze_concurrent(&contract_id, &text).await?
            };

            let rendered = if compact { report.to_json()? } else { report.to_json_pretty()? };
            println!("{}", rendered);

            match GateDecision::decide(&report) {
                Decision::Allow => Ok(ExitCode::SUCCESS),
                Decision::Block(reasons) => {
                    eprintln!("deployment blocked by {} finding(s):", reasons.len());
                    for finding in &reasons {
                        eprintln!("  {}", finding);
                    }
                    Ok(ExitCode::from(EXIT_BLOCKED))
                }
            }
        }
        Commands::Validate { constitution } => {
            let ruleset = RuleLoader::load_from_path(&constitution)
                .await
                .with_context(|| format!("invalid constitution {}", constitution.display()))?;
            println!(
                "constitution {} is valid: version {}, {} rules, blocking at {}",
                constitution.display(),
                ruleset.version(),
                ruleset.len(),
                ruleset.blocking_severity()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
