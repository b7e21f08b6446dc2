//! dispatch-inspect - inspect a dispatcher configuration
//!
//! Loads the configuration the way a host service would and shows what the
//! dispatcher would do with it on a cold start.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use llm_dispatch::version::BuildInfo;
use llm_dispatch::{DispatchConfig, Dispatcher, ModelType, RequestPolicy};

/// Inspect llm-dispatch configuration and selection
#[derive(Parser)]
#[command(name = "dispatch-inspect")]
#[command(version = llm_dispatch::version::PKG_VERSION)]
#[command(about = "Inspect llm-dispatch configuration and provider selection")]
struct Args {
    /// Path to config file (default: ~/.llm-dispatch/config.toml)
    #[arg(short, long, env = "LLM_DISPATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved provider table
    Providers,

    /// Show the attempt plan for a request on a cold start
    Select {
        /// Model type (chat, vision, reasoning, artifact)
        #[arg(short = 't', long, default_value = "chat")]
        model_type: ModelType,
        /// Preferred provider
        #[arg(short, long)]
        prefer: Option<String>,
        /// Restrict the candidate pool (comma separated)
        #[arg(long, value_delimiter = ',')]
        providers: Vec<String>,
        /// Cost ceiling in USD
        #[arg(long)]
        max_cost: Option<f64>,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as TOML
    Config,

    /// Print build information
    Version,
}

fn main() -> ExitCode {
    // Initialise tracing (default: warn; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Version = args.command {
        let info = BuildInfo::current();
        println!("dispatch-inspect {}", info.version_string());
        if let Some(built_at) = info.built_at {
            println!("built: {built_at}");
        }
        return Ok(());
    }

    let config = DispatchConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Providers => {
            let dispatcher = Dispatcher::new(config)?;
            println!(
                "{:<12} {:<14} {:>8} {:>6} {:>6} {:>6} {:>6}  enabled",
                "id", "name", "priority", "max", "cost", "lat", "rel"
            );
            for (id, p) in dispatcher.selector().providers() {
                println!(
                    "{:<12} {:<14} {:>8} {:>6} {:>6.2} {:>6.2} {:>6.2}  {}",
                    id,
                    p.name,
                    p.priority,
                    p.max_concurrent,
                    p.cost_weight,
                    p.latency_weight,
                    p.reliability_weight,
                    p.enabled
                );
            }
        }

        Command::Select {
            model_type,
            prefer,
            providers,
            max_cost,
            json,
        } => {
            let dispatcher = Dispatcher::new(config)?;
            let mut policy = RequestPolicy::new().model_type(model_type);
            if let Some(prefer) = prefer {
                policy = policy.preferred_provider(prefer);
            }
            if !providers.is_empty() {
                policy = policy.providers(providers);
            }
            if let Some(max_cost) = max_cost {
                policy = policy.max_cost(max_cost);
            }

            let plan = dispatcher.plan(&policy)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan.decision)?);
                return Ok(());
            }
            println!("path: {}", plan.path.as_str());
            if let Some(decision) = &plan.decision {
                println!(
                    "selected: {} / {} (score {:.3})",
                    decision.provider, decision.model, decision.score
                );
                println!("reason: {}", decision.reason);
            }
            println!("attempts:");
            for (idx, target) in plan.targets.iter().enumerate() {
                println!("  {}. {} / {}", idx + 1, target.provider, target.model);
            }
        }

        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Command::Version => {}
    }

    Ok(())
}
