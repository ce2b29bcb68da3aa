use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plancast_core::config::AppConfig;
use plancast_core::traits::{MemoryLookup, PlanIngestor};
use plancast_core::types::{Plan, ScheduleResult};
use plancast_engine::{analyze_schedule, build_graph, Pipeline, PipelineOutput, StructuredIngestor};
use plancast_memory::{MemoryBank, SqliteMemory};

#[derive(Parser)]
#[command(name = "plancast", version, about = "Dependency and failure-risk forecasting for project plans")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "plancast.toml", env = "PLANCAST_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast failure risk for a plan document (TOML or JSON, `-` for stdin)
    Analyze {
        file: PathBuf,
        /// Override the plan's domain
        #[arg(long)]
        domain: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show critical path and parallel groups without risk lookups
    Schedule {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit domain failure memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List known domains
    List,
    /// Show the narrative for a domain
    Get { domain: String },
    /// Add or replace a domain narrative
    Set { domain: String, narrative: String },
    /// Forget a domain
    Remove { domain: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plancast=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "plancast", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Analyze { file, domain, json } => {
            let text = read_input(&file)?;
            let ingestor = StructuredIngestor::new(config.forecast.domain_key.clone());
            let mut plan = ingestor.ingest(&text)?;
            if let Some(domain) = domain {
                plan.metadata
                    .insert(config.forecast.domain_key.clone(), domain);
            }

            let memory = open_memory(&config)?;
            let source = plancast_signals::from_config(&config)?;
            let pipeline = Pipeline::new(config, source, memory);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling analysis");
                    on_signal.cancel();
                }
            });

            let output = check_plan(pipeline.analyze_plan(plan, cancel).await)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_analysis(&output);
            }
        }
        Commands::Schedule { file, json } => {
            let text = read_input(&file)?;
            let plan = StructuredIngestor::new(config.forecast.domain_key.clone()).ingest(&text)?;
            let built = check_plan(build_graph(&plan.steps))?;
            let schedule = analyze_schedule(&built.graph, &built.steps)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
            } else {
                let plan = Plan {
                    steps: built.steps,
                    graph: built.graph,
                    ..plan
                };
                print_schedule(&plan, &schedule);
            }
        }
        Commands::Memory { action } => {
            let memory = open_memory(&config)?;
            match action {
                MemoryAction::List => {
                    for (domain, narrative) in memory.entries() {
                        println!("{:<16} {}", domain, narrative);
                    }
                }
                MemoryAction::Get { domain } => println!("{}", memory.query(&domain)),
                MemoryAction::Set { domain, narrative } => {
                    if config.memory_path().is_none() {
                        warn!("No [memory] path configured; the change lasts only for this process");
                    }
                    memory.upsert(&domain, &narrative)?;
                    println!("Stored narrative for '{}'", domain.trim().to_lowercase());
                }
                MemoryAction::Remove { domain } => {
                    if memory.remove(&domain)? {
                        println!("Removed '{}'", domain.trim().to_lowercase());
                    } else {
                        println!("No narrative stored for '{}'", domain.trim().to_lowercase());
                    }
                }
            }
        }
        Commands::Config => {
            let mut shown = config.clone();
            if let Some(ws) = shown.web_search.as_mut() {
                if !ws.api_key.is_empty() {
                    ws.api_key = "***".into();
                }
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Structural plan errors (cycles, unknown ids) are reported plainly with
/// exit status 2; everything else propagates.
fn check_plan<T>(result: plancast_core::error::Result<T>) -> anyhow::Result<T> {
    match result {
        Err(e) if e.is_structural() => {
            eprintln!("Plan rejected: {}", e);
            std::process::exit(2);
        }
        other => Ok(other?),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(AppConfig::load(path)?)
    } else {
        Ok(AppConfig::default())
    }
}

/// SQLite store when a path is configured, in-process bank otherwise.
fn open_memory(config: &AppConfig) -> anyhow::Result<Arc<dyn MemoryLookup>> {
    match config.memory_path() {
        Some(path) => {
            let store = SqliteMemory::open(&path)?;
            store.apply_domains(&config.memory.domains)?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryBank::with_domains(&config.memory.domains))),
    }
}

fn read_input(file: &Path) -> anyhow::Result<String> {
    if file == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(file)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))
    }
}

fn print_schedule(plan: &Plan, schedule: &ScheduleResult) {
    if !plan.goal.is_empty() {
        println!("Goal: {}", plan.goal);
    }
    println!(
        "Critical path ({:.1}h): {}",
        schedule.critical_path_hours,
        schedule.critical_path.join(" -> ")
    );
    println!("Parallel groups:");
    for (i, group) in schedule.parallel_groups.iter().enumerate() {
        println!("  {}: {}", i + 1, group.join(", "));
    }
}

fn print_analysis(output: &PipelineOutput) {
    print_schedule(&output.plan, &output.schedule);
    println!();
    println!(
        "{:<12} {:>9} {:>8} {:>10} {:>6}  FACTORS",
        "STEP", "INTRINSIC", "EXTERNAL", "HISTORICAL", "TOTAL"
    );
    for step in &output.plan.steps {
        let r = &step.risk;
        println!(
            "{:<12} {:>9.2} {:>8.2} {:>10.2} {:>6.2}  {}",
            truncate(&step.id, 12),
            r.intrinsic,
            r.external,
            r.historical,
            r.total,
            r.factors.join("; ")
        );
    }
    println!();
    print!("{}", output.report.summary);
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
