//! Sentiscope CLI
//!
//! Runs the API server and offers one-shot commands against the same
//! configuration:
//! - Serve the REST API
//! - Analyze texts from the command line
//! - Recompute daily rollups
//! - Print statistics
//! - Generate a default config file

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sentiscope::analysis::AnalysisOrchestrator;
use sentiscope::api::{self, AppState};
use sentiscope::classifier::ClassifierResource;
use sentiscope::config::{generate_default_config, Config, LoggingConfig};
use sentiscope::stats::{RollupScheduler, StatisticsEngine};
use sentiscope::storage::{open_store, RecordStore};

#[derive(Parser)]
#[command(name = "sentiscope")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sentiment classification service with history and statistics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./sentiscope.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API server
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Classify one or more texts and record the outcome
    Analyze {
        /// Texts to classify
        #[arg(required = true)]
        texts: Vec<String>,
        /// Show the score for every label (single text only)
        #[arg(long)]
        all_scores: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Recompute daily rollups
    Rollup {
        /// Day to roll up (YYYY-MM-DD, default: today)
        #[arg(short, long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,
        /// First day of a range
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// Last day of a range, inclusive
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },

    /// Print statistics for the last N days
    Stats {
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing config to {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Analyze {
            texts,
            all_scores,
            json,
        } => run_analyze(&config, texts, all_scores, json).await,
        Commands::Rollup { date, from, to } => run_rollup(&config, date, from, to).await,
        Commands::Stats { days, json } => run_stats(&config, days, json).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sentiscope={},tower_http=info", logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn open_configured_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store = open_store(&config.storage.database_url)
        .with_context(|| format!("opening store {}", config.storage.database_url))?;
    tracing::info!(engine = store.engine(), "Record store opened");
    Ok(store)
}

async fn run_server(config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("Starting Sentiscope API server v{}", env!("CARGO_PKG_VERSION"));

    let store = open_configured_store(&config)?;

    let classifier = Arc::new(ClassifierResource::new(config.classifier.clone()));
    let loading = Arc::clone(&classifier);
    // Keep serving on failure: health reports it and analyses answer 503
    if let Err(e) = tokio::task::spawn_blocking(move || loading.initialize()).await? {
        tracing::warn!(error = %e, "Serving without a classifier");
    }

    let mut api_config = api::ApiConfig::from(&config.api);
    if let Some(host) = host {
        api_config.host = host;
    }
    if let Some(port) = port {
        api_config.port = port;
    }

    let mut state = AppState::new(classifier, store, api_config.clone());

    let scheduler = Arc::new(RollupScheduler::new(
        Arc::clone(&state.stats),
        config.rollup.interval_secs,
        config.rollup.enabled,
    ));
    let rollup_task = Arc::clone(&scheduler).start().await;
    if rollup_task.is_some() {
        tracing::info!(interval_secs = config.rollup.interval_secs, "Background rollup started");
        state = state.with_scheduler(Arc::clone(&scheduler));
    } else {
        tracing::info!("Background rollup disabled");
    }

    let served = api::serve(state, &api_config).await;

    scheduler.stop().await;
    if let Some(task) = rollup_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Rollup task ended abnormally");
        }
    }

    served?;
    tracing::info!("Sentiscope API server stopped");
    Ok(())
}

async fn run_analyze(
    config: &Config,
    texts: Vec<String>,
    all_scores: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_configured_store(config)?;
    let classifier = Arc::new(ClassifierResource::new(config.classifier.clone()));
    classifier.initialize()?;

    let orchestrator = AnalysisOrchestrator::new(classifier, store, config.classifier.batch_size);

    if let [text] = texts.as_slice() {
        let outcome = orchestrator.analyze_one(text, all_scores).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        let analysis = &outcome.analysis;
        println!("{:<10} {:.4}  {}", analysis.label, analysis.score, analysis.text);
        if let Some(predictions) = &analysis.predictions {
            for p in predictions {
                println!("  {:<10} {:.4}", p.label, p.score);
            }
        }
        if !outcome.persistence.is_stored() {
            eprintln!("warning: result was not recorded");
        }
        return Ok(());
    }

    if all_scores {
        tracing::warn!("--all-scores applies to a single text; showing top labels");
    }

    let outcome = orchestrator.analyze_many(texts).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for item in &outcome.results {
        println!("{:<10} {:.4}  {}", item.label, item.score, item.text);
    }
    println!(
        "\n{} texts in {:.2} ms ({:.2} ms each)",
        outcome.results.len(),
        outcome.total_time_ms,
        outcome.per_item_time_ms
    );
    if outcome.persistence_failures > 0 {
        eprintln!(
            "warning: {} of {} results were not recorded",
            outcome.persistence_failures,
            outcome.results.len()
        );
    }
    Ok(())
}

async fn run_rollup(
    config: &Config,
    date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let engine = StatisticsEngine::new(open_configured_store(config)?);

    let (from, to) = match (date, from, to) {
        (Some(day), _, _) => (day, day),
        (None, Some(from), Some(to)) => (from, to),
        (None, None, None) => {
            let today = Utc::now().date_naive();
            (today, today)
        }
        _ => bail!("--from and --to must be given together"),
    };
    let rolled = engine.rollup_range(from, to).await?;
    if rolled.is_empty() {
        println!("No analyses between {} and {}", from, to);
    }
    for stat in &rolled {
        println!(
            "{}  total {:>5}  positive {:>5}  negative {:>5}  avg score {}",
            stat.date,
            stat.total_analyses,
            stat.positive_count,
            stat.negative_count,
            stat.average_score
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

async fn run_stats(config: &Config, days: u32, json: bool) -> anyhow::Result<()> {
    let engine = StatisticsEngine::new(open_configured_store(config)?);
    let stats = engine.compute_stats_for_days(days).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Last {} days", days);
    println!("  analyses:        {}", stats.total_analyses);
    println!(
        "  positive:        {} ({:.1}%)",
        stats.positive_count, stats.positive_percentage
    );
    println!(
        "  negative:        {} ({:.1}%)",
        stats.negative_count, stats.negative_percentage
    );
    println!("  average score:   {:.4}", stats.average_score);
    println!("  average time:    {:.2} ms", stats.average_processing_time_ms);
    Ok(())
}
