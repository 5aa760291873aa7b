//! # Gazette — self-rescheduling newsletter pipeline
//!
//! Usage:
//!   gazette run                                    # Start the engine
//!   gazette subscribe --user u1 --email a@x.com \
//!       --categories technology,science --frequency daily
//!   gazette pause --user u1                        # Gate will skip
//!   gazette resume --user u1                       # Re-seed a cycle
//!   gazette cancel --user u1                       # Drop pending/in-flight cycle
//!   gazette status                                 # Recent cycles

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use gazette_core::GazetteConfig;
use gazette_core::traits::PreferenceStore;
use gazette_core::types::{CycleTrigger, Frequency, Subscription};
use gazette_delivery::EmailJsTransport;
use gazette_scheduler::{JobStore, Pipeline, ScheduleEngine, SqlitePreferenceStore};
use gazette_sources::NewsApiSource;

#[derive(Parser)]
#[command(name = "gazette", version, about = "Personalized newsletter pipeline")]
struct Cli {
    /// Config file path (default: ~/.gazette/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the schedule engine and run until interrupted.
    Run,
    /// Create (or replace) a subscription and queue an immediate cycle.
    Subscribe {
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: String,
        /// Comma-separated category tags.
        #[arg(long)]
        categories: String,
        /// daily | weekly | biweekly (unknown values fall back to weekly)
        #[arg(long, default_value = "weekly")]
        frequency: String,
    },
    /// Deactivate a subscription; pending cycles will skip at the gate.
    Pause {
        #[arg(long)]
        user: String,
    },
    /// Reactivate a subscription and seed the next cycle from stored
    /// preferences.
    Resume {
        #[arg(long)]
        user: String,
    },
    /// Cancel the user's pending or in-flight cycle.
    Cancel {
        #[arg(long)]
        user: String,
    },
    /// Show recent cycles.
    Status {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            GazetteConfig::load_from(Path::new(&shellexpand::tilde(path).to_string()))?
        }
        None => GazetteConfig::load()?,
    };
    config.apply_env();

    let db_path = shellexpand::tilde(&config.scheduler.db_path).to_string();
    let store = Arc::new(Mutex::new(JobStore::open(Path::new(&db_path))?));
    let prefs = Arc::new(SqlitePreferenceStore::open(Path::new(&db_path))?);
    let engine = build_engine(&config, store.clone(), prefs.clone());

    match cli.command {
        Command::Run => {
            // Credentials are a startup-time requirement for the
            // daemon, not for operator commands.
            config.email.validate()?;
            if config.llm.api_key.is_empty() {
                anyhow::bail!("Missing configuration: llm.api_key (or OPENAI_API_KEY)");
            }
            if config.news.api_key.is_empty() {
                tracing::warn!("⚠️ news.api_key is empty: every category fetch will fail");
            }
            println!("📰 Gazette v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {db_path}");
            println!("   ⏰ Tick:     every {}s", config.scheduler.tick_secs);
            gazette_scheduler::engine::run(Arc::new(engine)).await;
        }
        Command::Subscribe {
            user,
            email,
            categories,
            frequency,
        } => {
            let categories: Vec<String> = categories
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let frequency = Frequency::parse(&frequency);
            let sub = Subscription {
                user_id: user.clone(),
                email: email.clone(),
                categories: categories.clone(),
                frequency,
                is_active: true,
            };
            prefs.upsert(&sub)?;

            let queued = engine
                .submit(CycleTrigger {
                    user_id: user.clone(),
                    email,
                    categories,
                    frequency,
                    scheduled_for: None,
                })
                .await?;
            match queued {
                Some(run_id) => println!("✅ Subscribed {user}; first cycle {run_id} queued"),
                None => println!("✅ Subscription saved for {user}; a cycle was already queued"),
            }
        }
        Command::Pause { user } => {
            prefs.set_active(&user, false).await?;
            println!("⏸️  Paused {user} — the next cycle will skip at the gate");
        }
        Command::Resume { user } => {
            prefs.set_active(&user, true).await?;
            match engine.reactivate(&user).await? {
                Some(run_id) => println!("▶️  Resumed {user}; next cycle {run_id} seeded"),
                None => println!("▶️  Resumed {user}; a cycle was already queued"),
            }
        }
        Command::Cancel { user } => {
            engine.cancel(&user).await?;
            println!("🛑 Cancellation issued for {user}");
        }
        Command::Status { limit } => {
            let jobs = store.lock().await.recent(limit)?;
            if jobs.is_empty() {
                println!("No cycles recorded.");
            }
            for job in jobs {
                println!(
                    "{}  {:<10} {:<10} attempts={} scheduled_for={} {}",
                    job.run_id,
                    job.trigger.user_id,
                    job.status.as_str(),
                    job.attempts,
                    job.trigger
                        .scheduled_for
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "now".into()),
                    job.last_error.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn build_engine(
    config: &GazetteConfig,
    store: Arc<Mutex<JobStore>>,
    prefs: Arc<SqlitePreferenceStore>,
) -> ScheduleEngine {
    let source = Arc::new(NewsApiSource::new(config.news.clone()));
    let summarizer: Arc<dyn gazette_core::traits::Summarizer> =
        Arc::from(gazette_providers::create_summarizer(&config.llm));
    let transport = Arc::new(EmailJsTransport::new(config.email.clone()));

    let pipeline = Pipeline::new(
        source,
        summarizer,
        transport,
        prefs.clone(),
        config.clone(),
    );
    ScheduleEngine::new(store, pipeline, prefs, config.scheduler.clone())
}
