//! Dizznem CLI - run the user state cache and inspect stored users

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use dizznem::commands::ChatCommand;
use dizznem::config::{self, DizznemConfig, Settings};
use dizznem::money::format_money;
use dizznem::shutdown::ShutdownSignal;
use dizznem::ui::{self, output};
use dizznem::{FlushGuard, FlushScheduler, SqliteStore, UserCache, UserStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "dizznem")]
#[command(version)]
#[command(about = "Write-back user state cache for the Dizznem chat bot")]
#[command(long_about = r#"
Dizznem keeps chat users' balances, levels and message counts in memory,
saves changed users to SQLite on a fixed interval, and saves everything
still unsaved on exit.

Example usage:
  dizznem init
  echo "message 42:alice" | dizznem run
  dizznem show --id 42
  dizznem top --by level
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with the default settings
    Init {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Apply chat commands read from stdin until EOF, SIGINT or SIGTERM
    Run {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Seconds between autosaves
        #[arg(short, long)]
        interval: Option<u64>,

        /// Seconds the final save may hold up exit
        #[arg(long)]
        shutdown_timeout: Option<u64>,
    },

    /// Show one stored user
    Show {
        /// User id
        #[arg(long)]
        id: i64,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Leaderboard of stored users
    Top {
        /// Ranking column
        #[arg(long, value_enum, default_value_t = Ranking::Money)]
        by: Ranking,

        /// Maximum number of users
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show statistics about stored users
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Ranking {
    Money,
    Level,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = config::load_config(cli.config.as_deref())?;

    let log_file = file_config
        .as_ref()
        .and_then(|c| c.log_file.as_deref())
        .map(PathBuf::from);
    init_logging(cli.verbose, log_file.as_deref())?;

    match cli.command {
        Commands::Init { database, force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            let defaults = Settings::resolve(None, database, None, None)?;
            let config = DizznemConfig {
                database: Some(defaults.database.to_string_lossy().to_string()),
                flush_interval_secs: Some(defaults.flush_interval.as_secs()),
                shutdown_timeout_secs: Some(defaults.shutdown_timeout.as_secs()),
                log_file: None,
            };
            config::write_config(&path, &config, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }

        Commands::Run {
            database,
            interval,
            shutdown_timeout,
        } => {
            let settings =
                Settings::resolve(file_config.as_ref(), database, interval, shutdown_timeout)?;
            run(settings)?;
        }

        Commands::Show {
            id,
            database,
            format,
        } => {
            let store = open_existing(file_config.as_ref(), database)?;
            let Some(row) = store.get(id)? else {
                anyhow::bail!("No user with id {id}");
            };

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&row)?);
            } else {
                output::profile(&row);
            }
        }

        Commands::Top {
            by,
            limit,
            database,
        } => {
            let store = open_existing(file_config.as_ref(), database)?;
            let users = match by {
                Ranking::Money => store.top_by_money(limit)?,
                Ranking::Level => store.top_by_level(limit)?,
            };

            if users.is_empty() {
                println!("∅ No users stored yet.");
            } else {
                println!("{}", ui::leaderboard_table(&users));
            }
        }

        Commands::Stats { database } => {
            let settings = Settings::resolve(file_config.as_ref(), database, None, None)?;
            let store = open_existing_at(&settings.database)?;
            let stats = store.stats()?;

            let users = stats.users.to_string();
            let money = format!("${}", format_money(stats.total_money));
            let messages = stats.total_messages.to_string();

            ui::header(&format!("Dizznem Statistics ({})", settings.database.display()));
            println!(
                "{}",
                ui::stats_table(&[
                    ("Users", users.as_str()),
                    ("Money in circulation", money.as_str()),
                    ("Messages", messages.as_str()),
                ])
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let file_layer = match log_file {
        Some(path) => {
            config::ensure_db_dir(path)?;
            let file = File::create(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    // Replies go to stdout, so console logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

fn open_existing(
    file_config: Option<&DizznemConfig>,
    database: Option<PathBuf>,
) -> anyhow::Result<SqliteStore> {
    let settings = Settings::resolve(file_config, database, None, None)?;
    open_existing_at(&settings.database)
}

fn open_existing_at(path: &Path) -> anyhow::Result<SqliteStore> {
    if !path.exists() {
        anyhow::bail!("database not found at {} (run `dizznem run` first)", path.display());
    }
    Ok(SqliteStore::open(path)?)
}

fn run(settings: Settings) -> anyhow::Result<()> {
    config::ensure_db_dir(&settings.database)?;
    let store = Arc::new(SqliteStore::open(&settings.database)?);
    let cache = Arc::new(UserCache::new(store));

    // Entered before anything can mutate users; every exit path below,
    // including `?` and panics, goes through its flush
    let guard = FlushGuard::new(cache.clone(), settings.shutdown_timeout);

    tracing::info!(
        database = %settings.database.display(),
        interval = ?settings.flush_interval,
        "Starting dizznem"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let served = runtime.block_on(serve(cache, settings.flush_interval));
    // A stdin read may still be parked on the blocking pool
    runtime.shutdown_timeout(Duration::from_secs(1));

    let outcome = guard.finish();
    output::shutdown_outcome(&outcome);
    served
}

async fn serve(cache: Arc<UserCache>, interval: Duration) -> anyhow::Result<()> {
    let mut signals = ShutdownSignal::new()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = FlushScheduler::new(cache.clone(), interval).spawn(shutdown_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&cache, line).await,
                Ok(None) => {
                    tracing::info!("Input closed");
                    break Ok(());
                }
                Err(e) => break Err(anyhow::Error::from(e)),
            },
            signal = signals.recv() => {
                tracing::info!(signal, "Received shutdown signal");
                break Ok(());
            }
        }
    };

    let _ = shutdown_tx.send(true);
    scheduler.await?;
    result
}

async fn handle_line(cache: &Arc<UserCache>, line: String) {
    let line = line.trim().to_string();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    // First access to a user hits the store, keep that off the runtime threads
    let cache = Arc::clone(cache);
    let applied = tokio::task::spawn_blocking(move || {
        line.parse::<ChatCommand>()
            .and_then(|command| command.apply(&cache))
    })
    .await;

    match applied {
        Ok(Ok(reply)) => ui::reply(&reply),
        Ok(Err(e)) => ui::error(&e.to_string()),
        Err(e) => ui::error(&format!("command panicked: {e}")),
    }
}
