use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use vitalsync::config::Config;
use vitalsync::connectivity::{ConnectivitySource, ManualConnectivity, ProbeConnectivity};
use vitalsync::models::{ChatMessage, ChatRole, Meal, Measure, Record};
use vitalsync::remote::{HttpBackend, RemoteBackend, Unconfigured};
use vitalsync::storage::{KeyValueStore, MemoryStore, SqliteStore};
use vitalsync::{logging, DataAccess, ReadResult, ReadSource, SyncCore, WriteOutcome};

#[derive(Parser, Debug)]
#[command(name = "vitalsync")]
#[command(about = "Offline-first sync core for health tracking data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vitalsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Treat the backend as unreachable: reads come from cache, writes are queued
  #[arg(long, global = true)]
  offline: bool,

  /// Keep everything in memory instead of the database file
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show pending outbox items and cached collections
  Status,
  /// Run one drain cycle and print its report
  Drain,
  /// Read a collection (measures, meals, chat_history)
  Read { collection: String },
  /// Record a measurement
  AddMeasure {
    #[arg(long)]
    metric: String,
    #[arg(long)]
    value: f64,
    #[arg(long)]
    unit: String,
    /// RFC 3339 timestamp, defaults to now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
  },
  /// Log a meal
  LogMeal {
    #[arg(long)]
    name: String,
    #[arg(long)]
    calories: u32,
    #[arg(long)]
    at: Option<DateTime<Utc>>,
  },
  /// Append a chat message
  SendMessage {
    #[arg(long)]
    content: String,
    #[arg(long)]
    assistant: bool,
  },
  /// Keep running: drain on reconnect and after startup, log status changes
  Watch,
  /// Drop every pending outbox item
  Purge,
}

#[derive(Serialize)]
struct StatusView {
  online: bool,
  pending: usize,
  collections: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir();
  let _log_guard = logging::init(&config.log, data_dir.as_deref())?;

  let core = Arc::new(build_core(&config, &args).await?);
  let data = DataAccess::new(Arc::clone(&core));

  match args.command {
    Command::Status => {
      let view = StatusView {
        online: core.is_online(),
        pending: core.queue().size().await,
        collections: core.cache().collections(),
      };
      print_json(&view)?;
    }
    Command::Drain => {
      let report = core.processor().drain().await;
      print_json(&report)?;
    }
    Command::Read { collection } => {
      if collection == Measure::COLLECTION {
        print_read(data.read::<Measure>().await)?;
      } else if collection == Meal::COLLECTION {
        print_read(data.read::<Meal>().await)?;
      } else if collection == ChatMessage::COLLECTION {
        print_read(data.read::<ChatMessage>().await)?;
      } else {
        return Err(eyre!("Unknown collection: {}", collection));
      }
    }
    Command::AddMeasure {
      metric,
      value,
      unit,
      at,
    } => {
      let outcome = data
        .add_measure(Measure {
          id: String::new(),
          metric,
          value,
          unit,
          taken_at: at.unwrap_or_else(Utc::now),
        })
        .await;
      finish_write(&core, outcome).await?;
    }
    Command::LogMeal { name, calories, at } => {
      let outcome = data
        .log_meal(Meal {
          id: String::new(),
          name,
          calories,
          eaten_at: at.unwrap_or_else(Utc::now),
        })
        .await;
      finish_write(&core, outcome).await?;
    }
    Command::SendMessage { content, assistant } => {
      let outcome = data
        .send_message(ChatMessage {
          id: String::new(),
          role: if assistant {
            ChatRole::Assistant
          } else {
            ChatRole::User
          },
          content,
          sent_at: Utc::now(),
        })
        .await;
      finish_write(&core, outcome).await?;
    }
    Command::Watch => watch(&core, &config).await?,
    Command::Purge => {
      let dropped = core.queue().clear().await?;
      println!("dropped {} pending item(s)", dropped);
    }
  }

  Ok(())
}

async fn build_core(config: &Config, args: &Args) -> Result<SyncCore> {
  let store: Arc<dyn KeyValueStore> = if args.ephemeral {
    Arc::new(MemoryStore::new())
  } else {
    Arc::new(SqliteStore::open(config.storage.path.as_deref())?)
  };

  let remote: Arc<dyn RemoteBackend>;
  let connectivity: Arc<dyn ConnectivitySource>;
  match (&config.backend.url, args.offline) {
    (Some(_), false) => {
      let backend = HttpBackend::new(&config.backend)?;
      let probe_url = backend.probe_url(&config.sync.probe_path)?;
      connectivity = Arc::new(
        ProbeConnectivity::start(backend.client(), probe_url, config.sync.probe_interval()).await,
      );
      remote = Arc::new(backend);
    }
    (Some(_), true) => {
      remote = Arc::new(HttpBackend::new(&config.backend)?);
      connectivity = Arc::new(ManualConnectivity::new(false));
    }
    (None, _) => {
      info!("No backend configured, running offline");
      remote = Arc::new(Unconfigured);
      connectivity = Arc::new(ManualConnectivity::new(false));
    }
  }

  Ok(SyncCore::new(store, remote, connectivity))
}

async fn watch(core: &SyncCore, config: &Config) -> Result<()> {
  let mut status = core.status().subscribe();
  let tasks = core
    .start(config.sync.startup_delay(), config.sync.drain_interval())
    .await;

  loop {
    tokio::select! {
      update = status.recv() => match update {
        Ok(s) => info!(pending = s.pending, draining = s.draining, "Sync status"),
        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
          info!(skipped, "Status updates skipped");
        }
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
      },
      _ = tokio::signal::ctrl_c() => {
        info!("Interrupted, stopping");
        break;
      }
    }
  }

  tasks.abort();
  Ok(())
}

/// Let a drain started by the write finish before the runtime shuts down.
async fn finish_write<T: Record>(core: &SyncCore, outcome: Result<WriteOutcome<T>>) -> Result<()> {
  if let Some(report) = core.settle().await {
    debug!(delivered = report.delivered, retained = report.retained, "Background drain settled");
  }
  print_write(outcome?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to render output: {}", e))?;
  println!("{}", json);
  Ok(())
}

fn print_read<T: Record>(result: ReadResult<T>) -> Result<()> {
  #[derive(Serialize)]
  struct ReadView<T> {
    source: ReadSource,
    records: Vec<T>,
  }

  print_json(&ReadView {
    source: result.source,
    records: result.records,
  })
}

fn print_write<T: Record>(outcome: WriteOutcome<T>) -> Result<()> {
  #[derive(Serialize)]
  struct WriteView<T> {
    state: &'static str,
    record: T,
  }

  let state = if outcome.is_pending() {
    "pending"
  } else {
    "delivered"
  };
  print_json(&WriteView {
    state,
    record: outcome.into_record(),
  })
}
