use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::Value;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tablesync::storage::{Action, NewRecord, SyncStatus};
use tablesync::{Config, StorageConfig, SyncOptions, TableSync};

#[derive(Parser)]
#[command(name = "tablesync")]
#[command(about = "Offline mutation queue with batched sync to a REST backend")]
struct Cli {
    /// JSON config file; TABLESYNC_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of the persistent queue
    #[arg(short, long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a mutation for later sync
    Enqueue {
        /// Entity type, e.g. orders or reservations
        #[arg(short, long)]
        entity: String,

        /// create, update or delete
        #[arg(short, long)]
        action: Action,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,

        /// Record id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },

    /// List queued records
    List {
        /// Only show records with this status
        #[arg(short, long)]
        status: Option<SyncStatus>,
    },

    /// Show queue counts
    Status,

    /// Drain pending records to the remote API once
    Sync {
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Drop records already marked synced
    Purge,

    /// Move failed records back to pending
    RetryFailed,

    /// Delete every queued record
    Clear,

    /// Run the probe loop, auto-sync worker and admin endpoint until Ctrl-C
    Run,

    /// Admin tooling
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
}

#[derive(Subcommand)]
enum AdminCmd {
    /// Show queue health from the HTTP admin endpoint
    Status {
        /// Admin HTTP address, e.g. 127.0.0.1:9000
        #[arg(long)]
        http: String,

        #[arg(long)]
        token: Option<String>,
    },
    /// Dump Prometheus metrics from the HTTP admin endpoint
    Metrics {
        /// Admin HTTP address, e.g. 127.0.0.1:9000
        #[arg(long)]
        http: String,

        #[arg(long)]
        token: Option<String>,
    },
}

/// Size-capped log file that shifts `path` to `path.1`, `path.1` to `path.2`
/// and so on once `max_size` bytes would be exceeded.
struct RotatingFile {
    path: String,
    max_size: u64,
    keep: u32,
    file: File,
    written: u64,
}

impl RotatingFile {
    fn open(path: String, max_size: u64, keep: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_size,
            keep,
            file,
            written,
        })
    }

    fn rotate(&mut self) -> io::Result<()> {
        for i in (1..self.keep).rev() {
            let _ = std::fs::rename(format!("{}.{i}", self.path), format!("{}.{}", self.path, i + 1));
        }
        let _ = std::fs::rename(&self.path, format!("{}.1", self.path));

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Plain `env_logger` output to a rotating file when `TABLESYNC_LOG_FILE` is
/// set, structured `tracing` output on stderr otherwise.
fn init_logging() {
    if let Ok(path) = std::env::var("TABLESYNC_LOG_FILE") {
        let max_size_mb: u64 = env_number("TABLESYNC_LOG_MAX_SIZE_MB", 10);
        let keep: u32 = env_number("TABLESYNC_LOG_MAX_FILES", 3);

        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        match RotatingFile::open(path.clone(), max_size_mb * 1024 * 1024, keep) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {path}: {e}, logging to stderr"),
        }
        let _ = builder.try_init();
        return;
    }

    let _ = LogTracer::init();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .try_init();
}

/// GET `path` from a running admin endpoint. Fails on any non-2xx status
/// so scripts see rejected tokens and unknown routes as errors.
async fn admin_get(host_port: &str, path: &str, token: Option<&str>) -> anyhow::Result<String> {
    let base = if host_port.starts_with("http://") || host_port.starts_with("https://") {
        host_port.trim_end_matches('/').to_string()
    } else {
        format!("http://{host_port}")
    };
    let url = format!("{base}{path}");

    let mut request = reqwest::Client::new().get(&url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("connecting to admin endpoint {host_port}"))?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        bail!("admin endpoint returned {status} for {path}: {body}");
    }
    Ok(body)
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(dir) = &cli.data_dir {
        config.storage = StorageConfig::Sled {
            data_dir: dir.clone(),
        };
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    if let Command::Admin { cmd } = &cli.command {
        let body = match cmd {
            AdminCmd::Status { http, token } => {
                admin_get(http, "/health", token.as_deref()).await?
            }
            AdminCmd::Metrics { http, token } => {
                admin_get(http, "/metrics", token.as_deref()).await?
            }
        };
        println!("{body}");
        return Ok(());
    }

    let config = load_config(&cli)?;
    let sync = TableSync::open(config)?;

    match cli.command {
        Command::Enqueue {
            entity,
            action,
            data,
            id,
        } => {
            let data: Value =
                serde_json::from_str(&data).context("--data must be valid JSON")?;
            let record = match id {
                Some(id) => NewRecord::with_id(id, entity, action, data),
                None => NewRecord::new(entity, action, data),
            };
            let stored = sync.enqueue_record(record)?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        Command::List { status } => {
            let records = match status {
                Some(status) => sync.store().records_with_status(status),
                None => sync.records(),
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Status => {
            let store = sync.store();
            println!("total:   {}", store.len());
            println!("pending: {}", store.pending_count());
            println!("failed:  {}", store.failed_count());
        }
        Command::Sync { batch_size } => {
            let batch_size = batch_size.unwrap_or(sync.config().sync.batch_size);
            let options = SyncOptions::new()
                .batch_size(batch_size)
                .on_progress(|done, total| println!("{done}/{total}"));
            let report = sync
                .manager()
                .try_sync(&options)
                .await
                .map_err(|e| anyhow!("sync failed: {e}"))?;
            println!(
                "synced {} of {} ({} failed)",
                report.synced, report.total, report.failed
            );
            if !report.is_clean() {
                bail!("{} records failed to sync", report.failed);
            }
        }
        Command::Purge => {
            let removed = sync.store().purge_synced()?;
            println!("removed {removed} synced records");
        }
        Command::RetryFailed => {
            let moved = sync.store().requeue_failed()?;
            println!("requeued {moved} failed records");
        }
        Command::Clear => {
            sync.store().clear()?;
            println!("queue cleared");
        }
        Command::Run => {
            info!(
                "Starting tablesync against {} ({} pending)",
                sync.config().remote.api_root(),
                sync.pending_count()
            );
            let handles = sync.spawn_background()?;
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            for handle in handles {
                handle.abort();
            }
        }
        Command::Admin { .. } => unreachable!("handled before opening the queue"),
    }

    Ok(())
}
