//! didact-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens an
//! in-process SQLite store, and serves the task API over HTTP.
//!
//! Settings may also come from `DIDACT_*` environment variables. The
//! optional `[grading]` section tunes the free-text thresholds:
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 8080
//! store_path = "~/.local/share/didact/tasks.db"
//!
//! [grading]
//! correct_min = 90
//! partial_min = 50
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use didact_api::ApiState;
use didact_core::grading::GradingPolicy;
use didact_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Didact task server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
  host:       String,
  port:       u16,
  store_path: PathBuf,
  #[serde(default)]
  grading:    GradingSettings,
}

/// The `[grading]` section: result thresholds on the 0..=100 score scale.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct GradingSettings {
  correct_min: i64,
  partial_min: i64,
}

impl Default for GradingSettings {
  fn default() -> Self {
    let policy = GradingPolicy::default();
    Self { correct_min: policy.correct_min, partial_min: policy.partial_min }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("DIDACT"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_policy(GradingPolicy {
      correct_min: server_cfg.grading.correct_min,
      partial_min: server_cfg.grading.partial_min,
    });

  // No grader is wired here: free-text submissions must carry a score.
  // Embedders that mount the router themselves can plug one in.
  let state = ApiState { store: Arc::new(store), grader: None };

  let app = didact_api::router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
