use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BronzeError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub catalog: CatalogConfig,
    pub paths: PathsConfig,
    pub ingest: IngestConfig,
    pub sink: SinkConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `BRONZE_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("BRONZE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            catalog: CatalogConfig::from_env_profiled(p),
            paths: PathsConfig::from_env_profiled(p),
            ingest: IngestConfig::from_env_profiled(p),
            sink: SinkConfig::from_env_profiled(p),
        }
    }

    /// Config with every directory rooted under `root` and default tuning.
    /// Does not read the environment.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            profile: String::new(),
            catalog: CatalogConfig::default(),
            paths: PathsConfig {
                base_dir_data: root.to_path_buf(),
                base_dir_checkpoint: root.to_path_buf(),
                warehouse_dir: root.join("warehouse"),
                date_lookup_path: root.join("reference").join("date_lookup.csv"),
            },
            ingest: IngestConfig::default(),
            sink: SinkConfig::default(),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Fully qualified `catalog.database.table` name.
    pub fn qualified_table(&self, table: &str) -> String {
        format!("{}.{}.{}", self.catalog.catalog, self.catalog.database, table)
    }

    /// Reject settings that would make ingestion meaningless.
    pub fn validate(&self) -> Result<(), BronzeError> {
        if self.catalog.catalog.is_empty() || self.catalog.database.is_empty() {
            return Err(BronzeError::Config(
                "catalog and database names must not be empty".into(),
            ));
        }
        if self.ingest.poll_interval_secs == 0 {
            return Err(BronzeError::Config("POLL_INTERVAL_SECS must be > 0".into()));
        }
        if self.ingest.max_units_per_batch == 0 {
            return Err(BronzeError::Config("MAX_UNITS_PER_BATCH must be > 0".into()));
        }
        if self.sink.max_attempts == 0 {
            return Err(BronzeError::Config("SINK_MAX_ATTEMPTS must be > 0".into()));
        }
        if self.sink.max_backoff_ms < self.sink.initial_backoff_ms {
            return Err(BronzeError::Config(
                "SINK_MAX_BACKOFF_MS must be >= SINK_BACKOFF_MS".into(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  catalog:     {}.{}", self.catalog.catalog, self.catalog.database);
        tracing::info!("  landing:     {}", self.paths.landing_zone().display());
        tracing::info!("  checkpoints: {}", self.paths.checkpoint_base().display());
        tracing::info!("  warehouse:   {}", self.paths.warehouse_dir.display());
        tracing::info!(
            "  ingest:      interval={}s, max_units_per_batch={}",
            self.ingest.poll_interval_secs,
            self.ingest.max_units_per_batch
        );
        tracing::info!(
            "  sink:        attempts={}, backoff={}..{}ms",
            self.sink.max_attempts,
            self.sink.initial_backoff_ms,
            self.sink.max_backoff_ms
        );
    }
}

// ── Catalog ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Environment catalog, e.g. "dev" or "prod".
    pub catalog: String,
    pub database: String,
}

impl CatalogConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            catalog: profiled_env_or(p, "CATALOG", "dev"),
            database: profiled_env_or(p, "DB_NAME", "sbit_db"),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog: "dev".to_string(),
            database: "sbit_db".to_string(),
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub base_dir_data: PathBuf,
    pub base_dir_checkpoint: PathBuf,
    pub warehouse_dir: PathBuf,
    pub date_lookup_path: PathBuf,
}

impl PathsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let base_dir_data = PathBuf::from(profiled_env_or(p, "BASE_DIR_DATA", "data"));
        let base_dir_checkpoint =
            PathBuf::from(profiled_env_or(p, "BASE_DIR_CHECKPOINT", "data"));
        let warehouse_dir = profiled_env_opt(p, "WAREHOUSE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir_data.join("warehouse"));
        let date_lookup_path = profiled_env_opt(p, "DATE_LOOKUP_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir_data.join("reference").join("date_lookup.csv"));
        Self {
            base_dir_data,
            base_dir_checkpoint,
            warehouse_dir,
            date_lookup_path,
        }
    }

    /// Directory where raw source units arrive, one subdirectory per source.
    pub fn landing_zone(&self) -> PathBuf {
        self.base_dir_data.join("raw")
    }

    /// Parent of every per-source checkpoint location.
    pub fn checkpoint_base(&self) -> PathBuf {
        self.base_dir_checkpoint.join("checkpoint")
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Polling interval for continuous mode.
    pub poll_interval_secs: u64,
    /// Upper bound on raw units committed by a single append.
    pub max_units_per_batch: usize,
}

impl IngestConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_secs: profiled_env_u64(p, "POLL_INTERVAL_SECS", 5),
            max_units_per_batch: profiled_env_u32(p, "MAX_UNITS_PER_BATCH", 1) as usize,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_units_per_batch: 1,
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Total commit attempts before a batch failure becomes fatal.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl SinkConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "SINK_MAX_ATTEMPTS", 3),
            initial_backoff_ms: profiled_env_u64(p, "SINK_BACKOFF_MS", 200),
            max_backoff_ms: profiled_env_u64(p, "SINK_MAX_BACKOFF_MS", 2000),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
        }
    }
}
