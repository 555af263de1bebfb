use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::BronzeError;
use crate::schema::{FieldList, SchemaRegistry, GYM_LOGINS, KAFKA_MULTIPLEX, REGISTERED_USERS};

/// On-disk layout of a raw unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitFormat {
    /// Header row followed by positional columns.
    Csv,
    /// One JSON object per line, fields looked up by name.
    JsonLines,
}

impl UnitFormat {
    /// File extension accepted by discovery.
    pub fn extension(&self) -> &'static str {
        match self {
            UnitFormat::Csv => "csv",
            UnitFormat::JsonLines => "json",
        }
    }
}

/// Scheduling priority class. A resource-allocation hint for concurrently
/// running pipelines, never a correctness requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerPool {
    /// High-volume multiplexed topic.
    BronzeP1,
    /// Low-volume file feeds.
    BronzeP2,
}

impl SchedulerPool {
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerPool::BronzeP1 => "bronze_p1",
            SchedulerPool::BronzeP2 => "bronze_p2",
        }
    }

    /// Number of pipeline drains the pool may run at the same time.
    pub fn weight(&self) -> usize {
        match self {
            SchedulerPool::BronzeP1 => 2,
            SchedulerPool::BronzeP2 => 1,
        }
    }
}

impl fmt::Display for SchedulerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to run one source's pipeline. Built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub schema: FieldList,
    pub format: UnitFormat,
    pub input_dir: PathBuf,
    /// Destination table name (unqualified).
    pub table: String,
    pub checkpoint_dir: PathBuf,
    pub pool: SchedulerPool,
    pub max_units_per_batch: usize,
    /// Join the date lookup onto each record before it is persisted.
    pub enrich_with_dates: bool,
}

impl SourceSpec {
    /// The three bronze sources, with locations resolved from `config`.
    pub fn bronze_sources(
        config: &Config,
        registry: &SchemaRegistry,
    ) -> Result<Vec<SourceSpec>, BronzeError> {
        let landing = config.paths.landing_zone();
        let checkpoints = config.paths.checkpoint_base();
        let max_units = config.ingest.max_units_per_batch;

        let make = |name: &str, format, pool, enrich| -> Result<SourceSpec, BronzeError> {
            Ok(SourceSpec {
                name: name.to_string(),
                schema: registry.schema_for(name)?.clone(),
                format,
                input_dir: landing.join(name),
                table: name.to_string(),
                checkpoint_dir: checkpoints.join(name),
                pool,
                max_units_per_batch: max_units,
                enrich_with_dates: enrich,
            })
        };

        Ok(vec![
            make(REGISTERED_USERS, UnitFormat::Csv, SchedulerPool::BronzeP2, false)?,
            make(GYM_LOGINS, UnitFormat::Csv, SchedulerPool::BronzeP2, false)?,
            make(KAFKA_MULTIPLEX, UnitFormat::JsonLines, SchedulerPool::BronzeP1, true)?,
        ])
    }
}
