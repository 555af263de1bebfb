//! One pipeline per source: poll the reader, cast, enrich, append.
//!
//! The filesystem work of a drain is synchronous and runs on the blocking
//! pool; the async loop only waits for the interval, a scheduler slot, or
//! shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bronze_core::{BronzeError, SchedulerPool, SourceSpec};
use bronze_table::{CheckpointedSink, RetryPolicy, UnitBatch};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::context::BronzeContext;
use crate::enrich::{DateLookup, Enricher};
use crate::error::IngestError;
use crate::scheduler::Scheduler;
use crate::source::{RawUnit, SourceReader};

/// Finite drains the backlog present at start; continuous polls on an
/// interval until shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Finite,
    Continuous,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Finite => write!(f, "finite"),
            RunMode::Continuous => write!(f, "continuous"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    /// Waiting for new input.
    Polling,
    /// Finite mode only: the initial backlog is committed.
    Quiescent,
    Stopped,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Quiescent | PipelineState::Stopped | PipelineState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub batches: u64,
    pub units: u64,
    pub records_committed: u64,
    pub records_rejected: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub source: String,
    pub table: String,
    pub state: PipelineState,
    pub stats: PipelineStats,
    pub elapsed: Duration,
}

/// Final report plus the error that stopped the pipeline, if any.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub report: PipelineReport,
    pub error: Option<IngestError>,
}

pub struct Pipeline {
    name: String,
    table: String,
    pool: SchedulerPool,
    max_units_per_batch: usize,
    reader: SourceReader,
    sink: CheckpointedSink,
    enricher: Option<Enricher>,
    stats: PipelineStats,
    state: Arc<watch::Sender<PipelineState>>,
}

impl Pipeline {
    /// Open the source's table and checkpoint and seed its reader with the
    /// units the checkpoint already holds.
    pub fn open(
        ctx: &BronzeContext,
        spec: &SourceSpec,
        lookup: Option<Arc<DateLookup>>,
    ) -> Result<Self, IngestError> {
        let table = ctx.warehouse.open_table(&spec.table)?;
        let qualified = ctx.warehouse.qualified_name(&spec.table);
        let sink = CheckpointedSink::open(
            &spec.name,
            table,
            &spec.checkpoint_dir,
            RetryPolicy::from_config(&ctx.config.sink),
        )?;
        let reader = SourceReader::for_spec(spec)
            .with_committed(sink.checkpoint().committed_units().iter().cloned());

        let enricher = if spec.enrich_with_dates {
            let lookup = lookup.ok_or_else(|| {
                BronzeError::Config(format!("source {} needs a date lookup", spec.name))
            })?;
            Some(Enricher::new(lookup))
        } else {
            None
        };

        let (state, _) = watch::channel(PipelineState::Idle);
        Ok(Self {
            name: spec.name.clone(),
            table: qualified,
            pool: spec.pool,
            max_units_per_batch: spec.max_units_per_batch.max(1),
            reader,
            sink,
            enricher,
            stats: PipelineStats::default(),
            state: Arc::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> SchedulerPool {
        self.pool
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PipelineState) {
        self.state.send_replace(state);
    }

    /// Poll once and commit every unit found, `max_units_per_batch` units
    /// per append. Checks `shutdown` between appends. Returns the number of
    /// units processed.
    pub fn drain(&mut self, shutdown: &watch::Receiver<bool>) -> Result<usize, IngestError> {
        self.set_state(PipelineState::Polling);
        let units = self.reader.poll()?;
        if units.is_empty() {
            return Ok(0);
        }

        self.set_state(PipelineState::Running);
        let mut processed = 0;
        for chunk in units.chunks(self.max_units_per_batch) {
            if *shutdown.borrow() {
                debug!(source = %self.name, remaining = units.len() - processed, "Shutdown requested, stopping drain");
                break;
            }
            self.commit_units(chunk)?;
            processed += chunk.len();
        }
        Ok(processed)
    }

    fn commit_units(&mut self, units: &[RawUnit]) -> Result<(), IngestError> {
        let ids: Vec<String> = units.iter().map(|u| u.id.clone()).collect();
        let mut batches = Vec::with_capacity(units.len());
        let mut rejected = 0u64;

        for unit in units {
            let mut records = Vec::new();
            for item in self.reader.read(unit)? {
                match item {
                    Ok(record) => records.push(match &self.enricher {
                        Some(enricher) => enricher.enrich(record),
                        None => record,
                    }),
                    Err(e) if e.is_fatal() => {
                        error!(source = %self.name, unit = %unit.id, error = %e, "Unit read failed");
                        return Err(IngestError::UnitRead {
                            unit: unit.id.clone(),
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        debug!(source = %self.name, unit = %unit.id, error = %e, "Rejected record");
                        rejected += 1;
                    }
                }
            }
            batches.push(UnitBatch::new(unit.id.clone(), records));
        }

        let result = match self.sink.append(batches) {
            Ok(result) => result,
            Err(e) => {
                error!(source = %self.name, units = ?ids, error = %e, "Micro-batch commit failed");
                return Err(e.into());
            }
        };
        self.reader.acknowledge(&ids);

        if result.is_skipped() {
            debug!(source = %self.name, units = ?ids, "Units already committed, skipped");
            return Ok(());
        }
        self.stats.batches += 1;
        self.stats.units += result.units.len() as u64;
        self.stats.records_committed += result.rows;
        self.stats.records_rejected += rejected;
        info!(
            source = %self.name,
            table = %self.table,
            batch_id = result.batch_id,
            rows = result.rows,
            rejected,
            units = ?result.units,
            "Committed micro-batch"
        );
        Ok(())
    }

    fn report(&self, state: PipelineState, elapsed: Duration) -> PipelineReport {
        PipelineReport {
            source: self.name.clone(),
            table: self.table.clone(),
            state,
            stats: self.stats,
            elapsed,
        }
    }

    /// Drive the pipeline until its backlog is done (finite) or until
    /// `shutdown` flips to `true` (continuous).
    pub async fn run(
        self,
        mode: RunMode,
        interval: Duration,
        scheduler: Arc<Scheduler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let state = self.state.clone();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(source = %self.name, pool = %self.pool, %mode, "Pipeline started");
        let mut pipeline = self;
        let result: Result<(), IngestError> = loop {
            if mode == RunMode::Continuous {
                pipeline.set_state(PipelineState::Polling);
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break Ok(());
                        }
                        continue;
                    }
                }
            }
            if *shutdown.borrow() {
                break Ok(());
            }

            let permit = match scheduler.acquire(pipeline.pool).await {
                Ok(permit) => permit,
                Err(e) => break Err(e),
            };
            let before = pipeline.report(PipelineState::Failed, Duration::ZERO);
            let view = shutdown.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let result = pipeline.drain(&view);
                (pipeline, result)
            })
            .await;
            drop(permit);

            match joined {
                Ok((p, result)) => {
                    pipeline = p;
                    if let Err(e) = result {
                        break Err(e);
                    }
                }
                Err(e) => {
                    state.send_replace(PipelineState::Failed);
                    error!(source = %before.source, error = %e, "Pipeline task panicked");
                    return PipelineOutcome {
                        report: PipelineReport {
                            elapsed: started.elapsed(),
                            ..before
                        },
                        error: Some(e.into()),
                    };
                }
            }

            if mode == RunMode::Finite {
                break Ok(());
            }
        };

        let final_state = match (&result, mode) {
            (Err(_), _) => PipelineState::Failed,
            (Ok(()), RunMode::Finite) => PipelineState::Quiescent,
            (Ok(()), RunMode::Continuous) => PipelineState::Stopped,
        };
        pipeline.set_state(final_state);

        let report = pipeline.report(final_state, started.elapsed());
        match &result {
            Ok(()) => info!(
                source = %report.source,
                state = ?final_state,
                batches = report.stats.batches,
                rows = report.stats.records_committed,
                rejected = report.stats.records_rejected,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Pipeline finished"
            ),
            Err(e) => error!(source = %report.source, error = %e, "Pipeline failed"),
        }
        PipelineOutcome {
            report,
            error: result.err(),
        }
    }
}
