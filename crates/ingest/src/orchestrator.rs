use std::sync::Arc;
use std::time::{Duration, Instant};

use bronze_core::{Config, SourceSpec};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::context::BronzeContext;
use crate::enrich::DateLookup;
use crate::error::IngestError;
use crate::pipeline::{
    Pipeline, PipelineOutcome, PipelineReport, PipelineState, PipelineStats, RunMode,
};
use crate::scheduler::Scheduler;
use crate::validate::{CountCheck, Validator};

/// Summary of a finished ingestion run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub elapsed: Duration,
    pub pipelines: Vec<PipelineReport>,
}

impl RunReport {
    pub fn records_committed(&self) -> u64 {
        self.pipelines.iter().map(|p| p.stats.records_committed).sum()
    }

    pub fn records_rejected(&self) -> u64 {
        self.pipelines.iter().map(|p| p.stats.records_rejected).sum()
    }

    pub fn pipeline(&self, source: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.source == source)
    }
}

/// A pipeline that was launched, or the outcome of a source that could not
/// be opened.
enum PipelineTask {
    Running(JoinHandle<PipelineOutcome>),
    NotOpened(PipelineOutcome),
}

/// Handle to the pipelines started by [`Bronze::consume`].
///
/// Dropping a continuous run without calling [`IngestionRun::stop`] also
/// signals its pipelines to stop, but nobody waits for them.
pub struct IngestionRun {
    mode: RunMode,
    interval: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
    shutdown: watch::Sender<bool>,
    tasks: Vec<PipelineTask>,
    states: Vec<(String, watch::Receiver<PipelineState>)>,
    report: Option<RunReport>,
}

impl IngestionRun {
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current state of every pipeline, in start order.
    pub fn states(&self) -> Vec<(String, PipelineState)> {
        self.states
            .iter()
            .map(|(name, rx)| (name.clone(), *rx.borrow()))
            .collect()
    }

    /// Set once all pipelines have stopped.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Signal every pipeline to stop after its in-flight append and wait
    /// for them. Returns the first pipeline error, in source order, once
    /// every pipeline has stopped.
    pub async fn stop(mut self) -> Result<RunReport, IngestError> {
        if self.report.is_none() {
            info!("Stopping bronze layer consumption");
        }
        self.shutdown.send_replace(true);
        self.join().await
    }

    async fn join(&mut self) -> Result<RunReport, IngestError> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }

        let mut pipelines = Vec::with_capacity(self.tasks.len());
        let mut first_error = None;
        for task in self.tasks.drain(..) {
            let handle = match task {
                PipelineTask::Running(handle) => handle,
                PipelineTask::NotOpened(outcome) => {
                    if let Some(e) = outcome.error {
                        first_error.get_or_insert(e);
                    }
                    pipelines.push(outcome.report);
                    continue;
                }
            };
            match handle.await {
                Ok(outcome) => {
                    if let Some(e) = outcome.error {
                        first_error.get_or_insert(e);
                    }
                    pipelines.push(outcome.report);
                }
                Err(e) => {
                    warn!(error = %e, "Pipeline task did not complete");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        let report = RunReport {
            mode: self.mode,
            elapsed: self.started.elapsed(),
            pipelines,
        };
        info!(
            "Completed bronze layer consumption in {} seconds",
            report.elapsed.as_secs()
        );
        self.report = Some(report.clone());

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Entry point for the bronze layer: consumption and validation.
#[derive(Clone)]
pub struct Bronze {
    ctx: Arc<BronzeContext>,
}

impl Bronze {
    pub fn new(config: Config) -> Result<Self, IngestError> {
        Ok(Self::from_context(BronzeContext::new(config)?))
    }

    pub fn from_context(ctx: BronzeContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &BronzeContext {
        &self.ctx
    }

    /// Start one pipeline per source.
    ///
    /// A source whose table or checkpoint cannot be opened is reported as
    /// `Failed` while the others run.
    ///
    /// In finite mode this waits until every pipeline has committed the
    /// backlog it saw at start, then returns the finished run (or the first
    /// pipeline error once all have stopped). In continuous mode it returns
    /// as soon as the pipelines are launched.
    pub async fn consume(
        &self,
        mode: RunMode,
        interval: Duration,
    ) -> Result<IngestionRun, IngestError> {
        let started = Instant::now();
        info!(%mode, interval_secs = interval.as_secs(), "Starting bronze layer consumption");

        let ctx = self.ctx.clone();
        let pipelines = tokio::task::spawn_blocking(move || open_pipelines(&ctx)).await??;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::new(Scheduler::new());
        let mut states = Vec::with_capacity(pipelines.len());
        let mut tasks = Vec::with_capacity(pipelines.len());
        for opened in pipelines {
            match opened {
                Ok(pipeline) => {
                    states.push((pipeline.name().to_string(), pipeline.subscribe()));
                    tasks.push(PipelineTask::Running(tokio::spawn(pipeline.run(
                        mode,
                        interval,
                        scheduler.clone(),
                        shutdown_rx.clone(),
                    ))));
                }
                Err(outcome) => {
                    let (_, failed) = watch::channel(PipelineState::Failed);
                    states.push((outcome.report.source.clone(), failed));
                    tasks.push(PipelineTask::NotOpened(outcome));
                }
            }
        }

        let mut run = IngestionRun {
            mode,
            interval,
            started_at: Utc::now(),
            started,
            shutdown,
            tasks,
            states,
            report: None,
        };
        if mode == RunMode::Finite {
            run.join().await?;
        }
        Ok(run)
    }

    /// Assert the committed counts for `sets` landed data sets.
    pub async fn validate(&self, sets: u32) -> Result<Vec<CountCheck>, IngestError> {
        let validator = Validator::new(self.ctx.warehouse.clone());
        tokio::task::spawn_blocking(move || validator.validate(sets)).await?
    }
}

/// Open every source's pipeline. Only a missing or invalid date lookup
/// fails the whole run; per-source failures come back as `Failed` outcomes.
fn open_pipelines(
    ctx: &BronzeContext,
) -> Result<Vec<Result<Pipeline, PipelineOutcome>>, IngestError> {
    let sources = ctx.sources()?;
    let lookup = if sources.iter().any(|s| s.enrich_with_dates) {
        Some(Arc::new(DateLookup::load_csv(
            &ctx.config.paths.date_lookup_path,
        )?))
    } else {
        None
    };

    Ok(sources
        .iter()
        .map(|spec| {
            Pipeline::open(ctx, spec, lookup.clone()).map_err(|e| not_opened(ctx, spec, e))
        })
        .collect())
}

fn not_opened(ctx: &BronzeContext, spec: &SourceSpec, e: IngestError) -> PipelineOutcome {
    error!(source = %spec.name, error = %e, "Pipeline failed to open");
    PipelineOutcome {
        report: PipelineReport {
            source: spec.name.clone(),
            table: ctx.warehouse.qualified_name(&spec.table),
            state: PipelineState::Failed,
            stats: PipelineStats::default(),
            elapsed: Duration::ZERO,
        },
        error: Some(e),
    }
}
