//! Pipeline driver.
//!
//! For each pattern the driver moves through
//! `Checking → Generating → (Batching ↔ resolve) → Draining`, then on to the
//! next pattern, finishing in `Done`. A pattern that needs the main wordlist
//! when none is configured either skips that pattern or moves the run to
//! `Aborted`, depending on `skip_missing_binding`. The abort case is detected
//! for every pattern before any resolver round runs.
//!
//! Cancellation is cooperative: a triggered [`Shutdown`] is honoured at the
//! next batch boundary, after the in-flight resolver round has been recorded.

use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, Batcher};
use crate::config::{Config, PipelineConfig};
use crate::download;
use crate::error::FuzzError;
use crate::extract::Extractor;
use crate::ledger::Ledger;
use crate::metrics;
use crate::pattern::{Expander, Pattern};
use crate::resolver::{self, BatchOutcome, Resolver};
use crate::wordlist::{self, WordlistStore};

/// Driver states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing started.
    Idle,
    /// Confirming the pattern's bindings.
    Checking,
    /// Expanding the pattern.
    Generating,
    /// Dispatching full batches.
    Batching,
    /// Dispatching the trailing partial batch.
    Draining,
    /// All patterns processed.
    Done,
    /// Stopped on a configuration error.
    Aborted,
}

/// How a pattern finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternStatus {
    /// Candidate stream exhausted.
    Completed,
    /// Stopped at `max_per_pattern`.
    Capped,
    /// Needs the main wordlist, none configured, skipping allowed.
    SkippedMissingBinding,
    /// In-memory expansion exceeds `max_expand`.
    SkippedTooLarge {
        /// Candidates the pattern would have produced.
        size: u128,
    },
    /// Shutdown requested.
    Cancelled,
}

impl PatternStatus {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Completed => "completed",
            PatternStatus::Capped => "capped",
            PatternStatus::SkippedMissingBinding => "skipped_missing_binding",
            PatternStatus::SkippedTooLarge { .. } => "skipped_too_large",
            PatternStatus::Cancelled => "cancelled",
        }
    }

    /// True for either skip status.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            PatternStatus::SkippedMissingBinding | PatternStatus::SkippedTooLarge { .. }
        )
    }
}

/// Per-pattern statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternReport {
    /// Pattern as written.
    pub pattern: String,
    /// Candidates drawn and dispatched.
    pub tested: u64,
    /// Resolver rounds run.
    pub batches: usize,
    /// Rounds that failed or timed out.
    pub failed_batches: usize,
    /// Names first recorded by this pattern.
    pub new_positives: Vec<String>,
    /// How the pattern finished.
    pub status: PatternStatus,
}

impl PatternReport {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            tested: 0,
            batches: 0,
            failed_batches: 0,
            new_positives: Vec::new(),
            status: PatternStatus::Completed,
        }
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per pattern, in patterns-file order.
    pub patterns: Vec<PatternReport>,
}

impl RunReport {
    /// Total candidates dispatched.
    pub fn tested(&self) -> u64 {
        self.patterns.iter().map(|p| p.tested).sum()
    }

    /// Total names newly recorded.
    pub fn new_positives(&self) -> usize {
        self.patterns.iter().map(|p| p.new_positives.len()).sum()
    }

    /// Patterns that were skipped.
    pub fn skipped(&self) -> usize {
        self.patterns.iter().filter(|p| p.status.is_skipped()).count()
    }

    /// Total failed resolver rounds.
    pub fn failed_batches(&self) -> usize {
        self.patterns.iter().map(|p| p.failed_batches).sum()
    }

    /// True if the run stopped on a shutdown request.
    pub fn cancelled(&self) -> bool {
        self.patterns
            .iter()
            .any(|p| p.status == PatternStatus::Cancelled)
    }
}

/// Receiving side of a cooperative shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Triggers a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a linked trigger and signal.
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    /// A signal tripped by Ctrl-C. Spawn the returned worker.
    pub fn new_signals() -> (Shutdown, impl Future<Output = ()>) {
        let (trigger, shutdown) = Self::channel();
        let worker = async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, finishing current batch");
                trigger.trigger();
            }
        };
        (shutdown, worker)
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ShutdownTrigger {
    /// Request shutdown.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Drives patterns through expansion, batching, resolution and the ledger.
pub struct Pipeline {
    config: PipelineConfig,
    store: WordlistStore,
    resolver: Box<dyn Resolver>,
    extractor: Extractor,
    ledger: Ledger,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("extractor", &self.extractor)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        config: PipelineConfig,
        store: WordlistStore,
        resolver: Box<dyn Resolver>,
        extractor: Extractor,
        ledger: Ledger,
    ) -> Self {
        Self {
            config,
            store,
            resolver,
            extractor,
            ledger,
        }
    }

    /// The ledger positives are recorded in.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Process every pattern.
    ///
    /// Returns `Err` for run-level failures: a pattern needing an unconfigured
    /// main wordlist (unless skipping is enabled), a missing resolver binary or
    /// a ledger write error.
    pub async fn run(
        &self,
        patterns: &[String],
        shutdown: &Shutdown,
    ) -> Result<RunReport, FuzzError> {
        debug!(state = ?DriverState::Idle, patterns = patterns.len(), "pipeline starting");

        if let Err(e) = self.preflight(patterns) {
            error!(state = ?DriverState::Aborted, error = %e, "aborting run");
            return Err(e);
        }

        let reports = futures::stream::iter(patterns.iter().enumerate())
            .map(|(index, pattern)| self.run_pattern(index, pattern, shutdown))
            .buffered(self.config.pattern_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await;

        let report = match reports {
            Ok(patterns) => RunReport { patterns },
            Err(e) => {
                error!(state = ?DriverState::Aborted, error = %e, "aborting run");
                return Err(e);
            }
        };

        info!(
            state = ?DriverState::Done,
            patterns = report.patterns.len(),
            tested = report.tested(),
            new_positives = report.new_positives(),
            skipped = report.skipped(),
            failed_batches = report.failed_batches(),
            ledger_total = self.ledger.len(),
            "pipeline finished"
        );
        Ok(report)
    }

    fn preflight(&self, patterns: &[String]) -> Result<(), FuzzError> {
        if self.store.main.is_some() || self.config.skip_missing_binding {
            return Ok(());
        }
        match patterns.iter().find(|p| Pattern::parse(p).needs_bulk()) {
            Some(pattern) => Err(FuzzError::MissingBinding {
                pattern: pattern.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Process one pattern.
    pub async fn run_pattern(
        &self,
        index: usize,
        raw: &str,
        shutdown: &Shutdown,
    ) -> Result<PatternReport, FuzzError> {
        let mut report = PatternReport::new(raw);
        let pattern = Pattern::parse(raw);

        debug!(pattern = index, state = ?DriverState::Checking, "checking bindings");
        if shutdown.is_shutting_down() {
            report.status = PatternStatus::Cancelled;
            return Ok(report);
        }
        if pattern.needs_bulk() && self.store.main.is_none() {
            if !self.config.skip_missing_binding {
                return Err(FuzzError::MissingBinding {
                    pattern: raw.to_string(),
                });
            }
            warn!(pattern = %raw, "pattern requires the main wordlist, skipping");
            report.status = PatternStatus::SkippedMissingBinding;
            metrics::record_pattern(report.status.as_str());
            return Ok(report);
        }

        info!(pattern = %raw, "processing pattern");
        debug!(pattern = index, state = ?DriverState::Generating, "expanding");
        let expansion = match Expander::new(&self.store, self.config.max_expand).expand(&pattern) {
            Ok(expansion) => expansion,
            Err(FuzzError::ExpansionTooLarge { size, limit }) => {
                warn!(pattern = %raw, size = %size, limit, "expansion too large, skipping pattern");
                report.status = PatternStatus::SkippedTooLarge { size };
                metrics::record_pattern(report.status.as_str());
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        let mut batcher = Batcher::new(expansion, self.config.batch_size, self.config.cap());
        let mut cancelled = false;
        for batch in batcher.by_ref() {
            let batch = batch?;
            let state = if batch.len() < self.config.batch_size {
                DriverState::Draining
            } else {
                DriverState::Batching
            };
            debug!(
                pattern = index,
                ?state,
                batch = batch.seq(),
                names = batch.len(),
                "dispatching batch"
            );

            self.process_batch(&batch, &mut report).await?;

            if shutdown.is_shutting_down() {
                cancelled = true;
                break;
            }
        }

        report.tested = batcher.drawn();
        report.status = if cancelled {
            PatternStatus::Cancelled
        } else if batcher.is_capped() {
            info!(pattern = %raw, cap = self.config.max_per_pattern, "reached max-per-pattern");
            PatternStatus::Capped
        } else {
            PatternStatus::Completed
        };

        metrics::record_candidates(report.tested);
        metrics::record_pattern(report.status.as_str());
        info!(
            pattern = %raw,
            tested = report.tested,
            batches = report.batches,
            failed_batches = report.failed_batches,
            new_positives = report.new_positives.len(),
            status = report.status.as_str(),
            "finished pattern"
        );
        Ok(report)
    }

    async fn process_batch(
        &self,
        batch: &Batch,
        report: &mut PatternReport,
    ) -> Result<(), FuzzError> {
        let outcome = self.resolver.resolve(batch).await?;
        report.batches += 1;

        let output = match outcome {
            BatchOutcome::Resolved { output, .. } => output,
            BatchOutcome::Failed { .. } | BatchOutcome::TimedOut { .. } => {
                report.failed_batches += 1;
                return Ok(());
            }
            BatchOutcome::Skipped => return Ok(()),
        };

        let positives = self.extractor.positives_from_file(&output);
        let _ = std::fs::remove_file(&output);
        let positives = match positives {
            Ok(positives) => positives,
            Err(e) => {
                warn!(batch = batch.seq(), error = %e, "could not read resolver output");
                report.failed_batches += 1;
                return Ok(());
            }
        };

        let fresh = self.ledger.record(&positives)?;
        metrics::record_new_positives(fresh.len());
        info!(
            batch = batch.seq(),
            alive = positives.len(),
            new = fresh.len(),
            total = self.ledger.len(),
            "batch resolved"
        );
        report.new_positives.extend(fresh);
        Ok(())
    }
}

/// Run the whole pipeline from configuration.
///
/// Loads patterns and wordlists, prepares the output directory, fetches the
/// resolver list when resolution is enabled, opens the ledger and processes
/// every pattern.
pub async fn run(config: &Config, shutdown: &Shutdown) -> Result<RunReport, FuzzError> {
    config.validate()?;

    let patterns = wordlist::read_patterns(&config.pipeline.patterns_file)?;
    let store = WordlistStore::load(&config.wordlists, config.pipeline.skip_missing_binding)?;

    let output_dir = &config.pipeline.output_dir;
    tokio::fs::create_dir_all(output_dir).await?;

    if config.pipeline.run_resolution {
        download::ensure_resolvers(
            &config.resolver.resolvers_url,
            &output_dir.join(&config.resolver.resolvers_file),
            config.resolver.refresh_resolvers,
        )
        .await?;
    } else {
        info!("dry-run mode, resolver will not be invoked");
    }

    let ledger = Ledger::open(config.pipeline.ledger_path())?;
    let pipeline = Pipeline::new(
        config.pipeline.clone(),
        store,
        resolver::from_config(config)?,
        Extractor::new(config.resolver.record_type()?),
        ledger,
    );
    pipeline.run(&patterns, shutdown).await
}
