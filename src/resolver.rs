//! Resolution adapter.
//!
//! [`Resolver`] is the seam between the pipeline and whatever resolves a batch.
//! [`MassDnsResolver`] runs a massdns-compatible binary as a subprocess;
//! [`DryRunResolver`] resolves nothing and is selected when resolution is off.

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::config::{Config, ResolverConfig};
use crate::error::FuzzError;
use crate::metrics::{self, BatchResult, Timer};

/// Result of resolving one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The resolver ran; its records are in `output`. The caller owns the file.
    Resolved {
        /// Output artifact in `<name> <TYPE> <data...>` form.
        output: PathBuf,
        /// Exited with a partial-failure code; some lookups may be missing.
        partial: bool,
    },
    /// The resolver exited unsuccessfully. Candidates are left unresolved.
    Failed {
        /// Exit code, `None` if killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The resolver was killed after the configured timeout.
    TimedOut {
        /// Configured deadline.
        after: Duration,
    },
    /// Resolution is disabled.
    Skipped,
}

impl BatchOutcome {
    /// Label used in logs and metrics.
    pub fn result(&self) -> BatchResult {
        match self {
            BatchOutcome::Resolved { partial: false, .. } => BatchResult::Resolved,
            BatchOutcome::Resolved { partial: true, .. } => BatchResult::Partial,
            BatchOutcome::Failed { .. } => BatchResult::Failed,
            BatchOutcome::TimedOut { .. } => BatchResult::TimedOut,
            BatchOutcome::Skipped => BatchResult::Skipped,
        }
    }
}

/// Resolves batches of candidate names.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve one batch.
    ///
    /// Batch-level failures are reported as [`BatchOutcome`] variants; an `Err`
    /// means the run cannot continue.
    async fn resolve(&self, batch: &Batch) -> Result<BatchOutcome, FuzzError>;
}

/// Write a batch in the resolver input format: one name per line.
pub fn write_targets<W: Write>(batch: &Batch, writer: W) -> io::Result<()> {
    let mut writer = BufWriter::new(writer);
    for name in batch.candidates() {
        writer.write_all(name.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Runs a massdns-compatible binary once per batch.
#[derive(Debug)]
pub struct MassDnsResolver {
    config: ResolverConfig,
    record_type: RecordType,
    resolvers_file: PathBuf,
    work_dir: PathBuf,
    invocations: AtomicU64,
}

impl MassDnsResolver {
    /// Create a resolver writing its artifacts under `work_dir`.
    pub fn new(
        config: ResolverConfig,
        resolvers_file: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self, FuzzError> {
        let record_type = config.record_type()?;
        Ok(Self {
            config,
            record_type,
            resolvers_file: resolvers_file.into(),
            work_dir: work_dir.into(),
            invocations: AtomicU64::new(0),
        })
    }

    fn output_path(&self) -> PathBuf {
        let n = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        self.work_dir
            .join(format!("massdns_{}_{}.txt", std::process::id(), n))
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.binary_args)
            .arg("-r")
            .arg(&self.resolvers_file)
            .arg("--processes")
            .arg(self.config.processes.to_string())
            .arg("--socket-count")
            .arg(self.config.socket_count.to_string())
            .arg("-s")
            .arg(self.config.hashmap_size.to_string())
            .arg("-t")
            .arg(self.record_type.to_string())
            .args(["-o", "S"])
            .arg("-w")
            .arg(output)
            .args(&self.config.extra_args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep a terminal Ctrl-C from reaching the resolver: the driver lets
        // the in-flight batch finish before stopping.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    async fn run(&self, batch: &Batch, output: &Path) -> Result<BatchOutcome, FuzzError> {
        // Removed when dropped, whatever the outcome.
        let input = tempfile::Builder::new()
            .prefix("md_targets_")
            .suffix(".txt")
            .tempfile_in(&self.work_dir)?;
        write_targets(batch, input.as_file())?;
        let input = input.into_temp_path();

        let child = match self.command(&input, output).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FuzzError::ResolverNotFound {
                    binary: self.config.binary.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let waited = match self.config.timeout_secs {
            Some(secs) => {
                let after = Duration::from_secs(secs);
                match tokio::time::timeout(after, child.wait_with_output()).await {
                    Ok(result) => result?,
                    Err(_) => return Ok(BatchOutcome::TimedOut { after }),
                }
            }
            None => child.wait_with_output().await?,
        };

        let stderr = String::from_utf8_lossy(&waited.stderr).trim().to_string();
        let code = waited.status.code();
        if waited.status.success() {
            return Ok(BatchOutcome::Resolved {
                output: output.to_path_buf(),
                partial: false,
            });
        }
        if code.is_some_and(|c| self.config.partial_exit_codes.contains(&c)) {
            debug!(batch = batch.seq(), ?code, %stderr, "resolver reported partial failure");
            return Ok(BatchOutcome::Resolved {
                output: output.to_path_buf(),
                partial: true,
            });
        }
        Ok(BatchOutcome::Failed { code, stderr })
    }
}

#[async_trait]
impl Resolver for MassDnsResolver {
    async fn resolve(&self, batch: &Batch) -> Result<BatchOutcome, FuzzError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::Skipped);
        }

        let output = self.output_path();
        let _ = std::fs::remove_file(&output);

        debug!(
            batch = batch.seq(),
            names = batch.len(),
            output = %output.display(),
            "running resolver"
        );

        let timer = Timer::start();
        let outcome = self.run(batch, &output).await;
        let elapsed = timer.elapsed();

        match &outcome {
            Ok(outcome) => {
                metrics::record_batch(outcome.result(), batch.len(), elapsed);
                match outcome {
                    BatchOutcome::Failed { code, stderr } => {
                        warn!(batch = batch.seq(), ?code, %stderr, "resolver failed on batch");
                    }
                    BatchOutcome::TimedOut { after } => {
                        warn!(batch = batch.seq(), ?after, "resolver timed out on batch");
                    }
                    _ => {}
                }
                if !matches!(outcome, BatchOutcome::Resolved { .. }) {
                    let _ = std::fs::remove_file(&output);
                }
            }
            Err(_) => {
                let _ = std::fs::remove_file(&output);
            }
        }
        outcome
    }
}

/// Resolver used when resolution is disabled.
///
/// Logs each batch and reports it as skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunResolver;

#[async_trait]
impl Resolver for DryRunResolver {
    async fn resolve(&self, batch: &Batch) -> Result<BatchOutcome, FuzzError> {
        info!(
            batch = batch.seq(),
            names = batch.len(),
            "(dry-run) would resolve batch"
        );
        metrics::record_batch(BatchResult::Skipped, batch.len(), Duration::ZERO);
        Ok(BatchOutcome::Skipped)
    }
}

/// Select the resolver for a run: the subprocess resolver when resolution is
/// enabled, otherwise [`DryRunResolver`].
pub fn from_config(config: &Config) -> Result<Box<dyn Resolver>, FuzzError> {
    if !config.pipeline.run_resolution {
        return Ok(Box::new(DryRunResolver));
    }
    let output_dir = &config.pipeline.output_dir;
    Ok(Box::new(MassDnsResolver::new(
        config.resolver.clone(),
        output_dir.join(&config.resolver.resolvers_file),
        output_dir.clone(),
    )?))
}
