//! Shared test infrastructure for pipeline integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use tempfile::TempDir;

use dns_fuzz::pipeline::ShutdownTrigger;
use dns_fuzz::{
    Batch, BatchOutcome, Config, Extractor, FuzzError, Ledger, Pipeline, PipelineConfig, Resolver,
    StreamingWordlist, WordlistStore,
};

// --- Constants ---

pub const ZONE: &str = "example.com";
pub const ANSWER_ADDR: &str = "10.0.0.1";

// --- Workspace ---

/// A temporary directory holding patterns, wordlists and the output directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir().join("output.txt")
    }

    /// Write `lines` to `name`, one per line.
    pub fn write_lines(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    /// Names currently in the ledger file, in file order.
    pub fn ledger_lines(&self) -> Vec<String> {
        match fs::read_to_string(self.ledger_path()) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

// --- Config builders ---

/// A dry-run configuration rooted in `ws`, with the main wordlist set to
/// `main` and a pre-seeded resolver list so nothing is downloaded.
pub fn test_config(ws: &TestWorkspace, patterns: &Path, main: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.pipeline.patterns_file = patterns.to_path_buf();
    config.pipeline.output_dir = ws.output_dir();
    config.wordlists.main = main.map(Path::to_path_buf);
    config.wordlists.number = ws.path().join("number.txt");
    config.wordlists.region = ws.path().join("region.txt");

    fs::create_dir_all(ws.output_dir()).expect("failed to create output dir");
    fs::write(ws.output_dir().join("resolvers.txt"), "127.0.0.1\n")
        .expect("failed to seed resolver list");
    config
}

pub fn test_pipeline_config(ws: &TestWorkspace, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        output_dir: ws.output_dir(),
        ..Default::default()
    }
}

// --- Pipeline builder ---

/// Assemble a pipeline around `resolver` with `main` as the bulk wordlist.
pub fn build_pipeline(
    ws: &TestWorkspace,
    config: PipelineConfig,
    main: &Path,
    resolver: impl Resolver + 'static,
) -> Pipeline {
    fs::create_dir_all(ws.output_dir()).expect("failed to create output dir");
    let store = WordlistStore::default().with_main(StreamingWordlist::new(main));
    let ledger = Ledger::open(ws.ledger_path()).expect("failed to open ledger");
    Pipeline::new(
        config,
        store,
        Box::new(resolver),
        Extractor::new(RecordType::A),
        ledger,
    )
}

// --- ScriptedResolver ---

/// Answers `A` for a fixed set of names by writing a massdns-style output file.
///
/// Optionally trips a shutdown after a given number of rounds.
pub struct ScriptedResolver {
    alive: HashSet<String>,
    work_dir: PathBuf,
    rounds: AtomicUsize,
    seen: Arc<Mutex<Vec<Vec<String>>>>,
    trip_after: Option<(usize, ShutdownTrigger)>,
}

impl ScriptedResolver {
    pub fn new(work_dir: impl Into<PathBuf>, alive: &[&str]) -> Self {
        Self {
            alive: alive.iter().map(|s| s.to_string()).collect(),
            work_dir: work_dir.into(),
            rounds: AtomicUsize::new(0),
            seen: Arc::new(Mutex::new(Vec::new())),
            trip_after: None,
        }
    }

    /// Handle to the candidates of every batch received, usable after the
    /// resolver has been moved into a pipeline.
    pub fn seen(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        Arc::clone(&self.seen)
    }

    /// Trigger `trigger` once `rounds` batches have been resolved.
    pub fn trip_after(mut self, rounds: usize, trigger: ShutdownTrigger) -> Self {
        self.trip_after = Some((rounds, trigger));
        self
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, batch: &Batch) -> Result<BatchOutcome, FuzzError> {
        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(batch.candidates().to_vec());

        let output = self.work_dir.join(format!("scripted_{round}.txt"));
        let mut contents = String::new();
        for name in batch.candidates() {
            if self.alive.contains(name) {
                contents.push_str(&format!("{name}. A {ANSWER_ADDR}\n"));
            } else {
                contents.push_str(&format!("{name}. CNAME dead.{ZONE}.\n"));
            }
        }
        fs::write(&output, contents)?;

        if let Some((after, trigger)) = &self.trip_after {
            if round >= *after {
                trigger.trigger();
            }
        }

        Ok(BatchOutcome::Resolved {
            output,
            partial: false,
        })
    }
}
