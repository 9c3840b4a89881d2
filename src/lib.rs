//! dns-fuzz - Streamed pattern expansion and batch DNS resolution.
//!
//! This crate expands domain-name patterns such as `{fuzz}.{region}.example.com`
//! into candidate names, resolves them in batches through an external
//! massdns-compatible resolver, and appends every name that answers with the
//! configured record type to a deduplicated ledger file.
//!
//! ## Features
//!
//! - Streaming expansion: the main wordlist is read one line at a time, so
//!   memory does not grow with its size
//! - Fixed-size batches with an optional per-pattern cap
//! - Idempotent ledger: re-running never duplicates a recorded name
//! - Dry-run mode that exercises generation and batching without resolving
//! - Cooperative shutdown at batch boundaries
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            dns-fuzz                               │
//! │                                                                   │
//! │  patterns ──▶ ┌──────────┐    ┌─────────┐    ┌──────────────┐     │
//! │               │ Expander │───▶│ Batcher │───▶│   Resolver   │──┐  │
//! │  wordlists ──▶└──────────┘    └─────────┘    │ (massdns/dry)│  │  │
//! │                                              └──────────────┘  │  │
//! │                                                                ▼  │
//! │               ┌──────────┐    ┌───────────┐                       │
//! │  output.txt ◀─│  Ledger  │◀───│ Extractor │◀── resolver output     │
//! │               └──────────┘    └───────────┘                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use dns_fuzz::{pipeline, Config, Shutdown};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::default();
//!     config.pipeline.patterns_file = "patterns.txt".into();
//!     config.pipeline.run_resolution = true;
//!
//!     let (shutdown, worker) = Shutdown::new_signals();
//!     tokio::spawn(worker);
//!
//!     let report = pipeline::run(&config, &shutdown).await.unwrap();
//!     println!("{} new names", report.new_positives());
//! }
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod metrics;
pub mod pattern;
pub mod pipeline;
pub mod resolver;
pub mod telemetry;
pub mod wordlist;

// Re-export main types
pub use batch::{Batch, Batcher};
pub use config::{Config, PipelineConfig, ResolverConfig, TelemetryConfig, WordlistConfig};
pub use error::FuzzError;
pub use extract::{Extractor, ResolutionRecord};
pub use ledger::Ledger;
pub use pattern::{Expander, Pattern};
pub use pipeline::{Pipeline, PatternReport, PatternStatus, RunReport, Shutdown};
pub use resolver::{BatchOutcome, DryRunResolver, MassDnsResolver, Resolver};
pub use wordlist::{StreamingWordlist, WordlistStore};
