//! Configuration types for dns-fuzz.

use hickory_proto::rr::RecordType;
use serde::{Deserialize, Serialize};
#[cfg(feature = "prometheus")]
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::FuzzError;

/// Main wordlist used when none is configured explicitly.
pub const DEFAULT_MAIN_WORDLIST: &str = "./wordlists/2m-subdomains.txt";

/// Public resolver list fetched when no cached copy exists.
pub const DEFAULT_RESOLVERS_URL: &str =
    "https://raw.githubusercontent.com/trickest/resolvers/refs/heads/main/resolvers.txt";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Generation, batching and policy settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Resolver subprocess settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Wordlist locations.
    #[serde(default)]
    pub wordlists: WordlistConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), FuzzError> {
        if self.pipeline.batch_size == 0 {
            return Err(FuzzError::Config("batch_size must be at least 1".into()));
        }
        if self.pipeline.pattern_concurrency == 0 {
            return Err(FuzzError::Config(
                "pattern_concurrency must be at least 1".into(),
            ));
        }
        self.resolver.record_type()?;
        Ok(())
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// File containing one pattern per line.
    #[serde(default = "default_patterns_file")]
    pub patterns_file: PathBuf,

    /// Candidates per resolver invocation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum candidates drawn from one pattern (0 = unbounded).
    #[serde(default)]
    pub max_per_pattern: u64,

    /// Ceiling on the in-memory product of a pattern without a bulk token.
    #[serde(default = "default_max_expand")]
    pub max_expand: Option<u64>,

    /// Invoke the resolver. When false, batches are generated and logged only.
    #[serde(default)]
    pub run_resolution: bool,

    /// Skip patterns needing an unconfigured main wordlist instead of aborting.
    #[serde(default)]
    pub skip_missing_binding: bool,

    /// Number of patterns processed at once.
    #[serde(default = "default_pattern_concurrency")]
    pub pattern_concurrency: usize,

    /// Directory for the ledger, resolver list and transient artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Ledger file name, relative to `output_dir` unless absolute.
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

impl PipelineConfig {
    /// Full path of the durable ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join(&self.ledger_file)
    }

    /// Per-pattern cap, `None` when unbounded.
    pub fn cap(&self) -> Option<u64> {
        (self.max_per_pattern > 0).then_some(self.max_per_pattern)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            patterns_file: default_patterns_file(),
            batch_size: default_batch_size(),
            max_per_pattern: 0,
            max_expand: default_max_expand(),
            run_resolution: false,
            skip_missing_binding: false,
            pattern_concurrency: default_pattern_concurrency(),
            output_dir: default_output_dir(),
            ledger_file: default_ledger_file(),
        }
    }
}

/// Resolver (massdns) configuration.
///
/// Tuning knobs are passed through to the binary unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolver binary path or name on `PATH`.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Arguments placed before the resolver's own arguments (e.g. a wrapper script).
    #[serde(default)]
    pub binary_args: Vec<String>,

    /// Arguments appended after the standard ones, before the input file.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// `--processes`
    #[serde(default = "default_one")]
    pub processes: u32,

    /// `--socket-count`
    #[serde(default = "default_one")]
    pub socket_count: u32,

    /// `-s` (internal hashmap size)
    #[serde(default = "default_hashmap_size")]
    pub hashmap_size: u32,

    /// Record type queried and treated as a positive answer.
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// Exit codes meaning "some lookups failed", whose output is still used.
    #[serde(default = "default_partial_exit_codes")]
    pub partial_exit_codes: Vec<i32>,

    /// Kill the resolver after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Resolver address list, relative to the output directory unless absolute.
    #[serde(default = "default_resolvers_file")]
    pub resolvers_file: PathBuf,

    /// Where the resolver address list is fetched from.
    #[serde(default = "default_resolvers_url")]
    pub resolvers_url: String,

    /// Re-download the resolver list even when a cached copy exists.
    #[serde(default)]
    pub refresh_resolvers: bool,
}

impl ResolverConfig {
    /// Parsed target record type.
    pub fn record_type(&self) -> Result<RecordType, FuzzError> {
        Ok(RecordType::from_str(&self.record_type.to_ascii_uppercase())?)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            binary_args: Vec::new(),
            extra_args: Vec::new(),
            processes: default_one(),
            socket_count: default_one(),
            hashmap_size: default_hashmap_size(),
            record_type: default_record_type(),
            partial_exit_codes: default_partial_exit_codes(),
            timeout_secs: None,
            resolvers_file: default_resolvers_file(),
            resolvers_url: default_resolvers_url(),
            refresh_resolvers: false,
        }
    }
}

/// Wordlist locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordlistConfig {
    /// Streaming wordlist for `{fuzz_all}`, `{fuzz}` and `{fuzz_number}`.
    /// Falls back to [`DEFAULT_MAIN_WORDLIST`] when unset and present.
    #[serde(default)]
    pub main: Option<PathBuf>,

    /// Values for `{number}`.
    #[serde(default = "default_number_file")]
    pub number: PathBuf,

    /// Values for `{region}`.
    #[serde(default = "default_region_file")]
    pub region: PathBuf,
}

impl Default for WordlistConfig {
    fn default() -> Self {
        Self {
            main: None,
            number: default_number_file(),
            region: default_region_file(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "dns_fuzz=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[cfg(feature = "prometheus")]
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            #[cfg(feature = "prometheus")]
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_patterns_file() -> PathBuf {
    PathBuf::from("patterns.txt")
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_expand() -> Option<u64> {
    Some(10_000_000)
}

fn default_pattern_concurrency() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dns_fuzz_results")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("output.txt")
}

fn default_binary() -> String {
    "massdns".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_hashmap_size() -> u32 {
    10_000
}

fn default_record_type() -> String {
    "A".to_string()
}

fn default_partial_exit_codes() -> Vec<i32> {
    vec![1]
}

fn default_resolvers_file() -> PathBuf {
    PathBuf::from("resolvers.txt")
}

fn default_resolvers_url() -> String {
    DEFAULT_RESOLVERS_URL.to_string()
}

fn default_number_file() -> PathBuf {
    PathBuf::from("number.txt")
}

fn default_region_file() -> PathBuf {
    PathBuf::from("region.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.batch_size, 1000);
        assert_eq!(config.pipeline.cap(), None);
        assert_eq!(config.resolver.record_type().unwrap(), RecordType::A);
        assert_eq!(
            config.pipeline.ledger_path(),
            PathBuf::from("dns_fuzz_results/output.txt")
        );
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(matches!(config.validate(), Err(FuzzError::Config(_))));
    }

    #[test]
    fn test_unknown_record_type_rejected() {
        let mut config = Config::default();
        config.resolver.record_type = "NOPE".to_string();
        assert!(matches!(
            config.validate(),
            Err(FuzzError::InvalidRecordType(_))
        ));
    }

    #[test]
    fn test_record_type_is_case_insensitive() {
        let resolver = ResolverConfig {
            record_type: "aaaa".to_string(),
            ..Default::default()
        };
        assert_eq!(resolver.record_type().unwrap(), RecordType::AAAA);
    }

    #[test]
    fn test_cap_zero_means_unbounded() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.cap(), None);
        pipeline.max_per_pattern = 25;
        assert_eq!(pipeline.cap(), Some(25));
    }
}
