//! Subprocess tests for the massdns adapter.
//!
//! A small shell script stands in for massdns: it understands `-w <file>`,
//! reads the input file (last argument) and answers `A` for every name
//! containing `alive`. Runs through `/bin/sh`, so unix only.
//!
//! The terminal-interrupt test re-runs one test of this binary under
//! `setsid`, so the `kill -INT 0` it sends reaches only that session.
#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::*;
use dns_fuzz::resolver::MassDnsResolver;
use dns_fuzz::{pipeline, Batch, BatchOutcome, Resolver, ResolverConfig, Shutdown};

const FAKE_MASSDNS: &str = r#"
out=""
while [ $# -gt 1 ]; do
    case "$1" in
        -w) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
: > "$out"
while IFS= read -r name; do
    case "$name" in
        *alive*) echo "$name. A 10.0.0.1" >> "$out" ;;
        *) echo "$name. CNAME parked.example.net." >> "$out" ;;
    esac
done < "$1"
"#;

fn script(ws: &TestWorkspace, name: &str, body: &str) -> PathBuf {
    let path = ws.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn sh_config(script: &Path) -> ResolverConfig {
    ResolverConfig {
        binary: "/bin/sh".to_string(),
        binary_args: vec![script.to_string_lossy().into_owned()],
        ..Default::default()
    }
}

fn batch(names: &[&str]) -> Batch {
    Batch::new(1, names.iter().map(|n| n.to_string()).collect())
}

fn resolver(ws: &TestWorkspace, config: ResolverConfig) -> MassDnsResolver {
    fs::create_dir_all(ws.output_dir()).unwrap();
    MassDnsResolver::new(config, ws.output_dir().join("resolvers.txt"), ws.output_dir()).unwrap()
}

fn leftover_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

// =========================================================================
// Exit status handling
// =========================================================================

#[tokio::test]
async fn successful_run_yields_output_file() {
    let ws = TestWorkspace::new();
    let fake = script(&ws, "massdns.sh", FAKE_MASSDNS);
    let resolver = resolver(&ws, sh_config(&fake));

    let outcome = resolver
        .resolve(&batch(&["alive.example.com", "gone.example.com"]))
        .await
        .unwrap();

    let BatchOutcome::Resolved { output, partial } = outcome else {
        panic!("expected resolved outcome, got {outcome:?}");
    };
    assert!(!partial);
    let contents = fs::read_to_string(&output).unwrap();
    assert_eq!(
        contents,
        "alive.example.com. A 10.0.0.1\ngone.example.com. CNAME parked.example.net.\n"
    );

    // Only the output artifact remains; the input file is gone.
    fs::remove_file(&output).unwrap();
    assert!(leftover_files(&ws.output_dir()).is_empty());
}

#[tokio::test]
async fn partial_exit_code_keeps_output() {
    let ws = TestWorkspace::new();
    let body = format!("{FAKE_MASSDNS}\nexit 1\n");
    let fake = script(&ws, "massdns.sh", &body);
    let resolver = resolver(&ws, sh_config(&fake));

    let outcome = resolver.resolve(&batch(&["alive.example.com"])).await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Resolved { partial: true, .. }));
}

#[tokio::test]
async fn nonzero_exit_is_a_failed_batch() {
    let ws = TestWorkspace::new();
    let fake = script(&ws, "massdns.sh", "echo 'no resolvers loaded' >&2\nexit 3\n");
    let resolver = resolver(&ws, sh_config(&fake));

    let outcome = resolver.resolve(&batch(&["alive.example.com"])).await.unwrap();

    assert_eq!(
        outcome,
        BatchOutcome::Failed {
            code: Some(3),
            stderr: "no resolvers loaded".to_string(),
        }
    );
    assert!(leftover_files(&ws.output_dir()).is_empty());
}

#[tokio::test]
async fn slow_resolver_times_out() {
    let ws = TestWorkspace::new();
    let fake = script(&ws, "massdns.sh", "exec sleep 30\n");
    let config = ResolverConfig {
        timeout_secs: Some(1),
        ..sh_config(&fake)
    };
    let resolver = resolver(&ws, config);

    let outcome = resolver.resolve(&batch(&["alive.example.com"])).await.unwrap();
    assert!(matches!(outcome, BatchOutcome::TimedOut { .. }));
}

// =========================================================================
// Full run
// =========================================================================

#[tokio::test]
async fn run_with_resolution_records_alive_names() {
    let ws = TestWorkspace::new();
    let fake = script(&ws, "massdns.sh", FAKE_MASSDNS);
    let main = ws.write_lines("words.txt", &["alive1", "dead", "alive2", "other"]);
    let patterns = ws.write_lines("patterns.txt", &["{fuzz_all}.example.com"]);

    let mut config = test_config(&ws, &patterns, Some(&main));
    config.pipeline.run_resolution = true;
    config.pipeline.batch_size = 3;
    config.resolver = sh_config(&fake);

    let report = pipeline::run(&config, &Shutdown::never()).await.unwrap();

    assert_eq!(report.tested(), 4);
    assert_eq!(report.patterns[0].batches, 2);
    assert_eq!(report.failed_batches(), 0);
    assert_eq!(ws.ledger_lines(), vec!["alive1.example.com", "alive2.example.com"]);

    let mut left = leftover_files(&ws.output_dir());
    left.sort();
    assert_eq!(left, vec!["output.txt", "resolvers.txt"]);
}

// =========================================================================
// Terminal interrupt
// =========================================================================

const SESSION_CHILD_ENV: &str = "DNS_FUZZ_SESSION_CHILD";

#[tokio::test]
#[ignore = "run in its own session by terminal_interrupt_keeps_in_flight_batch"]
async fn in_flight_batch_survives_process_group_interrupt() {
    if std::env::var_os(SESSION_CHILD_ENV).is_none() {
        return;
    }

    let ws = TestWorkspace::new();
    let body = format!("sleep 2\n{FAKE_MASSDNS}");
    let fake = script(&ws, "massdns.sh", &body);
    let main = ws.write_lines("words.txt", &["alive-api", "dead", "alive-www"]);
    let patterns = ws.write_lines("patterns.txt", &["{fuzz}.example.com"]);

    let mut config = test_config(&ws, &patterns, Some(&main));
    config.pipeline.run_resolution = true;
    config.resolver = sh_config(&fake);

    let (shutdown, worker) = Shutdown::new_signals();
    tokio::spawn(worker);
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(700)).await;
        // Same delivery as a terminal Ctrl-C: every process in our group.
        let _ = tokio::process::Command::new("sh")
            .args(["-c", "kill -INT 0"])
            .status()
            .await;
    });

    let report = pipeline::run(&config, &shutdown).await.unwrap();

    assert!(report.cancelled());
    assert_eq!(report.failed_batches(), 0);
    assert_eq!(
        ws.ledger_lines(),
        vec!["alive-api.example.com", "alive-www.example.com"]
    );
}

#[test]
fn terminal_interrupt_keeps_in_flight_batch() {
    let exe = std::env::current_exe().unwrap();
    let status = std::process::Command::new("setsid")
        .arg(&exe)
        .args([
            "in_flight_batch_survives_process_group_interrupt",
            "--exact",
            "--ignored",
            "--test-threads=1",
        ])
        .env(SESSION_CHILD_ENV, "1")
        .status();

    match status {
        Ok(status) => assert!(status.success(), "session child failed: {status}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("setsid not available, skipping");
        }
        Err(e) => panic!("failed to start session child: {e}"),
    }
}
