//! Deduplicating ledger of confirmed names.
//!
//! The ledger file is append-only, one bare name per line. Its full contents
//! are loaded into memory when opened and that set decides what is new; a name
//! is written at most once over the life of the file, across runs.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::FuzzError;
use crate::metrics;
use crate::wordlist::clean_line;

/// Shared handle to the ledger. Clones refer to the same ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<Mutex<LedgerInner>>,
}

#[derive(Debug)]
struct LedgerInner {
    path: PathBuf,
    seen: HashSet<String>,
    file: File,
}

impl Ledger {
    /// Open (or create) the ledger at `path`, loading every recorded name.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FuzzError> {
        let path = path.into();
        let ledger_err = |source: io::Error| FuzzError::Ledger {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(ledger_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(ledger_err)?;

        // Hand-edited ledgers may carry stray bytes; decode lossily.
        let mut seen = HashSet::new();
        for line in BufReader::new(&file).split(b'\n') {
            if let Some(name) = clean_line(&line.map_err(ledger_err)?) {
                seen.insert(name);
            }
        }

        // Keep appends on their own line if the file was edited by hand.
        if !ends_with_newline(&mut file).map_err(ledger_err)? {
            file.write_all(b"\n").map_err(ledger_err)?;
        }

        info!(path = %path.display(), names = seen.len(), "ledger loaded");
        metrics::record_ledger_size(seen.len());

        Ok(Self {
            inner: Arc::new(Mutex::new(LedgerInner { path, seen, file })),
        })
    }

    /// Append names not yet recorded and return them, in input order.
    ///
    /// The seen-check and the append happen under one lock.
    pub fn record<I, S>(&self, names: I) -> Result<Vec<String>, FuzzError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.lock();

        let mut fresh: Vec<String> = Vec::new();
        let mut batch_seen = HashSet::new();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() || inner.seen.contains(name) || !batch_seen.insert(name.to_string())
            {
                continue;
            }
            fresh.push(name.to_string());
        }
        if fresh.is_empty() {
            return Ok(fresh);
        }

        let mut buf = String::with_capacity(fresh.iter().map(|n| n.len() + 1).sum());
        for name in &fresh {
            buf.push_str(name);
            buf.push('\n');
        }
        let inner = &mut *inner;
        if let Err(source) = inner
            .file
            .write_all(buf.as_bytes())
            .and_then(|_| inner.file.flush())
        {
            return Err(FuzzError::Ledger {
                path: inner.path.clone(),
                source,
            });
        }

        inner.seen.extend(fresh.iter().cloned());
        debug!(new = fresh.len(), total = inner.seen.len(), "ledger appended");
        metrics::record_ledger_size(inner.seen.len());
        Ok(fresh)
    }

    /// Whether `name` has been recorded.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().seen.contains(name)
    }

    /// Number of recorded names.
    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ledger file path.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }
}

#[cfg(test)]
impl Ledger {
    /// A ledger over a read-only handle, so every append fails.
    pub(crate) fn read_only(path: impl Into<PathBuf>) -> Result<Self, FuzzError> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                path,
                seen: HashSet::new(),
                file,
            })),
        })
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
