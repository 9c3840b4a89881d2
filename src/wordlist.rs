//! Wordlist store.
//!
//! Small lists (`{number}`, `{region}`) are loaded fully into memory once per
//! run. The main list can be millions of lines long, so it is only ever exposed
//! as a [`StreamingWordlist`] that re-opens the file for every pattern and yields
//! one line at a time.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{WordlistConfig, DEFAULT_MAIN_WORDLIST};
use crate::error::FuzzError;

/// Read a small newline-delimited list. Blank lines are dropped.
///
/// A missing file loads as an empty list.
pub fn read_small_list(path: &Path) -> Result<Vec<String>, FuzzError> {
    if !path.is_file() {
        warn!(path = %path.display(), "wordlist not found, using empty list");
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut words = Vec::new();
    for line in reader.split(b'\n') {
        if let Some(word) = clean_line(&line?) {
            words.push(word);
        }
    }
    Ok(words)
}

/// Read the patterns file. Blank lines and `#` comments are dropped.
pub fn read_patterns(path: &Path) -> Result<Vec<String>, FuzzError> {
    if !path.is_file() {
        return Err(FuzzError::Config(format!(
            "missing patterns file: {}",
            path.display()
        )));
    }
    let words = read_small_list(path)?;
    Ok(words.into_iter().filter(|p| !p.starts_with('#')).collect())
}

pub(crate) fn clean_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let trimmed = line.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A large wordlist read sequentially, never held in memory.
#[derive(Debug, Clone)]
pub struct StreamingWordlist {
    path: PathBuf,
}

impl StreamingWordlist {
    /// Wrap a wordlist file. The file is not opened until [`Self::stream`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh pass over the file.
    pub fn stream(&self) -> Result<WordStream, FuzzError> {
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(WordStream { reader, buf: Vec::new() })
    }
}

/// One pass over a [`StreamingWordlist`].
///
/// Holds a single line buffer regardless of file size.
#[derive(Debug)]
pub struct WordStream {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl Iterator for WordStream {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if let Some(word) = clean_line(&self.buf) {
                        return Some(Ok(word));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Token bindings shared by every pattern of a run.
#[derive(Debug, Clone, Default)]
pub struct WordlistStore {
    /// Bulk source for the `{fuzz*}` tokens.
    pub main: Option<StreamingWordlist>,
    /// Values for `{number}`.
    pub number: Arc<Vec<String>>,
    /// Values for `{region}`.
    pub region: Arc<Vec<String>>,
}

impl WordlistStore {
    /// Build a store from in-memory lists, without a main wordlist.
    pub fn from_lists(number: Vec<String>, region: Vec<String>) -> Self {
        Self {
            main: None,
            number: Arc::new(number),
            region: Arc::new(region),
        }
    }

    /// Attach a main wordlist.
    pub fn with_main(mut self, main: StreamingWordlist) -> Self {
        self.main = Some(main);
        self
    }

    /// Load the small lists and locate the main wordlist.
    ///
    /// An explicitly configured main wordlist that does not exist is a
    /// configuration error unless `skip_missing` is set. Without an explicit
    /// path, [`DEFAULT_MAIN_WORDLIST`] is used if it exists.
    pub fn load(config: &WordlistConfig, skip_missing: bool) -> Result<Self, FuzzError> {
        let number = read_small_list(&config.number)?;
        let region = read_small_list(&config.region)?;

        let mut main = None;
        if let Some(path) = &config.main {
            if path.is_file() {
                main = Some(StreamingWordlist::new(path));
            } else if skip_missing {
                warn!(path = %path.display(), "main wordlist missing, continuing without it");
            } else {
                return Err(FuzzError::Config(format!(
                    "main wordlist does not exist: {}",
                    path.display()
                )));
            }
        }
        if main.is_none() && Path::new(DEFAULT_MAIN_WORDLIST).is_file() {
            main = Some(StreamingWordlist::new(DEFAULT_MAIN_WORDLIST));
        }

        info!(
            main = ?main.as_ref().map(|m| m.path().display().to_string()),
            number = number.len(),
            region = region.len(),
            "wordlists loaded"
        );

        Ok(Self {
            main,
            number: Arc::new(number),
            region: Arc::new(region),
        })
    }
}
