//! Batch scheduling.
//!
//! Groups a pattern's candidate stream into fixed-size batches, honouring an
//! optional per-pattern cap. Batches are flushed when full, when the stream is
//! exhausted and when the cap is reached, so every candidate drawn lands in
//! exactly one batch.

use std::fmt;
use std::iter::Peekable;

use crate::error::FuzzError;

/// An ordered group of candidates resolved in one resolver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    seq: usize,
    candidates: Vec<String>,
}

impl Batch {
    /// Create a batch. `seq` is 1-based within its pattern.
    pub fn new(seq: usize, candidates: Vec<String>) -> Self {
        Self { seq, candidates }
    }

    /// Position of this batch within its pattern, starting at 1.
    pub fn seq(&self) -> usize {
        self.seq
    }

    /// Candidates in generation order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True if the batch holds no candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Turns a candidate stream into batches.
pub struct Batcher<I: Iterator> {
    source: Peekable<I>,
    batch_size: usize,
    cap: Option<u64>,
    drawn: u64,
    seq: usize,
    capped: bool,
    done: bool,
    pending_error: Option<FuzzError>,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = Result<String, FuzzError>>,
{
    /// Create a batcher. A `batch_size` of 0 is treated as 1.
    pub fn new(source: I, batch_size: usize, cap: Option<u64>) -> Self {
        Self {
            source: source.peekable(),
            batch_size: batch_size.max(1),
            cap,
            drawn: 0,
            seq: 0,
            capped: false,
            done: false,
            pending_error: None,
        }
    }

    /// Candidates drawn from the source so far.
    pub fn drawn(&self) -> u64 {
        self.drawn
    }

    /// Batches emitted so far.
    pub fn batches(&self) -> usize {
        self.seq
    }

    /// True once the per-pattern cap stopped the stream with candidates left.
    pub fn is_capped(&self) -> bool {
        self.capped
    }

    fn cap_reached(&self) -> bool {
        self.cap.is_some_and(|cap| self.drawn >= cap)
    }
}

impl<I: Iterator> fmt::Debug for Batcher<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("batch_size", &self.batch_size)
            .field("cap", &self.cap)
            .field("drawn", &self.drawn)
            .field("seq", &self.seq)
            .field("capped", &self.capped)
            .finish_non_exhaustive()
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<String, FuzzError>>,
{
    type Item = Result<Batch, FuzzError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        let mut candidates = Vec::with_capacity(self.batch_size.min(4096));
        while candidates.len() < self.batch_size {
            if self.cap_reached() {
                // A source ending exactly at the cap is complete, not capped.
                self.capped = self.source.peek().is_some();
                self.done = true;
                break;
            }
            match self.source.next() {
                Some(Ok(candidate)) => {
                    candidates.push(candidate);
                    self.drawn += 1;
                }
                Some(Err(e)) => {
                    self.done = true;
                    if candidates.is_empty() {
                        return Some(Err(e));
                    }
                    // Flush what was drawn before the error.
                    self.pending_error = Some(e);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }
        self.seq += 1;
        Some(Ok(Batch::new(self.seq, candidates)))
    }
}
