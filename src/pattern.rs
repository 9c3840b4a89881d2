//! Pattern parsing and lazy expansion.
//!
//! A pattern is a domain-name template such as `{fuzz}-{number}.{region}.example.com`.
//! Placeholders come from a fixed vocabulary, listed here in canonical order:
//!
//! | Placeholder | Binding |
//! |---|---|
//! | `{fuzz_all}`, `{fuzz}`, `{fuzz_number}` | main wordlist (streamed) |
//! | `{number}` | number list (in memory) |
//! | `{region}` | region list (in memory) |
//!
//! The `{fuzz*}` aliases all bind the same stream; when several appear in one
//! pattern they receive the same word. Candidates are produced in canonical
//! order: for each streamed word, every `{number}` value, and for each of
//! those every `{region}` value.
//!
//! Placeholders are matched on exact `{name}` delimiters and substituted values
//! are never re-scanned. Braced names outside the vocabulary are kept as text.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::error::FuzzError;
use crate::wordlist::{WordStream, WordlistStore};

/// A placeholder binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Token {
    /// Main wordlist (`{fuzz_all}`, `{fuzz}`, `{fuzz_number}`).
    Bulk,
    /// `{number}`
    Number,
    /// `{region}`
    Region,
}

/// Small tokens in expansion order, outermost first.
const SMALL_TOKENS: [Token; 2] = [Token::Number, Token::Region];

fn token_named(name: &str) -> Option<Token> {
    match name {
        "fuzz_all" | "fuzz" | "fuzz_number" => Some(Token::Bulk),
        "number" => Some(Token::Number),
        "region" => Some(Token::Region),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Token),
}

/// A parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Split a pattern into literal text and placeholder slots.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let slot = after
                .find('}')
                .and_then(|close| token_named(&after[..close]).map(|token| (close, token)));

            match slot {
                Some((close, token)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(token));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `token` occurs in the pattern.
    pub fn uses(&self, token: Token) -> bool {
        self.segments.contains(&Segment::Slot(token))
    }

    /// Whether the pattern needs the main wordlist.
    pub fn needs_bulk(&self) -> bool {
        self.uses(Token::Bulk)
    }

    /// Whether the pattern contains any recognized placeholder.
    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Slot(_)))
    }

    fn render(&self, bulk: Option<&str>, small: &[(Token, &str)]) -> String {
        let mut out = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Token::Bulk) => out.push_str(bulk.unwrap_or_default()),
                Segment::Slot(token) => {
                    if let Some((_, value)) = small.iter().find(|(t, _)| t == token) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Expands patterns against a [`WordlistStore`].
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    store: &'a WordlistStore,
    max_expand: Option<u64>,
}

impl<'a> Expander<'a> {
    /// Create an expander. `max_expand` limits patterns without a bulk token.
    pub fn new(store: &'a WordlistStore, max_expand: Option<u64>) -> Self {
        Self { store, max_expand }
    }

    /// Start a lazy expansion of `pattern`.
    ///
    /// Yields nothing when the pattern needs the main wordlist and none is
    /// bound; callers decide whether that is an error before getting here.
    pub fn expand(&self, pattern: &Pattern) -> Result<Expansion, FuzzError> {
        let small: Vec<(Token, Arc<Vec<String>>)> = SMALL_TOKENS
            .iter()
            .filter(|token| pattern.uses(**token))
            .map(|token| (*token, self.list_for(*token)))
            .collect();

        if small.iter().any(|(_, values)| values.is_empty()) {
            return Ok(Expansion::empty(pattern));
        }

        let outer = if pattern.needs_bulk() {
            match &self.store.main {
                Some(main) => Outer::Stream(main.stream()?),
                None => return Ok(Expansion::empty(pattern)),
            }
        } else {
            let size = small
                .iter()
                .fold(1u128, |acc, (_, values)| acc.saturating_mul(values.len() as u128));
            if let Some(limit) = self.max_expand {
                if size > limit as u128 {
                    return Err(FuzzError::ExpansionTooLarge { size, limit });
                }
            }
            Outer::Single { taken: false }
        };

        Ok(Expansion {
            pattern: pattern.clone(),
            outer,
            indices: vec![0; small.len()],
            small,
            word: None,
            in_product: false,
        })
    }

    fn list_for(&self, token: Token) -> Arc<Vec<String>> {
        match token {
            Token::Number => Arc::clone(&self.store.number),
            Token::Region => Arc::clone(&self.store.region),
            Token::Bulk => Arc::default(),
        }
    }
}

enum Outer {
    Single { taken: bool },
    Stream(WordStream),
    Exhausted,
}

impl Outer {
    fn advance(&mut self) -> Option<io::Result<Option<String>>> {
        match self {
            Outer::Single { taken } if !*taken => {
                *taken = true;
                Some(Ok(None))
            }
            Outer::Stream(stream) => stream.next().map(|word| word.map(Some)),
            _ => None,
        }
    }
}

/// Lazy candidate sequence for one pattern.
///
/// The outer loop reads the main wordlist one word at a time; for each word the
/// in-memory Cartesian product is walked with an index odometer. Memory use does
/// not depend on the size of the main wordlist.
pub struct Expansion {
    pattern: Pattern,
    outer: Outer,
    small: Vec<(Token, Arc<Vec<String>>)>,
    indices: Vec<usize>,
    word: Option<String>,
    in_product: bool,
}

impl Expansion {
    fn empty(pattern: &Pattern) -> Self {
        Self {
            pattern: pattern.clone(),
            outer: Outer::Exhausted,
            small: Vec::new(),
            indices: Vec::new(),
            word: None,
            in_product: false,
        }
    }

    /// Advance the odometer, last token fastest. Returns false once wrapped.
    fn step(&mut self) -> bool {
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.small[pos].1.len() {
                return true;
            }
            self.indices[pos] = 0;
        }
        false
    }

    fn current(&self) -> String {
        let values: Vec<(Token, &str)> = self
            .small
            .iter()
            .zip(&self.indices)
            .map(|((token, values), idx)| (*token, values[*idx].as_str()))
            .collect();
        self.pattern.render(self.word.as_deref(), &values)
    }
}

impl Iterator for Expansion {
    type Item = Result<String, FuzzError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.in_product {
            match self.outer.advance()? {
                Ok(word) => {
                    self.word = word;
                    self.in_product = true;
                }
                Err(e) => {
                    self.outer = Outer::Exhausted;
                    return Some(Err(e.into()));
                }
            }
        }

        let candidate = self.current();
        if !self.step() {
            self.in_product = false;
        }
        Some(Ok(candidate))
    }
}

impl fmt::Debug for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expansion")
            .field("pattern", &self.pattern.as_str())
            .field("word", &self.word)
            .field("indices", &self.indices)
            .finish()
    }
}
