//! Resolver output parsing.
//!
//! Output lines look like `<name>[.] <TYPE> <data...>`. Only records of the
//! configured type count as positive; other types are ignored and lines with
//! fewer than three fields are skipped.

use hickory_proto::rr::RecordType;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace};

use crate::error::FuzzError;

/// One parsed resolver output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    /// Queried name, trailing dot removed.
    pub name: String,
    /// Record type as printed by the resolver.
    pub kind: String,
    /// Record data fields joined by a single space. Not interpreted.
    pub data: String,
}

impl ResolutionRecord {
    /// Parse one output line. Returns `None` for malformed lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let name = fields.next()?.trim_end_matches('.');
        let kind = fields.next()?;
        let data: Vec<&str> = fields.collect();
        if data.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            kind: kind.to_string(),
            data: data.join(" "),
        })
    }
}

/// Extracts positively resolved names from resolver output.
#[derive(Debug, Clone)]
pub struct Extractor {
    target: String,
}

impl Extractor {
    /// Treat records of `record_type` as positive.
    pub fn new(record_type: RecordType) -> Self {
        Self {
            target: record_type.to_string(),
        }
    }

    /// Whether a record is positive.
    pub fn is_positive(&self, record: &ResolutionRecord) -> bool {
        record.kind.eq_ignore_ascii_case(&self.target)
    }

    /// Collect unique positive names in first-seen order.
    pub fn positives<R: BufRead>(&self, reader: R) -> io::Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let mut skipped = 0usize;

        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = ResolutionRecord::parse(&line) else {
                skipped += 1;
                continue;
            };
            if !self.is_positive(&record) {
                trace!(name = %record.name, kind = %record.kind, "ignoring record");
                continue;
            }
            if seen.insert(record.name.clone()) {
                names.push(record.name);
            }
        }

        if skipped > 0 {
            debug!(skipped, "skipped malformed resolver output lines");
        }
        Ok(names)
    }

    /// Read positives from an output artifact. A missing file has none.
    pub fn positives_from_file(&self, path: &Path) -> Result<Vec<String>, FuzzError> {
        match File::open(path) {
            Ok(file) => Ok(self.positives(BufReader::new(file))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "resolver produced no output file");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_strips_trailing_dot() {
        let record = ResolutionRecord::parse("a.example.com. A 1.2.3.4").unwrap();
        assert_eq!(record.name, "a.example.com");
        assert_eq!(record.kind, "A");
        assert_eq!(record.data, "1.2.3.4");
    }

    #[test]
    fn test_parse_keeps_multi_field_data() {
        let record =
            ResolutionRecord::parse("example.com. MX 10   mail.example.com.").unwrap();
        assert_eq!(record.data, "10 mail.example.com.");
    }

    #[test]
    fn test_parse_rejects_short_lines() {
        assert!(ResolutionRecord::parse("malformed").is_none());
        assert!(ResolutionRecord::parse("a.example.com. A").is_none());
        assert!(ResolutionRecord::parse("").is_none());
    }

    #[test]
    fn test_positives_filters_kind_and_malformed() {
        let output = "a.example.com. A 1.2.3.4\n\
                      b.example.com. CNAME c.example.com.\n\
                      malformed\n";
        let names = Extractor::new(RecordType::A)
            .positives(Cursor::new(output))
            .unwrap();
        assert_eq!(names, vec!["a.example.com"]);
    }

    #[test]
    fn test_positives_deduplicates_multiple_answers() {
        let output = "a.example.com. A 1.2.3.4\n\
                      a.example.com. A 5.6.7.8\n\
                      b.example.com A 9.9.9.9\n";
        let names = Extractor::new(RecordType::A)
            .positives(Cursor::new(output))
            .unwrap();
        assert_eq!(names, vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_target_kind_is_configurable() {
        let output = "a.example.com. A 1.2.3.4\nb.example.com. aaaa ::1\n";
        let names = Extractor::new(RecordType::AAAA)
            .positives(Cursor::new(output))
            .unwrap();
        assert_eq!(names, vec!["b.example.com"]);
    }

    #[test]
    fn test_missing_output_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let names = Extractor::new(RecordType::A)
            .positives_from_file(&dir.path().join("absent.txt"))
            .unwrap();
        assert!(names.is_empty());
    }
}
