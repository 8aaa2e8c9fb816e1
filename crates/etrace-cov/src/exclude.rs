//! `filename:line` exclude lists, used by the LCOV emitter to drop specific
//! source lines (or whole files, with `linenr == -1`) from the report.
//! Mirrors `excludes_create`/`excludes_match`.

use std::fs;
use std::path::Path;

use crate::error::{CovError, Result};

#[derive(Debug, Clone)]
struct Exclude {
    filename: String,
    linenr: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    entries: Vec<Exclude>,
}

impl ExcludeFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses an exclude file: one `filename:linenr` entry per line, `#` and
    /// blank lines skipped, lines without a `:` delimiter warned and ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| CovError::ExcludeFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut entries = Vec::new();
        for line in text.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((filename, linenr_s)) = line.split_once(':') else {
                tracing::warn!(line, "bad exclude line, missing ':' delimiter");
                continue;
            };
            let linenr = linenr_s.trim().parse().unwrap_or(0);
            entries.push(Exclude {
                filename: filename.to_string(),
                linenr,
            });
        }
        Ok(Self { entries })
    }

    /// Whether `filename:linenr` is excluded: an entry for this file whose
    /// stored line is either `-1` (whole-file wildcard) or this exact line.
    pub fn matches(&self, filename: &str, linenr: i64) -> bool {
        self.entries
            .iter()
            .any(|e| e.filename == filename && (e.linenr == -1 || e.linenr == linenr))
    }

    /// Whether the whole file is excluded via a `filename:-1` entry.
    pub fn excludes_file(&self, filename: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.filename == filename && e.linenr == -1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_and_matches_entries() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# a comment").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "foo.c:10").unwrap();
        writeln!(f, "bad line with no colon").unwrap();
        let filter = ExcludeFilter::load(f.path()).unwrap();

        assert!(filter.matches("foo.c", 10));
        assert!(!filter.matches("foo.c", 11));
        assert!(!filter.matches("bar.c", 10));
    }

    #[test]
    fn whole_file_wildcard() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "foo.c:-1").unwrap();
        let filter = ExcludeFilter::load(f.path()).unwrap();
        assert!(filter.excludes_file("foo.c"));
        assert!(filter.matches("foo.c", 123));
    }
}
