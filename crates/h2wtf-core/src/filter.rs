//! Stream id filters for display.
//!
//! Filter specs are partial stream ids:
//! - `4711-2-7`: exactly that stream
//! - `2-7`: session 2, stream 7 in any child
//! - `4711-`: anything in child 4711
//! - `7` (or `-7`): stream 7 on any connection
//!
//! A stream passes if it matches any spec. An empty filter passes everything.

use regex::Regex;
use thiserror::Error;

use crate::types::StreamKey;

/// A filter spec in none of the accepted shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "invalid stream filter '{0}', expected <child>-<session>-<stream>, <session>-<stream>, <child>- or <stream>"
)]
pub struct FilterError(String);

/// Set of partial-id patterns matched against flattened stream ids.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    patterns: Vec<Regex>,
}

impl StreamFilter {
    /// A filter letting every stream pass.
    pub fn all() -> Self {
        Self::default()
    }

    /// Compiles filter specs.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, FilterError> {
        let patterns = specs
            .iter()
            .map(|spec| {
                let spec = spec.as_ref().trim();
                let pattern = pattern_for(spec)?;
                Regex::new(&pattern).map_err(|_| FilterError(spec.to_string()))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether no specs are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, key: &StreamKey) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let id = key.to_string();
        self.patterns.iter().any(|p| p.is_match(&id))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn pattern_for(spec: &str) -> Result<String, FilterError> {
    let parts: Vec<&str> = spec.split('-').collect();
    let pattern = match parts.as_slice() {
        [child, session, stream] if is_digits(child) && is_digits(session) && is_digits(stream) => {
            format!("^{spec}$")
        }
        [session, stream] if is_digits(session) && is_digits(stream) => {
            format!(r"^\d+-{spec}$")
        }
        [child, ""] if is_digits(child) => format!(r"^{child}-\d+-\d+$"),
        ["", stream] | [stream] if is_digits(stream) => format!(r"^\d+-\d+-{stream}$"),
        _ => return Err(FilterError(spec.to_string())),
    };
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(child: u32, session: u64, stream: u32) -> StreamKey {
        StreamKey::new(child, session, stream)
    }

    #[test]
    fn empty_filter_passes_everything() {
        let filter = StreamFilter::all();
        assert!(filter.is_empty());
        assert!(filter.matches(&key(1, 2, 3)));
    }

    #[test]
    fn full_triple_matches_exactly() {
        let filter = StreamFilter::parse(&["1-2-3"]).unwrap();
        assert!(filter.matches(&key(1, 2, 3)));
        assert!(!filter.matches(&key(11, 2, 3)));
        assert!(!filter.matches(&key(1, 2, 33)));
    }

    #[test]
    fn pair_matches_any_child() {
        let filter = StreamFilter::parse(&["5-3"]).unwrap();
        assert!(filter.matches(&key(1, 5, 3)));
        assert!(filter.matches(&key(4711, 5, 3)));
        assert!(!filter.matches(&key(1, 15, 3)));
        assert!(!filter.matches(&key(1, 5, 31)));

        let other = StreamFilter::parse(&["9-1"]).unwrap();
        assert!(!other.matches(&key(1, 5, 3)));
    }

    #[test]
    fn child_prefix_and_stream_suffix() {
        let child = StreamFilter::parse(&["4711-"]).unwrap();
        assert!(child.matches(&key(4711, 1, 0)));
        assert!(!child.matches(&key(471, 1, 0)));

        let stream = StreamFilter::parse(&["7"]).unwrap();
        assert!(stream.matches(&key(1, 2, 7)));
        assert!(!stream.matches(&key(1, 2, 17)));
        assert!(StreamFilter::parse(&["-7"]).unwrap().matches(&key(3, 4, 7)));
    }

    #[test]
    fn specs_are_ored() {
        let filter = StreamFilter::parse(&["1-2-3", "9"]).unwrap();
        assert!(filter.matches(&key(1, 2, 3)));
        assert!(filter.matches(&key(5, 5, 9)));
        assert!(!filter.matches(&key(5, 5, 8)));
    }

    #[test]
    fn rejects_non_numeric_specs() {
        for bad in ["", "a-b", "1-2-3-4", ".*", "1--2"] {
            assert!(StreamFilter::parse(&[bad]).is_err(), "{bad:?} should be rejected");
        }
    }
}
