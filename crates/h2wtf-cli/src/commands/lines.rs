//! Lines command: print selected log records.
//!
//! This module implements `h2wtf lines`, a grep that understands the protocol
//! module's message prefixes. Records are printed in their normalized form
//! with elapsed time instead of the wall clock.

use std::io::{self, Write};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use h2wtf_core::RuleSet;
use h2wtf_log::{LogReader, LogRecord};
use regex::Regex;

use super::Outcome;
use crate::{Config, LineSelection};

/// Generic stream mention of the h2 components, e.g. `h2_task(2-7)`.
static STREAM_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:AH\d+: )?h2_(?:mplx|session|stream|task)\((?P<stream>\d+-\d+)(?:,[^)]*)?\)")
        .unwrap()
});

/// Decides which records get printed.
#[derive(Debug, Clone)]
pub enum LineFilter {
    /// Every record of the protocol module.
    Module(RuleSet),
    /// Records matched by any rule of the set.
    Rules(RuleSet),
    /// Records mentioning a stream id or a suffix of one.
    Stream { rules: RuleSet, id: String },
}

impl LineFilter {
    /// Builds the filter for a selection.
    pub fn new(config: &Config, select: &LineSelection) -> Result<Self> {
        let filter = if select.frames {
            Self::Rules(RuleSet::new(config.module.clone(), Vec::new()).with_frames())
        } else if select.lifetime {
            Self::Rules(config.rule_set(false)?)
        } else if let Some(id) = &select.stream {
            Self::Stream {
                rules: config.rule_set(false)?,
                id: id.trim().to_string(),
            }
        } else {
            Self::Module(config.rule_set(false)?)
        };
        Ok(filter)
    }

    pub fn selects(&self, record: &LogRecord) -> bool {
        match self {
            Self::Module(rules) => rules.is_relevant(record),
            Self::Rules(rules) => rules.classify(record).is_some(),
            Self::Stream { rules, id } => {
                if !rules.is_relevant(record) {
                    return false;
                }
                STREAM_MENTION_RE
                    .captures(&record.message)
                    .and_then(|caps| caps.name("stream"))
                    .is_some_and(|m| mentions(m.as_str(), id))
            }
        }
    }
}

/// Whether `mention` is `id` or ends with it on a component boundary.
fn mentions(mention: &str, id: &str) -> bool {
    mention == id
        || mention
            .strip_suffix(id)
            .is_some_and(|rest| rest.ends_with('-'))
}

/// Runs the lines command.
pub fn run(path: &Path, config: &Config, select: &LineSelection) -> Result<Outcome> {
    let filter = LineFilter::new(config, select)?;
    let reader =
        LogReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut stdout = io::stdout().lock();
    let mut printed = 0usize;
    for record in reader {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        if filter.selects(&record) {
            writeln!(stdout, "{record}")?;
            printed += 1;
        }
    }
    tracing::debug!(printed, "lines done");

    Ok(Outcome::from_found(printed > 0))
}
