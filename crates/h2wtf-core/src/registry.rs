//! Stream registry and identity resolution.
//!
//! The [`StreamRegistry`] is the single owner of everything learned during one
//! pass over a log: the streams keyed by canonical identity and the alias
//! table mapping drifted identities back to them.
//!
//! # Aliasing
//!
//! httpd 2.4.48 (and maybe earlier) reassigns connection ids in `mpm_event`,
//! so `h2_task` and `h2_mplx` lines may name a stream under a session id that
//! differs from the one it was created with. Events of `aliasing` rules whose
//! identity is unknown are reconciled against existing streams with the same
//! child and stream number. A unique candidate is recorded permanently; more
//! than one candidate is never guessed at.

use std::collections::HashMap;

use h2wtf_log::LogRecord;

use crate::event_type::EventName;
use crate::filter::StreamFilter;
use crate::rules::RuleSet;
use crate::stream::StreamEvents;
use crate::types::StreamKey;

/// Outcome of resolving a raw identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The raw identity names a known stream.
    Known(StreamKey),
    /// An earlier alias decision maps the raw identity.
    Alias(StreamKey),
    /// Reconciliation just attached the raw identity to a unique stream.
    Attached(StreamKey),
    /// A creating event introduces a new stream.
    Created(StreamKey),
    /// No stream matches; the event is dropped.
    Unknown,
    /// Several streams could match; the event is dropped.
    Ambiguous(usize),
}

impl Resolution {
    /// The canonical identity, if the event is kept.
    pub const fn key(&self) -> Option<StreamKey> {
        match self {
            Self::Known(key) | Self::Alias(key) | Self::Attached(key) | Self::Created(key) => {
                Some(*key)
            }
            Self::Unknown | Self::Ambiguous(_) => None,
        }
    }
}

/// Owns all streams and aliases of one collector run.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    rules: RuleSet,
    filter: StreamFilter,
    streams: HashMap<StreamKey, StreamEvents>,
    aliases: HashMap<StreamKey, StreamKey>,
}

impl StreamRegistry {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Restricts [`get_streams`](Self::get_streams) and the return value of
    /// [`observe`](Self::observe) to matching streams.
    #[must_use]
    pub fn with_filter(mut self, filter: StreamFilter) -> Self {
        self.filter = filter;
        self
    }

    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub const fn filter(&self) -> &StreamFilter {
        &self.filter
    }

    /// Routes one record through classification and resolution.
    ///
    /// Returns `true` if a rule matched and the resolved identity passes the
    /// filter, even when the event itself had to be discarded.
    pub fn observe(&mut self, record: &LogRecord) -> bool {
        let Some(hit) = self.rules.classify(record) else {
            return false;
        };
        let raw = hit.key;
        let name = hit.rule.name().clone();
        let creating = hit.rule.is_creating();
        let aliasing = hit.rule.is_aliasing();

        let resolution = self.resolve(raw, creating, aliasing);
        match resolution {
            Resolution::Created(key) => {
                tracing::debug!(stream = %key, line = record.line, "stream created");
                self.streams
                    .insert(key, StreamEvents::new(key, name, record.clone()));
            }
            Resolution::Known(key) | Resolution::Alias(key) | Resolution::Attached(key) => {
                if creating {
                    tracing::error!(
                        stream = %key,
                        line = record.line,
                        "stream already exists, ignoring: {record}"
                    );
                } else if let Some(stream) = self.streams.get_mut(&key) {
                    stream.add_event(name, record.clone());
                }
            }
            Resolution::Unknown => {
                tracing::info!(stream = %raw, line = record.line, "stream unknown, ignoring: {record}");
            }
            Resolution::Ambiguous(candidates) => {
                tracing::warn!(
                    stream = %raw,
                    candidates,
                    line = record.line,
                    "stream has {candidates} possible matches, ignoring: {record}"
                );
            }
        }

        self.filter.matches(&resolution.key().unwrap_or(raw))
    }

    /// Maps a raw identity to a canonical one.
    ///
    /// # Algorithm
    ///
    /// 1. A raw identity naming a known stream is used as is
    /// 2. A raw identity with an alias entry reuses it
    /// 3. For `aliasing` rules, search streams sharing child and stream number;
    ///    a unique candidate becomes a permanent alias, several are ambiguous
    /// 4. Non-creating rules referring to unknown streams are dropped
    /// 5. Creating rules introduce the raw identity as a new stream
    ///
    /// Only step 3 mutates state (the alias table).
    pub fn resolve(&mut self, raw: StreamKey, creating: bool, aliasing: bool) -> Resolution {
        if self.streams.contains_key(&raw) {
            return Resolution::Known(raw);
        }
        if let Some(canonical) = self.aliases.get(&raw) {
            return Resolution::Alias(*canonical);
        }

        if aliasing {
            let candidates: Vec<StreamKey> = self
                .streams
                .keys()
                .filter(|key| key.child == raw.child && key.stream == raw.stream)
                .copied()
                .collect();
            match candidates.as_slice() {
                [canonical] => {
                    self.aliases.insert(raw, *canonical);
                    tracing::info!(alias = %raw, stream = %canonical, "attached to stream");
                    return Resolution::Attached(*canonical);
                }
                [] => {}
                many => return Resolution::Ambiguous(many.len()),
            }
        }

        if creating {
            Resolution::Created(raw)
        } else {
            Resolution::Unknown
        }
    }

    /// The canonical identity an alias was attached to.
    pub fn resolve_alias(&self, raw: &StreamKey) -> Option<StreamKey> {
        self.aliases.get(raw).copied()
    }

    pub fn stream(&self, key: &StreamKey) -> Option<&StreamEvents> {
        self.streams.get(key)
    }

    /// The connection-level entity carrying a stream.
    pub fn connection_of(&self, stream: &StreamEvents) -> Option<&StreamEvents> {
        if stream.is_connection() {
            return None;
        }
        self.stream(&stream.key().connection())
    }

    /// Streams passing the filter, ordered by creation time.
    pub fn get_streams(&self) -> Vec<&StreamEvents> {
        sorted(
            self.streams
                .values()
                .filter(|s| self.filter.matches(&s.key())),
        )
    }

    /// Every stream regardless of filter, ordered by creation time.
    pub fn all_streams(&self) -> Vec<&StreamEvents> {
        sorted(self.streams.values())
    }

    /// Number of known streams and connections.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Convenience for the first occurrence of an event on a stream.
    pub fn event(&self, key: &StreamKey, name: &EventName) -> Option<&LogRecord> {
        self.stream(key).and_then(|s| s.event(name))
    }
}

fn sorted<'a>(streams: impl Iterator<Item = &'a StreamEvents>) -> Vec<&'a StreamEvents> {
    let mut streams: Vec<_> = streams.collect();
    // Key as tiebreaker keeps output stable across runs
    streams.sort_by_key(|s| (s.created().elapsed, s.key()));
    streams
}
