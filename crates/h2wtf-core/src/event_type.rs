//! Lifecycle event names.
//!
//! Event names are configuration rather than a closed enum: the httpd log
//! format has drifted between releases, so rule sets may introduce names of
//! their own. The well-known names are provided as constants.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of a lifecycle event, e.g. `created` or `ended`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(Cow<'static, str>);

impl EventName {
    pub const CREATED: Self = Self(Cow::Borrowed("created"));
    pub const SCHEDULED: Self = Self(Cow::Borrowed("scheduled"));
    pub const STARTED: Self = Self(Cow::Borrowed("started"));
    pub const RESPONSE: Self = Self(Cow::Borrowed("response"));
    pub const ENDED: Self = Self(Cow::Borrowed("ended"));
    pub const CLEANUP: Self = Self(Cow::Borrowed("cleanup"));
    pub const DESTROYED: Self = Self(Cow::Borrowed("destroyed"));
    pub const RESET: Self = Self(Cow::Borrowed("reset"));
    pub const ERROR: Self = Self(Cow::Borrowed("error"));
    pub const FRAME: Self = Self(Cow::Borrowed("frame"));

    const WELL_KNOWN: [Self; 10] = [
        Self::CREATED,
        Self::SCHEDULED,
        Self::STARTED,
        Self::RESPONSE,
        Self::ENDED,
        Self::CLEANUP,
        Self::DESTROYED,
        Self::RESET,
        Self::ERROR,
        Self::FRAME,
    ];

    /// Creates an event name after validation.
    ///
    /// Names are non-empty and consist of lowercase ASCII letters, digits,
    /// `_` and `-`.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidEventName> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if !valid {
            return Err(InvalidEventName(name));
        }
        if let Some(known) = Self::WELL_KNOWN.iter().find(|known| known.as_str() == name) {
            return Ok(known.clone());
        }
        Ok(Self(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the event can occur on a connection-level entity.
    ///
    /// Scheduling, processing and responses only happen on individual
    /// streams.
    pub fn applies_to_connection(&self) -> bool {
        ![Self::SCHEDULED, Self::STARTED, Self::RESPONSE, Self::ENDED].contains(self)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventName {
    type Err = InvalidEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for EventName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Error type for malformed event names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event name: '{0}'")]
pub struct InvalidEventName(String);
