//! Stream identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing a flattened stream identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseKeyError {
    /// Not three dash-separated components.
    #[error("expected <child>-<session>-<stream>, got '{0}'")]
    Shape(String),
    /// A component is not a number in range.
    #[error("invalid {component} in stream id '{value}'")]
    Component {
        component: &'static str,
        value: String,
    },
}

/// Canonical identity of a stream: `(child, session, stream)`.
///
/// `child` is the httpd child process, `session` the connection id within it
/// and `stream` the HTTP/2 stream number. Stream number 0 denotes the
/// connection itself rather than a stream on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct StreamKey {
    pub child: u32,
    pub session: u64,
    pub stream: u32,
}

impl StreamKey {
    pub const fn new(child: u32, session: u64, stream: u32) -> Self {
        Self {
            child,
            session,
            stream,
        }
    }

    /// Whether this identifies a connection-level entity.
    pub const fn is_connection(&self) -> bool {
        self.stream == 0
    }

    /// The identity of the connection carrying this stream.
    #[must_use]
    pub const fn connection(&self) -> Self {
        Self::new(self.child, self.session, 0)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.child, self.session, self.stream)
    }
}

impl FromStr for StreamKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(child), Some(session), Some(stream), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseKeyError::Shape(s.to_string()));
        };

        let component = |component: &'static str| ParseKeyError::Component {
            component,
            value: s.to_string(),
        };
        Ok(Self {
            child: child.parse().map_err(|_| component("child"))?,
            session: session.parse().map_err(|_| component("session"))?,
            stream: stream.parse().map_err(|_| component("stream"))?,
        })
    }
}

impl TryFrom<String> for StreamKey {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamKey> for String {
    fn from(key: StreamKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let key = StreamKey::new(4711, 2, 7);
        assert_eq!(key.to_string(), "4711-2-7");
        assert_eq!("4711-2-7".parse::<StreamKey>().unwrap(), key);
    }

    #[test]
    fn connection_has_stream_zero() {
        let key = StreamKey::new(1, 2, 7);
        assert!(!key.is_connection());
        assert_eq!(key.connection(), StreamKey::new(1, 2, 0));
        assert!(key.connection().is_connection());
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert_eq!(
            "1-2".parse::<StreamKey>(),
            Err(ParseKeyError::Shape("1-2".into()))
        );
        assert!(matches!(
            "1-2-3-4".parse::<StreamKey>(),
            Err(ParseKeyError::Shape(_))
        ));
        assert!(matches!(
            "1-x-3".parse::<StreamKey>(),
            Err(ParseKeyError::Component {
                component: "session",
                ..
            })
        ));
    }

    #[test]
    fn keys_order_by_child_then_session_then_stream() {
        let mut keys = vec![
            StreamKey::new(2, 1, 1),
            StreamKey::new(1, 3, 0),
            StreamKey::new(1, 2, 5),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                StreamKey::new(1, 2, 5),
                StreamKey::new(1, 3, 0),
                StreamKey::new(2, 1, 1),
            ]
        );
    }

    #[test]
    fn serde_roundtrip_uses_flat_string() {
        let key = StreamKey::new(1, 2, 3);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"1-2-3\"");
        let parsed: StreamKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
        assert!(serde_json::from_str::<StreamKey>("\"1-2\"").is_err());
    }
}
