//! Core domain logic for h2wtf.
//!
//! This crate reconstructs HTTP/2 stream lifetimes from httpd log records:
//! - Classification: mapping messages to lifecycle events via ordered rules
//! - Identity resolution: following streams whose connection id drifted
//! - Concurrency: counting busy workers over time
//! - Reporting: per-stream offsets, occupancy and outcomes

pub mod event_type;
pub mod filter;
pub mod registry;
pub mod report;
pub mod rules;
pub mod stream;
pub mod timeline;
pub mod types;

pub use event_type::{EventName, InvalidEventName};
pub use filter::{FilterError, StreamFilter};
pub use registry::{Resolution, StreamRegistry};
pub use report::{EventCell, LifetimeReport, LifetimeRow};
pub use rules::{Classified, EventRule, HTTP2_MODULE, RuleError, RuleSet};
pub use stream::StreamEvents;
pub use timeline::{ConcurrencyTimeline, WorkerChange};
pub use types::{ParseKeyError, StreamKey};
