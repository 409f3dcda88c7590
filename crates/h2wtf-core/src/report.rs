//! Lifetime report of displayed streams.
//!
//! One row per stream passing the registry filter. Every column event is shown
//! as an offset from the stream's creation together with the number of busy
//! workers at that moment.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use crate::event_type::EventName;
use crate::registry::StreamRegistry;
use crate::stream::StreamEvents;
use crate::timeline::ConcurrencyTimeline;
use crate::types::StreamKey;

static ERROR_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"error=(\d+)").unwrap());

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"response (\d{3})\b").unwrap());

/// One column of a report row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCell {
    /// The event happened `offset` after creation, with `in_use` busy workers.
    Offset { offset: Duration, in_use: i64 },
    /// No record of the event.
    Missing,
    /// The event never happens on this kind of entity.
    NotApplicable,
}

/// Derived values of one stream or connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifetimeRow {
    pub key: StreamKey,
    pub is_connection: bool,
    /// Elapsed time of the creating record.
    pub created_at: Duration,
    pub in_use_at_created: i64,
    /// Cells aligned with [`LifetimeReport::columns`].
    pub cells: Vec<EventCell>,
    /// Code of the first `error` event.
    pub error_code: Option<u32>,
    /// HTTP status of the first `response` event.
    pub status: Option<u16>,
    /// Time from creation to the parent connection's cleanup.
    pub connection_cleanup: Option<Duration>,
}

/// Table of lifetimes, ordered by creation.
#[derive(Debug, Clone, Default)]
pub struct LifetimeReport {
    columns: Vec<EventName>,
    rows: Vec<LifetimeRow>,
    peak_in_use: i64,
}

impl LifetimeReport {
    /// Columns shown when none are configured.
    pub fn default_columns() -> Vec<EventName> {
        vec![
            EventName::SCHEDULED,
            EventName::STARTED,
            EventName::RESPONSE,
            EventName::ENDED,
            EventName::RESET,
            EventName::ERROR,
            EventName::CLEANUP,
            EventName::DESTROYED,
        ]
    }

    /// Derives the report from a finished registry.
    ///
    /// Occupancy always counts every stream, not only displayed ones.
    pub fn build(registry: &StreamRegistry, columns: &[EventName]) -> Self {
        let timeline = ConcurrencyTimeline::from_registry(registry);
        let rows = registry
            .get_streams()
            .into_iter()
            .map(|stream| row_for(registry, &timeline, stream, columns))
            .collect();
        Self {
            columns: columns.to_vec(),
            rows,
            peak_in_use: timeline.peak(),
        }
    }

    pub fn columns(&self) -> &[EventName] {
        &self.columns
    }

    pub fn rows(&self) -> &[LifetimeRow] {
        &self.rows
    }

    /// Highest worker occupancy over the whole log.
    pub const fn peak_in_use(&self) -> i64 {
        self.peak_in_use
    }

    /// Whether no stream passed the filter, the "no data" outcome.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn row_for(
    registry: &StreamRegistry,
    timeline: &ConcurrencyTimeline,
    stream: &StreamEvents,
    columns: &[EventName],
) -> LifetimeRow {
    let created_at = stream.created().elapsed;
    let is_connection = stream.is_connection();

    let cells = columns
        .iter()
        .map(|name| {
            if is_connection && !name.applies_to_connection() {
                return EventCell::NotApplicable;
            }
            stream.event(name).map_or(EventCell::Missing, |record| EventCell::Offset {
                offset: record.elapsed - created_at,
                in_use: timeline.in_use_at(record.elapsed),
            })
        })
        .collect();

    let connection_cleanup = registry
        .connection_of(stream)
        .and_then(|conn| conn.event(&EventName::CLEANUP))
        .map(|record| record.elapsed - created_at);

    LifetimeRow {
        key: stream.key(),
        is_connection,
        created_at,
        in_use_at_created: timeline.in_use_at(created_at),
        cells,
        error_code: first_capture(stream, &EventName::ERROR, &ERROR_CODE_RE),
        status: first_capture(stream, &EventName::RESPONSE, &STATUS_RE),
        connection_cleanup,
    }
}

fn first_capture<T: std::str::FromStr>(
    stream: &StreamEvents,
    name: &EventName,
    re: &Regex,
) -> Option<T> {
    let record = stream.event(name)?;
    re.captures(&record.message)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StreamFilter;
    use crate::rules::RuleSet;
    use crate::rules::tests::record;

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    fn cell(report: &LifetimeReport, row: &LifetimeRow, name: &EventName) -> EventCell {
        let i = report.columns().iter().position(|c| c == name).unwrap();
        row.cells[i]
    }

    fn scenario_a() -> StreamRegistry {
        let mut registry = StreamRegistry::new(RuleSet::httpd());
        for r in [
            record(0, 1, "AH03082: h2_stream(2-7,IDLE): created"),
            record(50, 1, "h2_task(2-7): process connection"),
            record(200, 1, "h2_mplx(2-7): request done, 149.2 ms elapsed"),
            record(210, 1, "h2_stream(2-7,CLEANUP): cleanup"),
        ] {
            registry.observe(&r);
        }
        registry
    }

    #[test]
    fn single_stream_lifetime() {
        let registry = scenario_a();
        let report = LifetimeReport::build(&registry, &LifetimeReport::default_columns());

        assert_eq!(report.rows().len(), 1);
        let row = &report.rows()[0];
        assert_eq!(row.key, StreamKey::new(1, 2, 7));
        assert_eq!(row.created_at, ms(0));
        assert_eq!(row.in_use_at_created, 0);

        assert_eq!(
            cell(&report, row, &EventName::STARTED),
            EventCell::Offset { offset: ms(50), in_use: 1 }
        );
        assert_eq!(
            cell(&report, row, &EventName::ENDED),
            EventCell::Offset { offset: ms(200), in_use: 0 }
        );
        assert_eq!(
            cell(&report, row, &EventName::CLEANUP),
            EventCell::Offset { offset: ms(210), in_use: 0 }
        );
        assert_eq!(cell(&report, row, &EventName::SCHEDULED), EventCell::Missing);
        assert_eq!(row.error_code, None);
        assert_eq!(row.status, None);
        assert_eq!(row.connection_cleanup, None);
        assert_eq!(report.peak_in_use(), 1);
    }

    #[test]
    fn offsets_are_relative_to_creation() {
        let mut registry = StreamRegistry::new(RuleSet::httpd());
        registry.observe(&record(1000, 1, "AH03082: h2_stream(2-9,IDLE): created"));
        registry.observe(&record(1300, 1, "h2_mplx(2-9): request done, 0.3 ms elapsed"));

        let report = LifetimeReport::build(&registry, &[EventName::ENDED]);
        let row = &report.rows()[0];
        assert_eq!(row.created_at, ms(1000));
        assert_eq!(
            row.cells,
            vec![EventCell::Offset { offset: ms(300), in_use: 0 }]
        );
    }

    #[test]
    fn error_code_status_and_connection_cleanup() {
        let mut registry = StreamRegistry::new(RuleSet::httpd());
        for r in [
            record(0, 1, "AH03200: h2_session(2,INIT,0): created"),
            record(10, 1, "AH03082: h2_stream(2-1,IDLE): created"),
            record(20, 1, "AH03073: h2_stream(2-1,HALF_CLOSED_REMOTE): submit response 503"),
            record(30, 1, "AH03079: h2_stream(2-1,CLOSED): reset, error=8"),
            record(31, 1, "AH03079: h2_stream(2-1,CLOSED): reset, error=2"),
            record(500, 1, "h2_session(2,DONE,0): pool_cleanup"),
        ] {
            registry.observe(&r);
        }

        let report = LifetimeReport::build(&registry, &LifetimeReport::default_columns());
        assert_eq!(report.rows().len(), 2);

        let conn = &report.rows()[0];
        assert!(conn.is_connection);
        assert_eq!(cell(&report, conn, &EventName::STARTED), EventCell::NotApplicable);
        assert_eq!(cell(&report, conn, &EventName::RESET), EventCell::Missing);
        assert_eq!(
            cell(&report, conn, &EventName::CLEANUP),
            EventCell::Offset { offset: ms(500), in_use: 0 }
        );
        assert_eq!(conn.connection_cleanup, None);

        let stream = &report.rows()[1];
        assert_eq!(stream.key, StreamKey::new(1, 2, 1));
        assert_eq!(stream.status, Some(503));
        assert_eq!(stream.error_code, Some(8));
        assert_eq!(stream.connection_cleanup, Some(ms(490)));
    }

    #[test]
    fn occupancy_counts_streams_outside_the_filter() {
        let mut registry = StreamRegistry::new(RuleSet::httpd())
            .with_filter(StreamFilter::parse(&["2-3"]).unwrap());
        for r in [
            record(0, 1, "AH03082: h2_stream(2-1,IDLE): created"),
            record(5, 1, "h2_task(2-1): process connection"),
            record(10, 1, "AH03082: h2_stream(2-3,IDLE): created"),
            record(20, 1, "h2_task(2-3): process connection"),
        ] {
            registry.observe(&r);
        }

        let report = LifetimeReport::build(&registry, &[EventName::STARTED]);
        assert_eq!(report.rows().len(), 1);
        let row = &report.rows()[0];
        assert_eq!(row.key, StreamKey::new(1, 2, 3));
        assert_eq!(row.in_use_at_created, 1);
        assert_eq!(row.cells, vec![EventCell::Offset { offset: ms(10), in_use: 2 }]);
    }

    #[test]
    fn nothing_matching_is_no_data() {
        let registry = scenario_a().with_filter(StreamFilter::parse(&["9-9-9"]).unwrap());
        let report = LifetimeReport::build(&registry, &LifetimeReport::default_columns());
        assert!(report.is_empty());
        assert_eq!(report.columns().len(), 8);

        let empty = LifetimeReport::build(&StreamRegistry::default(), &[]);
        assert!(empty.is_empty());
        assert_eq!(empty.peak_in_use(), 0);
    }
}
