//! Worker concurrency over time.
//!
//! Every stream occupies a worker from its first `started` to its first
//! `ended` event. The timeline is a sorted list of +1/-1 changes; the number
//! of busy workers at `t` is the sum of all changes at or before `t`.

use chrono::Duration;

use crate::event_type::EventName;
use crate::registry::StreamRegistry;
use crate::stream::StreamEvents;

/// A worker being taken (+1) or released (-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerChange {
    /// Elapsed time of the change.
    pub at: Duration,
    pub delta: i32,
}

/// Sorted worker changes of one run.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyTimeline {
    changes: Vec<WorkerChange>,
}

impl ConcurrencyTimeline {
    /// Builds the timeline from streams.
    ///
    /// Connection-level entities are skipped. A stream that never ended keeps
    /// its worker until the end of the log; one that ended without a recorded
    /// start contributes nothing.
    pub fn from_streams<'a, I>(streams: I) -> Self
    where
        I: IntoIterator<Item = &'a StreamEvents>,
    {
        let mut changes = Vec::new();
        for stream in streams.into_iter().filter(|s| !s.is_connection()) {
            let Some(started) = stream.event(&EventName::STARTED) else {
                continue;
            };
            changes.push(WorkerChange {
                at: started.elapsed,
                delta: 1,
            });
            if let Some(ended) = stream.event(&EventName::ENDED) {
                changes.push(WorkerChange {
                    at: ended.elapsed,
                    delta: -1,
                });
            }
        }
        // Stable: simultaneous changes commute anyway
        changes.sort_by_key(|c| c.at);
        Self { changes }
    }

    /// Builds the timeline from every stream of the registry, unfiltered.
    pub fn from_registry(registry: &StreamRegistry) -> Self {
        Self::from_streams(registry.all_streams())
    }

    pub fn changes(&self) -> &[WorkerChange] {
        &self.changes
    }

    /// Number of busy workers at `t`, counting changes at exactly `t`.
    pub fn in_use_at(&self, t: Duration) -> i64 {
        self.changes
            .iter()
            .take_while(|c| c.at <= t)
            .map(|c| i64::from(c.delta))
            .sum()
    }

    /// Highest number of simultaneously busy workers.
    pub fn peak(&self) -> i64 {
        let mut busy = 0i64;
        let mut peak = 0i64;
        for (i, change) in self.changes.iter().enumerate() {
            busy += i64::from(change.delta);
            // Only sample after all changes sharing a timestamp
            let last_at_time = self
                .changes
                .get(i + 1)
                .is_none_or(|next| next.at != change.at);
            if last_at_time {
                peak = peak.max(busy);
            }
        }
        peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;
    use crate::rules::tests::record;
    use crate::types::StreamKey;

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    /// Registry with one stream per `(start, end)` interval, all in child 1.
    fn registry_with(intervals: &[(i64, Option<i64>)]) -> StreamRegistry {
        let mut registry = StreamRegistry::new(RuleSet::httpd());
        for (i, (start, end)) in (1u32..).zip(intervals) {
            let ssid = format!("1-{i}");
            registry.observe(&record(0, 1, &format!("AH03082: h2_stream({ssid},IDLE): created")));
            registry.observe(&record(*start, 1, &format!("h2_task({ssid}): process connection")));
            if let Some(end) = end {
                registry.observe(&record(
                    *end,
                    1,
                    &format!("h2_mplx({ssid}): request done, 0.1 ms elapsed"),
                ));
            }
        }
        registry
    }

    #[test]
    fn single_stream_occupies_worker_between_start_and_end() {
        let timeline = ConcurrencyTimeline::from_registry(&registry_with(&[(50, Some(200))]));

        assert_eq!(timeline.in_use_at(ms(0)), 0);
        assert_eq!(timeline.in_use_at(ms(50)), 1);
        assert_eq!(timeline.in_use_at(ms(199)), 1);
        assert_eq!(timeline.in_use_at(ms(200)), 0);
        assert_eq!(timeline.changes().len(), 2);
    }

    #[test]
    fn in_use_counts_containing_intervals_exactly() {
        let intervals = [
            (10, Some(100)),
            (20, Some(40)),
            (40, Some(60)),
            (40, Some(40)),
            (55, Some(120)),
            (90, Some(100)),
        ];
        let timeline = ConcurrencyTimeline::from_registry(&registry_with(&intervals));

        let mut samples: Vec<i64> = intervals
            .iter()
            .flat_map(|(s, e)| [*s, e.unwrap()])
            .collect();
        samples.extend([0, 15, 30, 45, 70, 95, 110, 130]);
        for t in samples {
            let expected = intervals
                .iter()
                .filter(|(s, e)| *s <= t && t < e.unwrap())
                .count();
            assert_eq!(
                timeline.in_use_at(ms(t)),
                i64::try_from(expected).unwrap(),
                "at {t}ms"
            );
        }
    }

    #[test]
    fn unfinished_streams_stay_busy() {
        let timeline =
            ConcurrencyTimeline::from_registry(&registry_with(&[(10, None), (20, Some(30))]));
        assert_eq!(timeline.in_use_at(ms(25)), 2);
        assert_eq!(timeline.in_use_at(ms(10_000)), 1);
    }

    #[test]
    fn connections_and_unstarted_streams_are_skipped() {
        let mut registry = StreamRegistry::new(RuleSet::httpd());
        registry.observe(&record(0, 1, "AH03200: h2_session(1,INIT,0): created"));
        registry.observe(&record(1, 1, "AH03082: h2_stream(1-3,IDLE): created"));
        registry.observe(&record(5, 1, "h2_mplx(1-3): request done, 0.1 ms elapsed"));

        let timeline = ConcurrencyTimeline::from_registry(&registry);
        assert!(timeline.changes().is_empty());
        assert_eq!(timeline.in_use_at(ms(10)), 0);
        assert!(registry.stream(&StreamKey::new(1, 1, 0)).is_some());
    }

    #[test]
    fn peak_ignores_transient_overlap_at_same_instant() {
        // One stream ends exactly when the next starts
        let timeline =
            ConcurrencyTimeline::from_registry(&registry_with(&[(10, Some(20)), (20, Some(30))]));
        assert_eq!(timeline.peak(), 1);

        let timeline = ConcurrencyTimeline::from_registry(&registry_with(&[
            (10, Some(50)),
            (20, Some(30)),
            (25, None),
        ]));
        assert_eq!(timeline.peak(), 3);
    }
}
