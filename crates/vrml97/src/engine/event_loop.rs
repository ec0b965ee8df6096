use std::collections::{HashSet, VecDeque};

use log::warn;

use super::arena::NodeId;
use crate::config::BrowserConfig;
use crate::field::FieldValue;

/// An emitted event waiting to be routed.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    pub timestamp: f64,
    pub source: NodeId,
    /// Canonical interface id of the emitting eventOut.
    pub event_out: String,
    pub value: FieldValue,
    /// Number of route hops between the event that started the cascade and
    /// this one. Events emitted outside a pass have depth 0.
    pub depth: usize,
}

/// Outcome of one processing pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CascadeReport {
    pub timestamp: f64,
    /// Events taken off the queue and routed.
    pub delivered: usize,
    /// Emissions discarded by the cascade bound or the one-event rule,
    /// including the ones still queued when delivery was cut short.
    pub dropped: usize,
    /// The cascade bound or the per-pass limit cut delivery short.
    pub truncated: bool,
}

/// FIFO of pending emissions with cascade-depth bookkeeping.
///
/// Delivery itself happens in [`crate::Scene::process_events`]; the loop only
/// decides which emissions are admitted and in what order they leave.
pub struct EventLoop {
    queue: VecDeque<PendingEvent>,
    /// Depth of the event currently being delivered, `None` between events.
    current_depth: Option<usize>,
    max_cascade_depth: usize,
    max_events_per_pass: usize,
    one_event_per_eventout: bool,
    /// (source, eventOut) pairs that already emitted at `emitted_at`.
    emitted: HashSet<(NodeId, String)>,
    emitted_at: f64,
    report: CascadeReport,
    in_pass: bool,
}

impl EventLoop {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            current_depth: None,
            max_cascade_depth: config.max_cascade_depth,
            max_events_per_pass: config.max_events_per_pass,
            one_event_per_eventout: config.one_event_per_eventout,
            emitted: HashSet::new(),
            emitted_at: f64::NEG_INFINITY,
            report: CascadeReport::default(),
            in_pass: false,
        }
    }

    /// Queue an emission. Returns `false` if it was dropped.
    pub fn enqueue(&mut self, source: NodeId, event_out: &str, value: FieldValue, timestamp: f64) -> bool {
        if self.in_pass && self.report.truncated {
            self.report.dropped += 1;
            return false;
        }
        let depth = self.current_depth.map_or(0, |depth| depth + 1);
        if depth > self.max_cascade_depth {
            warn!(
                "event cascade at t={timestamp} exceeded depth {}; dropping {source}.{event_out} and {} pending",
                self.max_cascade_depth,
                self.queue.len()
            );
            self.report.truncated = true;
            self.report.dropped += 1 + self.queue.len();
            self.queue.clear();
            return false;
        }

        if self.one_event_per_eventout {
            if timestamp != self.emitted_at {
                self.emitted.clear();
                self.emitted_at = timestamp;
            }
            if !self.emitted.insert((source, event_out.to_string())) {
                self.report.dropped += 1;
                return false;
            }
        }

        self.queue.push_back(PendingEvent {
            timestamp,
            source,
            event_out: event_out.to_string(),
            value,
            depth,
        });
        true
    }

    /// Start a pass at `timestamp`. Events queued since the last pass are
    /// delivered at `timestamp`.
    pub fn begin_pass(&mut self, timestamp: f64) {
        for event in &mut self.queue {
            event.timestamp = timestamp;
        }
        self.in_pass = true;
        self.current_depth = None;
        self.report = CascadeReport {
            timestamp,
            ..CascadeReport::default()
        };
    }

    /// Take the next event to deliver. Emissions made until the following
    /// call are one hop deeper than the returned event.
    pub fn next(&mut self) -> Option<PendingEvent> {
        if self.report.delivered >= self.max_events_per_pass && !self.queue.is_empty() {
            warn!(
                "more than {} events at t={}; discarding {} pending",
                self.max_events_per_pass,
                self.report.timestamp,
                self.queue.len()
            );
            self.report.dropped += self.queue.len();
            self.report.truncated = true;
            self.queue.clear();
        }
        let event = self.queue.pop_front();
        match &event {
            Some(event) => {
                self.current_depth = Some(event.depth);
                self.report.delivered += 1;
            }
            None => self.current_depth = None,
        }
        event
    }

    /// Finish the pass and hand back what happened.
    pub fn end_pass(&mut self) -> CascadeReport {
        self.in_pass = false;
        self.current_depth = None;
        std::mem::take(&mut self.report)
    }

    pub fn in_pass(&self) -> bool {
        self.in_pass
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.emitted.clear();
        self.current_depth = None;
        self.in_pass = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> NodeId {
        NodeId { index, generation: 0 }
    }

    fn value() -> FieldValue {
        FieldValue::SfFloat(1.0)
    }

    #[test]
    fn fifo_order_and_depth() {
        let mut events = EventLoop::new(&BrowserConfig::default());
        events.enqueue(id(1), "a", value(), 1.0);
        events.enqueue(id(2), "b", value(), 1.0);

        events.begin_pass(1.0);
        let first = events.next().unwrap();
        assert_eq!((first.source, first.depth), (id(1), 0));
        events.enqueue(id(3), "c", value(), 1.0);

        let second = events.next().unwrap();
        assert_eq!(second.source, id(2));
        let third = events.next().unwrap();
        assert_eq!((third.source, third.depth), (id(3), 1));
        assert!(events.next().is_none());

        let report = events.end_pass();
        assert_eq!(report.delivered, 3);
        assert!(!report.truncated);
    }

    #[test]
    fn emissions_beyond_the_depth_bound_are_dropped() {
        let config = BrowserConfig {
            max_cascade_depth: 2,
            ..BrowserConfig::default()
        };
        let mut events = EventLoop::new(&config);
        events.enqueue(id(1), "out", value(), 0.0);
        events.begin_pass(0.0);
        let mut hops = 0;
        while events.next().is_some() {
            if events.enqueue(id(1), "out", value(), 0.0) {
                hops += 1;
            }
        }
        let report = events.end_pass();
        assert_eq!(hops, 2);
        assert!(report.truncated);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn depth_overrun_ends_the_pass() {
        let config = BrowserConfig {
            max_cascade_depth: 2,
            ..BrowserConfig::default()
        };
        let mut events = EventLoop::new(&config);
        events.enqueue(id(1), "out", value(), 0.0);
        events.enqueue(id(2), "out", value(), 0.0);
        events.begin_pass(0.0);
        let mut delivered = Vec::new();
        while let Some(event) = events.next() {
            delivered.push((event.source, event.depth));
            events.enqueue(event.source, "out", value(), 0.0);
        }
        let report = events.end_pass();
        // id(1) overruns first; id(2)'s depth 2 event is discarded with it.
        assert_eq!(
            delivered,
            vec![(id(1), 0), (id(2), 0), (id(1), 1), (id(2), 1), (id(1), 2)]
        );
        assert!(report.truncated);
        assert_eq!(report.delivered, 5);
        assert_eq!(report.dropped, 2);
        assert!(events.is_empty());

        // The next pass is not affected.
        events.enqueue(id(1), "out", value(), 1.0);
        events.begin_pass(1.0);
        assert!(events.next().is_some());
        assert!(events.enqueue(id(1), "out", value(), 1.0));
        assert!(!events.end_pass().truncated);
    }

    #[test]
    fn events_queued_between_passes_take_the_pass_timestamp() {
        let mut events = EventLoop::new(&BrowserConfig::default());
        events.enqueue(id(1), "out", value(), 0.0);
        events.begin_pass(1.0);
        assert_eq!(events.next().unwrap().timestamp, 1.0);
        events.end_pass();
    }

    #[test]
    fn per_pass_limit_discards_the_rest() {
        let config = BrowserConfig {
            max_events_per_pass: 2,
            ..BrowserConfig::default()
        };
        let mut events = EventLoop::new(&config);
        for n in 0..5 {
            events.enqueue(id(n), "out", value(), 0.0);
        }
        events.begin_pass(0.0);
        let mut delivered = 0;
        while events.next().is_some() {
            delivered += 1;
        }
        let report = events.end_pass();
        assert_eq!(delivered, 2);
        assert_eq!(report.dropped, 3);
        assert!(report.truncated);
        assert!(events.is_empty());
    }

    #[test]
    fn one_event_per_eventout_per_timestamp() {
        let config = BrowserConfig {
            one_event_per_eventout: true,
            ..BrowserConfig::default()
        };
        let mut events = EventLoop::new(&config);
        assert!(events.enqueue(id(1), "out", value(), 1.0));
        assert!(!events.enqueue(id(1), "out", value(), 1.0));
        assert!(events.enqueue(id(1), "other", value(), 1.0));
        assert!(events.enqueue(id(1), "out", value(), 2.0));
        assert_eq!(events.len(), 3);
    }
}
