//! Append-only event log for the current trace
//!
//! The log is the source of truth for replay. Events are kept in the order
//! the controller finished processing them, which for geo-pending hops is
//! lookup-completion order rather than hop order.

use super::event::{Hop, TraceEvent};
use crate::error::{Result, TraceError};

#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<TraceEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Nothing may follow `end`.
    pub fn append(&mut self, event: TraceEvent) -> Result<()> {
        if self.is_finished() {
            return Err(TraceError::LogClosed(event.kind()));
        }
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True once `end` has been appended
    pub fn is_finished(&self) -> bool {
        self.events.last().is_some_and(TraceEvent::is_end)
    }

    pub fn hops(&self) -> impl Iterator<Item = &Hop> {
        self.events.iter().filter_map(TraceEvent::as_hop)
    }

    pub fn has_hops(&self) -> bool {
        self.hops().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoInfo;

    fn start() -> TraceEvent {
        TraceEvent::Start {
            is_race: false,
            target: None,
            challenge: None,
        }
    }

    #[test]
    fn keeps_append_order() {
        let mut log = EventLog::new();
        log.append(start()).unwrap();
        log.append(TraceEvent::Hop(Hop::new(3, Some("10.0.0.3"), None))).unwrap();
        log.append(TraceEvent::Hop(Hop::new(2, Some("10.0.0.2"), Some(GeoInfo::at(1.0, 1.0))))).unwrap();

        let indices: Vec<u32> = log.hops().map(|h| h.index).collect();
        assert_eq!(indices, vec![3, 2]);
        assert_eq!(log.len(), 3);
        assert!(log.has_hops());
    }

    #[test]
    fn end_is_terminal() {
        let mut log = EventLog::new();
        log.append(start()).unwrap();
        log.append(TraceEvent::End).unwrap();
        assert!(log.is_finished());

        let err = log.append(TraceEvent::End).unwrap_err();
        assert!(matches!(err, TraceError::LogClosed("end")));
        let err = log.append(TraceEvent::Hop(Hop::new(1, None, None))).unwrap_err();
        assert!(matches!(err, TraceError::LogClosed("hop")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn empty_log_has_no_hops() {
        let mut log = EventLog::new();
        assert!(log.is_empty());
        assert!(!log.has_hops());
        assert!(!log.is_finished());
        log.append(start()).unwrap();
        assert!(!log.has_hops());
    }
}
