//! Replay of a recorded trace at a fixed cadence
//!
//! A replay walks a snapshot of the event log from the start and emits the
//! same instructions the live pass produced. Hops are drawn at their stored
//! positions; nothing is looked up or re-jittered. After each hop the replay
//! waits `interval` before handling the next event.

use super::event::TraceEvent;
use crate::render::{render_event, RenderSink, RenderState};
use std::time::{Duration, Instant};

/// Default delay between replayed hops
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayProgress {
    Running,
    Finished,
}

pub struct Replay {
    events: Vec<TraceEvent>,
    cursor: usize,
    interval: Duration,
    resume_at: Option<Instant>,
}

impl Replay {
    pub fn new(events: Vec<TraceEvent>, interval: Duration) -> Self {
        Self {
            events,
            cursor: 0,
            interval,
            resume_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events emitted so far
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.events.len()
    }

    /// Emit every event that is due at `now`. Events are handled strictly
    /// in log order; a hop whose delay has not elapsed blocks everything
    /// behind it.
    pub fn advance<S: RenderSink + ?Sized>(
        &mut self,
        now: Instant,
        state: &mut RenderState,
        sink: &mut S,
    ) -> ReplayProgress {
        loop {
            if let Some(resume_at) = self.resume_at {
                if now < resume_at {
                    return ReplayProgress::Running;
                }
                self.resume_at = None;
            }

            let Some(event) = self.events.get(self.cursor) else {
                return ReplayProgress::Finished;
            };
            self.cursor += 1;

            render_event(event, state, sink);

            if matches!(event, TraceEvent::Hop(_)) {
                self.resume_at = Some(now + self.interval);
            }
        }
    }
}
