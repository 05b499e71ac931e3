//! Live trace controller
//!
//! Owns the current [`TraceSession`] and drives it from three inputs: the
//! trace transport, background geo lookups and the replay clock. Transport
//! reading and geo lookups run on worker threads that only do I/O; their
//! results come back over a channel tagged with the session number and are
//! applied on the caller's thread inside [`TraceController::poll`]. Results
//! tagged with an older session are dropped, so a superseded trace can never
//! touch the current log or view.

use super::event::{Hop, TraceEvent};
use super::log::EventLog;
use super::replay::{Replay, ReplayProgress};
use super::transport::TraceSource;
use crate::config::ControllerConfig;
use crate::error::{Result, TraceError};
use crate::geo::{Coordinate, GeoInfo, GeoResolver, Resolution};
use crate::jitter::Jitter;
use crate::render::{render_event, RenderInstruction, RenderSink, RenderState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of [`TraceController::replay_current_trace`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayRequest {
    Started,
    /// A replay is already running; it continues unaffected
    AlreadyRunning,
    /// The log holds no hops
    NothingToReplay,
    /// The live trace is still streaming or waiting on lookups
    TraceInProgress,
}

enum TransportMessage {
    Event(TraceEvent),
    Failed(String),
    /// Stream ended without `end`
    Closed,
}

enum Inbound {
    Transport {
        session: u64,
        message: TransportMessage,
    },
    Lookup {
        session: u64,
        index: u32,
        address: String,
        resolution: Resolution,
    },
}

/// Open transport. Dropping it tells the reader thread to stop.
struct TransportHandle {
    cancel: Arc<AtomicBool>,
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// All mutable state of one trace, live or replayed
pub struct TraceSession {
    id: u64,
    target: Option<String>,
    log: EventLog,
    render: RenderState,
    transport: Option<TransportHandle>,
    pending_lookups: usize,
    end_deferred: bool,
    replay: Option<Replay>,
}

impl TraceSession {
    fn new(id: u64, target: Option<String>) -> Self {
        Self {
            id,
            target,
            log: EventLog::new(),
            render: RenderState::default(),
            transport: None,
            pending_lookups: 0,
            end_deferred: false,
            replay: None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

pub struct TraceController<S: RenderSink> {
    config: ControllerConfig,
    source: Arc<dyn TraceSource>,
    resolver: Arc<dyn GeoResolver>,
    jitter: Jitter,
    sink: S,
    origin: Option<Coordinate>,
    session: TraceSession,
    tx: Sender<Inbound>,
    rx: Receiver<Inbound>,
}

impl<S: RenderSink> TraceController<S> {
    pub fn new(
        config: ControllerConfig,
        source: Arc<dyn TraceSource>,
        resolver: Arc<dyn GeoResolver>,
        sink: S,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let jitter = Jitter::new(config.jitter_spread, config.seed);

        Self {
            config,
            source,
            resolver,
            jitter,
            sink,
            origin: None,
            session: TraceSession::new(0, None),
            tx,
            rx,
        }
    }

    /// Viewer location, drawn as the "self" marker at the start of every pass
    pub fn with_origin(mut self, origin: Option<Coordinate>) -> Self {
        self.origin = origin;
        self
    }

    // ------------------------------------------------------------------
    // Exposed operations
    // ------------------------------------------------------------------

    /// Discard the current session and start streaming a trace to `target`
    pub fn start_live_trace(&mut self, target: &str) -> Result<()> {
        let target = target.trim();
        if target.is_empty() {
            warn!("refusing to trace an empty target");
            return Err(TraceError::EmptyTarget);
        }

        self.begin_session(Some(target.to_string()));
        self.sink
            .render(&RenderInstruction::SetStatus(format!("Tracing {target}...")));

        let cancel = Arc::new(AtomicBool::new(false));
        spawn_transport(
            Arc::clone(&self.source),
            target.to_string(),
            self.session.id,
            self.tx.clone(),
            Arc::clone(&cancel),
        );
        self.session.transport = Some(TransportHandle { cancel });

        info!(session = self.session.id, host = target, "live trace started");
        Ok(())
    }

    /// Replay the current log. `None` uses the configured interval.
    pub fn replay_current_trace(&mut self, interval: Option<Duration>) -> ReplayRequest {
        if self.session.replay.is_some() {
            debug!("replay already running");
            return ReplayRequest::AlreadyRunning;
        }
        if self.session.transport.is_some() || self.session.pending_lookups > 0 {
            return ReplayRequest::TraceInProgress;
        }
        if !self.session.log.has_hops() {
            return ReplayRequest::NothingToReplay;
        }

        let interval = interval.unwrap_or(self.config.replay_interval);
        let replay = Replay::new(self.session.log.events().to_vec(), interval);

        self.reset_view();
        self.sink.render(&RenderInstruction::SetStatus(format!(
            "Replaying {} events every {} ms",
            replay.len(),
            interval.as_millis()
        )));
        self.session.replay = Some(replay);

        info!(session = self.session.id, ?interval, "replay started");
        ReplayRequest::Started
    }

    /// True once the log holds a hop and the live trace is over
    pub fn replay_available(&self) -> bool {
        self.session.log.has_hops()
            && self.session.transport.is_none()
            && self.session.pending_lookups == 0
    }

    /// Tear down the current session and start over with an empty one
    pub fn reset(&mut self) {
        self.begin_session(None);
        self.sink
            .render(&RenderInstruction::SetStatus("Ready".to_string()));
    }

    /// Apply everything that completed since the last call and advance the
    /// replay clock to `now`. Never blocks.
    pub fn poll(&mut self, now: Instant) {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.dispatch(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if let Some(replay) = self.session.replay.as_mut() {
            if replay.advance(now, &mut self.session.render, &mut self.sink) == ReplayProgress::Finished {
                self.session.replay = None;
                self.sink
                    .render(&RenderInstruction::SetStatus("Replay complete".to_string()));
                info!(session = self.session.id, "replay finished");
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn session(&self) -> &TraceSession {
        &self.session
    }

    pub fn session_id(&self) -> u64 {
        self.session.id
    }

    pub fn event_log(&self) -> &EventLog {
        &self.session.log
    }

    pub fn render_state(&self) -> &RenderState {
        &self.session.render
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Transport still open
    pub fn is_live(&self) -> bool {
        self.session.transport.is_some()
    }

    pub fn is_replaying(&self) -> bool {
        self.session.replay.is_some()
    }

    pub fn pending_lookups(&self) -> usize {
        self.session.pending_lookups
    }

    /// Nothing streaming, resolving or replaying
    pub fn is_idle(&self) -> bool {
        !self.is_live() && self.session.pending_lookups == 0 && !self.is_replaying()
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    fn begin_session(&mut self, target: Option<String>) {
        let id = self.session.id + 1;
        let previous = std::mem::replace(&mut self.session, TraceSession::new(id, target));
        if previous.transport.is_some() || previous.pending_lookups > 0 || previous.replay.is_some() {
            debug!(superseded = previous.id, session = id, "superseding active session");
        }
        // closes the old transport
        drop(previous);

        self.reset_view();
    }

    fn reset_view(&mut self) {
        self.session.render.reset(&mut self.sink);
        if let Some(origin) = self.origin {
            self.session
                .render
                .place_self(origin, self.config.anchor_origin, &mut self.sink);
        }
    }

    // ------------------------------------------------------------------
    // Live processing
    // ------------------------------------------------------------------

    fn dispatch(&mut self, message: Inbound) {
        match message {
            Inbound::Transport { session, message } if session == self.session.id => {
                self.on_transport(message)
            }
            Inbound::Lookup {
                session,
                index,
                address,
                resolution,
            } if session == self.session.id => self.on_lookup(index, address, resolution),
            Inbound::Transport { session, .. } | Inbound::Lookup { session, .. } => {
                debug!(stale = session, current = self.session.id, "dropping result of superseded session");
            }
        }
    }

    fn on_transport(&mut self, message: TransportMessage) {
        if self.session.transport.is_none() {
            debug!("transport already closed; ignoring message");
            return;
        }

        match message {
            TransportMessage::Event(event) => self.handle_event(event),
            TransportMessage::Failed(reason) => self.fail_transport(&reason),
            TransportMessage::Closed => self.fail_transport("stream closed before the trace ended"),
        }
    }

    fn handle_event(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::Hop(hop) => self.on_hop(hop),
            TraceEvent::End => self.on_end(),
            other => self.record(other),
        }
    }

    fn on_hop(&mut self, mut hop: Hop) {
        // positions are only ever assigned here
        hop.geo_jittered = None;

        hop.address = hop
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        let Some(address) = hop.address.clone() else {
            hop.geo = None;
            self.record(TraceEvent::Hop(hop));
            return;
        };

        match hop.geo.as_ref().map(GeoInfo::coordinate) {
            Some(true_position) => {
                hop.geo_jittered = Some(self.jitter.apply(true_position));
                self.record(TraceEvent::Hop(hop));
            }
            None => self.spawn_lookup(hop.index, address),
        }
    }

    fn spawn_lookup(&mut self, index: u32, address: String) {
        self.session.pending_lookups += 1;
        debug!(hop = index, %address, "geo lookup requested");

        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        let session = self.session.id;

        thread::spawn(move || {
            let resolution = resolver.resolve(&address);
            let _ = tx.send(Inbound::Lookup {
                session,
                index,
                address,
                resolution,
            });
        });
    }

    fn on_lookup(&mut self, index: u32, address: String, resolution: Resolution) {
        self.session.pending_lookups = self.session.pending_lookups.saturating_sub(1);

        let mut hop = Hop::new(index, Some(&address), None);
        match resolution {
            Resolution::Resolved(geo) => {
                hop.geo_jittered = Some(self.jitter.apply(geo.coordinate()));
                hop.geo = Some(geo);
            }
            Resolution::Unavailable => debug!(hop = index, %address, "location unavailable"),
        }
        self.record(TraceEvent::Hop(hop));

        if self.session.end_deferred && self.session.pending_lookups == 0 {
            self.finish_end();
        }
    }

    fn on_end(&mut self) {
        self.session.transport = None;

        if self.session.pending_lookups > 0 {
            self.session.end_deferred = true;
            self.sink.render(&RenderInstruction::SetStatus(format!(
                "Waiting for {} location lookups...",
                self.session.pending_lookups
            )));
            debug!(pending = self.session.pending_lookups, "end deferred until lookups complete");
            return;
        }

        self.finish_end();
    }

    fn finish_end(&mut self) {
        self.session.end_deferred = false;
        self.record(TraceEvent::End);

        let hops = self.session.log.hops().count();
        self.sink
            .render(&RenderInstruction::SetStatus(format!("Trace complete: {hops} hops")));
        info!(session = self.session.id, hops, "trace complete");
    }

    fn fail_transport(&mut self, reason: &str) {
        warn!(session = self.session.id, reason, "trace transport failed");
        self.session.transport = None;
        self.sink
            .render(&RenderInstruction::Log(format!("Transport error: {reason}")));
        self.sink
            .render(&RenderInstruction::SetStatus("Trace interrupted".to_string()));
    }

    /// Append to the log, then draw what was stored
    fn record(&mut self, event: TraceEvent) {
        if let Err(e) = self.session.log.append(event) {
            warn!(error = %e, "dropping event");
            return;
        }
        if let Some(stored) = self.session.log.events().last() {
            render_event(stored, &mut self.session.render, &mut self.sink);
        }
    }
}

fn spawn_transport(
    source: Arc<dyn TraceSource>,
    target: String,
    session: u64,
    tx: Sender<Inbound>,
    cancel: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let send = |message| tx.send(Inbound::Transport { session, message }).is_ok();

        let events = match source.open(&target) {
            Ok(events) => events,
            Err(e) => {
                send(TransportMessage::Failed(failure_reason(e)));
                return;
            }
        };

        for item in events {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            match item {
                Ok(event) => {
                    let is_end = event.is_end();
                    if !send(TransportMessage::Event(event)) || is_end {
                        return;
                    }
                }
                Err(TraceError::Decode(e)) => warn!(error = %e, "skipping malformed trace event"),
                Err(e) => {
                    send(TransportMessage::Failed(failure_reason(e)));
                    return;
                }
            }
        }

        if !cancel.load(Ordering::Relaxed) {
            send(TransportMessage::Closed);
        }
    });
}

fn failure_reason(error: TraceError) -> String {
    match error {
        TraceError::Transport(reason) => reason,
        other => other.to_string(),
    }
}
