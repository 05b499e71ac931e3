//! Trace transport: a one-way push stream of trace events
//!
//! The trace server streams Server-Sent Events from `/stream?target=<host>`,
//! one JSON-encoded event per `data:` line.

use super::event::TraceEvent;
use crate::error::{Result, TraceError};
use std::io::{BufRead, BufReader, Read};
use std::time::Duration;
use tracing::debug;

/// A single traceroute hop can take tens of seconds; this bounds how long a
/// reader (including one left over from a superseded trace) stays blocked.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Events from an open stream, in arrival order
pub type EventStream = Box<dyn Iterator<Item = Result<TraceEvent>> + Send>;

/// Opens a trace for a target host. Called from the transport reader thread.
pub trait TraceSource: Send + Sync {
    fn open(&self, target: &str) -> Result<EventStream>;
}

/// SSE client for the trace server
pub struct SseSource {
    base_url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl SseSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Longest silence tolerated between two bytes of the stream
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn stream_url(&self, target: &str) -> String {
        format!("{}/stream?target={}", self.base_url, urlencoding::encode(target))
    }
}

impl TraceSource for SseSource {
    fn open(&self, target: &str) -> Result<EventStream> {
        let url = self.stream_url(target);
        debug!(%url, "opening trace stream");

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.connect_timeout)
            .timeout_read(self.read_timeout)
            .build();
        let response = agent
            .get(&url)
            .set("Accept", "text/event-stream")
            .call()
            .map_err(|e| TraceError::Transport(e.to_string()))?;

        Ok(Box::new(SseEvents::new(response.into_reader())))
    }
}

/// Iterator over the `data:` payloads of an SSE body
pub struct SseEvents<R: Read> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> SseEvents<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }
}

impl<R: Read> Iterator for SseEvents<R> {
    type Item = Result<TraceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(TraceError::Transport(e.to_string()))),
            }

            // bad bytes only spoil their own line; JSON decoding decides its fate
            let line = String::from_utf8_lossy(&self.buf);
            if let Some(event) = parse_sse_line(line.trim_end_matches(['\r', '\n'])) {
                return Some(event);
            }
        }
    }
}

/// Decode one SSE line. Non-data lines (blank separators, `event:`, `id:`,
/// `:` comments) yield `None`.
pub fn parse_sse_line(line: &str) -> Option<Result<TraceEvent>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    Some(serde_json::from_str(payload).map_err(TraceError::from))
}
