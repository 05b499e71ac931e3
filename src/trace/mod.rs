//! Trace event stream: live processing, event log and replay

pub mod controller;
pub mod event;
pub mod log;
pub mod replay;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{ReplayRequest, TraceController, TraceSession};
pub use event::{Challenge, Hop, TraceEvent};
pub use log::EventLog;
pub use transport::{SseSource, TraceSource};
