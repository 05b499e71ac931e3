//! Test doubles for the trace core

use super::controller::TraceController;
use super::event::TraceEvent;
use super::transport::{EventStream, SseEvents, TraceSource};
use crate::error::{Result, TraceError};
use crate::geo::{GeoResolver, Resolution};
use crate::render::{RenderInstruction, RenderSink};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Remembers every instruction it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub instructions: Vec<RenderInstruction>,
}

impl RecordingSink {
    pub fn map_instructions(&self) -> Vec<RenderInstruction> {
        self.instructions.iter().filter(|i| i.is_map()).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }
}

impl RenderSink for RecordingSink {
    fn render(&mut self, instruction: &RenderInstruction) {
        self.instructions.push(instruction.clone());
    }
}

/// Transport fed from test code. Each `open` hands out the next queued
/// stream; a stream ends when its sender is dropped.
#[derive(Default)]
pub struct ChannelSource {
    streams: Mutex<VecDeque<Receiver<TraceEvent>>>,
}

impl ChannelSource {
    /// Queue a stream for the next `open` and return its feeding end
    pub fn stream(&self) -> Sender<TraceEvent> {
        let (tx, rx) = mpsc::channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    /// Queue a stream that delivers `events` and then closes
    pub fn scripted(&self, events: Vec<TraceEvent>) {
        let tx = self.stream();
        for event in events {
            tx.send(event).unwrap();
        }
    }
}

impl TraceSource for ChannelSource {
    fn open(&self, _target: &str) -> Result<EventStream> {
        let rx = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TraceError::Transport("connection refused".into()))?;
        Ok(Box::new(rx.into_iter().map(Ok)))
    }
}

/// Transport that replays raw SSE bodies, one per `open`
#[derive(Default)]
pub struct BodySource {
    bodies: Mutex<VecDeque<Vec<u8>>>,
}

impl BodySource {
    pub fn push(&self, body: Vec<u8>) {
        self.bodies.lock().unwrap().push_back(body);
    }
}

impl TraceSource for BodySource {
    fn open(&self, _target: &str) -> Result<EventStream> {
        let body = self
            .bodies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TraceError::Transport("connection refused".into()))?;
        Ok(Box::new(SseEvents::new(Cursor::new(body))))
    }
}

/// Resolver whose answers are released by the test, per address.
/// Addresses without a gate resolve to `Unavailable` immediately.
#[derive(Default)]
pub struct GatedResolver {
    gates: Mutex<HashMap<String, Receiver<Resolution>>>,
}

impl GatedResolver {
    pub fn gate(&self, address: &str) -> Sender<Resolution> {
        let (tx, rx) = mpsc::channel();
        self.gates.lock().unwrap().insert(address.to_string(), rx);
        tx
    }
}

impl GeoResolver for GatedResolver {
    fn resolve(&self, address: &str) -> Resolution {
        let gate = self.gates.lock().unwrap().remove(address);
        match gate {
            Some(rx) => rx.recv().unwrap_or(Resolution::Unavailable),
            None => Resolution::Unavailable,
        }
    }
}

/// Poll the controller until `done` holds; panics after a few seconds
pub fn pump_until<S, F>(controller: &mut TraceController<S>, mut done: F)
where
    S: RenderSink,
    F: FnMut(&TraceController<S>) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        controller.poll(Instant::now());
        if done(controller) {
            return;
        }
        assert!(Instant::now() < deadline, "controller did not reach expected state");
        thread::sleep(Duration::from_millis(2));
    }
}
