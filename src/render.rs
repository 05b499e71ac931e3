//! Render instructions and per-pass render state
//!
//! Live processing and replay both go through [`render_event`], so a stored
//! event always produces the same instructions no matter which pass draws it.

use crate::geo::{Coordinate, GeoInfo};
use crate::trace::event::{Challenge, Hop, TraceEvent};
use std::fmt;

/// One-shot announcements that do not touch the map
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    RaceStarted {
        challenge: Option<Challenge>,
    },
    RaceSuccess {
        rank: u32,
        points: u32,
        distance_km: f64,
        final_location: String,
    },
    RaceFailed {
        distance_km: f64,
        required_radius_km: f64,
        final_location: String,
    },
    DistanceFeedback {
        distance_km: f64,
        final_location: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RaceStarted { challenge: Some(c) } => {
                write!(f, "Race started: reach {} within {} km", c.city_name, c.radius_km)
            }
            Notice::RaceStarted { challenge: None } => write!(f, "Race started"),
            Notice::RaceSuccess {
                rank,
                points,
                distance_km,
                final_location,
            } => write!(
                f,
                "Race won! Rank #{rank}, {points} points, {distance_km:.2} km from target ({final_location})"
            ),
            Notice::RaceFailed {
                distance_km,
                required_radius_km,
                final_location,
            } => write!(
                f,
                "Race failed: ended {distance_km:.2} km away in {final_location}, needed {required_radius_km} km"
            ),
            Notice::DistanceFeedback {
                distance_km,
                final_location,
            } => write!(
                f,
                "Trace ended in {final_location}, {distance_km:.2} km from the mystery location"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderInstruction {
    ClearAll,
    PlaceSelf {
        at: Coordinate,
    },
    PlaceHop {
        hop_index: u32,
        address: String,
        geo: GeoInfo,
        at: Coordinate,
    },
    DrawSegment {
        from: Coordinate,
        to: Coordinate,
    },
    HighlightDestination {
        at: Coordinate,
    },
    Notify(Notice),
    Log(String),
    SetStatus(String),
}

impl RenderInstruction {
    /// True for instructions that draw on the map
    pub fn is_map(&self) -> bool {
        matches!(
            self,
            RenderInstruction::PlaceSelf { .. }
                | RenderInstruction::PlaceHop { .. }
                | RenderInstruction::DrawSegment { .. }
                | RenderInstruction::HighlightDestination { .. }
        )
    }
}

/// Receiver of render instructions (map view, console, recorder)
pub trait RenderSink {
    fn render(&mut self, instruction: &RenderInstruction);
}

/// Something currently drawn by the active pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Drawn {
    SelfMarker(Coordinate),
    HopMarker { hop_index: u32, at: Coordinate },
    Segment { from: Coordinate, to: Coordinate },
    Destination(Coordinate),
}

/// Drawing state owned by the active pass, live or replay
#[derive(Debug, Default)]
pub struct RenderState {
    last_placed: Option<Coordinate>,
    last_hop: Option<Coordinate>,
    drawn: Vec<Drawn>,
}

impl RenderState {
    /// Anchor for the next segment
    pub fn last_placed(&self) -> Option<Coordinate> {
        self.last_placed
    }

    /// Position of the most recently placed hop
    pub fn last_hop(&self) -> Option<Coordinate> {
        self.last_hop
    }

    pub fn drawn(&self) -> &[Drawn] {
        &self.drawn
    }

    /// Forget everything and clear the view
    pub fn reset<S: RenderSink + ?Sized>(&mut self, sink: &mut S) {
        self.last_placed = None;
        self.last_hop = None;
        self.drawn.clear();
        sink.render(&RenderInstruction::ClearAll);
    }

    /// Mark the viewer's own location. With `anchor` the first hop gets
    /// connected to it.
    pub fn place_self<S: RenderSink + ?Sized>(&mut self, at: Coordinate, anchor: bool, sink: &mut S) {
        sink.render(&RenderInstruction::PlaceSelf { at });
        self.drawn.push(Drawn::SelfMarker(at));
        if anchor {
            self.last_placed = Some(at);
        }
    }

    fn place_hop<S: RenderSink + ?Sized>(
        &mut self,
        hop_index: u32,
        address: &str,
        geo: &GeoInfo,
        at: Coordinate,
        sink: &mut S,
    ) {
        sink.render(&RenderInstruction::PlaceHop {
            hop_index,
            address: address.to_string(),
            geo: geo.clone(),
            at,
        });
        self.drawn.push(Drawn::HopMarker { hop_index, at });

        if let Some(from) = self.last_placed {
            sink.render(&RenderInstruction::DrawSegment { from, to: at });
            self.drawn.push(Drawn::Segment { from, to: at });
        }

        self.last_placed = Some(at);
        self.last_hop = Some(at);
    }

    fn highlight_destination<S: RenderSink + ?Sized>(&mut self, sink: &mut S) {
        if let Some(at) = self.last_hop {
            sink.render(&RenderInstruction::HighlightDestination { at });
            self.drawn.push(Drawn::Destination(at));
        }
    }
}

/// Translate a stored event into render instructions
pub fn render_event<S: RenderSink + ?Sized>(event: &TraceEvent, state: &mut RenderState, sink: &mut S) {
    match event {
        TraceEvent::Start {
            is_race,
            target,
            challenge,
        } => {
            let line = match target {
                Some(target) => format!("Trace to {target} started"),
                None => "Trace started".to_string(),
            };
            sink.render(&RenderInstruction::Log(line));
            if *is_race {
                sink.render(&RenderInstruction::Notify(Notice::RaceStarted {
                    challenge: challenge.clone(),
                }));
            }
        }
        TraceEvent::Hop(hop) => render_hop(hop, state, sink),
        TraceEvent::RaceSuccess {
            rank,
            points,
            distance_km,
            final_location,
            ..
        } => sink.render(&RenderInstruction::Notify(Notice::RaceSuccess {
            rank: *rank,
            points: *points,
            distance_km: *distance_km,
            final_location: final_location.clone(),
        })),
        TraceEvent::RaceFailed {
            distance_km,
            final_location,
            required_radius_km,
        } => sink.render(&RenderInstruction::Notify(Notice::RaceFailed {
            distance_km: *distance_km,
            required_radius_km: *required_radius_km,
            final_location: final_location.clone(),
        })),
        TraceEvent::DistanceFeedback {
            distance_km,
            final_location,
        } => sink.render(&RenderInstruction::Notify(Notice::DistanceFeedback {
            distance_km: *distance_km,
            final_location: final_location.clone(),
        })),
        TraceEvent::End => state.highlight_destination(sink),
    }
}

fn render_hop<S: RenderSink + ?Sized>(hop: &Hop, state: &mut RenderState, sink: &mut S) {
    match (&hop.address, &hop.geo, hop.display_coordinate()) {
        (Some(address), Some(geo), Some(at)) => state.place_hop(hop.index, address, geo, at, sink),
        (Some(address), _, _) => sink.render(&RenderInstruction::Log(format!(
            "hop {}: {} (location unknown)",
            hop.index, address
        ))),
        (None, _, _) => sink.render(&RenderInstruction::Log(format!(
            "hop {}: * (no response)",
            hop.index
        ))),
    }
}
