//! Trace events as streamed by the trace server and stored in the event log

use crate::geo::{Coordinate, GeoInfo};
use serde::{Deserialize, Serialize};

/// Race target announced with a race `start`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub city_name: String,
    pub radius_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
}

/// One hop result.
///
/// `address == None` is a timed-out hop. `geo == None` with an address means
/// the location is unknown (or still being looked up while live).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    #[serde(rename = "hop")]
    pub index: u32,
    #[serde(rename = "ip", default)]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    /// Display position, assigned once during the live run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_jittered: Option<Coordinate>,
}

impl Hop {
    pub fn new(index: u32, address: Option<&str>, geo: Option<GeoInfo>) -> Self {
        Self {
            index,
            address: address.map(str::to_string),
            geo,
            geo_jittered: None,
        }
    }

    /// Coordinate the hop is drawn at: the stored jittered position, or the
    /// true position for hops stored without one. Never re-randomized.
    pub fn display_coordinate(&self) -> Option<Coordinate> {
        self.geo_jittered.or_else(|| self.geo.as_ref().map(GeoInfo::coordinate))
    }

    pub fn is_timed_out(&self) -> bool {
        self.address.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Start {
        #[serde(default)]
        is_race: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        challenge: Option<Challenge>,
    },
    Hop(Hop),
    RaceSuccess {
        rank: u32,
        points: u32,
        distance_km: f64,
        final_location: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
    },
    RaceFailed {
        distance_km: f64,
        final_location: String,
        required_radius_km: f64,
    },
    DistanceFeedback {
        distance_km: f64,
        final_location: String,
    },
    End,
}

impl TraceEvent {
    /// Tag name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            TraceEvent::Start { .. } => "start",
            TraceEvent::Hop(_) => "hop",
            TraceEvent::RaceSuccess { .. } => "race_success",
            TraceEvent::RaceFailed { .. } => "race_failed",
            TraceEvent::DistanceFeedback { .. } => "distance_feedback",
            TraceEvent::End => "end",
        }
    }

    pub fn as_hop(&self) -> Option<&Hop> {
        match self {
            TraceEvent::Hop(hop) => Some(hop),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, TraceEvent::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TraceEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_start_with_challenge() {
        let event = parse(
            r#"{"type": "start", "target": "8.8.8.8", "ts": 1700000000.5, "is_race": true,
                "challenge": {"id": "abc", "city_name": "Paris", "city_lat": 48.85,
                "city_lon": 2.35, "radius_km": 50.0, "target_host": "example.fr"}}"#,
        );
        let TraceEvent::Start { is_race, target, challenge } = event else {
            panic!("expected start");
        };
        assert!(is_race);
        assert_eq!(target.as_deref(), Some("8.8.8.8"));
        let challenge = challenge.unwrap();
        assert_eq!(challenge.city_name, "Paris");
        assert_eq!(challenge.radius_km, 50.0);
    }

    #[test]
    fn start_defaults_to_plain_trace() {
        let event = parse(r#"{"type": "start"}"#);
        assert_eq!(
            event,
            TraceEvent::Start {
                is_race: false,
                target: None,
                challenge: None
            }
        );
    }

    #[test]
    fn parses_hop_variants() {
        let located = parse(
            r#"{"type": "hop", "hop": 4, "ip": "72.14.204.1",
                "geo": {"lat": 37.4, "lon": -122.0, "city": "Mountain View", "country": "US"}}"#,
        );
        let hop = located.as_hop().unwrap();
        assert_eq!(hop.index, 4);
        assert_eq!(hop.address.as_deref(), Some("72.14.204.1"));
        assert_eq!(hop.geo.as_ref().unwrap().lat, 37.4);
        assert!(hop.geo_jittered.is_none());

        let timed_out = parse(r#"{"type": "hop", "hop": 5, "ip": null}"#);
        assert!(timed_out.as_hop().unwrap().is_timed_out());

        let bare = parse(r#"{"type": "hop", "hop": 6}"#);
        assert!(bare.as_hop().unwrap().is_timed_out());

        let pending = parse(r#"{"type": "hop", "hop": 7, "ip": "10.1.1.1"}"#);
        assert!(pending.as_hop().unwrap().geo.is_none());
    }

    #[test]
    fn parses_race_outcomes_and_end() {
        let success = parse(
            r#"{"type": "race_success", "rank": 2, "points": 80, "distance_km": 12.34,
                "duration_seconds": 4.2, "final_location": "Paris, France"}"#,
        );
        assert_eq!(success.kind(), "race_success");

        let failed = parse(
            r#"{"type": "race_failed", "distance_km": 900.1, "required_radius_km": 50.0,
                "final_location": "Berlin, Germany"}"#,
        );
        assert!(matches!(failed, TraceEvent::RaceFailed { required_radius_km, .. } if required_radius_km == 50.0));

        let feedback = parse(
            r#"{"type": "distance_feedback", "distance_km": 1.5, "final_location": "Lyon, France"}"#,
        );
        assert_eq!(feedback.kind(), "distance_feedback");

        let end = parse(r#"{"type": "end", "target": "8.8.8.8", "ts": 1700000001.0}"#);
        assert!(end.is_end());
    }

    #[test]
    fn stored_jitter_survives_serialization() {
        let mut hop = Hop::new(1, Some("10.0.0.1"), Some(GeoInfo::at(10.0, 10.0)));
        hop.geo_jittered = Some(Coordinate::new(10.03, 9.98));

        let json = serde_json::to_string(&TraceEvent::Hop(hop.clone())).unwrap();
        assert!(json.contains(r#""type":"hop""#));
        assert!(json.contains(r#""geo_jittered""#));
        assert_eq!(parse(&json), TraceEvent::Hop(hop));
    }

    #[test]
    fn display_coordinate_prefers_stored_jitter() {
        let mut hop = Hop::new(1, Some("1.1.1.1"), Some(GeoInfo::at(5.0, 6.0)));
        assert_eq!(hop.display_coordinate(), Some(Coordinate::new(5.0, 6.0)));
        hop.geo_jittered = Some(Coordinate::new(5.05, 5.95));
        assert_eq!(hop.display_coordinate(), Some(Coordinate::new(5.05, 5.95)));
        assert_eq!(Hop::new(2, None, None).display_coordinate(), None);
    }
}
