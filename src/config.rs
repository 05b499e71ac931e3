use crate::error::{Result, TraceError};
use crate::jitter::{DEFAULT_SPREAD_DEG, MAX_SPREAD_DEG};
use crate::trace::replay::DEFAULT_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Default trace server address
pub const DEFAULT_SERVER: &str = "http://localhost:5000";

/// Knobs for the trace controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub replay_interval: Duration,
    pub jitter_spread: f64,
    pub seed: Option<u64>,
    /// Connect the first hop to the viewer's own marker
    pub anchor_origin: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            replay_interval: DEFAULT_INTERVAL,
            jitter_spread: DEFAULT_SPREAD_DEG,
            seed: None,
            anchor_origin: false,
        }
    }
}

/// Where hop locations come from
#[derive(Clone, Debug, PartialEq)]
pub enum GeoBackend {
    /// The trace server's `/geo/<ip>` endpoint (or another compatible one)
    Endpoint(String),
    /// Local GeoLite2 database
    MaxMind(Option<PathBuf>),
}

/// Everything a `trace` run needs, after merging settings and CLI flags
#[derive(Clone, Debug)]
pub struct TraceConfig {
    pub target: String,
    pub server: String,
    pub geo: GeoBackend,
    pub locate_self: bool,
    /// How many times to replay the finished trace
    pub replays: u32,
    /// Poll/frame period of the main loop
    pub time_step: Duration,
    pub controller: ControllerConfig,
}

/// Check a jitter bound taken from flags or the settings file
pub fn validate_spread(spread_deg: f64) -> Result<f64> {
    if !spread_deg.is_finite() || !(0.0..=MAX_SPREAD_DEG).contains(&spread_deg) {
        return Err(TraceError::Config(format!(
            "jitter spread must be between 0 and {MAX_SPREAD_DEG} degrees, got {spread_deg}"
        )));
    }
    Ok(spread_deg)
}

/// Main-loop poll period from a seconds value; never shorter than 1 ms
pub fn poll_period(seconds: f32) -> Result<Duration> {
    let invalid = || TraceError::Config(format!("invalid poll period: {seconds} s"));
    if !seconds.is_finite() {
        return Err(invalid());
    }
    Duration::try_from_secs_f32(seconds.max(0.001)).map_err(|_| invalid())
}
