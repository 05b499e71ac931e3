//! Visual offset for geolocated hops
//!
//! Nearby hops (often several routers in one datacenter) would otherwise
//! stack on the same map cell. Each placed hop gets a small random offset,
//! drawn once while the trace is live and stored on the hop.

use crate::geo::Coordinate;
use rand::prelude::*;
use tracing::warn;

/// Default offset bound per axis, in degrees
pub const DEFAULT_SPREAD_DEG: f64 = 0.1;

/// Largest accepted offset bound; anything wider is no longer a nudge
pub const MAX_SPREAD_DEG: f64 = 180.0;

pub struct Jitter {
    rng: StdRng,
    spread: f64,
}

impl Jitter {
    /// `seed` makes the offset sequence reproducible
    pub fn new(spread_deg: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let spread = if spread_deg.is_finite() {
            spread_deg.abs().min(MAX_SPREAD_DEG)
        } else {
            warn!(spread_deg, "non-finite jitter spread; using default");
            DEFAULT_SPREAD_DEG
        };

        Self { rng, spread }
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Offset `coord` by up to `spread` degrees on each axis
    pub fn apply(&mut self, coord: Coordinate) -> Coordinate {
        if self.spread == 0.0 {
            return coord;
        }

        let d_lat = self.rng.gen_range(-self.spread..=self.spread);
        let d_lon = self.rng.gen_range(-self.spread..=self.spread);

        Coordinate {
            lat: (coord.lat + d_lat).clamp(-90.0, 90.0),
            lon: wrap_longitude(coord.lon + d_lon),
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new(DEFAULT_SPREAD_DEG, None)
    }
}

/// Wrap a longitude into [-180, 180]
fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}
