//! Hop geolocation
//!
//! Resolves hop addresses to coordinates either through the trace server's
//! `/geo/<ip>` endpoint or a local MaxMind GeoLite2 database. Every lookup is
//! single-shot and uncached; any failure is reported as `Unavailable`.

use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Mean Earth radius used for great-circle distances
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default timeout for a single geo lookup request
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Coordinates
// ============================================================================

/// A point on the map, in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Geolocation attached to a hop. Never modified once stored on an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl GeoInfo {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            city: None,
            country: None,
            org: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// "City, Country" with "Unknown" standing in for missing parts
    pub fn place_name(&self) -> String {
        format!(
            "{}, {}",
            self.city.as_deref().unwrap_or("Unknown"),
            self.country.as_deref().unwrap_or("Unknown")
        )
    }
}

/// Great-circle distance between two coordinates in kilometers
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

// ============================================================================
// Resolver
// ============================================================================

/// Outcome of a single lookup. `Unavailable` covers network errors, unknown
/// addresses and declined lookups alike.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(GeoInfo),
    Unavailable,
}

impl From<Option<GeoInfo>> for Resolution {
    fn from(geo: Option<GeoInfo>) -> Self {
        geo.map_or(Resolution::Unavailable, Resolution::Resolved)
    }
}

/// Lookup-by-address. Called from worker threads, one request per call.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, address: &str) -> Resolution;
}

/// Body returned by the trace server's geo endpoint
#[derive(Debug, Deserialize)]
struct GeoReply {
    ok: bool,
    #[serde(default)]
    geo: Option<GeoInfo>,
}

/// Resolver backed by the trace server's `GET <endpoint>/<address>`
pub struct HttpGeoResolver {
    endpoint: String,
    timeout: Duration,
}

impl HttpGeoResolver {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout: LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn lookup(&self, address: &str) -> Result<Option<GeoInfo>, String> {
        let url = format!("{}/{}", self.endpoint, urlencoding::encode(address));
        let response = ureq::get(&url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| e.to_string())?;

        let reply: GeoReply = response.into_json().map_err(|e| e.to_string())?;
        Ok(if reply.ok { reply.geo } else { None })
    }
}

impl GeoResolver for HttpGeoResolver {
    fn resolve(&self, address: &str) -> Resolution {
        match self.lookup(address) {
            Ok(geo) => geo.into(),
            Err(e) => {
                // 404 {"ok": false} lands here too
                debug!(address, error = %e, "geo lookup failed");
                Resolution::Unavailable
            }
        }
    }
}

/// Offline resolver over a MaxMind GeoLite2-City database
pub struct MaxMindResolver {
    reader: Option<Reader<Vec<u8>>>,
}

impl MaxMindResolver {
    pub fn new(db_path: Option<&Path>) -> Self {
        let reader = Self::find_database(db_path).and_then(|path| match Reader::open_readfile(&path) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not open GeoIP database");
                None
            }
        });

        Self { reader }
    }

    fn find_database(explicit_path: Option<&Path>) -> Option<PathBuf> {
        // 1. Explicit path from CLI/config
        if let Some(path) = explicit_path {
            if path.exists() {
                return Some(path.to_path_buf());
            }
        }

        // 2. Default locations
        let candidates = [
            dirs::config_dir().map(|p| p.join("tracemap/GeoLite2-City.mmdb")),
            Some(PathBuf::from("/usr/share/GeoIP/GeoLite2-City.mmdb")),
            Some(PathBuf::from("/var/lib/GeoIP/GeoLite2-City.mmdb")),
            Some(PathBuf::from("./GeoLite2-City.mmdb")),
        ];

        candidates.into_iter().flatten().find(|p| p.exists())
    }

    /// Returns true if a database was found and loaded
    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }

    fn lookup(&self, ip: IpAddr) -> Option<GeoInfo> {
        let reader = self.reader.as_ref()?;
        let city: geoip2::City = reader.lookup(ip).ok()?;
        let location = city.location?;

        let english = |names: Option<std::collections::BTreeMap<&str, &str>>| {
            names.and_then(|n| n.get("en").map(|s| s.to_string()))
        };

        Some(GeoInfo {
            lat: location.latitude?,
            lon: location.longitude?,
            city: english(city.city.and_then(|c| c.names)),
            country: english(city.country.and_then(|c| c.names)),
            org: None,
        })
    }
}

impl GeoResolver for MaxMindResolver {
    fn resolve(&self, address: &str) -> Resolution {
        let Ok(ip) = address.parse::<IpAddr>() else {
            return Resolution::Unavailable;
        };

        if let IpAddr::V4(v4) = ip {
            if is_local_or_private(v4) {
                return Resolution::Unavailable;
            }
        }

        self.lookup(ip).into()
    }
}

// ============================================================================
// Self location
// ============================================================================

#[derive(Debug, Deserialize)]
struct IpApiLocation {
    lat: f64,
    lon: f64,
}

/// Fetch the viewer's own location from an IP geolocation service
///
/// Note: ip-api.com's free tier only supports plain HTTP. The location is
/// only used to position the "self" marker.
pub fn locate_self() -> Option<Coordinate> {
    let response = ureq::get("http://ip-api.com/json/?fields=lat,lon")
        .timeout(Duration::from_secs(3))
        .call()
        .map_err(|e| debug!(error = %e, "self location lookup failed"))
        .ok()?;

    let location: IpApiLocation = response.into_json().ok()?;
    Some(Coordinate::new(location.lat, location.lon))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Check if IP is localhost, private range or unspecified
pub fn is_local_or_private(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    // 127.0.0.0/8 (localhost)
    if octets[0] == 127 {
        return true;
    }

    // 10.0.0.0/8 (private)
    if octets[0] == 10 {
        return true;
    }

    // 172.16.0.0/12 (private)
    if octets[0] == 172 && (16..=31).contains(&octets[1]) {
        return true;
    }

    // 192.168.0.0/16 (private)
    if octets[0] == 192 && octets[1] == 168 {
        return true;
    }

    ip.is_unspecified()
}
