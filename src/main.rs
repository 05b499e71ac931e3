use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracemap::config::{poll_period, validate_spread, ControllerConfig, GeoBackend, TraceConfig, DEFAULT_SERVER};
use tracemap::console::ConsoleSink;
use tracemap::error::Result;
use tracemap::geo::{self, GeoResolver, HttpGeoResolver, MaxMindResolver, Resolution};
use tracemap::jitter::DEFAULT_SPREAD_DEG;
use tracemap::render::RenderSink;
use tracemap::settings::Settings;
use tracemap::trace::replay::DEFAULT_INTERVAL;
use tracemap::trace::{ReplayRequest, SseSource, TraceController};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tracemap")]
#[command(version)]
#[command(about = "Live traceroute visualization with deterministic replay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a traceroute from the trace server and draw it hop by hop
    Trace {
        /// Host or IP to trace
        target: String,

        /// Trace server base URL
        #[arg(short, long)]
        server: Option<String>,

        /// Geo lookup endpoint (default: <server>/geo)
        #[arg(long)]
        geo_endpoint: Option<String>,

        /// Resolve hops offline with a GeoLite2-City database
        #[arg(long)]
        geoip_db: Option<PathBuf>,

        /// Replay the finished trace this many times
        #[arg(short, long, default_value = "0")]
        replay: u32,

        /// Delay between replayed hops in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Random seed for reproducible hop offsets
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum hop offset in degrees
        #[arg(long)]
        spread: Option<f64>,

        /// Connect the first hop to your own location
        #[arg(long)]
        anchor_self: bool,

        /// Skip looking up your own location
        #[arg(long)]
        no_locate: bool,

        /// Poll period in seconds
        #[arg(short, long, default_value = "0.02")]
        time: f32,
    },

    /// Resolve a single address and print its location as JSON
    Geo {
        address: String,

        /// Trace server base URL
        #[arg(short, long)]
        server: Option<String>,

        /// Geo lookup endpoint (default: <server>/geo)
        #[arg(long)]
        geo_endpoint: Option<String>,

        /// Resolve offline with a GeoLite2-City database
        #[arg(long)]
        geoip_db: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command {
        Commands::Trace {
            target,
            server,
            geo_endpoint,
            geoip_db,
            replay,
            interval,
            seed,
            spread,
            anchor_self,
            no_locate,
            time,
        } => {
            let server = server
                .or_else(|| settings.server.url.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string());
            let config = TraceConfig {
                target,
                geo: geo_backend(&settings, &server, geo_endpoint, geoip_db),
                server,
                locate_self: !no_locate && settings.geo.locate_self.unwrap_or(true),
                replays: replay,
                time_step: poll_period(time)?,
                controller: ControllerConfig {
                    replay_interval: interval
                        .or(settings.replay.interval_ms)
                        .map(Duration::from_millis)
                        .unwrap_or(DEFAULT_INTERVAL),
                    jitter_spread: validate_spread(
                        spread
                            .or(settings.jitter.spread_deg)
                            .unwrap_or(DEFAULT_SPREAD_DEG),
                    )?,
                    seed: seed.or(settings.jitter.seed),
                    anchor_origin: anchor_self || settings.render.anchor_origin.unwrap_or(false),
                },
            };
            run_trace(config)?;
        }
        Commands::Geo {
            address,
            server,
            geo_endpoint,
            geoip_db,
        } => {
            let server = server
                .or_else(|| settings.server.url.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string());
            let resolver = build_resolver(&geo_backend(&settings, &server, geo_endpoint, geoip_db));
            match resolver.resolve(address.trim()) {
                Resolution::Resolved(geo) => println!("{}", serde_json::to_string_pretty(&geo)?),
                Resolution::Unavailable => eprintln!("{}: location unavailable", address),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tracemap=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// A local database wins over the HTTP endpoint
fn geo_backend(
    settings: &Settings,
    server: &str,
    endpoint: Option<String>,
    geoip_db: Option<PathBuf>,
) -> GeoBackend {
    if let Some(path) = geoip_db.or_else(|| settings.geo.geoip_db.clone()) {
        return GeoBackend::MaxMind(Some(path));
    }

    let endpoint = endpoint
        .or_else(|| settings.geo.endpoint.clone())
        .unwrap_or_else(|| format!("{}/geo", server.trim_end_matches('/')));
    GeoBackend::Endpoint(endpoint)
}

fn build_resolver(backend: &GeoBackend) -> Arc<dyn GeoResolver> {
    match backend {
        GeoBackend::Endpoint(url) => Arc::new(HttpGeoResolver::new(url)),
        GeoBackend::MaxMind(path) => {
            let resolver = MaxMindResolver::new(path.as_deref());
            if !resolver.is_available() {
                warn!("no GeoIP database found; hops will not be placed on the map");
            }
            Arc::new(resolver)
        }
    }
}

fn run_trace(config: TraceConfig) -> Result<()> {
    let origin = if config.locate_self { geo::locate_self() } else { None };
    info!(target_host = %config.target, server = %config.server, ?origin, "starting trace");

    let source = Arc::new(SseSource::new(&config.server));
    let resolver = build_resolver(&config.geo);
    let mut controller = TraceController::new(config.controller.clone(), source, resolver, ConsoleSink::stdout())
        .with_origin(origin);

    controller.start_live_trace(&config.target)?;
    wait_until_idle(&mut controller, config.time_step);

    for pass in 1..=config.replays {
        match controller.replay_current_trace(None) {
            ReplayRequest::Started => wait_until_idle(&mut controller, config.time_step),
            refused => {
                warn!(pass, ?refused, "replay not started");
                break;
            }
        }
    }

    Ok(())
}

fn wait_until_idle<S: RenderSink>(controller: &mut TraceController<S>, step: Duration) {
    loop {
        controller.poll(Instant::now());
        if controller.is_idle() {
            break;
        }
        thread::sleep(step);
    }
}
