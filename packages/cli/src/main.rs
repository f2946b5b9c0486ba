#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line front end for the traffic map engine.
//!
//! ```text
//! traffic_map decode <polyline>
//! traffic_map area --lat 34.05 --lng -118.24 [--radius 5 | --zoom 12] [--watch]
//! traffic_map route --from 34.05,-118.24 --to 34.14,-118.15 [--width 1] [--geojson] [--watch]
//! ```
//!
//! Snapshots are printed as JSON on stdout, one per line in `--watch`
//! mode. Settings come from `traffic_map.toml` (or `--config`); API keys
//! come from the environment variables the config names.

mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use traffic_map_geocoder::GeocodeError;
use traffic_map_geography_models::{GeoPoint, InvalidCoordinateError};
use traffic_map_polyline::DecodeError;
use traffic_map_route::RouteError;
use traffic_map_scheduler::config::DEFAULT_CONFIG_FILE;
use traffic_map_scheduler::{ConfigError, SchedulerError, TrafficMapConfig};
use traffic_map_source::SourceError;

/// Errors surfaced to the user.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("incident feed setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("router setup failed: {0}")]
    Route(#[from] RouteError),

    #[error("geocoder setup failed: {0}")]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("invalid polyline: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinateError),

    #[error("failed to write output: {0}")]
    Json(#[from] serde_json::Error),

    /// The one-shot refresh failed.
    #[error("refresh failed: {message}")]
    Refresh { message: String },

    /// The route changed while it was being computed.
    #[error("route request was superseded")]
    Superseded,
}

#[derive(Parser)]
#[command(name = "traffic_map", about = "Traffic incidents around a point or along a route")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a flexible polyline and print its points
    Decode {
        /// Encoded polyline
        polyline: String,
    },
    /// Show incidents around a point
    Area {
        /// Center latitude
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Center longitude
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Query radius in miles (defaults to the configured radius)
        #[arg(long, conflicts_with = "zoom")]
        radius: Option<f64>,
        /// Size the query like a map at this zoom level instead
        #[arg(long)]
        zoom: Option<i32>,
        /// Keep refreshing and print every new snapshot
        #[arg(long)]
        watch: bool,
    },
    /// Show incidents along a driving route
    Route {
        /// Origin as `lat,lng`
        #[arg(long, allow_hyphen_values = true)]
        from: GeoPoint,
        /// Destination as `lat,lng`
        #[arg(long, allow_hyphen_values = true)]
        to: GeoPoint,
        /// Corridor half-width in miles (defaults to the configured width)
        #[arg(long)]
        width: Option<f64>,
        /// Print the colored route and corridor as GeoJSON instead
        #[arg(long, conflicts_with = "watch")]
        geojson: bool,
        /// Keep refreshing and print every new snapshot
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { polyline } => {
            let decoded = traffic_map_polyline::decode_with_header(&polyline)?;
            log::info!(
                "decoded {} points at precision {}",
                decoded.points.len(),
                decoded.header.precision
            );
            let points: Vec<[f64; 2]> = decoded.points.iter().map(|p| [p.lat, p.lng]).collect();
            println!("{}", serde_json::to_string(&points)?);
        }
        Commands::Area {
            lat,
            lng,
            radius,
            zoom,
            watch,
        } => {
            let mut config = TrafficMapConfig::load_or_default(&cli.config)?;
            if let Some(radius) = radius {
                config.scheduler.default_radius_miles = radius;
            }
            let center = GeoPoint::new(lat, lng)?;
            session::area(&config, center, zoom, watch).await?;
        }
        Commands::Route {
            from,
            to,
            width,
            geojson,
            watch,
        } => {
            let mut config = TrafficMapConfig::load_or_default(&cli.config)?;
            if let Some(width) = width {
                config.scheduler.default_corridor_width_miles = width;
            }
            let output = if geojson {
                session::RouteOutput::GeoJson
            } else if watch {
                session::RouteOutput::Watch
            } else {
                session::RouteOutput::Snapshot
            };
            session::route(&config, from, to, output).await?;
        }
    }

    Ok(())
}
