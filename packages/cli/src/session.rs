//! Wires a [`RefreshScheduler`] to the configured HTTP services and prints
//! what it publishes.

use std::sync::Arc;

use traffic_map_cache::IncidentCache;
use traffic_map_geocoder::NominatimReverse;
use traffic_map_geography_models::GeoPoint;
use traffic_map_route::{HereRouter, segments_to_geojson};
use traffic_map_scheduler::{RefreshOutcome, RefreshScheduler, Snapshot, Status, TrafficMapConfig};
use traffic_map_source::HttpIncidentFeed;
use traffic_map_spatial::Corridor;

use crate::CliError;

/// What `route` prints.
pub enum RouteOutput {
    /// The snapshot after one refresh.
    Snapshot,
    /// Route segments, corridor and incidents as one feature collection.
    GeoJson,
    /// Every snapshot until interrupted.
    Watch,
}

fn build(config: &TrafficMapConfig, center: GeoPoint) -> Result<RefreshScheduler, CliError> {
    config.scheduler.validate()?;

    let feed = HttpIncidentFeed::new(config.feed.clone())?;
    let mut scheduler = RefreshScheduler::new(
        config.scheduler.clone(),
        center,
        Arc::new(feed),
        Arc::new(IncidentCache::new()),
    );
    if config.geocoder.enabled {
        scheduler = scheduler.with_geocoder(Arc::new(NominatimReverse::new(&config.geocoder)?));
    }
    Ok(scheduler)
}

/// Runs an area query around `center`.
pub async fn area(
    config: &TrafficMapConfig,
    center: GeoPoint,
    zoom: Option<i32>,
    watch: bool,
) -> Result<(), CliError> {
    let scheduler = build(config, center)?;
    if let Some(label) = scheduler.label_location(center).await {
        log::info!("incidents around {label}");
    }

    let outcome = match zoom {
        Some(zoom) => scheduler.set_area_zoom(zoom).await,
        None => scheduler.trigger_refresh().await,
    };

    if watch {
        watch_snapshots(&scheduler).await
    } else {
        finish(&scheduler, outcome)
    }
}

/// Runs a route query from `from` to `to`.
pub async fn route(
    config: &TrafficMapConfig,
    from: GeoPoint,
    to: GeoPoint,
    output: RouteOutput,
) -> Result<(), CliError> {
    let router = HereRouter::new(config.router.clone())?;
    let scheduler = build(config, from)?.with_router(Arc::new(router));

    let outcome = scheduler.set_route(from, to).await?;
    if let Some(view) = &scheduler.snapshot().route {
        let summary = view.route.summary;
        log::info!(
            "route is {:.1} miles, {:.0} min with {:.0} min of traffic delay",
            summary.length_miles,
            summary.realtime_duration_secs / 60.0,
            summary.delay_secs() / 60.0,
        );
    }

    match output {
        RouteOutput::Snapshot => finish(&scheduler, outcome),
        RouteOutput::Watch => watch_snapshots(&scheduler).await,
        RouteOutput::GeoJson => {
            check(&scheduler.snapshot(), outcome)?;
            print_geojson(&scheduler)
        }
    }
}

fn check(snapshot: &Snapshot, outcome: RefreshOutcome) -> Result<(), CliError> {
    match outcome {
        RefreshOutcome::Applied => Ok(()),
        RefreshOutcome::Superseded => Err(CliError::Superseded),
        RefreshOutcome::Failed => Err(CliError::Refresh {
            message: snapshot.error_message.clone().unwrap_or_default(),
        }),
    }
}

fn finish(scheduler: &RefreshScheduler, outcome: RefreshOutcome) -> Result<(), CliError> {
    let snapshot = scheduler.snapshot();
    print_snapshot(&snapshot)?;
    check(&snapshot, outcome)
}

fn print_snapshot(snapshot: &Snapshot) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}

fn print_geojson(scheduler: &RefreshScheduler) -> Result<(), CliError> {
    let snapshot = scheduler.snapshot();
    let Some(view) = &snapshot.route else {
        return Err(CliError::Superseded);
    };

    let mut collection = segments_to_geojson(&view.route.segments);
    let width = scheduler.settings().corridor_width_miles;
    if let Some(corridor) = Corridor::new(&view.route.points, width) {
        collection.features.extend(corridor.to_geojson().features);
    }
    for incident in &snapshot.incidents {
        let properties = serde_json::to_value(incident)?.as_object().cloned();
        collection.features.push(geojson::Feature {
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                incident.location.lng,
                incident.location.lat,
            ]))),
            id: Some(geojson::feature::Id::String(incident.id.clone())),
            properties,
            ..geojson::Feature::default()
        });
    }

    println!("{}", serde_json::to_string(&collection)?);
    Ok(())
}

/// Prints the current snapshot, then every settled snapshot the timer
/// loop publishes, until ctrl-c.
async fn watch_snapshots(scheduler: &RefreshScheduler) -> Result<(), CliError> {
    let mut updates = scheduler.subscribe();
    print_snapshot(&updates.borrow_and_update().clone())?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for ctrl-c, stopping: {e}");
        }
    };
    let printer = async {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.status != Status::Loading {
                print_snapshot(&snapshot)?;
            }
        }
        Ok::<_, CliError>(())
    };

    tokio::select! {
        () = scheduler.run(shutdown) => Ok(()),
        result = printer => result,
    }
}
