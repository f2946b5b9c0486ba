//! The refresh state machine.
//!
//! Every trigger (timer tick, setting change, manual refresh) runs the
//! same pipeline: fetch through the cache, normalize, corridor-filter in
//! route mode, publish. Each run takes the next generation number when it
//! starts and only publishes if no newer run has started since, so a slow
//! response that arrives after a newer trigger is dropped rather than
//! overwriting fresher data. Starting a run and publishing a result both
//! happen under the snapshot channel's lock, which keeps the generation
//! check and the write atomic.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use traffic_map_cache::{CacheKey, IncidentCache};
use traffic_map_geocoder::ReverseGeocoder;
use traffic_map_geography::{
    bounding_box_from_radius_miles, bounding_box_from_zoom, expand_bounding_box_miles,
    haversine_miles,
};
use traffic_map_geography_models::{BoundingBox, GeoPoint};
use traffic_map_incident_models::{Incident, by_severity_then_center_distance};
use traffic_map_route::{Route, RouteError, RouteProvider};
use traffic_map_source::{IncidentFeed, SourceError, normalize};
use traffic_map_spatial::Corridor;

use crate::config::{ConfigError, SchedulerConfig, check_positive_miles};
use crate::snapshot::{Mode, RouteView, Snapshot, Status};

/// Errors from session setters.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A setting value was rejected.
    #[error(transparent)]
    InvalidSetting(#[from] ConfigError),

    /// A route was requested but no routing provider is configured.
    #[error("no routing provider is configured")]
    NoRouter,

    /// The route could not be computed or decoded.
    #[error("route request failed: {0}")]
    Route(#[from] RouteError),
}

/// What happened to a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Its incidents were published.
    Applied,
    /// A newer refresh started first; its result was dropped.
    Superseded,
    /// The fetch failed; the error was published alongside the previous
    /// incidents.
    Failed,
}

/// How big the area query is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaExtent {
    /// A radius around the center.
    RadiusMiles(f64),
    /// Whatever a map at this zoom level shows around the center.
    Zoom(i32),
}

/// The user-controlled query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Area query center.
    pub center: GeoPoint,
    /// Area query size.
    pub extent: AreaExtent,
    /// Area or route scoping.
    pub mode: Mode,
    /// Corridor half-width in route mode.
    pub corridor_width_miles: f64,
    /// Feed filters.
    pub filters: Vec<String>,
}

struct ActiveRoute {
    from: GeoPoint,
    corridor: Option<Arc<Corridor>>,
}

#[derive(Default)]
struct RouteState {
    seq: u64,
    active: Option<ActiveRoute>,
}

/// Everything one refresh needs, captured when it starts.
struct QueryPlan {
    bbox: BoundingBox,
    center: GeoPoint,
    filters: Vec<String>,
    corridor: Option<Arc<Corridor>>,
}

/// Orchestrates incident refreshes for one map session.
pub struct RefreshScheduler {
    config: SchedulerConfig,
    feed: Arc<dyn IncidentFeed>,
    cache: Arc<IncidentCache>,
    router: Option<Arc<dyn RouteProvider>>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    settings: Mutex<SessionSettings>,
    routes: Mutex<RouteState>,
    generation: AtomicU64,
    state: watch::Sender<Snapshot>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("feed", &self.feed.id())
            .field("settings", &*self.lock_settings())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl RefreshScheduler {
    /// Creates an idle scheduler centered on `center`, with the radius,
    /// width and filters from `config`.
    ///
    /// The cache is passed in so sessions can share one.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        center: GeoPoint,
        feed: Arc<dyn IncidentFeed>,
        cache: Arc<IncidentCache>,
    ) -> Self {
        let settings = SessionSettings {
            center,
            extent: AreaExtent::RadiusMiles(config.default_radius_miles),
            mode: Mode::Area,
            corridor_width_miles: config.default_corridor_width_miles,
            filters: config.filters.clone(),
        };
        Self {
            config,
            feed,
            cache,
            router: None,
            geocoder: None,
            settings: Mutex::new(settings),
            routes: Mutex::new(RouteState::default()),
            generation: AtomicU64::new(0),
            state: watch::Sender::new(Snapshot::default()),
        }
    }

    /// Enables [`Self::set_route`].
    #[must_use]
    pub fn with_router(mut self, router: Arc<dyn RouteProvider>) -> Self {
        self.router = Some(router);
        self
    }

    /// Enables [`Self::label_location`].
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// A receiver notified on every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.lock_settings().clone()
    }

    /// Refreshes now with the current settings.
    pub async fn trigger_refresh(&self) -> RefreshOutcome {
        let generation = self.begin();
        let plan = self.plan();
        let key = CacheKey::new(plan.bbox, &plan.filters);
        let feed = &self.feed;
        let (bbox, center, filters) = (plan.bbox, plan.center, plan.filters.as_slice());

        let fetched = self
            .cache
            .get_or_fetch(&key, self.config.cache_ttl(), move || async move {
                let raw = feed.fetch(bbox, filters).await?;
                Ok::<_, SourceError>(normalize(&raw, center))
            })
            .await;

        let result = match fetched {
            Ok(incidents) => {
                let incidents = recenter(incidents, center);
                Ok(match &plan.corridor {
                    Some(corridor) => corridor.filter(incidents),
                    None => incidents,
                })
            }
            Err(e) => {
                log::warn!("incident fetch from {} failed: {e}", self.feed.id());
                Err(e.to_string())
            }
        };

        self.apply(generation, result)
    }

    /// Switches between area and route scoping and refreshes.
    pub async fn set_mode(&self, mode: Mode) -> RefreshOutcome {
        self.lock_settings().mode = mode;
        self.trigger_refresh().await
    }

    /// Moves the area center and refreshes.
    pub async fn set_center(&self, center: GeoPoint) -> RefreshOutcome {
        self.lock_settings().center = center;
        self.trigger_refresh().await
    }

    /// Sizes the area query by radius and refreshes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidSetting`] unless `miles` is finite
    /// and positive; nothing is refreshed then.
    pub async fn set_area_radius(&self, miles: f64) -> Result<RefreshOutcome, SchedulerError> {
        check_positive_miles("radius_miles", miles)?;
        self.lock_settings().extent = AreaExtent::RadiusMiles(miles);
        Ok(self.trigger_refresh().await)
    }

    /// Sizes the area query by map zoom level and refreshes.
    pub async fn set_area_zoom(&self, zoom: i32) -> RefreshOutcome {
        self.lock_settings().extent = AreaExtent::Zoom(zoom);
        self.trigger_refresh().await
    }

    /// Changes the corridor width, rebuilds the active corridor and
    /// refreshes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidSetting`] unless `miles` is finite
    /// and positive.
    pub async fn set_corridor_width(&self, miles: f64) -> Result<RefreshOutcome, SchedulerError> {
        check_positive_miles("corridor_width_miles", miles)?;
        self.lock_settings().corridor_width_miles = miles;
        {
            let mut routes = self.lock_routes();
            if let Some(active) = routes.active.as_mut()
                && let Some(corridor) = &active.corridor
            {
                active.corridor = Corridor::new(corridor.route(), miles).map(Arc::new);
            }
        }
        Ok(self.trigger_refresh().await)
    }

    /// Replaces the feed filters and refreshes.
    pub async fn set_filters(&self, filters: Vec<String>) -> RefreshOutcome {
        self.lock_settings().filters = filters;
        self.trigger_refresh().await
    }

    /// Computes a route, switches to route mode and refreshes.
    ///
    /// If another route is requested (or the route cleared) while this one
    /// is being computed, this one is dropped and
    /// [`RefreshOutcome::Superseded`] returned.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::NoRouter`] if no provider is configured
    /// * [`SchedulerError::Route`] if the provider fails or returns a
    ///   malformed shape; the previous route and snapshot are kept
    pub async fn set_route(
        &self,
        from: GeoPoint,
        to: GeoPoint,
    ) -> Result<RefreshOutcome, SchedulerError> {
        let router = self.router.clone().ok_or(SchedulerError::NoRouter)?;
        let seq = {
            let mut routes = self.lock_routes();
            routes.seq += 1;
            routes.seq
        };

        let route = match router.route(from, to).await {
            Ok(response) => Route::from_response(&response),
            Err(e) => Err(e),
        }
        .inspect_err(|e| log::warn!("route from {from} to {to} via {} failed: {e}", router.id()))?;

        let width = self.lock_settings().corridor_width_miles;
        let corridor = Corridor::new(&route.points, width).map(Arc::new);

        {
            let mut routes = self.lock_routes();
            if routes.seq != seq {
                log::debug!("dropping superseded route from {from} to {to}");
                return Ok(RefreshOutcome::Superseded);
            }
            routes.active = Some(ActiveRoute { from, corridor });
            self.state.send_modify(|snapshot| {
                snapshot.route = Some(RouteView { from, to, route });
            });
        }

        self.lock_settings().mode = Mode::Route;
        Ok(self.trigger_refresh().await)
    }

    /// Drops the active route, returns to area mode and refreshes.
    pub async fn clear_route(&self) -> RefreshOutcome {
        {
            let mut routes = self.lock_routes();
            routes.seq += 1;
            routes.active = None;
            self.state.send_modify(|snapshot| snapshot.route = None);
        }
        self.lock_settings().mode = Mode::Area;
        self.trigger_refresh().await
    }

    /// Looks up an address label for `point`. Failures are logged and
    /// yield `None`.
    pub async fn label_location(&self, point: GeoPoint) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        match geocoder.reverse(point).await {
            Ok(label) => label,
            Err(e) => {
                log::debug!("reverse geocode for {point} failed: {e}");
                None
            }
        }
    }

    /// Refreshes on a fixed interval, starting immediately, until
    /// `shutdown` resolves. Ticks missed during a slow refresh are delayed,
    /// not bunched up.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.config.refresh_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    let outcome = self.trigger_refresh().await;
                    log::debug!("timer refresh: {outcome:?}");
                }
            }
        }
    }

    /// Starts a run: takes the next generation and enters `Loading`.
    fn begin(&self) -> u64 {
        let mode = self.lock_settings().mode;
        let mut generation = 0;
        self.state.send_modify(|snapshot| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            snapshot.status = Status::Loading;
            snapshot.mode = mode;
            snapshot.generation = generation;
        });
        generation
    }

    /// Publishes a run's result unless a newer run has started.
    fn apply(&self, generation: u64, result: Result<Vec<Incident>, String>) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::Superseded;
        self.state.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match result {
                Ok(incidents) => {
                    snapshot.status = Status::Ready;
                    snapshot.incidents = incidents;
                    snapshot.last_updated = Some(Utc::now());
                    snapshot.error_message = None;
                    outcome = RefreshOutcome::Applied;
                }
                Err(message) => {
                    snapshot.status = Status::Error;
                    snapshot.error_message = Some(message);
                    outcome = RefreshOutcome::Failed;
                }
            }
            true
        });

        if outcome == RefreshOutcome::Superseded {
            log::debug!("dropping superseded refresh {generation}");
        }
        outcome
    }

    /// Resolves the current settings into a query. Route mode without a
    /// usable corridor queries the area instead.
    fn plan(&self) -> QueryPlan {
        let settings = self.settings();

        if settings.mode == Mode::Route {
            let routes = self.lock_routes();
            if let Some(active) = routes.active.as_ref()
                && let Some(corridor) = &active.corridor
                && let Some(extent) = BoundingBox::from_points(corridor.route())
            {
                return QueryPlan {
                    bbox: expand_bounding_box_miles(extent, corridor.width_miles()),
                    center: active.from,
                    filters: settings.filters,
                    corridor: Some(Arc::clone(corridor)),
                };
            }
            log::debug!("route mode without a usable route, querying the area");
        }

        let bbox = match settings.extent {
            AreaExtent::RadiusMiles(miles) => bounding_box_from_radius_miles(settings.center, miles),
            AreaExtent::Zoom(zoom) => bounding_box_from_zoom(settings.center, zoom),
        };
        QueryPlan {
            bbox,
            center: settings.center,
            filters: settings.filters,
            corridor: None,
        }
    }

    fn lock_settings(&self) -> MutexGuard<'_, SessionSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_routes(&self) -> MutexGuard<'_, RouteState> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Measures center distances from `center` and restores the center
/// ordering. A cached list may have been normalized around a different
/// center that rounds to the same cache key.
fn recenter(mut incidents: Vec<Incident>, center: GeoPoint) -> Vec<Incident> {
    for incident in &mut incidents {
        incident.distance_from_center_miles = haversine_miles(center, incident.location);
    }
    incidents.sort_by(by_severity_then_center_distance);
    incidents
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;
    use traffic_map_geocoder::GeocodeError;
    use traffic_map_route::RouteResponse;
    use traffic_map_source_models::RawIncidentRecord;

    use super::*;

    const CENTER: GeoPoint = GeoPoint {
        lat: 34.05,
        lng: -118.24,
    };

    /// (34.05, -118.24) to (34.06, -118.25).
    const SHORT_ROUTE: &str = "BFws6vG_31xWw-Bv-B";

    fn record(id: &str, lat: f64, lng: f64) -> RawIncidentRecord {
        RawIncidentRecord::new(json!({
            "id": id,
            "severity": 2,
            "lat": lat,
            "lng": lng,
            "shortDesc": "Crash on Main St",
        }))
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.incidents.iter().map(|i| i.id.as_str()).collect()
    }

    /// Answers fetches from a queue; an empty queue answers with no records.
    #[derive(Default)]
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<Vec<RawIncidentRecord>, SourceError>>>,
        calls: AtomicUsize,
        bboxes: Mutex<Vec<BoundingBox>>,
    }

    impl ScriptedFeed {
        fn with(responses: Vec<Result<Vec<RawIncidentRecord>, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_bbox(&self) -> BoundingBox {
            *self.bboxes.lock().unwrap().last().unwrap()
        }
    }

    #[async_trait]
    impl IncidentFeed for ScriptedFeed {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn fetch(
            &self,
            bbox: BoundingBox,
            _filters: &[String],
        ) -> Result<Vec<RawIncidentRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bboxes.lock().unwrap().push(bbox);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(vec![]))
        }
    }

    /// Holds each fetch until its gate (keyed by the joined filters) opens.
    struct GatedFeed {
        gates: Mutex<HashMap<String, (oneshot::Receiver<()>, Vec<RawIncidentRecord>)>>,
    }

    #[async_trait]
    impl IncidentFeed for GatedFeed {
        fn id(&self) -> &str {
            "gated"
        }

        async fn fetch(
            &self,
            _bbox: BoundingBox,
            filters: &[String],
        ) -> Result<Vec<RawIncidentRecord>, SourceError> {
            let gate = self.gates.lock().unwrap().remove(&filters.join(","));
            let (open, records) = gate.expect("unexpected fetch");
            open.await.expect("gate dropped");
            Ok(records)
        }
    }

    struct FakeRouter {
        polyline: String,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeRouter {
        fn new(polyline: &str) -> Arc<Self> {
            Arc::new(Self {
                polyline: polyline.to_string(),
                gate: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl RouteProvider for FakeRouter {
        fn id(&self) -> &str {
            "fake"
        }

        async fn route(&self, _from: GeoPoint, _to: GeoPoint) -> Result<RouteResponse, RouteError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.await.expect("gate dropped");
            }
            Ok(RouteResponse {
                polyline: self.polyline.clone(),
                maneuvers: vec![],
                duration_secs: 120.0,
                realtime_duration_secs: 180.0,
            })
        }
    }

    struct FakeGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FakeGeocoder {
        async fn reverse(&self, point: GeoPoint) -> Result<Option<String>, GeocodeError> {
            if point.lat > 0.0 {
                Ok(Some("100 Main St, Los Angeles".to_string()))
            } else {
                Err(GeocodeError::RateLimited)
            }
        }
    }

    fn scheduler(feed: Arc<dyn IncidentFeed>) -> RefreshScheduler {
        RefreshScheduler::new(
            SchedulerConfig::default(),
            CENTER,
            feed,
            Arc::new(IncidentCache::new()),
        )
    }

    #[tokio::test]
    async fn starts_idle() {
        let scheduler = scheduler(ScriptedFeed::with(vec![]));
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.status, Status::Idle);
        assert_eq!(snapshot.mode, Mode::Area);
        assert!(snapshot.incidents.is_empty());
        assert!(snapshot.last_updated.is_none());
        assert_eq!(snapshot.generation, 0);
    }

    #[tokio::test]
    async fn area_refresh_publishes_normalized_incidents() {
        let feed = ScriptedFeed::with(vec![Ok(vec![
            record("far", 34.10, -118.30),
            record("near", 34.051, -118.241),
        ])]);
        let scheduler = scheduler(feed.clone());

        assert_eq!(scheduler.trigger_refresh().await, RefreshOutcome::Applied);

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.status, Status::Ready);
        assert_eq!(ids(&snapshot), ["near", "far"]);
        assert!(snapshot.last_updated.is_some());
        assert!(snapshot.error_message.is_none());
        assert_eq!(snapshot.generation, 1);
        assert!(feed.last_bbox().contains(CENTER));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_incidents() {
        let feed = ScriptedFeed::with(vec![
            Ok(vec![record("a", 34.05, -118.24)]),
            Err(SourceError::RateLimited),
        ]);
        let scheduler = scheduler(feed.clone());

        scheduler.trigger_refresh().await;
        let before = scheduler.snapshot();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(scheduler.trigger_refresh().await, RefreshOutcome::Failed);

        let after = scheduler.snapshot();
        assert_eq!(feed.calls(), 2);
        assert_eq!(after.status, Status::Error);
        assert_eq!(ids(&after), ["a"]);
        assert_eq!(after.last_updated, before.last_updated);
        assert!(after.error_message.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn slow_response_never_overwrites_a_newer_one() {
        let (old_open, old_gate) = oneshot::channel();
        let (new_open, new_gate) = oneshot::channel();
        let feed = Arc::new(GatedFeed {
            gates: Mutex::new(HashMap::from([
                ("old".to_string(), (old_gate, vec![record("old-1", 34.05, -118.24)])),
                ("new".to_string(), (new_gate, vec![record("new-1", 34.05, -118.24)])),
            ])),
        });
        let scheduler = scheduler(feed);
        let mut updates = scheduler.subscribe();

        let (first, second, ()) = tokio::join!(
            scheduler.set_filters(vec!["old".to_string()]),
            scheduler.set_filters(vec!["new".to_string()]),
            async {
                new_open.send(()).unwrap();
                updates
                    .wait_for(|s| s.status == Status::Ready)
                    .await
                    .unwrap();
                old_open.send(()).unwrap();
            },
        );

        assert_eq!(first, RefreshOutcome::Superseded);
        assert_eq!(second, RefreshOutcome::Applied);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.status, Status::Ready);
        assert_eq!(ids(&snapshot), ["new-1"]);
        assert_eq!(snapshot.generation, 2);
    }

    #[tokio::test]
    async fn radius_changes_use_separate_cache_entries() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone());

        scheduler.set_area_radius(5.0).await.unwrap();
        let small = feed.last_bbox();
        scheduler.set_area_radius(10.0).await.unwrap();
        let large = feed.last_bbox();
        assert_eq!(feed.calls(), 2);
        assert!(large.north > small.north);

        scheduler.set_area_radius(5.0).await.unwrap();
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test]
    async fn zoom_sizes_the_area_query() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone());

        scheduler.set_area_zoom(10).await;
        let wide = feed.last_bbox();
        scheduler.set_area_zoom(14).await;
        let narrow = feed.last_bbox();

        assert!(wide.north - wide.south > narrow.north - narrow.south);
        assert!(narrow.contains(CENTER));
    }

    #[tokio::test]
    async fn invalid_radius_is_rejected_without_refreshing() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone());

        let result = scheduler.set_area_radius(-1.0).await;

        assert!(matches!(result, Err(SchedulerError::InvalidSetting(_))));
        assert_eq!(feed.calls(), 0);
        assert_eq!(scheduler.snapshot().generation, 0);
        assert_eq!(
            scheduler.settings().extent,
            AreaExtent::RadiusMiles(SchedulerConfig::default().default_radius_miles)
        );
    }

    #[tokio::test]
    async fn route_mode_keeps_only_corridor_incidents() {
        let feed = ScriptedFeed::with(vec![Ok(vec![
            record("on-route", 34.055, -118.245),
            record("off-route", 34.30, -118.50),
        ])]);
        let scheduler = scheduler(feed.clone()).with_router(FakeRouter::new(SHORT_ROUTE));
        let to = GeoPoint {
            lat: 34.06,
            lng: -118.25,
        };

        let outcome = scheduler.set_route(CENTER, to).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Applied);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.mode, Mode::Route);
        assert_eq!(ids(&snapshot), ["on-route"]);
        assert!(snapshot.incidents[0].route_offset_miles.is_some());

        let view = snapshot.route.unwrap();
        assert_eq!(view.to, to);
        assert_eq!(view.route.points.len(), 2);
        assert!((view.route.summary.delay_secs() - 60.0).abs() < 1e-9);

        let bbox = feed.last_bbox();
        assert!(bbox.contains(CENTER));
        assert!(bbox.north < 34.09);
    }

    #[tokio::test]
    async fn reversed_route_measures_from_its_own_origin() {
        let feed = ScriptedFeed::with(vec![Ok(vec![record("near-b", 34.0595, -118.2495)])]);
        let scheduler = scheduler(feed.clone()).with_router(FakeRouter::new(SHORT_ROUTE));
        let b = GeoPoint {
            lat: 34.06,
            lng: -118.25,
        };
        let incident = GeoPoint {
            lat: 34.0595,
            lng: -118.2495,
        };

        scheduler.set_route(CENTER, b).await.unwrap();
        let forward = scheduler.snapshot().incidents[0].distance_from_center_miles;
        assert!((forward - haversine_miles(CENTER, incident)).abs() < 1e-9);

        scheduler.set_route(b, CENTER).await.unwrap();

        assert_eq!(feed.calls(), 1);
        let snapshot = scheduler.snapshot();
        assert_eq!(ids(&snapshot), ["near-b"]);
        let reversed = snapshot.incidents[0].distance_from_center_miles;
        assert!((reversed - haversine_miles(b, incident)).abs() < 1e-9);
        assert!(reversed < 0.1);
    }

    #[tokio::test]
    async fn narrowing_the_corridor_narrows_the_query() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone()).with_router(FakeRouter::new(SHORT_ROUTE));
        let to = GeoPoint {
            lat: 34.06,
            lng: -118.25,
        };

        scheduler.set_route(CENTER, to).await.unwrap();
        let wide = feed.last_bbox();
        scheduler.set_corridor_width(0.5).await.unwrap();
        let narrow = feed.last_bbox();

        assert!(narrow.north < wide.north);
        assert!(narrow.north > 34.06);
    }

    #[tokio::test]
    async fn route_mode_without_route_queries_the_area() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone());

        assert_eq!(scheduler.set_mode(Mode::Route).await, RefreshOutcome::Applied);

        assert_eq!(scheduler.snapshot().mode, Mode::Route);
        assert_eq!(
            feed.last_bbox(),
            bounding_box_from_radius_miles(CENTER, SchedulerConfig::default().default_radius_miles)
        );
    }

    #[tokio::test]
    async fn malformed_route_leaves_snapshot_untouched() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone()).with_router(FakeRouter::new(""));

        let result = scheduler.set_route(CENTER, CENTER).await;

        assert!(matches!(result, Err(SchedulerError::Route(RouteError::Decode(_)))));
        assert_eq!(scheduler.snapshot(), Snapshot::default());
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn set_route_requires_a_router() {
        let scheduler = scheduler(ScriptedFeed::with(vec![]));
        assert!(matches!(
            scheduler.set_route(CENTER, CENTER).await,
            Err(SchedulerError::NoRouter)
        ));
    }

    #[tokio::test]
    async fn clearing_while_routing_drops_the_route() {
        let (open, gate) = oneshot::channel();
        let router = FakeRouter::new(SHORT_ROUTE);
        *router.gate.lock().unwrap() = Some(gate);
        let scheduler = scheduler(ScriptedFeed::with(vec![])).with_router(router);

        let (routed, cleared) = tokio::join!(scheduler.set_route(CENTER, CENTER), async {
            let outcome = scheduler.clear_route().await;
            open.send(()).unwrap();
            outcome
        });

        assert_eq!(routed.unwrap(), RefreshOutcome::Superseded);
        assert_eq!(cleared, RefreshOutcome::Applied);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.mode, Mode::Area);
        assert!(snapshot.route.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_refreshes_on_each_tick_until_shutdown() {
        let feed = ScriptedFeed::with(vec![]);
        let scheduler = scheduler(feed.clone());

        scheduler
            .run(tokio::time::sleep(Duration::from_secs(125)))
            .await;

        assert_eq!(feed.calls(), 3);
        assert_eq!(scheduler.snapshot().generation, 3);
    }

    #[tokio::test]
    async fn label_location_swallows_geocoder_failures() {
        let scheduler = scheduler(ScriptedFeed::with(vec![]));
        assert_eq!(scheduler.label_location(CENTER).await, None);

        let scheduler = scheduler.with_geocoder(Arc::new(FakeGeocoder));
        assert_eq!(
            scheduler.label_location(CENTER).await.as_deref(),
            Some("100 Main St, Los Angeles")
        );
        let south = GeoPoint {
            lat: -33.9,
            lng: 18.4,
        };
        assert_eq!(scheduler.label_location(south).await, None);
    }

    #[tokio::test]
    async fn subscribers_see_the_published_state() {
        let scheduler = scheduler(ScriptedFeed::with(vec![Ok(vec![record(
            "a", 34.05, -118.24,
        )])]));
        let mut updates = scheduler.subscribe();

        scheduler.trigger_refresh().await;

        assert!(updates.has_changed().unwrap());
        let seen = updates.borrow_and_update().clone();
        assert_eq!(seen.status, Status::Ready);
        assert_eq!(ids(&seen), ["a"]);
    }
}
