//! Source feeds as queries.
//!
//! Every payload the backends serve is a leaf query that fetches and decodes
//! it. Domain entities are derived queries over those leaves, so a refetch
//! that returns identical bytes never re-runs an adapter.

mod schedule;
mod trips;

pub use schedule::Departures;

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use futures_util::future;
use ridealong_transit::identifiers::RouteIdentifier;
use ridealong_transit::models::types::{Alert, Bus, Route, SourceTag, Stop, TransitError};
use ridealong_transit::network::DataFetcher;
use ridealong_transit::source::Theme;
use ridealong_transit::schedule::GridPalette;
use ridealong_transit::source::bustime::{
    self, BustimeBulletin, BustimeDirections, BustimePattern, BustimeRoute, BustimeVehicle,
};
use ridealong_transit::source::campus::{
    self, CampusAnnouncement, CampusRoute, CampusStop, CampusVehicle,
};
use ridealong_transit::source::places;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ConfigError, FeedConfig};
use crate::error::QueryError;
use crate::query::{
    Dependencies, Query, QueryBuilder, QueryClient, QueryKey, QueryValue, UpstreamQuery,
};
use crate::query_key;
use crate::selector::{SourceSelector, SourceTable};

/// Cache policy of one query.
#[derive(Clone, Copy, Debug, Default)]
struct CachePolicy {
    stale_time: Option<Duration>,
    refetch_interval: Option<Duration>,
}

impl CachePolicy {
    fn fixed(stale: Duration) -> Self {
        Self {
            stale_time: Some(stale),
            refetch_interval: None,
        }
    }

    /// Stale by the time the next refetch fires.
    fn live(stale: Duration, period: Duration) -> Self {
        Self {
            stale_time: Some(stale.min(period)),
            refetch_interval: Some(period),
        }
    }

    fn apply<T: QueryValue>(self, mut builder: QueryBuilder<T>) -> QueryBuilder<T> {
        if let Some(stale) = self.stale_time {
            builder = builder.stale_time(stale);
        }
        if let Some(period) = self.refetch_interval {
            builder = builder.refetch_interval(period);
        }
        builder
    }
}

/// One backend request.
struct Request<'a> {
    source: &'a str,
    base: &'a str,
    resource: &'a str,
    params: Vec<(&'static str, String)>,
    enabled: bool,
}

impl Request<'_> {
    fn url(&self) -> String {
        let mut url = format!("{}/{}", self.base.trim_end_matches('/'), self.resource);
        for (i, (name, value)) in self.params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(name);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    fn key(&self) -> QueryKey {
        self.params.iter().fold(
            query_key!(self.source, "payload", self.resource),
            |key, (name, value)| key.with(format!("{name}={value}")),
        )
    }
}

async fn fetch_json<P: DeserializeOwned>(
    fetcher: Arc<dyn DataFetcher>,
    label: Arc<str>,
    url: String,
) -> Result<P, QueryError> {
    let bytes = fetcher.fetch(&url).await?;
    debug!(label = %label, url, bytes = bytes.len(), "fetched payload");

    serde_json::from_slice(&bytes).map_err(|error| QueryError::Validation {
        label,
        message: error.to_string().into(),
    })
}

pub(crate) fn find_route(
    routes: &[Arc<Route>],
    id: &RouteIdentifier,
) -> Result<Arc<Route>, QueryError> {
    routes
        .iter()
        .find(|route| &route.id == id)
        .cloned()
        .ok_or_else(|| TransitError::RouteNotFound(id.clone()).into())
}

/// The query layer over both sources and the trip planner.
pub struct TransitFeeds {
    client: Arc<QueryClient>,
    fetcher: Arc<dyn DataFetcher>,
    config: FeedConfig,
    theme: Arc<Theme>,
    palette: GridPalette,
    offset: FixedOffset,
}

impl TransitFeeds {
    pub fn new(fetcher: Arc<dyn DataFetcher>, config: FeedConfig) -> Result<Self, ConfigError> {
        Self::with_client(Arc::new(QueryClient::new()), fetcher, config)
    }

    pub fn with_client(
        client: Arc<QueryClient>,
        fetcher: Arc<dyn DataFetcher>,
        config: FeedConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            theme: Arc::new(config.theme()?),
            palette: config.grid_palette()?,
            offset: config.utc_offset()?,
            client,
            fetcher,
            config,
        })
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn base(&self, tag: SourceTag) -> &str {
        match tag {
            SourceTag::Bustime => &self.config.endpoints.bustime,
            SourceTag::Campus => &self.config.endpoints.campus,
        }
    }

    fn static_policy(&self) -> CachePolicy {
        CachePolicy::fixed(self.config.cache.static_stale())
    }

    fn vehicles_policy(&self) -> CachePolicy {
        let period = self.config.cache.vehicles_refetch();
        CachePolicy::live(period, period)
    }

    fn estimates_policy(&self) -> CachePolicy {
        let cache = &self.config.cache;
        CachePolicy::live(cache.estimates_stale(), cache.estimates_refetch())
    }

    /// Leaf query fetching and decoding one payload.
    fn payload<P>(&self, request: Request<'_>, policy: CachePolicy) -> Query<P>
    where
        P: DeserializeOwned + QueryValue,
    {
        let label: Arc<str> = format!("{} {} payload", request.source, request.resource).into();
        let url = request.url();
        let enabled = request.enabled;
        let fetcher = self.fetcher.clone();

        self.client.query(&label.clone(), request.key(), move |builder| {
            policy
                .apply(builder)
                .enabled(move || enabled)
                .build(move |_| fetch_json::<P>(fetcher.clone(), label.clone(), url.clone()))
        })
    }

    fn source_payload<P>(&self, tag: SourceTag, resource: &str, policy: CachePolicy) -> Query<P>
    where
        P: DeserializeOwned + QueryValue,
    {
        let source = tag.to_string();
        self.payload(
            Request {
                source: &source,
                base: self.base(tag),
                resource,
                params: Vec::new(),
                enabled: true,
            },
            policy,
        )
    }

    /// Derived query running a synchronous adapter over its upstreams.
    fn derived<T, F>(
        &self,
        label: &str,
        key: QueryKey,
        upstream: &[UpstreamQuery],
        policy: CachePolicy,
        adapt: F,
    ) -> Query<T>
    where
        T: QueryValue,
        F: Fn(&Dependencies) -> Result<T, QueryError> + Send + Sync + 'static,
    {
        self.client.query(label, key, move |builder| {
            policy
                .apply(builder)
                .depends_on_all(upstream)
                .build(move |deps| future::ready(adapt(&deps)))
        })
    }

    // ========================================================================
    // Routes, stops, vehicles
    // ========================================================================

    pub fn routes(&self, tag: SourceTag) -> Query<Vec<Arc<Route>>> {
        let theme = self.theme.clone();
        let policy = CachePolicy::default();

        match tag {
            SourceTag::Bustime => {
                let raw: Query<Vec<BustimeRoute>> =
                    self.source_payload(tag, "routes", self.static_policy());
                let directions: Query<BustimeDirections> =
                    self.source_payload(tag, "directions", self.static_policy());
                let patterns: Query<Vec<BustimePattern>> =
                    self.source_payload(tag, "patterns", self.static_policy());

                self.derived(
                    "bustime routes",
                    query_key!(tag, "routes"),
                    &[raw.upstream(), directions.upstream(), patterns.upstream()],
                    policy,
                    move |deps| {
                        let (raw, directions, patterns) =
                            (deps.get(&raw)?, deps.get(&directions)?, deps.get(&patterns)?);
                        let routes = bustime::routes(&raw, &directions, &patterns, &theme)?;
                        Ok(routes.into_iter().map(Arc::new).collect())
                    },
                )
            }
            SourceTag::Campus => {
                let raw: Query<Vec<CampusRoute>> =
                    self.source_payload(tag, "routes", self.static_policy());
                let stops: Query<Vec<CampusStop>> =
                    self.source_payload(tag, "stops", self.static_policy());

                self.derived(
                    "campus routes",
                    query_key!(tag, "routes"),
                    &[raw.upstream(), stops.upstream()],
                    policy,
                    move |deps| {
                        let (raw, stops) = (deps.get(&raw)?, deps.get(&stops)?);
                        let routes = campus::routes(&raw, &stops, &theme)?;
                        Ok(routes.into_iter().map(Arc::new).collect())
                    },
                )
            }
        }
    }

    /// Every stop a source serves.
    pub fn stops(&self, tag: SourceTag) -> Query<Vec<Stop>> {
        match tag {
            SourceTag::Bustime => {
                let routes = self.routes(tag);
                self.derived(
                    "bustime stops",
                    query_key!(tag, "stops"),
                    &[routes.upstream()],
                    CachePolicy::default(),
                    move |deps| {
                        let routes = deps.get(&routes)?;
                        Ok(places::unique_stops(&routes))
                    },
                )
            }
            SourceTag::Campus => {
                let raw: Query<Vec<CampusStop>> =
                    self.source_payload(tag, "stops", self.static_policy());
                self.derived(
                    "campus stops",
                    query_key!(tag, "stops"),
                    &[raw.upstream()],
                    CachePolicy::default(),
                    move |deps| {
                        let raw = deps.get(&raw)?;
                        Ok(campus::stops(&raw))
                    },
                )
            }
        }
    }

    /// Live vehicle positions. Refreshes on the vehicles interval once
    /// [`Query::spawn_refetch`] is called.
    pub fn vehicles(&self, tag: SourceTag) -> Query<Vec<Bus>> {
        let policy = self.vehicles_policy();
        match tag {
            SourceTag::Bustime => {
                let raw: Query<Vec<BustimeVehicle>> = self.source_payload(tag, "vehicles", policy);
                self.derived(
                    "bustime vehicles",
                    query_key!(tag, "vehicles"),
                    &[raw.upstream()],
                    policy,
                    move |deps| {
                        let raw = deps.get(&raw)?;
                        Ok(bustime::vehicles(&raw))
                    },
                )
            }
            SourceTag::Campus => {
                let raw: Query<Vec<CampusVehicle>> = self.source_payload(tag, "vehicles", policy);
                self.derived(
                    "campus vehicles",
                    query_key!(tag, "vehicles"),
                    &[raw.upstream()],
                    policy,
                    move |deps| {
                        let raw = deps.get(&raw)?;
                        Ok(campus::vehicles(&raw))
                    },
                )
            }
        }
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Alerts raised in the context of `route`.
    pub fn alerts(&self, route: Option<&Route>) -> SourceSelector<Vec<Alert>> {
        let table = SourceTable::from_fn(|tag| {
            let route = route.filter(|route| route.source == tag)?;
            Some(self.source_alerts(tag, route.id.clone()))
        });
        SourceSelector::new(route.map(|r| r.source), table, Vec::new())
    }

    fn source_alerts(&self, tag: SourceTag, route: RouteIdentifier) -> Query<Vec<Alert>> {
        let routes = self.routes(tag);
        let key = query_key!(tag, "alerts", &route);

        match tag {
            SourceTag::Bustime => {
                let bulletins: Query<Vec<BustimeBulletin>> = self.payload(
                    Request {
                        source: "bustime",
                        base: self.base(tag),
                        resource: "bulletins",
                        params: vec![("rt", route.to_string())],
                        enabled: true,
                    },
                    self.estimates_policy(),
                );
                self.derived(
                    "bustime alerts",
                    key,
                    &[routes.upstream(), bulletins.upstream()],
                    CachePolicy::default(),
                    move |deps| {
                        let (bulletins, routes) = (deps.get(&bulletins)?, deps.get(&routes)?);
                        bustime::alerts(&bulletins, &routes, &route).map_err(QueryError::from)
                    },
                )
            }
            SourceTag::Campus => {
                let announcements: Query<Vec<CampusAnnouncement>> =
                    self.source_payload(tag, "announcements", self.estimates_policy());
                self.derived(
                    "campus alerts",
                    key,
                    &[routes.upstream(), announcements.upstream()],
                    CachePolicy::default(),
                    move |deps| {
                        let (announcements, routes) =
                            (deps.get(&announcements)?, deps.get(&routes)?);
                        campus::alerts(&announcements, &routes, &route).map_err(QueryError::from)
                    },
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::future::Future;
    use std::pin::Pin;

    use dashmap::DashMap;
    use ridealong_transit::models::types::TransitError;
    use ridealong_transit::network::DataFetcher;

    /// Serves bodies by URL path; query strings are ignored.
    #[derive(Default)]
    pub struct MemoryFetcher {
        bodies: DashMap<String, Vec<u8>>,
        hits: DashMap<String, usize>,
        outages: DashMap<String, usize>,
    }

    impl MemoryFetcher {
        pub fn with_json(self, path: &str, body: serde_json::Value) -> Self {
            self.bodies.insert(path.to_string(), body.to_string().into_bytes());
            self
        }

        pub fn with_raw(self, path: &str, body: &str) -> Self {
            self.bodies.insert(path.to_string(), body.as_bytes().to_vec());
            self
        }

        /// Time out the next `count` fetches of `path` before serving it.
        pub fn with_outage(self, path: &str, count: usize) -> Self {
            self.outages.insert(path.to_string(), count);
            self
        }

        pub fn hits(&self, path: &str) -> usize {
            self.hits.get(path).map(|hits| *hits.value()).unwrap_or(0)
        }
    }

    impl DataFetcher for MemoryFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
        ) -> Pin<Box<dyn Future<Output = ridealong_transit::Result<Vec<u8>>> + Send + 'a>> {
            let path = url.split('?').next().unwrap_or(url).to_string();
            *self.hits.entry(path.clone()).or_default() += 1;
            let down = match self.outages.get_mut(&path) {
                Some(mut left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            };
            let body = self.bodies.get(&path).map(|body| body.value().clone());

            Box::pin(async move {
                if down {
                    return Err(TransitError::Fetch {
                        url: path,
                        message: "timeout".to_string(),
                    });
                }
                body.ok_or_else(|| TransitError::Fetch {
                    url: path,
                    message: "404 Not Found".to_string(),
                })
            })
        }
    }
}
