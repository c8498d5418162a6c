//! Cached, dependency-ordered query execution.
//!
//! A [`Query`] runs its derivation only once it is enabled and every declared
//! upstream has succeeded. Results are cached per *effective key*: the
//! declared key extended with the version of each upstream's current value,
//! so a changed upstream value always lands in a fresh cache slot.
//!
//! Concurrent resolves of one effective key share a single in-flight
//! execution. Versions only advance when a settled value differs from the
//! value it replaces, which keeps downstream keys stable across refetches
//! that return the same data.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::{KeyPart, QueryKey, QueryObserver, QueryState, TracingObserver};
use crate::error::QueryError;

type Derivation<T> =
    Box<dyn Fn(Dependencies) -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

type Predicate = Box<dyn Fn() -> bool + Send + Sync>;

type Job<T> = Shared<BoxFuture<'static, Outcome<T>>>;

/// Bound shared by every value a query can hold.
pub trait QueryValue: PartialEq + Send + Sync + 'static {}

impl<T: PartialEq + Send + Sync + 'static> QueryValue for T {}

// ============================================================================
// Outcomes and slots
// ============================================================================

enum Outcome<T> {
    Ready { value: Arc<T>, version: u64 },
    Failed(QueryError),
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Ready { value, version } => Outcome::Ready {
                value: value.clone(),
                version: *version,
            },
            Outcome::Failed(error) => Outcome::Failed(error.clone()),
        }
    }
}

impl<T> From<Outcome<T>> for QueryState<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Ready { value, .. } => QueryState::Success(value),
            Outcome::Failed(error) => QueryState::Error(error),
        }
    }
}

struct Slot<T> {
    settled: Option<(Outcome<T>, Instant)>,
    in_flight: Option<Job<T>>,
    /// Set by invalidation; cleared when a new execution starts.
    stale: bool,
    /// Start order of the latest execution for this slot.
    sequence: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            settled: None,
            in_flight: None,
            stale: false,
            sequence: 0,
        }
    }
}

impl<T> Slot<T> {
    /// The settled value while it is inside the stale window. Failures are
    /// reported by `state` but never served as fresh, so the next resolve
    /// runs again.
    fn fresh(&self, stale_time: Option<Duration>) -> Option<Outcome<T>> {
        if self.stale {
            return None;
        }
        let (outcome, at) = self.settled.as_ref()?;
        match (outcome, stale_time) {
            (Outcome::Failed(_), _) => None,
            (_, Some(window)) if at.elapsed() >= window => None,
            _ => Some(outcome.clone()),
        }
    }
}

/// Why a query did not run.
enum Blocked {
    Idle,
    Pending,
    Failed(QueryError),
}

enum Resolution<T> {
    Blocked(Blocked),
    Settled(Outcome<T>),
}

impl<T> From<Resolution<T>> for QueryState<T> {
    fn from(resolution: Resolution<T>) -> Self {
        match resolution {
            Resolution::Blocked(Blocked::Idle) => QueryState::Idle,
            Resolution::Blocked(Blocked::Pending) => QueryState::Pending,
            Resolution::Blocked(Blocked::Failed(error)) => QueryState::Error(error),
            Resolution::Settled(outcome) => outcome.into(),
        }
    }
}

// ============================================================================
// Type-erased upstream edge
// ============================================================================

enum UpstreamState {
    Idle,
    Pending,
    Ready {
        version: u64,
        value: Arc<dyn Any + Send + Sync>,
    },
    Failed(QueryError),
}

impl<T: QueryValue> From<Resolution<T>> for UpstreamState {
    fn from(resolution: Resolution<T>) -> Self {
        match resolution {
            Resolution::Blocked(Blocked::Idle) => UpstreamState::Idle,
            Resolution::Blocked(Blocked::Pending) => UpstreamState::Pending,
            Resolution::Blocked(Blocked::Failed(error)) => UpstreamState::Failed(error),
            Resolution::Settled(Outcome::Ready { value, version }) => {
                UpstreamState::Ready { version, value }
            }
            Resolution::Settled(Outcome::Failed(error)) => UpstreamState::Failed(error),
        }
    }
}

trait Upstream: Send + Sync {
    /// `refresh_live` re-executes the upstream if it has a refetch interval.
    fn resolve_erased(self: Arc<Self>, refresh_live: bool) -> BoxFuture<'static, UpstreamState>;
    fn peek_erased(&self) -> UpstreamState;
}

/// A query of any value type, seen as an upstream edge.
#[derive(Clone)]
pub struct UpstreamQuery(Arc<dyn Upstream>);

fn identity<T: ?Sized>(ptr: &Arc<T>) -> usize {
    Arc::as_ptr(ptr) as *const () as usize
}

/// Upstream values handed to a derivation.
pub struct Dependencies {
    resolved: Vec<Resolved>,
}

struct Resolved {
    id: usize,
    value: Arc<dyn Any + Send + Sync>,
}

impl Dependencies {
    /// The current value of `query`, which must be a declared upstream.
    pub fn get<U: QueryValue>(&self, query: &Query<U>) -> Result<Arc<U>, QueryError> {
        let id = identity(&query.inner);
        self.resolved
            .iter()
            .find(|resolved| resolved.id == id)
            .and_then(|resolved| resolved.value.clone().downcast::<U>().ok())
            .ok_or_else(|| QueryError::UndeclaredDependency(query.inner.label.clone()))
    }
}

// ============================================================================
// Query
// ============================================================================

struct QueryInner<T> {
    label: Arc<str>,
    key: QueryKey,
    enabled: Predicate,
    upstream: Vec<Arc<dyn Upstream>>,
    stale_time: Option<Duration>,
    refetch_interval: Option<Duration>,
    derive: Derivation<T>,
    observer: Arc<dyn QueryObserver>,
    slots: DashMap<QueryKey, Slot<T>>,
    versions: AtomicU64,
    executions: AtomicU64,
}

/// A node in the query graph. Clones share one cache.
pub struct Query<T> {
    inner: Arc<QueryInner<T>>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: QueryValue> Query<T> {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn key(&self) -> &QueryKey {
        &self.inner.key
    }

    pub fn is_enabled(&self) -> bool {
        (self.inner.enabled)()
    }

    pub fn upstream(&self) -> UpstreamQuery {
        UpstreamQuery(self.inner.clone())
    }

    /// Resolve upstreams, then return the cached value for the resulting
    /// effective key, executing the derivation only when nothing fresh is
    /// cached.
    pub async fn resolve(&self) -> QueryState<T> {
        self.inner.clone().resolve(false).await.into()
    }

    /// Like [`resolve`](Self::resolve) but re-executes this query's own
    /// derivation even when the cache is fresh, along with every upstream
    /// that has a refetch interval of its own. Upstreams without one are
    /// resolved normally. An in-flight execution is joined rather than
    /// duplicated.
    pub async fn refresh(&self) -> QueryState<T> {
        self.inner.clone().resolve(true).await.into()
    }

    /// Current state without executing anything.
    pub fn state(&self) -> QueryState<T> {
        self.inner.peek().into()
    }

    /// Mark every cached outcome stale. In-flight executions keep running
    /// and their callers still receive their result.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    /// Refresh on the configured refetch interval until the query is
    /// dropped. `None` when no interval is configured.
    pub fn spawn_refetch(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.refetch_interval?;
        let weak: Weak<QueryInner<T>> = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !(inner.enabled)() {
                    continue;
                }
                debug!(label = %inner.label, "periodic refetch");
                inner.resolve(true).await;
            }
        }))
    }
}

impl<T: QueryValue> QueryInner<T> {
    async fn resolve(self: Arc<Self>, force: bool) -> Resolution<T> {
        if !(self.enabled)() {
            return Resolution::Blocked(Blocked::Idle);
        }

        let states = join_all(
            self.upstream
                .iter()
                .map(|upstream| upstream.clone().resolve_erased(force)),
        )
        .await;

        let (key, dependencies) = match self.gate(states) {
            Ok(open) => open,
            Err(blocked) => return Resolution::Blocked(blocked),
        };

        Resolution::Settled(self.execute(key, dependencies, force).await)
    }

    fn peek(&self) -> Resolution<T> {
        if !(self.enabled)() {
            return Resolution::Blocked(Blocked::Idle);
        }

        let states = self.upstream.iter().map(|u| u.peek_erased()).collect();
        let (key, _) = match self.gate(states) {
            Ok(open) => open,
            Err(blocked) => return Resolution::Blocked(blocked),
        };

        match self.slots.get(&key).and_then(|slot| slot.settled.clone()) {
            Some((outcome, _)) => Resolution::Settled(outcome),
            None => Resolution::Blocked(Blocked::Pending),
        }
    }

    /// Effective key and dependency values, or why execution is blocked.
    /// An upstream error takes precedence over idle or pending upstreams.
    fn gate(&self, states: Vec<UpstreamState>) -> Result<(QueryKey, Dependencies), Blocked> {
        if let Some(error) = states.iter().find_map(|state| match state {
            UpstreamState::Failed(error) => Some(error.clone()),
            _ => None,
        }) {
            return Err(Blocked::Failed(error));
        }

        let mut key = self.key.clone();
        let mut resolved = Vec::with_capacity(states.len());
        for (upstream, state) in self.upstream.iter().zip(states) {
            match state {
                UpstreamState::Ready { version, value } => {
                    key = key.with(KeyPart::Version(version));
                    resolved.push(Resolved {
                        id: identity(upstream),
                        value,
                    });
                }
                UpstreamState::Idle => return Err(Blocked::Idle),
                UpstreamState::Pending => return Err(Blocked::Pending),
                UpstreamState::Failed(error) => return Err(Blocked::Failed(error)),
            }
        }

        Ok((key, Dependencies { resolved }))
    }

    async fn execute(
        self: Arc<Self>,
        key: QueryKey,
        dependencies: Dependencies,
        force: bool,
    ) -> Outcome<T> {
        let job = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            if let Some(job) = &slot.in_flight {
                job.clone()
            } else if let Some(outcome) = slot.fresh(self.stale_time).filter(|_| !force) {
                return outcome;
            } else {
                let sequence = self.executions.fetch_add(1, Ordering::Relaxed) + 1;
                let job = self.start(key.clone(), sequence, dependencies);
                slot.in_flight = Some(job.clone());
                slot.stale = false;
                slot.sequence = sequence;
                job
            }
        };

        job.await
    }

    fn start(self: &Arc<Self>, key: QueryKey, sequence: u64, dependencies: Dependencies) -> Job<T> {
        self.observer.on_execute(&self.label, &key);

        let derivation = (self.derive)(dependencies);
        let weak = Arc::downgrade(self);
        let started = Instant::now();

        async move {
            let result = derivation.await;
            match weak.upgrade() {
                Some(inner) => inner.settle(&key, sequence, result, started.elapsed()),
                // Query dropped mid-flight; nothing left to cache into
                None => match result {
                    Ok(value) => Outcome::Ready {
                        value: Arc::new(value),
                        version: 0,
                    },
                    Err(error) => Outcome::Failed(error),
                },
            }
        }
        .boxed()
        .shared()
    }

    fn settle(
        &self,
        key: &QueryKey,
        sequence: u64,
        result: Result<T, QueryError>,
        elapsed: Duration,
    ) -> Outcome<T> {
        let outcome = {
            let mut slot = self.slots.entry(key.clone()).or_default();

            let outcome = match result {
                Ok(value) => {
                    self.observer.on_success(&self.label, key, elapsed);
                    match &slot.settled {
                        Some((Outcome::Ready { value: previous, version }, _))
                            if **previous == value =>
                        {
                            Outcome::Ready {
                                value: previous.clone(),
                                version: *version,
                            }
                        }
                        _ => Outcome::Ready {
                            value: Arc::new(value),
                            version: self.versions.fetch_add(1, Ordering::Relaxed) + 1,
                        },
                    }
                }
                Err(error) => {
                    self.observer.on_failure(&self.label, key, &error);
                    Outcome::Failed(error)
                }
            };

            slot.settled = Some((outcome.clone(), Instant::now()));
            slot.in_flight = None;
            outcome
        };

        // Slots for superseded upstream values are never read again. A slot
        // started after this job already sees newer upstreams, so it stays.
        self.slots.retain(|slot_key, slot| {
            slot_key == key || slot.in_flight.is_some() || slot.sequence > sequence
        });

        outcome
    }
}

impl<T: QueryValue> Upstream for QueryInner<T> {
    fn resolve_erased(self: Arc<Self>, refresh_live: bool) -> BoxFuture<'static, UpstreamState> {
        let force = refresh_live && self.refetch_interval.is_some();
        async move { self.resolve(force).await.into() }.boxed()
    }

    fn peek_erased(&self) -> UpstreamState {
        self.peek().into()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Declares a query: key, upstreams, predicate and cache policy.
pub struct QueryBuilder<T> {
    label: Arc<str>,
    key: QueryKey,
    enabled: Option<Predicate>,
    upstream: Vec<Arc<dyn Upstream>>,
    stale_time: Option<Duration>,
    refetch_interval: Option<Duration>,
    observer: Arc<dyn QueryObserver>,
    _value: PhantomData<fn() -> T>,
}

impl<T: QueryValue> QueryBuilder<T> {
    pub fn new(label: impl Into<Arc<str>>, key: QueryKey) -> Self {
        Self {
            label: label.into(),
            key,
            enabled: None,
            upstream: Vec::new(),
            stale_time: None,
            refetch_interval: None,
            observer: Arc::new(TracingObserver),
            _value: PhantomData,
        }
    }

    pub fn observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Declare `query` as upstream. Its current value becomes part of the
    /// effective key and is readable through [`Dependencies::get`].
    pub fn depends_on<U: QueryValue>(mut self, query: &Query<U>) -> Self {
        self.upstream.push(query.inner.clone());
        self
    }

    /// [`depends_on`](Self::depends_on) for upstreams of mixed value types.
    pub fn depends_on_all<'a>(mut self, upstream: impl IntoIterator<Item = &'a UpstreamQuery>) -> Self {
        self.upstream
            .extend(upstream.into_iter().map(|edge| edge.0.clone()));
        self
    }

    /// Always enabled unless a predicate is given.
    pub fn enabled(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.enabled = Some(Box::new(predicate));
        self
    }

    /// How long a settled outcome stays fresh. Without one, outcomes stay
    /// fresh until invalidated or refreshed.
    pub fn stale_time(mut self, window: Duration) -> Self {
        self.stale_time = Some(window);
        self
    }

    pub fn refetch_interval(mut self, period: Duration) -> Self {
        self.refetch_interval = Some(period);
        self
    }

    pub fn build<F, Fut>(self, derive: F) -> Query<T>
    where
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let derive: Derivation<T> = Box::new(move |dependencies| derive(dependencies).boxed());

        Query {
            inner: Arc::new(QueryInner {
                label: self.label,
                key: self.key,
                enabled: self.enabled.unwrap_or_else(|| Box::new(|| true)),
                upstream: self.upstream,
                stale_time: self.stale_time,
                refetch_interval: self.refetch_interval,
                derive,
                observer: self.observer,
                slots: DashMap::new(),
                versions: AtomicU64::new(0),
                executions: AtomicU64::new(0),
            }),
        }
    }
}

// ============================================================================
// Registry view
// ============================================================================

/// What the client registry needs from a query of any value type.
pub(crate) trait ErasedQuery: Send + Sync {
    fn invalidate(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: QueryValue> ErasedQuery for QueryInner<T> {
    fn invalidate(&self) {
        for mut slot in self.slots.iter_mut() {
            slot.stale = true;
        }
        debug!(label = %self.label, "query invalidated");
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: QueryValue> Query<T> {
    pub(crate) fn erased(&self) -> Arc<dyn ErasedQuery> {
        self.inner.clone()
    }

    pub(crate) fn from_erased(erased: Arc<dyn ErasedQuery>) -> Option<Self> {
        erased
            .into_any()
            .downcast::<QueryInner<T>>()
            .ok()
            .map(|inner| Query { inner })
    }
}
