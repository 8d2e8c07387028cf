//! Size-classed pool of reusable byte buffers.
//!
//! # Size Classes
//!
//! Unlike pools with a fixed ladder of classes, a class is created on demand
//! for every distinct capacity that is seeded or released, and removed the
//! moment its last buffer is handed out. Classes are kept sorted by capacity so
//! lookups are a binary search.
//!
//! # Storage
//!
//! Pooled buffers are always stored "full" (`len == capacity`) and trimmed to
//! the requested length when handed out. The length of a released buffer is
//! recorded as a usage sample before it is normalized.
//!
//! # Thread Safety
//!
//! [Pool] is `Send + Sync` and cheap to clone. A single mutex serializes all
//! operations (including counter reads and usage sampling).

use crate::{
    bucket::Bucket,
    stats::{RollingStats, Summary},
};
use bytes::BytesMut;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::{
    fmt::Write as _,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};
use tracing::trace;

/// Outcome counters of released buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Returned {
    /// Buffers stored into an existing class of the same capacity.
    pub hit: usize,
    /// Buffers that required a new class.
    pub miss: usize,
}

/// Label for pool metrics, identifying the size class.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct SizeClassLabel {
    size_class: u64,
}

/// Metrics for the pool.
///
/// These mirror the in-pool counters but are never reset.
struct PoolMetrics {
    /// Requests served from a pooled buffer.
    hits: Counter,
    /// Requests that required a fresh allocation.
    misses: Counter,
    /// Released buffers stored into an existing class.
    return_hits: Counter,
    /// Released buffers that created a new class.
    return_misses: Counter,
    /// Seeded or released buffers refused at the size class limit.
    refused: Counter,
    /// Number of buffers currently pooled.
    pooled: Gauge,
    /// Number of distinct size classes.
    classes: Gauge,
    /// Number of buffers available per size class.
    available: Family<SizeClassLabel, Gauge>,
}

impl PoolMetrics {
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            hits: Counter::default(),
            misses: Counter::default(),
            return_hits: Counter::default(),
            return_misses: Counter::default(),
            refused: Counter::default(),
            pooled: Gauge::default(),
            classes: Gauge::default(),
            available: Family::default(),
        };

        registry.register(
            "buffer_pool_hits",
            "Total number of requests served from the pool",
            metrics.hits.clone(),
        );
        registry.register(
            "buffer_pool_misses",
            "Total number of requests that required a fresh allocation",
            metrics.misses.clone(),
        );
        registry.register(
            "buffer_pool_return_hits",
            "Total number of released buffers stored into an existing size class",
            metrics.return_hits.clone(),
        );
        registry.register(
            "buffer_pool_return_misses",
            "Total number of released buffers that created a new size class",
            metrics.return_misses.clone(),
        );
        registry.register(
            "buffer_pool_refused",
            "Total number of buffers dropped because the size class limit was reached",
            metrics.refused.clone(),
        );
        registry.register(
            "buffer_pool_pooled",
            "Number of buffers currently held by the pool",
            metrics.pooled.clone(),
        );
        registry.register(
            "buffer_pool_classes",
            "Number of distinct size classes currently held by the pool",
            metrics.classes.clone(),
        );
        registry.register(
            "buffer_pool_available",
            "Number of buffers available in each size class",
            metrics.available.clone(),
        );

        metrics
    }
}

/// How a buffer entered the pool.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Insert {
    /// Warm-up or replenishment, not counted as traffic.
    Seed,
    /// Released by a caller.
    Release,
}

/// State guarded by the pool mutex.
struct State {
    /// Buckets sorted by strictly ascending size.
    buckets: Vec<Bucket>,
    /// Total buffers across all buckets.
    count: usize,
    alloc_hit: usize,
    alloc_miss: usize,
    return_hit: usize,
    return_miss: usize,
    stats: RollingStats,
}

impl State {
    /// Pops from the bucket at `index`, dropping the bucket if this empties it.
    fn pop(&mut self, index: usize, metrics: &PoolMetrics) -> Option<BytesMut> {
        let mut emptied = false;
        let buf = self.buckets[index].pop(|| emptied = true);
        let label = SizeClassLabel {
            size_class: self.buckets[index].size() as u64,
        };
        if buf.is_some() {
            self.count -= 1;
            metrics.pooled.dec();
            metrics.available.get_or_create(&label).dec();
        }
        if emptied {
            self.buckets.remove(index);
            metrics.classes.set(self.buckets.len() as i64);
            metrics.available.remove(&label);
            trace!(size = label.size_class, "removed size class");
        }
        buf
    }
}

struct Inner {
    state: Mutex<State>,
    seed_capacity: usize,
    max_classes: usize,
    metrics: PoolMetrics,
}

/// A mutex-guarded, size-sorted collection of buffer classes.
///
/// Requests are served from the nearest class that can hold them and fall back
/// to a fresh allocation when the pool cannot help. Released buffers are kept
/// in a class matching their exact capacity.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("seed_capacity", &self.inner.seed_capacity)
            .field("max_classes", &self.inner.max_classes)
            .field("count", &self.count())
            .finish()
    }
}

impl Pool {
    /// Creates an empty pool.
    ///
    /// Each new size class reserves room for `seed_capacity` buffers. At most
    /// `max_classes` distinct capacities are held at once (this bounds the
    /// variety of sizes, not the number of buffers). `samples` bounds the usage
    /// window recorded by [Pool::release].
    pub fn new(
        seed_capacity: usize,
        max_classes: NonZeroUsize,
        samples: NonZeroUsize,
        registry: &mut Registry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    buckets: Vec::new(),
                    count: 0,
                    alloc_hit: 0,
                    alloc_miss: 0,
                    return_hit: 0,
                    return_miss: 0,
                    stats: RollingStats::new(samples),
                }),
                seed_capacity,
                max_classes: max_classes.get(),
                metrics: PoolMetrics::new(registry),
            }),
        }
    }

    /// Adds a buffer without counting it as returned traffic.
    ///
    /// Zero-capacity buffers are ignored. Once the pool holds `max_classes`
    /// distinct size classes, every buffer is dropped (even one matching an
    /// existing class) until a class is emptied by [Pool::request].
    pub fn seed(&self, buf: BytesMut) {
        if buf.capacity() == 0 {
            return;
        }
        let mut state = self.inner.state.lock().unwrap();
        self.insert(&mut state, buf, Insert::Seed);
    }

    /// Gives a buffer back to the pool.
    ///
    /// The buffer's length is recorded as a usage sample, then the buffer is
    /// stored at its full capacity. Zero-capacity buffers are sampled but not
    /// stored. Subject to the same class limit as [Pool::seed].
    pub fn release(&self, buf: BytesMut) {
        let mut state = self.inner.state.lock().unwrap();
        state.stats.record(buf.len() as i64);
        if buf.capacity() == 0 {
            return;
        }
        self.insert(&mut state, buf, Insert::Release);
    }

    fn insert(&self, state: &mut State, mut buf: BytesMut, kind: Insert) {
        let metrics = &self.inner.metrics;
        let size = buf.capacity();
        // At the limit nothing is accepted, not even into an existing class
        if !state.buckets.is_empty() && state.buckets.len() >= self.inner.max_classes {
            metrics.refused.inc();
            trace!(size, "refused buffer: size class limit reached");
            return;
        }
        let index = state.buckets.partition_point(|bucket| bucket.size() < size);
        let exact = index < state.buckets.len() && state.buckets[index].size() == size;
        if !exact {
            state
                .buckets
                .insert(index, Bucket::new(size, self.inner.seed_capacity));
            metrics.classes.set(state.buckets.len() as i64);
            trace!(size, "created size class");
        }

        // Stored buffers are always full
        buf.resize(size, 0);
        state.buckets[index].push(buf);
        state.count += 1;
        metrics.pooled.inc();
        metrics
            .available
            .get_or_create(&SizeClassLabel {
                size_class: size as u64,
            })
            .inc();

        match (kind, exact) {
            (Insert::Seed, _) => {}
            (Insert::Release, true) => {
                state.return_hit += 1;
                metrics.return_hits.inc();
            }
            (Insert::Release, false) => {
                state.return_miss += 1;
                metrics.return_misses.inc();
            }
        }
    }

    /// Returns a buffer of length `size`.
    ///
    /// Selection, in order:
    /// 1. A class of exactly `size`.
    /// 2. Otherwise, if classes larger than `size` exist, the second-smallest of
    ///    them (or the smallest, if it is the only one), trimmed to `size`.
    /// 3. Otherwise a fresh zeroed allocation. If any class exists, a buffer
    ///    is still taken from the largest one and discarded.
    ///
    /// The contents of a pooled buffer are whatever its last user left behind.
    /// `request(0)` returns an empty buffer and touches no counters.
    pub fn request(&self, size: usize) -> BytesMut {
        if size == 0 {
            return BytesMut::new();
        }
        let metrics = &self.inner.metrics;
        let mut state = self.inner.state.lock().unwrap();
        let len = state.buckets.len();
        let index = state.buckets.partition_point(|bucket| bucket.size() < size);
        let chosen = if index < len && state.buckets[index].size() == size {
            Some(index)
        } else if index < len {
            // Leave the tightest class for requests of its exact size
            Some(if index + 1 < len { index + 1 } else { index })
        } else if len > 0 {
            Some(len - 1)
        } else {
            None
        };

        match chosen.and_then(|index| state.pop(index, metrics)) {
            Some(mut buf) if buf.capacity() >= size => {
                state.alloc_hit += 1;
                metrics.hits.inc();
                buf.truncate(size);
                buf
            }
            _ => {
                // A buffer popped from a class that is too small is discarded
                state.alloc_miss += 1;
                metrics.misses.inc();
                BytesMut::zeroed(size)
            }
        }
    }

    /// Number of buffers currently pooled.
    pub fn count(&self) -> usize {
        self.inner.state.lock().unwrap().count
    }

    /// Number of distinct size classes currently pooled.
    pub fn classes(&self) -> usize {
        self.inner.state.lock().unwrap().buckets.len()
    }

    /// Requests served from the pool since the last reset.
    pub fn hits(&self) -> usize {
        self.inner.state.lock().unwrap().alloc_hit
    }

    /// Requests that required a fresh allocation since the last reset.
    pub fn misses(&self) -> usize {
        self.inner.state.lock().unwrap().alloc_miss
    }

    /// Release outcomes since the last reset.
    pub fn returned(&self) -> Returned {
        let state = self.inner.state.lock().unwrap();
        Returned {
            hit: state.return_hit,
            miss: state.return_miss,
        }
    }

    /// Zeroes all request and release counters. Pooled buffers are untouched.
    pub fn reset_counters(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.alloc_hit = 0;
        state.alloc_miss = 0;
        state.return_hit = 0;
        state.return_miss = 0;
    }

    /// Aggregates over the recorded usage window.
    pub fn stats(&self) -> Summary {
        self.inner.state.lock().unwrap().stats.summary()
    }

    /// Per-class occupancy followed by a usage summary, for diagnostics.
    pub fn debug_dump(&self) -> String {
        let state = self.inner.state.lock().unwrap();
        let mut out = String::new();
        for (i, bucket) in state.buckets.iter().enumerate() {
            let _ = writeln!(out, "{i} - {bucket}");
        }
        let _ = writeln!(out, "{}", state.stats.summary());
        out
    }
}
