//! Start-up and shutdown of a [Pool] with its replenisher.

use crate::{replenisher::Replenisher, Config, Error, Pool};
use bytes::BytesMut;
use futures::channel::oneshot;
use prometheus_client::registry::Registry;
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{runtime, task::JoinHandle};
use tracing::{debug, warn};

/// A warmed [Pool] kept topped up by an optional background replenisher.
///
/// # Example
///
/// ```rust
/// use commonware_pool::{Config, Factory};
/// use prometheus_client::registry::Registry;
/// use std::time::Duration;
///
/// let cfg = Config {
///     replenish_interval: Duration::ZERO,
///     ..Default::default()
/// };
/// let factory = Factory::start(cfg, &mut Registry::default()).unwrap();
/// let buf = factory.pool().request(1024);
/// factory.pool().release(buf);
/// ```
pub struct Factory {
    pool: Pool,
    replenished: Arc<AtomicUsize>,
    replenisher: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl Factory {
    /// Validates `cfg`, warms a new pool with `min_buffers` buffers of
    /// `min_buffer_size` bytes and, if `replenish_interval` is non-zero, spawns
    /// the replenisher on the current Tokio runtime.
    ///
    /// Warm-up does not count towards the pool's counters.
    ///
    /// # Errors
    ///
    /// Returns the first invalid configuration value, or
    /// [Error::MissingRuntime] if a replenisher is requested outside of a
    /// Tokio runtime. Nothing is allocated or spawned on error.
    pub fn start(cfg: Config, registry: &mut Registry) -> Result<Self, Error> {
        cfg.validate()?;
        // Zero values were rejected by validate, so these never fail
        let max_classes =
            NonZeroUsize::new(cfg.max_distinct_sizes).ok_or(Error::ZeroMaxDistinctSizes)?;
        let samples = NonZeroUsize::new(cfg.samples).ok_or(Error::ZeroSamples)?;
        let replenish = !cfg.replenish_interval.is_zero();
        if replenish && runtime::Handle::try_current().is_err() {
            return Err(Error::MissingRuntime);
        }

        let pool = Pool::new(cfg.buffers_per_size, max_classes, samples, registry);
        for _ in 0..cfg.min_buffers {
            pool.seed(BytesMut::with_capacity(cfg.min_buffer_size));
        }
        pool.reset_counters();

        let replenished = Arc::new(AtomicUsize::new(0));
        let replenisher = replenish.then(|| {
            let (stop, stopped) = oneshot::channel();
            let handle = Replenisher::new(
                pool.clone(),
                cfg.replenish_interval,
                cfg.min_buffers,
                cfg.min_buffer_size,
                cfg.max_buffer_size,
                replenished.clone(),
                registry,
            )
            .start(stopped);
            (stop, handle)
        });
        debug!(
            min_buffers = cfg.min_buffers,
            min_buffer_size = cfg.min_buffer_size,
            replenisher = replenisher.is_some(),
            "started buffer factory"
        );

        Ok(Self {
            pool,
            replenished,
            replenisher,
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Buffers created by the replenisher since start (or the last reset).
    pub fn replenished(&self) -> usize {
        self.replenished.load(Ordering::Relaxed)
    }

    /// Zeroes the pool's counters and the replenished count.
    pub fn reset_counters(&self) {
        self.replenished.store(0, Ordering::Relaxed);
        self.pool.reset_counters();
    }

    /// Returns true if a replenisher is running.
    pub fn is_replenishing(&self) -> bool {
        self.replenisher.is_some()
    }

    /// Stops the replenisher and waits for it to exit.
    ///
    /// No tick runs once this returns. Safe to call more than once, or when no
    /// replenisher was started. Pooled buffers remain usable.
    pub async fn close(&mut self) {
        let Some((stop, handle)) = self.replenisher.take() else {
            return;
        };
        let _ = stop.send(());
        if let Err(err) = handle.await {
            warn!(?err, "replenisher exited abnormally");
        }
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("pool", &self.pool)
            .field("replenished", &self.replenished())
            .field("replenishing", &self.is_replenishing())
            .finish()
    }
}
