//! Background task that tops a [Pool] back up to a minimum buffer count.

use crate::Pool;
use bytes::BytesMut;
use futures::channel::oneshot;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::debug;

/// Periodically seeds a [Pool] with buffers sized from observed usage.
///
/// On every tick, if the pool holds fewer than `min_buffers`, the deficit is
/// seeded with buffers of `min_size` bytes, or of the mean recorded usage
/// (rounded up) when that lies in `(min_size, max_size]`.
pub(crate) struct Replenisher {
    pool: Pool,
    interval: Duration,
    min_buffers: usize,
    min_size: usize,
    max_size: usize,
    replenished: Arc<AtomicUsize>,
    replenished_total: Counter,
}

impl Replenisher {
    pub(crate) fn new(
        pool: Pool,
        interval: Duration,
        min_buffers: usize,
        min_size: usize,
        max_size: usize,
        replenished: Arc<AtomicUsize>,
        registry: &mut Registry,
    ) -> Self {
        let replenished_total = Counter::default();
        registry.register(
            "buffer_pool_replenished",
            "Total number of buffers created by the replenisher",
            replenished_total.clone(),
        );
        Self {
            pool,
            interval,
            min_buffers,
            min_size,
            max_size,
            replenished,
            replenished_total,
        }
    }

    /// Spawns the replenisher on the current Tokio runtime.
    ///
    /// The task exits once `stop` resolves (or its sender is dropped). A tick
    /// that has already begun completes first.
    pub(crate) fn start(self, stop: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) {
        debug!(interval = ?self.interval, min_buffers = self.min_buffers, "replenisher started");
        loop {
            tokio::select! {
                biased;

                _ = &mut stop => {
                    debug!("replenisher stopped");
                    return;
                },
                _ = tokio::time::sleep(self.interval) => {
                    self.tick();
                },
            }
        }
    }

    /// Capacity of replenished buffers given the mean recorded usage.
    fn target_size(&self, mean: f64) -> usize {
        let average = mean.ceil();
        if average > self.min_size as f64 && average <= self.max_size as f64 {
            average as usize
        } else {
            self.min_size
        }
    }

    /// Seeds the current deficit and returns how many buffers were created.
    pub(crate) fn tick(&self) -> usize {
        let deficit = self.min_buffers.saturating_sub(self.pool.count());
        if deficit == 0 {
            return 0;
        }
        let size = self.target_size(self.pool.stats().mean);
        for _ in 0..deficit {
            self.pool.seed(BytesMut::with_capacity(size));
        }
        self.replenished.fetch_add(deficit, Ordering::Relaxed);
        self.replenished_total.inc_by(deficit as u64);
        debug!(deficit, size, "replenished pool");
        deficit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn nz(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).unwrap()
    }

    fn setup(min_buffers: usize, min_size: usize, max_size: usize) -> (Pool, Replenisher) {
        let mut registry = Registry::default();
        let pool = Pool::new(8, nz(16), nz(100), &mut registry);
        let replenisher = Replenisher::new(
            pool.clone(),
            Duration::from_millis(10),
            min_buffers,
            min_size,
            max_size,
            Arc::new(AtomicUsize::new(0)),
            &mut registry,
        );
        (pool, replenisher)
    }

    /// Records `len` bytes of usage without leaving the buffer in the pool.
    fn record_usage(pool: &Pool, capacity: usize, len: usize) {
        let mut buf = BytesMut::with_capacity(capacity);
        buf.resize(len, 0);
        pool.release(buf);
        let _ = pool.request(capacity);
    }

    #[test]
    fn test_tick_no_deficit() {
        let (pool, replenisher) = setup(2, 256, 1024);
        pool.seed(BytesMut::with_capacity(256));
        pool.seed(BytesMut::with_capacity(256));
        assert_eq!(replenisher.tick(), 0);
        assert_eq!(pool.count(), 2);
        assert_eq!(replenisher.replenished.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_tick_fills_deficit_with_min_size() {
        let (pool, replenisher) = setup(4, 256, 1024);
        pool.seed(BytesMut::with_capacity(256));
        assert_eq!(replenisher.tick(), 3);
        assert_eq!(pool.count(), 4);
        assert_eq!(pool.classes(), 1);
        assert_eq!(replenisher.replenished.load(Ordering::Relaxed), 3);
        assert_eq!(pool.request(256).capacity(), 256);
    }

    #[test]
    fn test_tick_sizes_from_usage() {
        let (pool, replenisher) = setup(3, 256, 1024);
        record_usage(&pool, 512, 299);
        record_usage(&pool, 512, 300);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.stats().mean, 299.5);

        assert_eq!(replenisher.tick(), 3);
        assert_eq!(pool.count(), 3);
        let buf = pool.request(300);
        assert_eq!(buf.capacity(), 300);
        assert_eq!(pool.hits(), 3);
    }

    #[test]
    fn test_target_size_bounds() {
        let (_, replenisher) = setup(1, 256, 1024);
        assert_eq!(replenisher.target_size(0.0), 256);
        assert_eq!(replenisher.target_size(256.0), 256);
        assert_eq!(replenisher.target_size(256.2), 257);
        assert_eq!(replenisher.target_size(1024.0), 1024);
        assert_eq!(replenisher.target_size(1024.5), 256);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stopped() {
        let (pool, replenisher) = setup(5, 64, 128);
        let replenished = replenisher.replenished.clone();
        let (stop, stopped) = oneshot::channel();
        let handle = replenisher.start(stopped);

        // Nothing happens before the first tick
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(pool.count(), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.count(), 5);
        assert_eq!(replenished.load(Ordering::Relaxed), 5);

        // Drain and let another tick refill
        for _ in 0..5 {
            let _ = pool.request(64);
        }
        assert_eq!(pool.count(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.count(), 5);

        stop.send(()).unwrap();
        handle.await.unwrap();

        // No tick runs after the task has exited
        for _ in 0..5 {
            let _ = pool.request(64);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.count(), 0);
        assert_eq!(replenished.load(Ordering::Relaxed), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_sender_dropped() {
        let (_pool, replenisher) = setup(1, 64, 128);
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = replenisher.start(stopped);
        drop(stop);
        handle.await.unwrap();
    }
}
