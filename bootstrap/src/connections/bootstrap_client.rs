use super::BootstrapConnections;
use crate::{bootstrap_limits, transport::BootstrapChannel};
#[cfg(test)]
use mock_instant::thread_local::Instant;
use std::{
    fmt::Display,
    net::SocketAddrV6,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
#[cfg(not(test))]
use std::time::Instant;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BootstrapClientId(u64);

impl BootstrapClientId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for BootstrapClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A connection to a bootstrap peer and its throughput
pub struct BootstrapClient {
    id: BootstrapClientId,
    observer: Weak<BootstrapConnections>,
    channel: Arc<dyn BootstrapChannel>,
    block_count: AtomicU64,
    block_rate: AtomicU64,
    pending_stop: AtomicBool,
    hard_stop: AtomicBool,
    start_time: Mutex<Instant>,
    last_sample: Mutex<RateSample>,
}

struct RateSample {
    time: Instant,
    block_count: u64,
}

impl BootstrapClient {
    /// The pool counts the client as a live connection until it is dropped
    pub fn new(observer: &Arc<BootstrapConnections>, channel: Arc<dyn BootstrapChannel>) -> Self {
        observer.bootstrap_client_created();
        Self::new_unobserved(Arc::downgrade(observer), channel)
    }

    fn new_unobserved(
        observer: Weak<BootstrapConnections>,
        channel: Arc<dyn BootstrapChannel>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: BootstrapClientId::next(),
            observer,
            channel,
            block_count: AtomicU64::new(0),
            block_rate: AtomicU64::new(0f64.to_bits()),
            pending_stop: AtomicBool::new(false),
            hard_stop: AtomicBool::new(false),
            start_time: Mutex::new(now),
            last_sample: Mutex::new(RateSample {
                time: now,
                block_count: 0,
            }),
        }
    }

    pub fn id(&self) -> BootstrapClientId {
        self.id
    }

    /// Blocks per second since the previous sample
    pub fn sample_block_rate(&self) -> f64 {
        let now = Instant::now();
        let block_count = self.block_count();
        let mut last = self.last_sample.lock().unwrap();
        let elapsed = now
            .duration_since(last.time)
            .as_secs_f64()
            .max(bootstrap_limits::BOOTSTRAP_MINIMUM_ELAPSED_SECONDS_BLOCKRATE);
        let new_block_rate = block_count.saturating_sub(last.block_count) as f64 / elapsed;
        *last = RateSample {
            time: now,
            block_count,
        };
        self.block_rate
            .store(new_block_rate.to_bits(), Ordering::SeqCst);
        new_block_rate
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.lock().unwrap().elapsed()
    }

    pub fn set_start_time(&self) {
        let now = Instant::now();
        *self.start_time.lock().unwrap() = now;
        *self.last_sample.lock().unwrap() = RateSample {
            time: now,
            block_count: self.block_count(),
        };
    }

    /// Returns the previous block count
    pub fn inc_block_count(&self) -> u64 {
        self.block_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn block_count(&self) -> u64 {
        self.block_count.load(Ordering::SeqCst)
    }

    pub fn block_rate(&self) -> f64 {
        f64::from_bits(self.block_rate.load(Ordering::SeqCst))
    }

    pub fn pending_stop(&self) -> bool {
        self.pending_stop.load(Ordering::SeqCst)
    }

    pub fn hard_stop(&self) -> bool {
        self.hard_stop.load(Ordering::SeqCst)
    }

    /// A graceful stop lets the current response finish, a forced stop closes the channel
    pub fn stop(&self, force: bool) {
        self.pending_stop.store(true, Ordering::SeqCst);
        if force {
            self.hard_stop.store(true, Ordering::SeqCst);
            self.close();
        }
    }

    pub fn close(&self) {
        self.channel.close();
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.channel.set_timeout(timeout);
    }

    pub fn remote_addr(&self) -> SocketAddrV6 {
        self.channel.remote_addr()
    }

    pub fn channel(&self) -> &Arc<dyn BootstrapChannel> {
        &self.channel
    }

    pub fn channel_string(&self) -> String {
        self.channel.to_string()
    }
}

impl Drop for BootstrapClient {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.upgrade() {
            observer.bootstrap_client_closed();
        }
    }
}
