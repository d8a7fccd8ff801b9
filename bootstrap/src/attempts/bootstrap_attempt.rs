use super::BootstrapMode;
use crate::{bootstrap_limits, connections::BootstrapConnections};
use rsban_core::{Block, UncheckedInfo};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// State shared by all bootstrap modes
pub struct BootstrapAttempt {
    pub id: String,
    pub incremental_id: u64,
    pub mode: BootstrapMode,
    pub mutex: Mutex<()>,
    pub condition: Condvar,
    stopped: AtomicBool,
    pub pulling: AtomicU32,
    pub total_blocks: AtomicU64,
    pub requeued_pulls: AtomicU32,
    pub frontiers_received: AtomicBool,
    pub started: AtomicBool,
    attempt_start: Instant,
    next_log: Mutex<Instant>,
    pub(crate) connections: Arc<BootstrapConnections>,
}

impl BootstrapAttempt {
    pub fn new(
        id: String,
        incremental_id: u64,
        mode: BootstrapMode,
        connections: Arc<BootstrapConnections>,
    ) -> Self {
        let id = if id.is_empty() {
            format!("{:016X}", rand::random::<u64>())
        } else {
            id
        };
        debug!("Starting {} bootstrap attempt with ID {}", mode.as_str(), id);
        let now = Instant::now();
        Self {
            id,
            incremental_id,
            mode,
            mutex: Mutex::new(()),
            condition: Condvar::new(),
            stopped: AtomicBool::new(false),
            pulling: AtomicU32::new(0),
            total_blocks: AtomicU64::new(0),
            requeued_pulls: AtomicU32::new(0),
            frontiers_received: AtomicBool::new(false),
            started: AtomicBool::new(false),
            attempt_start: now,
            next_log: Mutex::new(now),
            connections,
        }
    }

    pub fn stop(&self) {
        {
            let _guard = self.mutex.lock().unwrap();
            self.stopped.store(true, Ordering::SeqCst);
        }
        self.condition.notify_all();
        self.connections.clear_pulls(self.incremental_id);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns true if the attempt wasn't started before
    pub fn set_started(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    pub fn still_pulling(&self) -> bool {
        !self.stopped() && self.pulling() > 0
    }

    pub fn pulling(&self) -> u32 {
        self.pulling.load(Ordering::SeqCst)
    }

    pub fn pull_started(&self) {
        {
            let _guard = self.mutex.lock().unwrap();
            self.pulling.fetch_add(1, Ordering::SeqCst);
        }
        self.condition.notify_all();
    }

    pub fn pull_finished(&self) {
        {
            let _guard = self.mutex.lock().unwrap();
            let previous = self.pulling.fetch_sub(1, Ordering::SeqCst);
            debug_assert!(previous > 0);
        }
        self.condition.notify_all();
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks.load(Ordering::SeqCst)
    }

    pub fn inc_total_blocks(&self) {
        self.total_blocks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn requeued_pulls(&self) -> u32 {
        self.requeued_pulls.load(Ordering::SeqCst)
    }

    pub fn inc_requeued_pulls(&self) {
        self.requeued_pulls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn duration(&self) -> Duration {
        self.attempt_start.elapsed()
    }

    /// At most once every 15 seconds
    pub fn should_log(&self) -> bool {
        let mut next_log = self.next_log.lock().unwrap();
        let now = Instant::now();
        if *next_log <= now {
            *next_log = now + Duration::from_secs(15);
            true
        } else {
            false
        }
    }

    pub fn notify(&self) {
        self.condition.notify_all();
    }

    /// Block sink of legacy and wallet bootstrap.
    /// Returns true if the pull reached blocks that are already known.
    pub fn process_block(&self, block: Block, pull_blocks_processed: u64) -> bool {
        if pull_blocks_processed % bootstrap_limits::PULL_COUNT_PER_CHECK == 0
            && self.connections.ledger.block_or_pruned_exists(&block.hash())
        {
            true
        } else {
            self.connections
                .block_processor
                .add(UncheckedInfo::new(block));
            false
        }
    }

    /// Waits until the pool can hand out a connection. A pool without peers
    /// stops this attempt, in which case false is returned.
    pub fn wait_for_peer(&self) -> bool {
        while !self.stopped() {
            if let Some(client) = self.connections.connection(Some(self), true) {
                self.connections.pool_connection(client, false, true);
                return true;
            }
            if self.connections.is_stopped() {
                self.stop();
                break;
            }
            let guard = self.mutex.lock().unwrap();
            if !self.stopped() {
                drop(
                    self.condition
                        .wait_timeout(guard, Duration::from_millis(100))
                        .unwrap(),
                );
            }
        }
        false
    }
}

impl Drop for BootstrapAttempt {
    fn drop(&mut self) {
        debug!(
            "Exiting {} bootstrap attempt with ID {}",
            self.mode.as_str(),
            self.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connections::test_fixture::ConnectionsFixture, pulls::PullInfo};

    fn create_attempt(fixture: &ConnectionsFixture, id: &str) -> BootstrapAttempt {
        BootstrapAttempt::new(
            id.to_string(),
            1,
            BootstrapMode::Legacy,
            Arc::clone(&fixture.connections),
        )
    }

    #[test]
    fn random_id_when_none_given() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        assert_eq!(attempt.id.len(), 16);
        assert!(attempt.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(create_attempt(&fixture, "my_id").id, "my_id");
    }

    #[test]
    fn started_only_once() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        assert!(!attempt.started());
        assert!(attempt.set_started());
        assert!(!attempt.set_started());
        assert!(attempt.started());
    }

    #[test]
    fn pull_counter() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        attempt.pull_started();
        attempt.pull_started();
        assert_eq!(attempt.pulling(), 2);
        assert!(attempt.still_pulling());

        attempt.pull_finished();
        attempt.pull_finished();
        assert_eq!(attempt.pulling(), 0);
        assert!(!attempt.still_pulling());
    }

    #[test]
    fn stopped_attempt_is_not_pulling() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        attempt.pull_started();
        attempt.stop();
        assert!(attempt.stopped());
        assert!(!attempt.still_pulling());
    }

    #[test]
    fn stop_removes_own_queued_pulls() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        let mut other = PullInfo::new_test_instance();
        other.bootstrap_id = 2;
        let mut own = PullInfo::new_test_instance();
        own.bootstrap_id = 1;
        fixture.connections.add_pull(own);
        fixture.connections.add_pull(other.clone());

        attempt.stop();

        assert_eq!(fixture.connections.queued_pulls(), [other]);
    }

    #[test]
    fn should_log_throttles() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        assert!(attempt.should_log());
        assert!(!attempt.should_log());
    }

    #[test]
    fn requeued_pulls_and_total_blocks() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        attempt.inc_requeued_pulls();
        attempt.inc_total_blocks();
        attempt.inc_total_blocks();
        assert_eq!(attempt.requeued_pulls(), 1);
        assert_eq!(attempt.total_blocks(), 2);
    }

    #[test]
    fn known_block_stops_the_pull_at_check_points() {
        let fixture = ConnectionsFixture::new();
        let processed = fixture.block_processor.track();
        let attempt = create_attempt(&fixture, "");
        let block = Block::new_test_instance();
        fixture.ledger.add_block(block.hash());

        assert!(attempt.process_block(block.clone(), 0));
        assert_eq!(processed.output().len(), 0);

        assert!(!attempt.process_block(block.clone(), 1));
        assert_eq!(processed.output().len(), 1);
    }

    #[test]
    fn unknown_block_goes_to_block_processor() {
        let fixture = ConnectionsFixture::new();
        let processed = fixture.block_processor.track();
        let attempt = create_attempt(&fixture, "");
        let block = Block::new_test_instance();

        assert!(!attempt.process_block(block.clone(), 0));

        assert_eq!(processed.output()[0].block, block);
    }

    #[test]
    fn wait_for_peer_returns_connection_to_pool() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        let client = fixture.create_client(1);
        fixture
            .connections
            .pool_connection(Arc::clone(&client), true, false);

        assert!(attempt.wait_for_peer());

        assert_eq!(fixture.connections.idle_count(), 1);
        assert!(!attempt.stopped());
    }

    #[test]
    fn wait_for_peer_fails_when_pool_is_stopped() {
        let fixture = ConnectionsFixture::new();
        let attempt = create_attempt(&fixture, "");
        fixture.connections.stop();

        assert!(!attempt.wait_for_peer());

        assert!(attempt.stopped());
    }
}
