use super::{BootstrapAttempt, BootstrapMode};
use crate::{
    connections::{BootstrapConnections, BootstrapConnectionsExt},
    pulls::PullInfo,
};
use rsban_core::{Account, BlockHash};
use serde_json::json;
use std::{
    sync::{atomic::Ordering, Arc, Mutex},
    time::Duration,
};
use tracing::info;

/// Account chain a peer has ahead of us: pull from `head` down to our own frontier `end`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontierTarget {
    pub account: Account,
    pub head: BlockHash,
    pub end: BlockHash,
}

/// Legacy bootstrap session. Pulls the account chains that differ from the
/// frontiers of a peer, one pull per account.
pub struct BootstrapAttemptLegacy {
    pub attempt: BootstrapAttempt,
    targets: Mutex<Vec<FrontierTarget>>,
    frontier_retry_limit: u32,
}

impl BootstrapAttemptLegacy {
    pub fn new(
        id: String,
        incremental_id: u64,
        connections: Arc<BootstrapConnections>,
        targets: Vec<FrontierTarget>,
    ) -> Self {
        let frontier_retry_limit = connections.config.frontier_retry_limit;
        Self {
            attempt: BootstrapAttempt::new(id, incremental_id, BootstrapMode::Legacy, connections),
            targets: Mutex::new(targets),
            frontier_retry_limit,
        }
    }

    pub fn add_target(&self, target: FrontierTarget) {
        self.targets.lock().unwrap().push(target);
    }

    pub fn run(&self) {
        debug_assert!(self.attempt.started());
        self.attempt.connections.populate_connections(false);
        if self.request_frontiers() {
            self.add_pulls();
            let mut guard = self.attempt.mutex.lock().unwrap();
            while self.attempt.still_pulling() {
                guard = self
                    .attempt
                    .condition
                    .wait_timeout(guard, Duration::from_secs(1))
                    .unwrap()
                    .0;
            }
            drop(guard);
            if !self.attempt.stopped() {
                info!("Completed legacy pulls");
            }
        }
        self.attempt.stop();
    }

    /// The frontier request itself is done by the caller. The attempt only
    /// makes sure a peer is reachable before it queues the pulls.
    fn request_frontiers(&self) -> bool {
        let received = self.attempt.wait_for_peer();
        if received {
            self.attempt
                .frontiers_received
                .store(true, Ordering::SeqCst);
        }
        received
    }

    fn add_pulls(&self) {
        let targets = std::mem::take(&mut *self.targets.lock().unwrap());
        for target in targets {
            if self.attempt.stopped() {
                break;
            }
            if target.head.is_zero() || target.head == target.end {
                continue;
            }
            let pull = PullInfo::new(
                target.account.into(),
                target.head,
                target.end,
                self.attempt.incremental_id,
                0,
                self.frontier_retry_limit,
            );
            self.attempt.pull_started();
            self.attempt.connections.add_pull(pull);
        }
    }

    pub fn information(&self) -> serde_json::Value {
        json!({
            "frontiers_received": self.attempt.frontiers_received.load(Ordering::SeqCst),
            "frontier_targets": self.targets.lock().unwrap().len().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attempts::BootstrapStrategy, connections::test_fixture::ConnectionsFixture};
    use std::thread;

    fn start_legacy(
        fixture: &ConnectionsFixture,
        targets: Vec<FrontierTarget>,
    ) -> (Arc<BootstrapStrategy>, thread::JoinHandle<()>) {
        let incremental_id = fixture.attempts.lock().unwrap().get_incremental_id();
        let attempt = Arc::new(BootstrapStrategy::Legacy(Arc::new(
            BootstrapAttemptLegacy::new(
                String::new(),
                incremental_id,
                Arc::clone(&fixture.connections),
                targets,
            ),
        )));
        fixture.attempts.lock().unwrap().add(Arc::clone(&attempt));
        attempt.attempt().set_started();
        let attempt_l = Arc::clone(&attempt);
        let handle = thread::spawn(move || attempt_l.run());
        (attempt, handle)
    }

    fn target(account: u64, head: u64, end: u64) -> FrontierTarget {
        FrontierTarget {
            account: Account::from(account),
            head: BlockHash::from(head),
            end: BlockHash::from(end),
        }
    }

    #[test]
    fn queues_a_pull_per_differing_frontier() {
        let fixture = ConnectionsFixture::new();
        fixture
            .connections
            .pool_connection(fixture.create_client(1), true, false);
        let targets = vec![target(1, 10, 0), target(2, 0, 0), target(3, 30, 30), target(4, 40, 39)];

        let (attempt, handle) = start_legacy(&fixture, targets);

        test_helpers::assert_timely_eq(
            Duration::from_secs(5),
            || fixture.connections.pulls_count(),
            2,
        );
        let queued = fixture.connections.queued_pulls();
        assert_eq!(queued[0].account_or_head, Account::from(1).into());
        assert_eq!(queued[0].head, BlockHash::from(10));
        assert_eq!(queued[0].retry_limit, 2);
        assert_eq!(queued[1].end, BlockHash::from(39));
        assert_eq!(attempt.attempt().pulling(), 2);
        assert!(attempt.attempt().frontiers_received.load(Ordering::SeqCst));

        attempt.stop();
        handle.join().unwrap();
        assert_eq!(fixture.connections.pulls_count(), 0);
    }

    #[test]
    fn stops_without_peers() {
        let fixture = ConnectionsFixture::new();
        let (attempt, handle) = start_legacy(&fixture, vec![target(1, 10, 0)]);

        handle.join().unwrap();

        assert!(attempt.attempt().stopped());
        assert!(!attempt.attempt().frontiers_received.load(Ordering::SeqCst));
        assert_eq!(fixture.connections.pulls_count(), 0);
    }

    #[test]
    fn completes_when_all_pulls_finished() {
        let fixture = ConnectionsFixture::new();
        fixture
            .connections
            .pool_connection(fixture.create_client(1), true, false);
        let (attempt, handle) = start_legacy(&fixture, vec![target(1, 10, 0)]);
        test_helpers::assert_timely_eq(
            Duration::from_secs(5),
            || attempt.attempt().pulling(),
            1,
        );

        attempt.attempt().pull_finished();

        handle.join().unwrap();
        assert!(attempt.attempt().stopped());
    }

    #[test]
    fn information() {
        let fixture = ConnectionsFixture::new();
        let legacy =
            BootstrapAttemptLegacy::new(String::new(), 0, Arc::clone(&fixture.connections), vec![]);
        legacy.add_target(target(1, 2, 0));

        let info = legacy.information();

        assert_eq!(info["frontiers_received"], false);
        assert_eq!(info["frontier_targets"], "1");
    }
}
