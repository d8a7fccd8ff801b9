use super::{BootstrapClient, BootstrapClientId, BulkPullClient};
use crate::{
    attempts::{BootstrapAttempt, BootstrapAttempts, BootstrapMode},
    block_processing::{BlockProcessor, NullBlockProcessor},
    bootstrap_limits,
    config::BootstrapConfig,
    ledger::{Ledger, NullLedger},
    pulls::{PullInfo, PullsCache},
    stats::{DetailType, StatType, Stats},
    transport::{BootstrapConnector, BootstrapPeers, NullConnector, PeerSource},
    utils::{ThreadPool, ThreadPoolImpl},
};
use rsban_core::{utils::ContainerInfo, BlockHash};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
    net::SocketAddrV6,
    sync::{
        atomic::{self, AtomicBool, AtomicU32},
        Arc, Condvar, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};
use tokio::runtime::Handle;
use tracing::debug;

/// Container for bootstrap_client objects. Owned by bootstrap_initiator which pools open connections and makes them available
/// for use by different bootstrap sessions.
pub struct BootstrapConnections {
    mutex: Mutex<ConnectionsData>,
    condition: Condvar,
    populate_connections_started: AtomicBool,
    /// Connects in flight plus live clients
    connections_count: AtomicU32,
    attempts: Arc<Mutex<BootstrapAttempts>>,
    pulls_cache: Arc<Mutex<PullsCache>>,
    pub(crate) config: BootstrapConfig,
    pub(crate) stats: Arc<Stats>,
    workers: Arc<dyn ThreadPool>,
    pub(crate) runtime: Handle,
    connector: Arc<dyn BootstrapConnector>,
    peers: Arc<dyn PeerSource>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) block_processor: Arc<dyn BlockProcessor>,
}

impl BootstrapConnections {
    pub fn new(
        config: BootstrapConfig,
        attempts: Arc<Mutex<BootstrapAttempts>>,
        pulls_cache: Arc<Mutex<PullsCache>>,
        stats: Arc<Stats>,
        workers: Arc<dyn ThreadPool>,
        runtime: Handle,
        connector: Arc<dyn BootstrapConnector>,
        peers: Arc<dyn PeerSource>,
        ledger: Arc<dyn Ledger>,
        block_processor: Arc<dyn BlockProcessor>,
    ) -> Self {
        Self {
            mutex: Mutex::new(ConnectionsData {
                clients: HashMap::new(),
                idle: VecDeque::new(),
                pulls: VecDeque::new(),
                new_connections_empty: false,
                stopped: false,
            }),
            condition: Condvar::new(),
            populate_connections_started: AtomicBool::new(false),
            connections_count: AtomicU32::new(0),
            attempts,
            pulls_cache,
            config,
            stats,
            workers,
            runtime,
            connector,
            peers,
            ledger,
            block_processor,
        }
    }

    /// A pool without peers whose collaborators do nothing
    pub fn new_null(runtime: Handle) -> Self {
        Self::new(
            BootstrapConfig::new_test_instance(),
            Arc::new(Mutex::new(BootstrapAttempts::new())),
            Arc::new(Mutex::new(PullsCache::new())),
            Arc::new(Stats::default()),
            Arc::new(ThreadPoolImpl::new_test_instance()),
            runtime,
            Arc::new(NullConnector::new()),
            Arc::new(BootstrapPeers::new()),
            Arc::new(NullLedger::new()),
            Arc::new(NullBlockProcessor::new()),
        )
    }

    pub fn connections_count(&self) -> u32 {
        self.connections_count.load(atomic::Ordering::SeqCst)
    }

    pub(crate) fn bootstrap_client_created(&self) {
        self.connections_count.fetch_add(1, atomic::Ordering::SeqCst);
    }

    pub(crate) fn bootstrap_client_closed(&self) {
        self.connections_count.fetch_sub(1, atomic::Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.mutex.lock().unwrap().stopped
    }

    pub fn idle_count(&self) -> usize {
        self.mutex.lock().unwrap().idle.len()
    }

    pub fn clients_count(&self) -> usize {
        self.mutex.lock().unwrap().clients.len()
    }

    pub fn pulls_count(&self) -> usize {
        self.mutex.lock().unwrap().pulls.len()
    }

    pub fn queued_pulls(&self) -> Vec<PullInfo> {
        self.mutex.lock().unwrap().pulls.iter().cloned().collect()
    }

    /// Blocks until a connection is available, the pool is stopped, or no new
    /// connection can be made. In the latter case the given attempt gets stopped.
    pub fn connection(
        &self,
        attempt: Option<&BootstrapAttempt>,
        use_front_connection: bool,
    ) -> Option<Arc<BootstrapClient>> {
        let mut guard = self.mutex.lock().unwrap();
        let result = loop {
            guard = self
                .condition
                .wait_while(guard, |i| {
                    !i.stopped && i.idle.is_empty() && !i.new_connections_empty
                })
                .unwrap();

            if guard.stopped {
                break None;
            }
            match guard.pop_idle(use_front_connection) {
                Some(client) => break Some(client),
                None if guard.new_connections_empty => break None,
                // only stopping clients were idle
                None => {}
            }
        };

        let no_peers = result.is_none()
            && self.connections_count() == 0
            && (guard.new_connections_empty || guard.stopped);
        drop(guard);

        if no_peers {
            if let Some(attempt) = attempt {
                debug!("Bootstrap attempt stopped because there are no peers");
                self.stats
                    .inc(StatType::BootstrapConnections, DetailType::NoPeers);
                attempt.stop();
            }
        }
        result
    }

    /// Returns the client to the idle pool. Stopping clients and clients of excluded
    /// peers are closed instead.
    pub fn pool_connection(&self, client: Arc<BootstrapClient>, new_client: bool, push_front: bool) {
        let mut guard = self.mutex.lock().unwrap();
        if !guard.stopped
            && !client.pending_stop()
            && !self.peers.is_excluded(&client.remote_addr())
        {
            client.set_timeout(self.config.idle_timeout);
            if new_client || !guard.clients.contains_key(&client.id()) {
                guard.clients.insert(client.id(), Arc::downgrade(&client));
            }
            if !guard.is_idle(client.id()) {
                if push_front {
                    guard.idle.push_front(client);
                } else {
                    guard.idle.push_back(client);
                }
            }
        } else {
            client.close();
        }
        drop(guard);
        self.condition.notify_all();
    }

    /// Takes an idle connection to the given peer out of the pool
    pub fn find_connection(&self, endpoint: &SocketAddrV6) -> Option<Arc<BootstrapClient>> {
        let mut guard = self.mutex.lock().unwrap();
        let index = guard
            .idle
            .iter()
            .position(|c| c.remote_addr() == *endpoint && !c.pending_stop())?;
        guard.idle.remove(index)
    }

    pub fn target_connections(&self, pulls_remaining: usize, attempts_count: usize) -> u32 {
        let connections_max = self.config.bootstrap_connections_max;
        let attempts_factor =
            (self.config.bootstrap_connections as u64 * attempts_count as u64) as f64;
        if attempts_factor >= connections_max as f64 {
            return connections_max.max(1);
        }

        // Only scale up to bootstrap_connections_max for large pulls.
        let step_scale = (pulls_remaining as f64
            / bootstrap_limits::BOOTSTRAP_CONNECTION_SCALE_TARGET_BLOCKS as f64)
            .clamp(0.0, 1.0);
        let target = attempts_factor + (connections_max as f64 - attempts_factor) * step_scale;
        (target.round() as u32).max(1)
    }

    pub fn add_pull(&self, mut pull: PullInfo) {
        self.pulls_cache.lock().unwrap().update_pull(&mut pull);
        self.mutex.lock().unwrap().pulls.push_back(pull);
        self.condition.notify_all();
    }

    /// Decides whether an incomplete pull gets another try
    pub fn requeue_pull(&self, mut pull: PullInfo, network_error: bool) {
        if !network_error {
            pull.attempts += 1;
        }
        let attempt = self.attempts.lock().unwrap().find(pull.bootstrap_id).cloned();
        let Some(attempt) = attempt else {
            return;
        };
        attempt.attempt().inc_requeued_pulls();
        self.stats
            .inc(StatType::BootstrapPull, DetailType::RequeuedPull);
        if let Some(batch_size) = attempt.retry_batch_size() {
            pull.count = batch_size;
        }

        let attempts = pull.attempts as u64;
        let retry_budget = |blocks_per_retry: u64| {
            pull.retry_limit as u64 + pull.processed / blocks_per_retry.max(1)
        };
        let legacy_budget =
            retry_budget(bootstrap_limits::REQUEUED_PULLS_PROCESSED_BLOCKS_FACTOR as u64);
        let lazy_budget = retry_budget(self.config.lazy_max_pull_blocks as u64);

        match attempt.mode() {
            BootstrapMode::Legacy if attempts < legacy_budget => {
                attempt.attempt().pull_started();
                self.mutex.lock().unwrap().pulls.push_front(pull);
                self.condition.notify_all();
            }
            BootstrapMode::Lazy if attempts <= lazy_budget => {
                debug_assert_eq!(BlockHash::from(pull.account_or_head), pull.head);
                if !attempt.pull_is_obsolete(&pull) {
                    attempt.attempt().pull_started();
                    self.mutex.lock().unwrap().pulls.push_back(pull);
                    self.condition.notify_all();
                }
            }
            BootstrapMode::WalletLazy if attempts < legacy_budget => {
                attempt.attempt().pull_started();
                self.mutex.lock().unwrap().pulls.push_back(pull);
                self.condition.notify_all();
            }
            mode => {
                self.stats
                    .inc(StatType::Bootstrap, DetailType::BulkPullFailedAccount);
                debug!(
                    "Failed to pull account {} or head block {} down to {} after {} attempts and {} blocks processed",
                    pull.account_or_head, pull.head, pull.end, pull.attempts, pull.processed
                );
                match attempt.as_lazy() {
                    Some(lazy) if pull.processed > 0 => lazy.lazy_add(&pull),
                    _ if mode == BootstrapMode::Legacy => {
                        self.pulls_cache.lock().unwrap().add(&pull);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Removes all queued pulls of the given bootstrap attempt
    pub fn clear_pulls(&self, bootstrap_id: u64) {
        self.mutex
            .lock()
            .unwrap()
            .pulls
            .retain(|p| p.bootstrap_id != bootstrap_id);
        self.condition.notify_all();
    }

    pub fn remove_from_cache(&self, pull: &PullInfo) {
        self.pulls_cache.lock().unwrap().remove(pull);
    }

    pub fn stop(&self) {
        let mut guard = self.mutex.lock().unwrap();
        guard.stopped = true;
        drop(guard);
        self.condition.notify_all();

        let mut guard = self.mutex.lock().unwrap();
        for client in guard.clients.values().filter_map(|c| c.upgrade()) {
            client.close();
        }
        guard.clients.clear();
        let idle = std::mem::take(&mut guard.idle);
        drop(guard);
        drop(idle);
    }

    #[cfg(test)]
    fn idle_ids(&self) -> Vec<BootstrapClientId> {
        self.mutex.lock().unwrap().idle.iter().map(|c| c.id()).collect()
    }

    pub fn container_info(&self) -> ContainerInfo {
        let guard = self.mutex.lock().unwrap();
        [
            ("idle", guard.idle.len(), std::mem::size_of::<Arc<BootstrapClient>>()),
            (
                "clients",
                guard.clients.len(),
                std::mem::size_of::<BootstrapClientId>() + std::mem::size_of::<usize>(),
            ),
            ("pulls", guard.pulls.len(), std::mem::size_of::<PullInfo>()),
            ("connections", self.connections_count() as usize, 0),
        ]
        .into()
    }
}

pub trait BootstrapConnectionsExt {
    fn add_connection(&self, endpoint: SocketAddrV6);
    fn connect_client(&self, endpoint: SocketAddrV6, push_front: bool);
    fn populate_connections(&self, repeat: bool);
    fn start_populate_connections(&self);
    fn run(&self);
}

impl BootstrapConnectionsExt for Arc<BootstrapConnections> {
    fn add_connection(&self, endpoint: SocketAddrV6) {
        self.connect_client(endpoint, true);
    }

    fn connect_client(&self, endpoint: SocketAddrV6, push_front: bool) {
        self.connections_count.fetch_add(1, atomic::Ordering::SeqCst);
        self.stats
            .inc(StatType::BootstrapConnections, DetailType::ConnectStart);
        let self_w = Arc::downgrade(self);
        let connector = Arc::clone(&self.connector);
        let timeout = self.config.tcp_io_timeout;

        self.runtime.spawn(async move {
            let result = tokio::time::timeout(timeout, connector.connect(endpoint)).await;
            let Some(self_l) = self_w.upgrade() else {
                return;
            };
            match result {
                Ok(Ok(channel)) => {
                    debug!("Connection established to: {}", endpoint);
                    self_l
                        .stats
                        .inc(StatType::BootstrapConnections, DetailType::ConnectSuccess);
                    let client = Arc::new(BootstrapClient::new(&self_l, channel));
                    self_l.pool_connection(client, true, push_front);
                }
                Ok(Err(e)) => {
                    debug!(
                        "Error initiating bootstrap connection to: {} ({:?})",
                        endpoint, e
                    );
                    self_l
                        .stats
                        .inc(StatType::BootstrapConnections, DetailType::ConnectFailed);
                }
                Err(_) => {
                    debug!("Timeout initiating bootstrap connection to: {}", endpoint);
                    self_l
                        .stats
                        .inc(StatType::BootstrapConnections, DetailType::ConnectFailed);
                }
            }
            self_l
                .connections_count
                .fetch_sub(1, atomic::Ordering::SeqCst);
        });
    }

    fn populate_connections(&self, repeat: bool) {
        let mut rate_sum = 0f64;
        let attempts_count = self.attempts.lock().unwrap().size();
        let mut sorted_connections = BinaryHeap::new();
        let mut endpoints = HashSet::new();
        let num_pulls;
        {
            let mut guard = self.mutex.lock().unwrap();
            num_pulls = guard.pulls.len();
            let clients: Vec<_> = guard.clients.values().filter_map(|c| c.upgrade()).collect();
            // Cleanup expired clients
            guard.clients.clear();
            for client in clients {
                endpoints.insert(client.remote_addr());
                let elapsed_sec = client.elapsed().as_secs_f64();
                let blocks_per_sec = client.sample_block_rate();
                rate_sum += blocks_per_sec;

                // Force-stop the slowest peers, since they can take the whole bootstrap hostage by dribbling out blocks on the last remaining pull.
                // This is ~1.5kilobits/sec.
                if elapsed_sec > bootstrap_limits::BOOTSTRAP_MINIMUM_TERMINATION_TIME_SEC
                    && blocks_per_sec < bootstrap_limits::BOOTSTRAP_MINIMUM_BLOCKS_PER_SEC
                {
                    debug!(
                        "Stopping slow peer {} (elapsed sec {}s > {}s and {} blocks per second < {})",
                        client.channel_string(),
                        elapsed_sec,
                        bootstrap_limits::BOOTSTRAP_MINIMUM_TERMINATION_TIME_SEC,
                        blocks_per_sec,
                        bootstrap_limits::BOOTSTRAP_MINIMUM_BLOCKS_PER_SEC
                    );
                    self.stats
                        .inc(StatType::BootstrapConnections, DetailType::SlowPeerStopped);
                    client.stop(true);
                    guard.idle.retain(|c| c.id() != client.id());
                    continue;
                }

                if elapsed_sec > bootstrap_limits::BOOTSTRAP_CONNECTION_WARMUP_TIME_SEC
                    && client.block_count() > 0
                {
                    sorted_connections.push(SlowestFirst(Arc::clone(&client)));
                }
                guard.clients.insert(client.id(), Arc::downgrade(&client));
            }
        }

        let target = self.target_connections(num_pulls, attempts_count);

        // We only want to drop slow peers when more than 2/3 are active. 2/3 because 1/2 is too aggressive, and 100% rarely happens.
        if sorted_connections.len() >= (target as usize * 2) / 3 && target >= 4 {
            // 4 -> 1, 8 -> 2, 16 -> 4, arbitrary, but seems to work well.
            let drop = (target as f64 - 2.0).sqrt().round() as usize;
            debug!(
                "Dropping {} bulk pull peers, target connections {}",
                drop, target
            );
            for _ in 0..drop {
                let Some(SlowestFirst(client)) = sorted_connections.pop() else {
                    break;
                };
                debug!(
                    "Dropping peer with block rate {} and block count {} ({})",
                    client.block_rate(),
                    client.block_count(),
                    client.channel_string()
                );
                self.stats
                    .inc(StatType::BootstrapConnections, DetailType::PeerDropped);
                client.stop(false);
            }
        }

        debug!(
            "Bulk pull connections: {}, rate: {} blocks/sec, bootstrap attempts {}, remaining pulls: {}",
            self.connections_count(),
            rate_sum as u64,
            attempts_count,
            num_pulls
        );

        let (new_connections_empty, stopped) = {
            let guard = self.mutex.lock().unwrap();
            (guard.new_connections_empty, guard.stopped)
        };
        let connections_count = self.connections_count();
        if connections_count < target && (attempts_count != 0 || new_connections_empty) && !stopped
        {
            let delta = ((target - connections_count) * 2)
                .min(bootstrap_limits::BOOTSTRAP_MAX_NEW_CONNECTIONS);
            // Not many peers respond, need to try to make more connections than we need.
            for _ in 0..delta {
                let endpoint = self.peers.bootstrap_peer().filter(|endpoint| {
                    (self.config.allow_bootstrap_peers_duplicates || !endpoints.contains(endpoint))
                        && !self.peers.is_excluded(endpoint)
                });
                if let Some(endpoint) = endpoint {
                    self.connect_client(endpoint, false);
                    endpoints.insert(endpoint);
                    self.mutex.lock().unwrap().new_connections_empty = false;
                } else if self.connections_count() == 0 {
                    self.mutex.lock().unwrap().new_connections_empty = true;
                    self.condition.notify_all();
                }
            }
        }

        if !self.is_stopped() && repeat {
            let self_w = Arc::downgrade(self);
            self.workers.add_delayed_task(
                Duration::from_secs(1),
                Box::new(move || {
                    if let Some(self_l) = self_w.upgrade() {
                        self_l.populate_connections(true);
                    }
                }),
            );
        }
    }

    fn start_populate_connections(&self) {
        if !self
            .populate_connections_started
            .swap(true, atomic::Ordering::SeqCst)
        {
            self.populate_connections(true);
        }
    }

    fn run(&self) {
        self.start_populate_connections();
        let mut guard = self.mutex.lock().unwrap();
        while !guard.stopped {
            if !guard.pulls.is_empty() {
                guard = request_pull(self, guard);
            } else {
                guard = self.condition.wait(guard).unwrap();
            }
        }
        drop(guard);
        self.condition.notify_all();
    }
}

/// Checks out a connection and dispatches the next pull whose attempt is still alive
fn request_pull<'a>(
    connections: &'a Arc<BootstrapConnections>,
    guard: MutexGuard<'a, ConnectionsData>,
) -> MutexGuard<'a, ConnectionsData> {
    drop(guard);
    let connection = connections.connection(None, false);
    let mut guard = connections.mutex.lock().unwrap();

    let Some(connection) = connection else {
        if !guard.stopped {
            guard = connections
                .condition
                .wait_timeout(guard, Duration::from_secs(1))
                .unwrap()
                .0;
        }
        return guard;
    };

    let mut dispatch = None;
    while dispatch.is_none() {
        let Some(mut pull) = guard.pulls.pop_front() else {
            break;
        };
        let attempt = connections
            .attempts
            .lock()
            .unwrap()
            .find(pull.bootstrap_id)
            .cloned();
        if let Some(attempt) = attempt {
            // Check if lazy pull is obsolete (head was processed or head is 0 for destinations requests)
            if attempt.pull_is_obsolete(&pull) {
                attempt.attempt().pull_finished();
            } else {
                if let Some(batch_size) = attempt.retry_batch_size() {
                    pull.count = batch_size;
                }
                dispatch = Some((attempt, pull));
            }
        }
    }

    match dispatch {
        Some((attempt, pull)) => {
            // The bulk_pull_client destructor attempt to requeue_pull which can cause a deadlock if this is the last reference
            // Dispatch request in an external thread in case it needs to be destroyed
            let mut task = Some((Arc::clone(connections), connection, attempt, pull));
            connections.workers.push_task(Box::new(move || {
                if let Some((connections, connection, attempt, pull)) = task.take() {
                    BulkPullClient::new(connections, connection, attempt, pull).request();
                }
            }));
        }
        None => {
            drop(guard);
            connections.pool_connection(connection, false, false);
            guard = connections.mutex.lock().unwrap();
        }
    }
    guard
}

struct ConnectionsData {
    /// Every pooled client, checked out or idle
    clients: HashMap<BootstrapClientId, Weak<BootstrapClient>>,
    idle: VecDeque<Arc<BootstrapClient>>,
    pulls: VecDeque<PullInfo>,
    new_connections_empty: bool,
    stopped: bool,
}

impl ConnectionsData {
    fn is_idle(&self, id: BootstrapClientId) -> bool {
        self.idle.iter().any(|c| c.id() == id)
    }

    /// Clients that got stopped while idle are closed and skipped
    fn pop_idle(&mut self, front: bool) -> Option<Arc<BootstrapClient>> {
        loop {
            let client = if front {
                self.idle.pop_front()
            } else {
                self.idle.pop_back()
            }?;
            if client.pending_stop() {
                client.close();
            } else {
                return Some(client);
            }
        }
    }
}

/// Heap entry that puts the client with the lowest block rate on top
struct SlowestFirst(Arc<BootstrapClient>);

impl PartialEq for SlowestFirst {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SlowestFirst {}

impl PartialOrd for SlowestFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlowestFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.block_rate().total_cmp(&self.0.block_rate())
    }
}
