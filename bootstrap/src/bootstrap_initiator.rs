use crate::{
    attempts::{
        BootstrapAttemptLazy, BootstrapAttemptLegacy, BootstrapAttemptWallet, BootstrapAttempts,
        BootstrapMode, BootstrapStrategy, FrontierTarget,
    },
    block_processing::{BlockProcessor, NullBlockProcessor},
    config::BootstrapConfig,
    connections::{BootstrapConnections, BootstrapConnectionsExt},
    ledger::{Ledger, NullLedger},
    pulls::{PullInfo, PullsCache},
    stats::{DetailType, Direction, StatType, Stats},
    transport::{BootstrapConnector, BootstrapPeers, NullConnector, PeerSource},
    utils::{AsyncRuntime, ThreadPool, ThreadPoolImpl},
};
use rsban_core::{utils::ContainerInfo, Account, BlockHash, HashOrAccount};
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddrV6,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
};

/// Starts bootstrap attempts and owns everything they share
pub struct BootstrapInitiator {
    mutex: Mutex<Data>,
    condition: Condvar,
    threads: Mutex<Vec<JoinHandle<()>>>,
    pub connections: Arc<BootstrapConnections>,
    config: BootstrapConfig,
    stopped: AtomicBool,
    pub cache: Arc<Mutex<PullsCache>>,
    stats: Arc<Stats>,
    pub attempts: Arc<Mutex<BootstrapAttempts>>,
    peers: Arc<dyn PeerSource>,
    workers: Arc<dyn ThreadPool>,
    _runtime: Arc<AsyncRuntime>,
}

impl BootstrapInitiator {
    pub fn new(
        config: BootstrapConfig,
        runtime: Arc<AsyncRuntime>,
        workers: Arc<dyn ThreadPool>,
        stats: Arc<Stats>,
        connector: Arc<dyn BootstrapConnector>,
        peers: Arc<dyn PeerSource>,
        ledger: Arc<dyn Ledger>,
        block_processor: Arc<dyn BlockProcessor>,
    ) -> Self {
        let attempts = Arc::new(Mutex::new(BootstrapAttempts::new()));
        let cache = Arc::new(Mutex::new(PullsCache::new()));
        Self {
            mutex: Mutex::new(Data {
                attempts_list: HashMap::new(),
            }),
            condition: Condvar::new(),
            threads: Mutex::new(Vec::new()),
            connections: Arc::new(BootstrapConnections::new(
                config.clone(),
                Arc::clone(&attempts),
                Arc::clone(&cache),
                Arc::clone(&stats),
                Arc::clone(&workers),
                runtime.handle(),
                connector,
                Arc::clone(&peers),
                ledger,
                block_processor,
            )),
            config,
            stopped: AtomicBool::new(false),
            cache,
            stats,
            attempts,
            peers,
            workers,
            _runtime: runtime,
        }
    }

    pub fn new_null() -> Self {
        Self::new(
            BootstrapConfig::new_test_instance(),
            Arc::new(AsyncRuntime::default()),
            Arc::new(ThreadPoolImpl::new_test_instance()),
            Arc::new(Stats::default()),
            Arc::new(NullConnector::new()),
            Arc::new(BootstrapPeers::new()),
            Arc::new(NullLedger::new()),
            Arc::new(NullBlockProcessor::new()),
        )
    }

    fn run_bootstrap(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while !self.stopped.load(Ordering::SeqCst) {
            if guard.has_new_attempts() {
                let attempt = guard.new_attempt();
                drop(guard);
                if let Some(attempt) = attempt {
                    attempt.run();
                    self.remove_attempt(attempt);
                }
                guard = self.mutex.lock().unwrap();
            } else {
                guard = self.condition.wait(guard).unwrap();
            }
        }
    }

    pub fn clear_pulls(&self, bootstrap_id: u64) {
        self.connections.clear_pulls(bootstrap_id);
    }

    pub fn in_progress(&self) -> bool {
        !self.mutex.lock().unwrap().attempts_list.is_empty()
    }

    fn remove_attempt(&self, attempt: Arc<BootstrapStrategy>) {
        let mut guard = self.mutex.lock().unwrap();
        let incremental_id = attempt.incremental_id();
        let attempt = guard.attempts_list.get(&incremental_id).cloned();
        if let Some(attempt) = attempt {
            self.attempts.lock().unwrap().remove(incremental_id);
            guard.attempts_list.remove(&incremental_id);
            debug_assert_eq!(
                self.attempts.lock().unwrap().size(),
                guard.attempts_list.len()
            );
            drop(guard);
            attempt.stop();
        } else {
            drop(guard);
        }
        self.condition.notify_all();
    }

    pub fn current_legacy_attempt(&self) -> Option<Arc<BootstrapStrategy>> {
        self.mutex
            .lock()
            .unwrap()
            .find_attempt(BootstrapMode::Legacy)
    }

    pub fn current_lazy_attempt(&self) -> Option<Arc<BootstrapStrategy>> {
        self.mutex.lock().unwrap().find_attempt(BootstrapMode::Lazy)
    }

    pub fn current_wallet_attempt(&self) -> Option<Arc<BootstrapStrategy>> {
        self.mutex
            .lock()
            .unwrap()
            .find_attempt(BootstrapMode::WalletLazy)
    }

    fn stop_attempts(&self) {
        let mut guard = self.mutex.lock().unwrap();
        let copy_attempts = std::mem::take(&mut guard.attempts_list);
        self.attempts.lock().unwrap().clear();
        drop(guard);
        for i in copy_attempts.values() {
            i.stop();
        }
    }

    pub fn remove_from_cache(&self, pull: &PullInfo) {
        self.cache.lock().unwrap().remove(pull);
    }

    /// Pulls a block of the running lazy attempt again
    pub fn lazy_requeue(&self, hash: &BlockHash, previous: &BlockHash) {
        if let Some(attempt) = self.current_lazy_attempt() {
            if let Some(lazy) = attempt.as_lazy() {
                lazy.lazy_requeue(hash, previous);
            }
        }
    }

    pub fn attempts_information(&self) -> serde_json::Value {
        let attempts = self.attempts.lock().unwrap();
        serde_json::json!({
            "total_attempts": attempts.total_attempts().to_string(),
            "attempts": attempts.attempts_information(),
        })
    }

    pub fn collect_container_info(&self) -> ContainerInfo {
        let cache_count = self.cache.lock().unwrap().size();
        let attempts_count = self.attempts.lock().unwrap().size();
        ContainerInfo::builder()
            .leaf("pulls_cache", cache_count, PullsCache::ELEMENT_SIZE)
            .leaf(
                "attempts",
                attempts_count,
                std::mem::size_of::<Arc<BootstrapStrategy>>(),
            )
            .node("connections", self.connections.container_info())
            .finish()
    }
}

impl Drop for BootstrapInitiator {
    fn drop(&mut self) {
        debug_assert_eq!(0, self.threads.lock().unwrap().len());
    }
}

pub trait BootstrapInitiatorExt {
    fn start(&self);
    fn stop(&self);
    fn bootstrap(&self, force: bool, id: String, targets: Vec<FrontierTarget>);
    fn bootstrap_with_peer(&self, endpoint: SocketAddrV6, id: String, targets: Vec<FrontierTarget>);
    fn bootstrap_lazy(&self, hash_or_account: HashOrAccount, force: bool, id: String) -> bool;
    fn bootstrap_wallet(&self, accounts: VecDeque<Account>);
}

impl BootstrapInitiatorExt for Arc<BootstrapInitiator> {
    fn start(&self) {
        let mut threads = self.threads.lock().unwrap();
        let conns = Arc::clone(&self.connections);
        threads.push(
            std::thread::Builder::new()
                .name("Bootstrap conn".to_string())
                .spawn(move || {
                    conns.run();
                })
                .unwrap(),
        );

        for _ in 0..self.config.bootstrap_initiator_threads {
            let self_l = Arc::clone(self);
            threads.push(
                std::thread::Builder::new()
                    .name("Bootstrap init".to_string())
                    .spawn(move || {
                        self_l.run_bootstrap();
                    })
                    .unwrap(),
            );
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop_attempts();
            self.connections.stop();
            self.condition.notify_all();

            let threads = std::mem::take(&mut *self.threads.lock().unwrap());
            for thread in threads {
                thread.join().unwrap();
            }
            // Pending pull dispatches must not outlive the initiator
            self.workers.stop();
        }
    }

    fn bootstrap(&self, force: bool, id: String, targets: Vec<FrontierTarget>) {
        if force {
            self.stop_attempts();
        }
        let mut guard = self.mutex.lock().unwrap();
        if !self.stopped.load(Ordering::SeqCst)
            && guard.find_attempt(BootstrapMode::Legacy).is_none()
        {
            self.stats
                .inc_dir(StatType::Bootstrap, DetailType::Initiate, Direction::Out);
            let incremental_id = self.attempts.lock().unwrap().get_incremental_id();
            let legacy_attempt = Arc::new(BootstrapAttemptLegacy::new(
                id,
                incremental_id,
                Arc::clone(&self.connections),
                targets,
            ));
            let attempt = Arc::new(BootstrapStrategy::Legacy(legacy_attempt));
            guard
                .attempts_list
                .insert(incremental_id, Arc::clone(&attempt));
            self.attempts.lock().unwrap().add(attempt);
            drop(guard);
            self.condition.notify_all();
        }
    }

    fn bootstrap_with_peer(&self, endpoint: SocketAddrV6, id: String, targets: Vec<FrontierTarget>) {
        if !self.stopped.load(Ordering::SeqCst) {
            self.stop_attempts();
            self.stats
                .inc_dir(StatType::Bootstrap, DetailType::Initiate, Direction::Out);
            let mut guard = self.mutex.lock().unwrap();
            let incremental_id = self.attempts.lock().unwrap().get_incremental_id();
            let legacy_attempt = Arc::new(BootstrapAttemptLegacy::new(
                id,
                incremental_id,
                Arc::clone(&self.connections),
                targets,
            ));
            let attempt = Arc::new(BootstrapStrategy::Legacy(legacy_attempt));
            guard
                .attempts_list
                .insert(incremental_id, Arc::clone(&attempt));
            self.attempts.lock().unwrap().add(attempt);
            // connect before the attempt can start, so that it finds a peer
            if !self.peers.is_excluded(&endpoint) {
                self.connections.add_connection(endpoint);
            }
            drop(guard);
        }
        self.condition.notify_all();
    }

    fn bootstrap_lazy(&self, hash_or_account: HashOrAccount, force: bool, id: String) -> bool {
        let mut key_inserted = false;
        let lazy_attempt = self.current_lazy_attempt();
        if lazy_attempt.is_none() || force {
            if force {
                self.stop_attempts();
            }
            self.stats.inc_dir(
                StatType::Bootstrap,
                DetailType::InitiateLazy,
                Direction::Out,
            );
            let mut guard = self.mutex.lock().unwrap();
            if !self.stopped.load(Ordering::SeqCst)
                && guard.find_attempt(BootstrapMode::Lazy).is_none()
            {
                let incremental_id = self.attempts.lock().unwrap().get_incremental_id();
                let lazy_attempt = BootstrapAttemptLazy::new(
                    if id.is_empty() {
                        hash_or_account.to_string()
                    } else {
                        id
                    },
                    incremental_id,
                    Arc::clone(&self.connections),
                );
                let attempt = Arc::new(BootstrapStrategy::Lazy(lazy_attempt));
                guard
                    .attempts_list
                    .insert(incremental_id, Arc::clone(&attempt));
                self.attempts.lock().unwrap().add(Arc::clone(&attempt));
                drop(guard);

                if let Some(lazy) = attempt.as_lazy() {
                    key_inserted = lazy.lazy_start(&hash_or_account);
                }
            }
        } else if let Some(lazy) = lazy_attempt.as_deref().and_then(|a| a.as_lazy()) {
            key_inserted = lazy.lazy_start(&hash_or_account);
        }
        self.condition.notify_all();
        key_inserted
    }

    fn bootstrap_wallet(&self, accounts: VecDeque<Account>) {
        debug_assert!(!accounts.is_empty());
        let wallet_attempt = self.current_wallet_attempt();
        self.stats.inc_dir(
            StatType::Bootstrap,
            DetailType::InitiateWalletLazy,
            Direction::Out,
        );
        match wallet_attempt.as_deref().and_then(|a| a.as_wallet()) {
            Some(wallet) => wallet.wallet_start(accounts),
            None => {
                let mut guard = self.mutex.lock().unwrap();
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let id = accounts
                    .front()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let incremental_id = self.attempts.lock().unwrap().get_incremental_id();
                let wallet_attempt = Arc::new(BootstrapAttemptWallet::new(
                    id,
                    incremental_id,
                    Arc::clone(&self.connections),
                ));
                let attempt = Arc::new(BootstrapStrategy::Wallet(Arc::clone(&wallet_attempt)));
                guard
                    .attempts_list
                    .insert(incremental_id, Arc::clone(&attempt));
                self.attempts.lock().unwrap().add(attempt);
                drop(guard);
                wallet_attempt.wallet_start(accounts);
            }
        }
        self.condition.notify_all();
    }
}

struct Data {
    attempts_list: HashMap<u64, Arc<BootstrapStrategy>>,
}

impl Data {
    fn find_attempt(&self, mode: BootstrapMode) -> Option<Arc<BootstrapStrategy>> {
        self.attempts_list
            .values()
            .find(|i| i.mode() == mode)
            .cloned()
    }

    fn new_attempt(&self) -> Option<Arc<BootstrapStrategy>> {
        self.attempts_list
            .values()
            .find(|i| i.attempt().set_started())
            .cloned()
    }

    fn has_new_attempts(&self) -> bool {
        self.attempts_list.values().any(|i| !i.started())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_initiator() -> Arc<BootstrapInitiator> {
        Arc::new(BootstrapInitiator::new_null())
    }

    #[test]
    fn lazy_bootstrap_reuses_running_attempt() {
        let initiator = create_initiator();

        assert!(initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new()));
        assert!(!initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new()));
        assert!(initiator.bootstrap_lazy(HashOrAccount::from(2), false, String::new()));

        assert!(initiator.in_progress());
        let attempt = initiator.current_lazy_attempt().unwrap();
        assert_eq!(attempt.id(), HashOrAccount::from(1).to_string());
        assert_eq!(attempt.as_lazy().unwrap().lazy_keys_count(), 2);
        assert_eq!(initiator.attempts.lock().unwrap().size(), 1);
        assert_eq!(
            initiator
                .stats
                .count(StatType::Bootstrap, DetailType::InitiateLazy, Direction::Out),
            1
        );
        initiator.stop();
    }

    #[test]
    fn forced_lazy_bootstrap_replaces_attempt() {
        let initiator = create_initiator();
        initiator.bootstrap_lazy(HashOrAccount::from(1), false, "first".to_string());
        let first = initiator.current_lazy_attempt().unwrap();

        assert!(initiator.bootstrap_lazy(HashOrAccount::from(1), true, "second".to_string()));

        let second = initiator.current_lazy_attempt().unwrap();
        assert!(first.attempt().stopped());
        assert_eq!(second.id(), "second");
        assert_ne!(first.incremental_id(), second.incremental_id());
        initiator.stop();
    }

    #[test]
    fn only_one_legacy_attempt() {
        let initiator = create_initiator();

        initiator.bootstrap(false, String::new(), Vec::new());
        initiator.bootstrap(false, String::new(), Vec::new());

        assert!(initiator.current_legacy_attempt().is_some());
        assert_eq!(initiator.attempts.lock().unwrap().size(), 1);
        assert_eq!(
            initiator
                .stats
                .count(StatType::Bootstrap, DetailType::Initiate, Direction::Out),
            1
        );
        initiator.stop();
    }

    #[test]
    fn forced_legacy_bootstrap_stops_other_attempts() {
        let initiator = create_initiator();
        initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new());
        let lazy = initiator.current_lazy_attempt().unwrap();

        initiator.bootstrap(true, String::new(), Vec::new());

        assert!(lazy.attempt().stopped());
        assert!(initiator.current_lazy_attempt().is_none());
        assert!(initiator.current_legacy_attempt().is_some());
        initiator.stop();
    }

    #[test]
    fn wallet_bootstrap_reuses_running_attempt() {
        let initiator = create_initiator();

        initiator.bootstrap_wallet([Account::from(1), Account::from(2)].into());
        initiator.bootstrap_wallet([Account::from(3)].into());

        let attempt = initiator.current_wallet_attempt().unwrap();
        assert_eq!(attempt.id(), Account::from(1).to_string());
        assert_eq!(attempt.as_wallet().unwrap().wallet_size(), 1);
        assert_eq!(
            initiator.stats.count(
                StatType::Bootstrap,
                DetailType::InitiateWalletLazy,
                Direction::Out
            ),
            2
        );
        initiator.stop();
    }

    #[test]
    fn lazy_requeue_goes_to_running_lazy_attempt() {
        let initiator = create_initiator();
        initiator.lazy_requeue(&BlockHash::from(1), &BlockHash::from(2));

        initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new());
        initiator.lazy_requeue(&BlockHash::from(1), &BlockHash::from(2));

        // only processed blocks are pulled again
        assert_eq!(initiator.connections.pulls_count(), 0);
        initiator.stop();
    }

    #[test]
    fn nothing_starts_after_stop() {
        let initiator = create_initiator();
        initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new());
        let lazy = initiator.current_lazy_attempt().unwrap();

        initiator.stop();

        assert!(lazy.attempt().stopped());
        assert!(!initiator.in_progress());
        assert!(initiator.connections.is_stopped());
        initiator.bootstrap(false, String::new(), Vec::new());
        assert!(!initiator.bootstrap_lazy(HashOrAccount::from(2), false, String::new()));
        initiator.bootstrap_wallet([Account::from(1)].into());
        assert!(!initiator.in_progress());
    }

    #[test]
    fn attempts_information() {
        let initiator = create_initiator();
        initiator.bootstrap(false, "legacy_id".to_string(), Vec::new());
        initiator.bootstrap_lazy(HashOrAccount::from(1), false, String::new());

        let info = initiator.attempts_information();

        assert_eq!(info["total_attempts"], "2");
        assert_eq!(info["attempts"][0]["id"], "legacy_id");
        assert_eq!(info["attempts"][1]["mode"], "lazy");
        initiator.stop();
    }

    #[test]
    fn container_info() {
        let initiator = create_initiator();
        initiator.bootstrap(false, String::new(), Vec::new());

        let info = initiator.collect_container_info();

        assert_eq!(info.count("attempts"), Some(1));
        assert_eq!(info.count("pulls_cache"), Some(0));
        initiator.stop();
    }
}
