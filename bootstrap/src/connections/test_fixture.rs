use super::{BootstrapClient, BootstrapConnections};
use crate::{
    attempts::{
        BootstrapAttemptLazy, BootstrapAttemptLegacy, BootstrapAttemptWallet, BootstrapAttempts,
        BootstrapMode, BootstrapStrategy,
    },
    block_processing::NullBlockProcessor,
    config::BootstrapConfig,
    ledger::NullLedger,
    pulls::PullsCache,
    stats::Stats,
    transport::{test_endpoint, BootstrapPeers, BulkPull, NullChannel, NullConnector},
    utils::{AsyncRuntime, ThreadPoolImpl},
};
use rsban_output_tracker::OutputTrackerMt;
use std::sync::{Arc, Mutex};

/// A connection pool wired to null collaborators that tests can inspect
pub(crate) struct ConnectionsFixture {
    pub connections: Arc<BootstrapConnections>,
    pub attempts: Arc<Mutex<BootstrapAttempts>>,
    pub cache: Arc<Mutex<PullsCache>>,
    pub stats: Arc<Stats>,
    pub peers: Arc<BootstrapPeers>,
    pub connector: Arc<NullConnector>,
    pub ledger: Arc<NullLedger>,
    pub block_processor: Arc<NullBlockProcessor>,
    _runtime: AsyncRuntime,
}

impl ConnectionsFixture {
    pub fn new() -> Self {
        Self::with_config(BootstrapConfig::new_test_instance())
    }

    pub fn with_config(config: BootstrapConfig) -> Self {
        Self::with_peers(config, BootstrapPeers::new())
    }

    pub fn with_peers(config: BootstrapConfig, peers: BootstrapPeers) -> Self {
        let runtime = AsyncRuntime::default();
        let attempts = Arc::new(Mutex::new(BootstrapAttempts::new()));
        let cache = Arc::new(Mutex::new(PullsCache::new()));
        let stats = Arc::new(Stats::default());
        let peers = Arc::new(peers);
        let connector = Arc::new(NullConnector::new());
        let ledger = Arc::new(NullLedger::new());
        // processed blocks don't become known to the ledger
        let block_processor = Arc::new(NullBlockProcessor::new());
        let connections = Arc::new(BootstrapConnections::new(
            config,
            Arc::clone(&attempts),
            Arc::clone(&cache),
            Arc::clone(&stats),
            Arc::new(ThreadPoolImpl::new_test_instance()),
            runtime.handle(),
            Arc::clone(&connector) as _,
            Arc::clone(&peers) as _,
            Arc::clone(&ledger) as _,
            Arc::clone(&block_processor) as _,
        ));
        Self {
            connections,
            attempts,
            cache,
            stats,
            peers,
            connector,
            ledger,
            block_processor,
            _runtime: runtime,
        }
    }

    pub fn create_client(&self, peer: u16) -> Arc<BootstrapClient> {
        Arc::new(BootstrapClient::new(
            &self.connections,
            Arc::new(NullChannel::new(test_endpoint(peer))),
        ))
    }

    /// A client whose sent requests can be observed
    pub fn create_tracked_client(
        &self,
        peer: u16,
    ) -> (Arc<BootstrapClient>, Arc<OutputTrackerMt<BulkPull>>) {
        let channel = Arc::new(NullChannel::new(test_endpoint(peer)));
        let requests = channel.track_requests();
        let client = Arc::new(BootstrapClient::new(&self.connections, channel));
        (client, requests)
    }

    pub fn add_attempt(&self, mode: BootstrapMode) -> Arc<BootstrapStrategy> {
        let incremental_id = self.attempts.lock().unwrap().get_incremental_id();
        let connections = Arc::clone(&self.connections);
        let strategy = match mode {
            BootstrapMode::Legacy => BootstrapStrategy::Legacy(Arc::new(
                BootstrapAttemptLegacy::new(String::new(), incremental_id, connections, Vec::new()),
            )),
            BootstrapMode::Lazy => BootstrapStrategy::Lazy(BootstrapAttemptLazy::new(
                String::new(),
                incremental_id,
                connections,
            )),
            BootstrapMode::WalletLazy => BootstrapStrategy::Wallet(Arc::new(
                BootstrapAttemptWallet::new(String::new(), incremental_id, connections),
            )),
        };
        let attempt = Arc::new(strategy);
        self.attempts.lock().unwrap().add(Arc::clone(&attempt));
        attempt
    }
}

impl Drop for ConnectionsFixture {
    fn drop(&mut self) {
        // attempts keep the pool alive
        self.attempts.lock().unwrap().clear();
        self.connections.stop();
    }
}
