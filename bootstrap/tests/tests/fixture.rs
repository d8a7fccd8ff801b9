use rsban_bootstrap::{
    block_processing::NullBlockProcessor,
    config::BootstrapConfig,
    ledger::{Ledger, NullLedger},
    stats::{DetailType, Direction, StatType, Stats},
    transport::{test_endpoint, BootstrapPeers, NullConnector, ServedChains},
    utils::{AsyncRuntime, ThreadPoolImpl},
    BootstrapInitiator, BootstrapInitiatorExt,
};
use rsban_core::{Account, Block, BlockHash, Link, TestAccountChain};
use std::sync::Arc;

/// A started bootstrap initiator whose peers all serve the same chains
pub struct TestNode {
    pub initiator: Arc<BootstrapInitiator>,
    pub ledger: Arc<NullLedger>,
    pub served: Arc<ServedChains>,
    pub connector: Arc<NullConnector>,
    pub peers: Arc<BootstrapPeers>,
    pub stats: Arc<Stats>,
}

impl TestNode {
    pub fn new(peer_count: u16) -> Self {
        Self::with_config(peer_count, BootstrapConfig::new_test_instance())
    }

    pub fn with_config(peer_count: u16, config: BootstrapConfig) -> Self {
        test_helpers::init_tracing();
        let ledger = Arc::new(NullLedger::new());
        let served = Arc::new(ServedChains::new());
        let connector = Arc::new(NullConnector::with_served_chains(Arc::clone(&served)));
        let peers = Arc::new(BootstrapPeers::with_peers((1..=peer_count).map(test_endpoint)));
        let stats = Arc::new(Stats::default());
        let initiator = Arc::new(BootstrapInitiator::new(
            config,
            Arc::new(AsyncRuntime::default()),
            Arc::new(ThreadPoolImpl::new_test_instance()),
            Arc::clone(&stats),
            Arc::clone(&connector) as _,
            Arc::clone(&peers) as _,
            Arc::clone(&ledger) as _,
            Arc::new(NullBlockProcessor::with_ledger(Arc::clone(&ledger))),
        ));
        initiator.start();
        Self {
            initiator,
            ledger,
            served,
            connector,
            peers,
            stats,
        }
    }

    /// A chain whose open block receives from a block the ledger already has
    pub fn serve_chain(&self, height: usize) -> TestAccountChain {
        let genesis = BlockHash::random();
        self.ledger.add_block(genesis);
        self.serve_chain_receiving_from(height, genesis)
    }

    pub fn serve_chain_receiving_from(&self, height: usize, source: BlockHash) -> TestAccountChain {
        let mut chain = TestAccountChain::with_account(Account::random());
        chain.add_block_with_link(Link::from(source));
        for _ in 1..height {
            chain.add_block();
        }
        self.served.add_chain(chain.blocks());
        chain
    }

    pub fn has_blocks(&self, blocks: &[Block]) -> bool {
        blocks
            .iter()
            .all(|b| self.ledger.block_or_pruned_exists(&b.hash()))
    }

    pub fn stat(&self, stat_type: StatType, detail: DetailType) -> u64 {
        self.stats.count(stat_type, detail, Direction::In)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.initiator.stop();
    }
}
