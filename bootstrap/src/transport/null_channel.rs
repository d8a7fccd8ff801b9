use super::{BootstrapChannel, BootstrapConnector, BulkPull};
use anyhow::anyhow;
use async_trait::async_trait;
use rsban_core::{Account, Block, BlockHash};
use rsban_output_tracker::{OutputListenerMt, OutputTrackerMt};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::Display,
    net::{Ipv6Addr, SocketAddrV6},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Account chains a null peer serves in response to bulk pulls
#[derive(Default)]
pub struct ServedChains {
    blocks: Mutex<HashMap<BlockHash, Block>>,
    frontiers: Mutex<HashMap<Account, BlockHash>>,
}

impl ServedChains {
    pub fn new() -> Self {
        Default::default()
    }

    /// Blocks must be ordered from open block to frontier
    pub fn add_chain(&self, blocks: &[Block]) {
        let mut served = self.blocks.lock().unwrap();
        let mut frontiers = self.frontiers.lock().unwrap();
        for block in blocks {
            served.insert(block.hash(), block.clone());
            frontiers.insert(block.account(), block.hash());
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn respond(&self, request: &BulkPull) -> VecDeque<Block> {
        let blocks = self.blocks.lock().unwrap();
        let start_hash = BlockHash::from(request.start);
        let mut current = if blocks.contains_key(&start_hash) {
            start_hash
        } else {
            let frontiers = self.frontiers.lock().unwrap();
            match frontiers.get(&Account::from(request.start)) {
                Some(frontier) => *frontier,
                None => return VecDeque::new(),
            }
        };

        let mut response = VecDeque::new();
        while current != request.end && !current.is_zero() {
            if request.is_count_present() && response.len() >= request.count as usize {
                break;
            }
            let Some(block) = blocks.get(&current) else {
                break;
            };
            current = block.previous();
            response.push_back(block.clone());
        }
        response
    }
}

pub struct NullChannel {
    remote_addr: SocketAddrV6,
    served: Arc<ServedChains>,
    pending: Mutex<VecDeque<Block>>,
    closed: AtomicBool,
    timeout: Mutex<Duration>,
    fail_sends: AtomicBool,
    request_listener: OutputListenerMt<BulkPull>,
}

impl NullChannel {
    pub fn new(remote_addr: SocketAddrV6) -> Self {
        Self::with_served_chains(remote_addr, Arc::new(ServedChains::new()))
    }

    pub fn with_served_chains(remote_addr: SocketAddrV6, served: Arc<ServedChains>) -> Self {
        Self {
            remote_addr,
            served,
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            timeout: Mutex::new(Duration::from_secs(15)),
            fail_sends: AtomicBool::new(false),
            request_listener: OutputListenerMt::new(),
        }
    }

    pub fn new_test_instance() -> Self {
        Self::new(test_endpoint(1))
    }

    pub fn track_requests(&self) -> Arc<OutputTrackerMt<BulkPull>> {
        self.request_listener.track()
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap()
    }
}

#[async_trait]
impl BootstrapChannel for NullChannel {
    fn remote_addr(&self) -> SocketAddrV6 {
        self.remote_addr
    }

    async fn send_bulk_pull(&self, request: &BulkPull) -> anyhow::Result<()> {
        if self.is_closed() {
            return Err(anyhow!("channel closed"));
        }
        self.request_listener.emit(request.clone());
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("send failed"));
        }
        *self.pending.lock().unwrap() = self.served.respond(request);
        Ok(())
    }

    async fn receive_block(&self) -> anyhow::Result<Option<Block>> {
        if self.is_closed() {
            return Err(anyhow!("channel closed"));
        }
        Ok(self.pending.lock().unwrap().pop_front())
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = timeout;
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Display for NullChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "null channel to {}", self.remote_addr)
    }
}

/// Connects to every endpoint except the ones marked unreachable.
/// All channels serve the same chains.
pub struct NullConnector {
    served: Arc<ServedChains>,
    unreachable: Mutex<HashSet<SocketAddrV6>>,
    channels: Mutex<Vec<Arc<NullChannel>>>,
    connect_listener: OutputListenerMt<SocketAddrV6>,
}

impl NullConnector {
    pub fn new() -> Self {
        Self::with_served_chains(Arc::new(ServedChains::new()))
    }

    pub fn with_served_chains(served: Arc<ServedChains>) -> Self {
        Self {
            served,
            unreachable: Mutex::new(HashSet::new()),
            channels: Mutex::new(Vec::new()),
            connect_listener: OutputListenerMt::new(),
        }
    }

    pub fn served_chains(&self) -> &Arc<ServedChains> {
        &self.served
    }

    pub fn set_unreachable(&self, endpoint: SocketAddrV6) {
        self.unreachable.lock().unwrap().insert(endpoint);
    }

    pub fn track_connects(&self) -> Arc<OutputTrackerMt<SocketAddrV6>> {
        self.connect_listener.track()
    }

    pub fn channels(&self) -> Vec<Arc<NullChannel>> {
        self.channels.lock().unwrap().clone()
    }
}

impl Default for NullConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BootstrapConnector for NullConnector {
    async fn connect(&self, endpoint: SocketAddrV6) -> anyhow::Result<Arc<dyn BootstrapChannel>> {
        self.connect_listener.emit(endpoint);
        if self.unreachable.lock().unwrap().contains(&endpoint) {
            return Err(anyhow!("connection refused"));
        }
        let channel = Arc::new(NullChannel::with_served_chains(
            endpoint,
            Arc::clone(&self.served),
        ));
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel)
    }
}

pub fn test_endpoint(i: u16) -> SocketAddrV6 {
    SocketAddrV6::new(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, i), 7075, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsban_core::{HashOrAccount, TestAccountChain};

    #[tokio::test]
    async fn serves_chain_from_account() {
        let chain = TestAccountChain::with_height(3);
        let served = Arc::new(ServedChains::new());
        served.add_chain(chain.blocks());
        let channel = NullChannel::with_served_chains(test_endpoint(1), served);

        channel
            .send_bulk_pull(&BulkPull {
                start: chain.account().into(),
                end: BlockHash::zero(),
                count: 0,
            })
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(block) = channel.receive_block().await.unwrap() {
            received.push(block);
        }
        assert_eq!(received, chain.blocks_from_frontier(&BlockHash::zero()));
    }

    #[tokio::test]
    async fn stops_at_end_and_count() {
        let chain = TestAccountChain::with_height(5);
        let served = Arc::new(ServedChains::new());
        served.add_chain(chain.blocks());
        let channel = NullChannel::with_served_chains(test_endpoint(1), served);

        channel
            .send_bulk_pull(&BulkPull {
                start: HashOrAccount::from(chain.frontier()),
                end: chain.block(2).hash(),
                count: 0,
            })
            .await
            .unwrap();
        let mut count = 0;
        while channel.receive_block().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);

        channel
            .send_bulk_pull(&BulkPull {
                start: HashOrAccount::from(chain.frontier()),
                end: BlockHash::zero(),
                count: 2,
            })
            .await
            .unwrap();
        let mut count = 0;
        while channel.receive_block().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn unknown_start_ends_stream_immediately() {
        let channel = NullChannel::new_test_instance();
        channel
            .send_bulk_pull(&BulkPull {
                start: HashOrAccount::from(1u64),
                end: BlockHash::zero(),
                count: 0,
            })
            .await
            .unwrap();
        assert_eq!(channel.receive_block().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_channel_fails() {
        let channel = NullChannel::new_test_instance();
        channel.close();
        assert!(channel.receive_block().await.is_err());
    }

    #[tokio::test]
    async fn connector_tracks_connects() {
        let connector = NullConnector::new();
        let tracker = connector.track_connects();
        connector.set_unreachable(test_endpoint(2));

        assert!(connector.connect(test_endpoint(1)).await.is_ok());
        assert!(connector.connect(test_endpoint(2)).await.is_err());
        assert_eq!(tracker.output(), vec![test_endpoint(1), test_endpoint(2)]);
        assert_eq!(connector.channels().len(), 1);
    }
}
