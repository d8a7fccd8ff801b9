use async_trait::async_trait;
use rsban_core::{Block, BlockHash, HashOrAccount};
use std::{fmt::Display, net::SocketAddrV6, sync::Arc, time::Duration};

/// Request for the blocks of one account chain, newest first, down to `end`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkPull {
    pub start: HashOrAccount,
    pub end: BlockHash,
    /// 0 = no limit
    pub count: u32,
}

impl BulkPull {
    pub fn is_count_present(&self) -> bool {
        self.count != 0
    }
}

/// One established connection to a bootstrap peer. Message framing happens behind this trait.
#[async_trait]
pub trait BootstrapChannel: Send + Sync + Display {
    fn remote_addr(&self) -> SocketAddrV6;
    async fn send_bulk_pull(&self, request: &BulkPull) -> anyhow::Result<()>;
    /// Returns `None` when the peer signaled the end of the block stream
    async fn receive_block(&self) -> anyhow::Result<Option<Block>>;
    fn set_timeout(&self, timeout: Duration);
    fn close(&self);
    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait BootstrapConnector: Send + Sync {
    async fn connect(&self, endpoint: SocketAddrV6) -> anyhow::Result<Arc<dyn BootstrapChannel>>;
}

/// Where the connection pool finds new peers
pub trait PeerSource: Send + Sync {
    fn bootstrap_peer(&self) -> Option<SocketAddrV6>;
    fn is_excluded(&self, endpoint: &SocketAddrV6) -> bool;
}
