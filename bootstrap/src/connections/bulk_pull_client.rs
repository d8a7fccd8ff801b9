use super::{BootstrapClient, BootstrapConnections};
use crate::{
    attempts::{BootstrapMode, BootstrapStrategy},
    pulls::PullInfo,
    stats::{DetailType, StatType},
    transport::BulkPull,
};
use rsban_core::{Account, Block, BlockHash};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Legacy pulls give up on a peer after this many blocks that don't belong to the pulled chain
const MAX_UNEXPECTED_BLOCKS: u64 = 16384;

/// Client side of a bulk_pull request. Receives the blocks of one pull from a single peer.
/// Whatever is left of the pull when the client is dropped gets requeued.
pub struct BulkPullClient {
    connections: Arc<BootstrapConnections>,
    connection: Arc<BootstrapClient>,
    attempt: Arc<BootstrapStrategy>,
    pull: PullInfo,
    pull_blocks: u64,
    unexpected_count: u64,
    expected: BlockHash,
    known_account: Account,
    network_error: bool,
}

impl BulkPullClient {
    pub fn new(
        connections: Arc<BootstrapConnections>,
        connection: Arc<BootstrapClient>,
        attempt: Arc<BootstrapStrategy>,
        pull: PullInfo,
    ) -> Self {
        attempt.attempt().notify();
        Self {
            expected: pull.head,
            connections,
            connection,
            attempt,
            pull,
            pull_blocks: 0,
            unexpected_count: 0,
            known_account: Account::zero(),
            network_error: false,
        }
    }

    pub fn request(mut self) {
        self.expected = self.pull.head;
        let request = BulkPull {
            start: self.pull.request_start(),
            end: self.pull.end,
            count: self.pull.count,
        };

        if self.attempt.attempt().should_log() {
            debug!(
                "Accounts in pull queue: {}",
                self.attempt.attempt().pulling()
            );
        }

        let runtime = self.connections.runtime.clone();
        runtime.spawn(async move {
            self.run(request).await;
        });
    }

    async fn run(mut self, request: BulkPull) {
        if let Err(e) = self.connection.channel().send_bulk_pull(&request).await {
            debug!(
                "Error sending bulk pull request to: {} ({:?})",
                self.connection.channel_string(),
                e
            );
            self.connections
                .stats
                .inc(StatType::Bootstrap, DetailType::BulkPullRequestFailure);
            self.network_error = true;
            return;
        }
        self.receive_blocks().await;
    }

    async fn receive_blocks(&mut self) {
        let timeout = self.connections.config.tcp_io_timeout;
        loop {
            if !self.wait_for_block_processor().await {
                return;
            }

            let received =
                tokio::time::timeout(timeout, self.connection.channel().receive_block()).await;
            let block = match received {
                Ok(Ok(Some(block))) => block,
                Ok(Ok(None)) => {
                    self.end_of_stream();
                    return;
                }
                Ok(Err(e)) => {
                    debug!(
                        "Error in bulk pull client from {} ({:?})",
                        self.connection.channel_string(),
                        e
                    );
                    self.connections
                        .stats
                        .inc(StatType::Bootstrap, DetailType::BulkPullErrorBlock);
                    self.network_error = true;
                    return;
                }
                Err(_) => {
                    debug!(
                        "Timeout receiving block from {}",
                        self.connection.channel_string()
                    );
                    self.network_error = true;
                    return;
                }
            };

            if !self.received_block(block) {
                return;
            }
        }
    }

    /// Backs off while the block processor is busy.
    /// Returns false when the pull should be abandoned.
    async fn wait_for_block_processor(&self) -> bool {
        loop {
            if !self.connections.block_processor.half_full() && !self.connection.pending_stop() {
                return true;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            if self.connection.pending_stop() || self.attempt.attempt().stopped() {
                return false;
            }
        }
    }

    /// Returns true if more blocks should be read
    fn received_block(&mut self, block: Block) -> bool {
        let hash = block.hash();
        let block_expected = hash == self.expected || self.is_unconfirmed_account_head(&block);
        if block_expected {
            self.expected = block.previous();
        } else {
            self.unexpected_count += 1;
            self.connections
                .stats
                .inc(StatType::BootstrapPull, DetailType::UnexpectedBlock);
        }

        if self.pull_blocks == 0 && block_expected {
            self.known_account = block.account();
        }
        if self.connection.inc_block_count() == 0 {
            self.connection.set_start_time();
        }
        self.attempt.attempt().inc_total_blocks();
        self.pull_blocks += 1;
        self.connections
            .stats
            .inc(StatType::BootstrapPull, DetailType::BlocksReceived);

        let stop_pull = self.attempt.process_block(
            block,
            &self.known_account,
            self.pull_blocks,
            self.pull.count,
            block_expected,
            self.pull.retry_limit,
        );

        if stop_pull && self.attempt.mode() == BootstrapMode::Legacy {
            // The rest of the chain is known locally
            self.expected = self.pull.end;
        }

        if !stop_pull && !self.connection.hard_stop() {
            // Legacy bootstrap gives up on peers that send too many blocks of other chains
            self.attempt.mode() != BootstrapMode::Legacy
                || self.unexpected_count < MAX_UNEXPECTED_BLOCKS
        } else {
            if !stop_pull && block_expected {
                self.connections
                    .pool_connection(Arc::clone(&self.connection), false, false);
            }
            false
        }
    }

    fn end_of_stream(&mut self) {
        let pull_complete = self.expected == self.pull.end
            || (self.pull.count != 0 && self.pull.count as u64 == self.pull_blocks);
        if !self.connection.pending_stop() && pull_complete {
            self.connections
                .pool_connection(Arc::clone(&self.connection), false, false);
        }
    }

    /// Wallet and lazy account pulls don't know the frontier of the pulled
    /// account. The first block they receive is accepted as its head.
    fn is_unconfirmed_account_head(&self, block: &Block) -> bool {
        let config = &self.connections.config;
        self.pull_blocks == 0
            && (self.attempt.mode() == BootstrapMode::WalletLazy
                || config.disable_legacy_bootstrap)
            && self.pull.retry_limit <= config.lazy_retry_limit
            && self.expected == BlockHash::from(self.pull.account_or_head)
            && block.account() == Account::from(self.pull.account_or_head)
    }
}

impl Drop for BulkPullClient {
    fn drop(&mut self) {
        // If received end block is not expected end block
        if self.expected != self.pull.end && !self.expected.is_zero() {
            self.pull.head = self.expected;
            match self.attempt.mode() {
                BootstrapMode::Legacy => {}
                BootstrapMode::Lazy => self.pull.account_or_head = self.expected.into(),
                // The account frontier is still unknown, a retry starts from the account again
                BootstrapMode::WalletLazy => self.pull.head = self.pull.head_original,
            }
            self.pull.processed += self.pull_blocks.saturating_sub(self.unexpected_count);
            debug!(
                "Bulk pull end block is not expected {} for account {} or head block {}",
                self.pull.end, self.pull.account_or_head, self.pull.head
            );
            self.connections
                .requeue_pull(self.pull.clone(), self.network_error);
        } else {
            self.connections.remove_from_cache(&self.pull);
            self.connections
                .stats
                .inc(StatType::BootstrapPull, DetailType::PullCompleted);
        }
        self.attempt.attempt().pull_finished();
    }
}
