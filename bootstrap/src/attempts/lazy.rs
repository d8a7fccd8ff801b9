use super::{BootstrapAttempt, BootstrapMode};
use crate::{
    bootstrap_limits,
    connections::{BootstrapConnections, BootstrapConnectionsExt},
    ledger::Ledger,
    pulls::PullInfo,
};
use rsban_core::{Account, Block, BlockHash, HashOrAccount, UncheckedInfo};
use serde_json::json;
use std::{
    cmp::max,
    collections::{hash_map::DefaultHasher, HashSet, VecDeque},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::debug;

/// Lazy bootstrap session. Started with a block hash, this will "trace down" the blocks obtained to find a connection to the ledger.
/// This attempts to quickly bootstrap a section of the ledger given a hash that's known to be confirmed.
pub struct BootstrapAttemptLazy {
    pub attempt: BootstrapAttempt,
    data: Mutex<LazyData>,
    lazy_max_pull_blocks: u32,
    lazy_min_pull_blocks: u32,
    lazy_retry_limit: u32,
    lazy_destinations_retry_limit: u32,
}

struct LazyData {
    lazy_blocks: HashSet<u64>,
    lazy_start_time: Instant,
    lazy_blocks_count: usize,
    lazy_pulls: VecDeque<(HashOrAccount, u32)>,
    lazy_keys: HashSet<BlockHash>,
    disable_legacy_bootstrap: bool,
}

fn u64_hash(block_hash: &BlockHash) -> u64 {
    let mut hasher = DefaultHasher::new();
    block_hash.hash(&mut hasher);
    hasher.finish()
}

impl LazyData {
    fn lazy_blocks_insert(&mut self, hash: &BlockHash) {
        let inserted = self.lazy_blocks.insert(u64_hash(hash));
        if inserted {
            self.lazy_blocks_count += 1;
        }
    }

    fn lazy_block_erase(&mut self, hash: &BlockHash) {
        let erased = self.lazy_blocks.remove(&u64_hash(hash));
        if erased {
            self.lazy_blocks_count -= 1;
        }
    }

    fn lazy_add(&mut self, hash_or_account: HashOrAccount, retry_limit: u32) {
        // Add only unknown blocks
        if !self.lazy_blocks_processed(&hash_or_account.into()) {
            self.lazy_pulls.push_back((hash_or_account, retry_limit));
        }
    }

    fn lazy_blocks_processed(&self, hash: &BlockHash) -> bool {
        self.lazy_blocks.contains(&u64_hash(hash))
    }

    fn lazy_has_expired(&self) -> bool {
        // Max 30 minutes run with enabled legacy bootstrap
        let max_lazy_time = if self.disable_legacy_bootstrap {
            Duration::from_secs(7 * 24 * 60 * 60)
        } else {
            Duration::from_secs(30 * 60)
        };
        if self.lazy_start_time.elapsed() >= max_lazy_time {
            true
        } else {
            !self.disable_legacy_bootstrap
                && self.lazy_blocks_count > bootstrap_limits::LAZY_BLOCKS_RESTART_LIMIT
        }
    }

    fn lazy_finished(&mut self, attempt: &BootstrapAttempt, ledger: &dyn Ledger) -> bool {
        if attempt.stopped() {
            return true;
        }

        let mut result = true;
        while let Some(hash) = self.lazy_keys.iter().next().cloned() {
            if attempt.stopped() {
                break;
            }
            if ledger.block_or_pruned_exists(&hash) {
                self.lazy_keys.remove(&hash);
            } else {
                result = false;
                break;
            }
        }

        // Finish lazy bootstrap without lazy pulls (in combination with still_pulling ())
        if !result && self.lazy_pulls.is_empty() {
            result = true;
        }
        result
    }
}

impl BootstrapAttemptLazy {
    pub fn new(id: String, incremental_id: u64, connections: Arc<BootstrapConnections>) -> Self {
        let config = connections.config.clone();
        Self {
            attempt: BootstrapAttempt::new(id, incremental_id, BootstrapMode::Lazy, connections),
            data: Mutex::new(LazyData {
                lazy_blocks: Default::default(),
                lazy_pulls: Default::default(),
                lazy_keys: Default::default(),
                lazy_start_time: Instant::now(),
                lazy_blocks_count: 0,
                disable_legacy_bootstrap: config.disable_legacy_bootstrap,
            }),
            lazy_max_pull_blocks: config.lazy_max_pull_blocks,
            lazy_min_pull_blocks: config.lazy_min_pull_blocks,
            lazy_retry_limit: config.lazy_retry_limit,
            lazy_destinations_retry_limit: config.lazy_destinations_retry_limit,
        }
    }

    fn ledger(&self) -> &dyn Ledger {
        self.attempt.connections.ledger.as_ref()
    }

    pub fn process_block(
        &self,
        block: Block,
        known_account: &Account,
        pull_blocks_processed: u64,
        max_blocks: u32,
        block_expected: bool,
        retry_limit: u32,
    ) -> bool {
        if block_expected {
            self.process_block_lazy(
                block,
                known_account,
                pull_blocks_processed,
                max_blocks,
                retry_limit,
            )
        } else {
            // Drop connection with unexpected block for lazy bootstrap
            true
        }
    }

    fn process_block_lazy(
        &self,
        block: Block,
        _known_account: &Account,
        pull_blocks_processed: u64,
        max_blocks: u32,
        retry_limit: u32,
    ) -> bool {
        let hash = block.hash();
        let lock = self.attempt.mutex.lock().unwrap();
        let mut data = self.data.lock().unwrap();
        // Processing new blocks
        if !data.lazy_blocks_processed(&hash) {
            // Search for new dependencies
            let source = BlockHash::from(block.link());
            if block.is_open()
                && !source.is_zero()
                && !data.lazy_blocks_processed(&source)
                && !self.ledger().block_or_pruned_exists(&source)
            {
                data.lazy_add(source.into(), retry_limit);
            }
            data.lazy_blocks_insert(&hash);
            drop(data);
            drop(lock);
            self.attempt
                .connections
                .block_processor
                .add(UncheckedInfo::new(block));
        }
        // Force drop lazy bootstrap connection for long bulk_pull
        pull_blocks_processed > max_blocks as u64
    }

    fn lazy_pull_flush<'a>(
        &'a self,
        mut lock: MutexGuard<'a, ()>,
        mut data: MutexGuard<'a, LazyData>,
    ) -> (MutexGuard<'a, ()>, MutexGuard<'a, LazyData>) {
        const MAX_PULLS: u32 = bootstrap_limits::BOOTSTRAP_CONNECTION_SCALE_TARGET_BLOCKS * 3;
        if self.attempt.pulling() < MAX_PULLS {
            let batch_count = self.lazy_batch_size_locked(&data);
            let mut count = 0;
            while count < MAX_PULLS {
                let Some((account_or_head, retry_limit)) = data.lazy_pulls.pop_front() else {
                    break;
                };
                let head = BlockHash::from(account_or_head);
                // Recheck if block was already processed
                if !data.lazy_blocks_processed(&head) && !self.ledger().block_or_pruned_exists(&head)
                {
                    drop(data);
                    drop(lock);
                    self.attempt.pull_started();
                    self.attempt.connections.add_pull(PullInfo::for_hash(
                        head,
                        self.attempt.incremental_id,
                        batch_count,
                        retry_limit,
                    ));
                    count += 1;
                    lock = self.attempt.mutex.lock().unwrap();
                    data = self.data.lock().unwrap();
                }
            }
        }
        (lock, data)
    }

    pub fn lazy_processed_or_exists(&self, hash: &BlockHash) -> bool {
        let lock = self.attempt.mutex.lock().unwrap();
        let data = self.data.lock().unwrap();
        if data.lazy_blocks_processed(hash) {
            return true;
        }
        drop(data);
        drop(lock);
        self.ledger().block_or_pruned_exists(hash)
    }

    pub fn lazy_batch_size(&self) -> u32 {
        let data = self.data.lock().unwrap();
        self.lazy_batch_size_locked(&data)
    }

    fn lazy_batch_size_locked(&self, data: &LazyData) -> u32 {
        let mut result = self.lazy_max_pull_blocks;
        let total_blocks = self.attempt.total_blocks();
        if total_blocks > bootstrap_limits::LAZY_BATCH_PULL_COUNT_RESIZE_BLOCKS_LIMIT
            && data.lazy_blocks_count != 0
        {
            let lazy_blocks_ratio = (total_blocks / data.lazy_blocks_count as u64) as f64;
            if lazy_blocks_ratio > bootstrap_limits::LAZY_BATCH_PULL_COUNT_RESIZE_RATIO {
                // Increasing blocks ratio weight as more important (^3). Small batch count should lower blocks ratio below target
                let lazy_blocks_factor = (lazy_blocks_ratio
                    / bootstrap_limits::LAZY_BATCH_PULL_COUNT_RESIZE_RATIO)
                    .powi(3);
                // Decreasing total block count weight as less important (sqrt)
                let total_blocks_factor = ((total_blocks
                    / bootstrap_limits::LAZY_BATCH_PULL_COUNT_RESIZE_BLOCKS_LIMIT)
                    as f64)
                    .sqrt();
                let batch_count_min = self.lazy_max_pull_blocks
                    / ((lazy_blocks_factor * total_blocks_factor) as u32).max(1);
                result = max(self.lazy_min_pull_blocks, batch_count_min);
            }
        }
        result
    }

    /// Returns true if the key was inserted
    pub fn lazy_start(&self, hash_or_account: &HashOrAccount) -> bool {
        let lock = self.attempt.mutex.lock().unwrap();
        let mut data = self.data.lock().unwrap();
        // Add start blocks, limit 1024 (4k with disabled legacy bootstrap)
        let max_keys = if data.disable_legacy_bootstrap {
            4 * 1024
        } else {
            1024
        };
        let key = BlockHash::from(hash_or_account);
        if data.lazy_keys.len() < max_keys
            && !data.lazy_keys.contains(&key)
            && !data.lazy_blocks_processed(&key)
        {
            data.lazy_keys.insert(key);
            data.lazy_pulls
                .push_back((*hash_or_account, self.lazy_retry_limit));
            drop(data);
            drop(lock);
            self.attempt.notify();
            true
        } else {
            false
        }
    }

    pub fn lazy_add(&self, pull: &PullInfo) {
        debug_assert_eq!(BlockHash::from(pull.account_or_head), pull.head);
        {
            let _lock = self.attempt.mutex.lock().unwrap();
            let mut data = self.data.lock().unwrap();
            data.lazy_add(pull.account_or_head, pull.retry_limit);
        }
        self.attempt.notify();
    }

    /// Pulls a single processed block again, e.g. after the block processor rejected it
    pub fn lazy_requeue(&self, hash: &BlockHash, previous: &BlockHash) {
        let lock = self.attempt.mutex.lock().unwrap();
        let mut data = self.data.lock().unwrap();
        // Add only known blocks
        if data.lazy_blocks_processed(hash) {
            data.lazy_block_erase(hash);
            drop(data);
            drop(lock);
            let mut pull = PullInfo::for_hash(
                *hash,
                self.attempt.incremental_id,
                1,
                self.lazy_destinations_retry_limit,
            );
            pull.end = *previous;
            self.attempt.connections.requeue_pull(pull, false);
        }
    }

    pub fn lazy_blocks_count(&self) -> usize {
        self.data.lock().unwrap().lazy_blocks_count
    }

    pub fn lazy_pulls_count(&self) -> usize {
        self.data.lock().unwrap().lazy_pulls.len()
    }

    pub fn lazy_keys_count(&self) -> usize {
        self.data.lock().unwrap().lazy_keys.len()
    }

    pub fn information(&self) -> serde_json::Value {
        let data = self.data.lock().unwrap();
        let mut info = json!({
            "lazy_blocks": data.lazy_blocks.len().to_string(),
            "lazy_pulls": data.lazy_pulls.len().to_string(),
            "lazy_keys": data.lazy_keys.len().to_string(),
        });
        if let Some(key) = data.lazy_keys.iter().next() {
            info["lazy_key_1"] = key.to_string().into();
        }
        info
    }

    pub fn run(&self) {
        debug_assert!(self.attempt.started());
        self.attempt.connections.populate_connections(false);
        if !self.attempt.wait_for_peer() {
            self.attempt.stop();
            return;
        }
        let mut lock = self.attempt.mutex.lock().unwrap();
        let mut data = self.data.lock().unwrap();
        data.lazy_start_time = Instant::now();
        while (self.attempt.still_pulling() || !data.lazy_finished(&self.attempt, self.ledger()))
            && !data.lazy_has_expired()
        {
            while self.attempt.still_pulling() && !data.lazy_has_expired() {
                while !(self.attempt.stopped()
                    || self.attempt.pulling() == 0
                    || (self.attempt.pulling()
                        < bootstrap_limits::BOOTSTRAP_CONNECTION_SCALE_TARGET_BLOCKS
                        && !data.lazy_pulls.is_empty())
                    || data.lazy_has_expired())
                {
                    drop(data);
                    lock = self.attempt.condition.wait(lock).unwrap();
                    data = self.data.lock().unwrap();
                }
                // Flushing lazy pulls
                (lock, data) = self.lazy_pull_flush(lock, data);
            }
            // Flushing lazy pulls
            (lock, data) = self.lazy_pull_flush(lock, data);
        }
        if !self.attempt.stopped() {
            debug!("Completed lazy pulls");
        }
        if data.lazy_has_expired() {
            debug!("Lazy bootstrap attempt ID {} expired", self.attempt.id);
        }
        drop(data);
        drop(lock);
        self.attempt.stop();
    }
}

impl Drop for BootstrapAttemptLazy {
    fn drop(&mut self) {
        let data = self.data.lock().unwrap();
        debug_assert_eq!(data.lazy_blocks.len(), data.lazy_blocks_count)
    }
}
