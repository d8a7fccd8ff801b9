use rsban_core::BlockHash;
use std::{collections::HashSet, sync::Mutex};

/// Read access to the local ledger
pub trait Ledger: Send + Sync {
    fn block_or_pruned_exists(&self, hash: &BlockHash) -> bool;
}

/// In-memory ledger that only knows which block hashes exist
#[derive(Default)]
pub struct NullLedger {
    blocks: Mutex<HashSet<BlockHash>>,
}

impl NullLedger {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_block(&self, hash: BlockHash) {
        self.blocks.lock().unwrap().insert(hash);
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

impl Ledger for NullLedger {
    fn block_or_pruned_exists(&self, hash: &BlockHash) -> bool {
        self.blocks.lock().unwrap().contains(hash)
    }
}
