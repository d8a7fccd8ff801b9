use rsban_core::{BlockHash, HashOrAccount};

/// An outstanding request for a range of an account chain.
/// `account_or_head` identifies the pull, `head` moves forward as blocks arrive.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct PullInfo {
    pub account_or_head: HashOrAccount,
    pub head: BlockHash,
    pub head_original: BlockHash,
    pub end: BlockHash,
    pub count: u32,
    pub attempts: u32,
    pub processed: u64,
    pub retry_limit: u32,
    pub bootstrap_id: u64,
}

impl PullInfo {
    pub fn new(
        account_or_head: HashOrAccount,
        head: BlockHash,
        end: BlockHash,
        bootstrap_id: u64,
        count: u32,
        retry_limit: u32,
    ) -> Self {
        Self {
            account_or_head,
            head,
            head_original: head,
            end,
            count,
            attempts: 0,
            processed: 0,
            retry_limit,
            bootstrap_id,
        }
    }

    /// Pull of a block and its predecessors, as requested by lazy bootstrap
    pub fn for_hash(hash: BlockHash, bootstrap_id: u64, count: u32, retry_limit: u32) -> Self {
        Self::new(
            hash.into(),
            hash,
            BlockHash::zero(),
            bootstrap_id,
            count,
            retry_limit,
        )
    }

    pub fn new_test_instance() -> Self {
        Self::for_hash(BlockHash::from(42), 0, 0, 16)
    }

    /// A fresh pull asks for the account on the first three of every four attempts,
    /// a pull that made progress continues from its current head.
    pub fn request_start(&self) -> HashOrAccount {
        if self.head == self.head_original && self.attempts % 4 < 3 {
            self.account_or_head
        } else {
            self.head.into()
        }
    }
}
