mod test_account_chain;
pub use test_account_chain::TestAccountChain;

use crate::{Account, Amount, BlockHash, BlockHashBuilder, Link};
use serde::{Deserialize, Serialize};

/// Fields that go into a block's hash
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BlockHashables {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    pub link: Link,
}

impl From<&BlockHashables> for BlockHash {
    fn from(hashables: &BlockHashables) -> Self {
        let mut preamble = [0u8; 32];
        preamble[31] = Block::PREAMBLE_TYPE;
        BlockHashBuilder::new()
            .update(preamble)
            .update(hashables.account.as_bytes())
            .update(hashables.previous.as_bytes())
            .update(hashables.representative.as_bytes())
            .update(hashables.balance.to_be_bytes())
            .update(hashables.link.as_bytes())
            .build()
    }
}

/// A state block as it travels through bootstrap. Signature and work are
/// validated further down the pipeline and are not inspected here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    hashables: BlockHashables,
    pub work: u64,
    hash: BlockHash,
}

impl Block {
    const PREAMBLE_TYPE: u8 = 6;

    pub fn new(
        account: Account,
        previous: BlockHash,
        representative: Account,
        balance: Amount,
        link: Link,
        work: u64,
    ) -> Self {
        let hashables = BlockHashables {
            account,
            previous,
            representative,
            balance,
            link,
        };
        let hash = BlockHash::from(&hashables);
        Self {
            hashables,
            work,
            hash,
        }
    }

    pub fn new_test_instance() -> Self {
        Self::new(
            Account::from(1),
            BlockHash::from(2),
            Account::from(3),
            Amount::raw(4),
            Link::from(5),
            6,
        )
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    pub fn account(&self) -> Account {
        self.hashables.account
    }

    pub fn previous(&self) -> BlockHash {
        self.hashables.previous
    }

    pub fn representative(&self) -> Account {
        self.hashables.representative
    }

    pub fn balance(&self) -> Amount {
        self.hashables.balance
    }

    pub fn link(&self) -> Link {
        self.hashables.link
    }

    /// Open blocks have no predecessor in their own chain
    pub fn is_open(&self) -> bool {
        self.hashables.previous.is_zero()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.work == other.work
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_covers_all_hashables() {
        let block = Block::new_test_instance();
        let other = Block::new(
            block.account(),
            block.previous(),
            block.representative(),
            Amount::raw(999),
            block.link(),
            block.work,
        );
        assert_ne!(block.hash(), other.hash());
    }

    #[test]
    fn work_is_not_hashed() {
        let block = Block::new_test_instance();
        let mut other = block.clone();
        other.work = 12345;
        assert_eq!(block.hash(), other.hash());
    }

    #[test]
    fn open_block() {
        let open = Block::new(
            Account::from(1),
            BlockHash::zero(),
            Account::from(1),
            Amount::raw(1),
            Link::from(9),
            0,
        );
        assert!(open.is_open());
        assert!(!Block::new_test_instance().is_open());
    }
}
