use crate::{Account, Amount, Block, BlockHash, Link};

/// Builds a chain of blocks for a single account. Used by tests that need
/// realistic predecessor links without a ledger.
pub struct TestAccountChain {
    account: Account,
    balance: Amount,
    blocks: Vec<Block>,
}

impl TestAccountChain {
    pub fn new() -> Self {
        Self::with_account(Account::random())
    }

    pub fn with_account(account: Account) -> Self {
        Self {
            account,
            balance: Amount::zero(),
            blocks: Vec::new(),
        }
    }

    /// Creates a chain with `height` blocks. The open block receives from a random source.
    pub fn with_height(height: usize) -> Self {
        let mut chain = Self::new();
        for _ in 0..height {
            chain.add_block();
        }
        chain
    }

    pub fn account(&self) -> Account {
        self.account
    }

    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn open(&self) -> BlockHash {
        self.blocks[0].hash()
    }

    pub fn frontier(&self) -> BlockHash {
        self.blocks.last().map(|b| b.hash()).unwrap_or_default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block at `height`, starting at 1 for the open block
    pub fn block(&self, height: u64) -> &Block {
        &self.blocks[height as usize - 1]
    }

    pub fn add_block(&mut self) -> &Block {
        let link = if self.blocks.is_empty() {
            Link::random()
        } else {
            Link::zero()
        };
        self.add_block_with_link(link)
    }

    pub fn add_block_with_link(&mut self, link: Link) -> &Block {
        self.balance = self.balance.wrapping_add(Amount::raw(1));
        let block = Block::new(
            self.account,
            self.frontier(),
            self.account,
            self.balance,
            link,
            self.blocks.len() as u64,
        );
        self.blocks.push(block);
        self.blocks.last().unwrap()
    }

    /// Blocks from the frontier down to (but excluding) `end`, in the order a
    /// peer streams them for a pull.
    pub fn blocks_from_frontier(&self, end: &BlockHash) -> Vec<Block> {
        self.blocks
            .iter()
            .rev()
            .take_while(|b| b.hash() != *end)
            .cloned()
            .collect()
    }
}

impl Default for TestAccountChain {
    fn default() -> Self {
        Self::new()
    }
}
