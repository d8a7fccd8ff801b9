use crate::{Block, BlockHash};
use std::time::{SystemTime, UNIX_EPOCH};

/// A block received from a peer that has not been validated yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UncheckedInfo {
    pub block: Block,

    /// Seconds since posix epoch
    pub modified: u64,
}

impl UncheckedInfo {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            modified: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        self.block.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_modified_time() {
        let info = UncheckedInfo::new(Block::new_test_instance());
        assert!(info.modified > 0);
        assert_eq!(info.hash(), Block::new_test_instance().hash());
    }
}
