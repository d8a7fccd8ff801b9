use crate::BlockHash;
use blake2::{
    digest::{consts::U32, Digest},
    Blake2b,
};

pub struct BlockHashBuilder {
    blake: Blake2b<U32>,
}

impl Default for BlockHashBuilder {
    fn default() -> Self {
        Self {
            blake: Blake2b::<U32>::new(),
        }
    }
}

impl BlockHashBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn update(mut self, data: impl AsRef<[u8]>) -> Self {
        Digest::update(&mut self.blake, data);
        self
    }

    pub fn build(self) -> BlockHash {
        let mut hash_bytes = [0u8; 32];
        hash_bytes.copy_from_slice(&self.blake.finalize());
        BlockHash::from_bytes(hash_bytes)
    }
}
