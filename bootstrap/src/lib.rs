pub mod attempts;
pub mod block_processing;
mod bootstrap_initiator;
pub mod config;
pub mod connections;
pub mod ledger;
pub mod pulls;
pub mod stats;
pub mod transport;
pub mod utils;

pub use bootstrap_initiator::*;

pub mod bootstrap_limits {
    pub const PULL_COUNT_PER_CHECK: u64 = 8 * 1024;
    pub const LAZY_BLOCKS_RESTART_LIMIT: usize = 1024 * 1024;
    pub const BOOTSTRAP_CONNECTION_SCALE_TARGET_BLOCKS: u32 = 10000;
    pub const BOOTSTRAP_CONNECTION_WARMUP_TIME_SEC: f64 = 5.0;
    pub const BOOTSTRAP_MINIMUM_ELAPSED_SECONDS_BLOCKRATE: f64 = 0.02;
    pub const BOOTSTRAP_MINIMUM_BLOCKS_PER_SEC: f64 = 10.0;
    pub const BOOTSTRAP_MINIMUM_TERMINATION_TIME_SEC: f64 = 30.0;
    pub const BOOTSTRAP_MAX_NEW_CONNECTIONS: u32 = 32;
    pub const REQUEUED_PULLS_PROCESSED_BLOCKS_FACTOR: u32 = 4096;
    pub const LAZY_BATCH_PULL_COUNT_RESIZE_BLOCKS_LIMIT: u64 = 4 * 1024 * 1024;
    pub const LAZY_BATCH_PULL_COUNT_RESIZE_RATIO: f64 = 2.0;
}
