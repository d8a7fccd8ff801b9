mod pull_info;
mod pulls_cache;

pub use pull_info::PullInfo;
pub use pulls_cache::PullsCache;
