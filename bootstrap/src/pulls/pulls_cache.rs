use super::PullInfo;
#[cfg(test)]
use mock_instant::thread_local::Instant;
use rsban_core::BlockHash;
#[cfg(not(test))]
use std::time::Instant;
use std::{
    collections::{BTreeMap, HashMap},
    mem::size_of,
};

type AccountHead = [u8; 64];

/// Remembers how far failed legacy pulls got, so that a later
/// bootstrap run can continue from there instead of starting over.
pub struct PullsCache {
    max_cache_size: usize,
    by_account_head: HashMap<AccountHead, CachedPull>,
    by_time: BTreeMap<Instant, Vec<AccountHead>>,
}

impl PullsCache {
    pub const ELEMENT_SIZE: usize =
        size_of::<CachedPull>() + size_of::<AccountHead>() * 2 + size_of::<Instant>();

    /// Pulls that processed this many blocks or fewer are not worth caching
    const MIN_PROCESSED: u64 = 500;

    pub fn new() -> Self {
        Self::with_max_cache_size(10_000)
    }

    pub fn with_max_cache_size(max_cache_size: usize) -> Self {
        Self {
            by_account_head: HashMap::new(),
            by_time: BTreeMap::new(),
            max_cache_size,
        }
    }

    pub fn size(&self) -> usize {
        self.by_account_head.len()
    }

    pub fn contains(&self, pull: &PullInfo) -> bool {
        self.by_account_head.contains_key(&account_head(pull))
    }

    pub fn add(&mut self, pull: &PullInfo) {
        if pull.processed <= Self::MIN_PROCESSED {
            return;
        }
        let key = account_head(pull);
        let now = Instant::now();
        if let Some(existing) = self.by_account_head.get_mut(&key) {
            remove_time_entry(&mut self.by_time, existing.time, &key);
            existing.time = now;
            existing.new_head = pull.head;
        } else {
            self.evict_oldest();
            self.by_account_head.insert(
                key,
                CachedPull {
                    time: now,
                    new_head: pull.head,
                },
            );
        }
        self.by_time.entry(now).or_default().push(key);
    }

    fn evict_oldest(&mut self) {
        while self.size() >= self.max_cache_size {
            let Some(mut oldest) = self.by_time.first_entry() else {
                break;
            };
            let key = oldest.get_mut().pop();
            if oldest.get().is_empty() {
                oldest.remove();
            }
            if let Some(key) = key {
                self.by_account_head.remove(&key);
            }
        }
    }

    /// Continues the pull from the head a previous run got to
    pub fn update_pull(&self, pull: &mut PullInfo) {
        if let Some(existing) = self.by_account_head.get(&account_head(pull)) {
            pull.head = existing.new_head;
        }
    }

    pub fn remove(&mut self, pull: &PullInfo) {
        let key = account_head(pull);
        if let Some(existing) = self.by_account_head.remove(&key) {
            remove_time_entry(&mut self.by_time, existing.time, &key);
        }
    }
}

impl Default for PullsCache {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_time_entry(
    by_time: &mut BTreeMap<Instant, Vec<AccountHead>>,
    time: Instant,
    key: &AccountHead,
) {
    if let Some(keys) = by_time.get_mut(&time) {
        keys.retain(|x| x != key);
        if keys.is_empty() {
            by_time.remove(&time);
        }
    }
}

fn account_head(pull: &PullInfo) -> AccountHead {
    let mut key = [0; 64];
    key[..32].copy_from_slice(pull.account_or_head.as_bytes());
    key[32..].copy_from_slice(pull.head_original.as_bytes());
    key
}

struct CachedPull {
    time: Instant,
    new_head: BlockHash,
}
