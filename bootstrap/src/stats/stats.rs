use super::{DetailType, Direction, StatType};
use rsban_core::utils::{get_env_bool, ContainerInfo};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::{Duration, Instant},
};
use tracing::debug;

pub struct Stats {
    mutables: RwLock<StatMutables>,
    enable_logging: bool,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            mutables: RwLock::new(StatMutables {
                counters: BTreeMap::new(),
                timestamp: Instant::now(),
            }),
            enable_logging: get_env_bool("RSBAN_LOG_STATS").unwrap_or(false),
        }
    }

    /// Add `value` to given counter
    pub fn add(&self, stat_type: StatType, detail: DetailType, value: u64) {
        self.add_dir(stat_type, detail, Direction::In, value)
    }

    /// Add `value` to given counter. The type level `All` counter is kept in sync.
    pub fn add_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction, value: u64) {
        if value == 0 {
            return;
        }

        if self.enable_logging {
            debug!(
                "Stat: {:?}::{:?}::{:?} += {}",
                stat_type, detail, dir, value
            );
        }

        let key = CounterKey::new(stat_type, detail, dir);
        let all_key = CounterKey::new(stat_type, DetailType::All, dir);

        // This is a two-step process to avoid exclusively locking the mutex in the common case
        {
            let lock = self.mutables.read().unwrap();
            if let (Some(counter), Some(all_counter)) =
                (lock.counters.get(&key), lock.counters.get(&all_key))
            {
                counter.add(value);
                if key != all_key {
                    all_counter.add(value);
                }
                return;
            }
        }
        // Not found, create a new entry
        {
            let mut lock = self.mutables.write().unwrap();
            lock.counters
                .entry(key)
                .or_insert_with(CounterEntry::new)
                .add(value);
            if key != all_key {
                lock.counters
                    .entry(all_key)
                    .or_insert_with(CounterEntry::new)
                    .add(value);
            }
        }
    }

    pub fn inc(&self, stat_type: StatType, detail: DetailType) {
        self.add_dir(stat_type, detail, Direction::In, 1)
    }

    pub fn inc_dir(&self, stat_type: StatType, detail: DetailType, dir: Direction) {
        self.add_dir(stat_type, detail, dir, 1)
    }

    /// Returns current value for the given counter
    pub fn count(&self, stat_type: StatType, detail: DetailType, dir: Direction) -> u64 {
        let key = CounterKey::new(stat_type, detail, dir);
        self.mutables
            .read()
            .unwrap()
            .counters
            .get(&key)
            .map(|i| i.into())
            .unwrap_or_default()
    }

    /// Returns current value for the given counter at the type level
    pub fn count_all(&self, stat_type: StatType, dir: Direction) -> u64 {
        self.count(stat_type, DetailType::All, dir)
    }

    /// Returns the duration since `clear()` was last called, or creation if it's never called.
    pub fn last_reset(&self) -> Duration {
        self.mutables.read().unwrap().timestamp.elapsed()
    }

    /// Clear all stats
    pub fn clear(&self) {
        let mut lock = self.mutables.write().unwrap();
        lock.counters.clear();
        lock.timestamp = Instant::now();
    }

    /// Counters as `{ "type": { "detail": { "dir": value } } }`
    pub fn to_json(&self) -> Value {
        let lock = self.mutables.read().unwrap();
        let mut types = Map::new();
        for (key, entry) in &lock.counters {
            let details = types
                .entry(key.stat_type.as_str())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(details) = details {
                let dirs = details
                    .entry(key.detail.as_str())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(dirs) = dirs {
                    dirs.insert(key.dir.as_str().to_owned(), u64::from(entry).into());
                }
            }
        }
        Value::Object(types)
    }

    pub fn container_info(&self) -> ContainerInfo {
        [(
            "counters",
            self.mutables.read().unwrap().counters.len(),
            std::mem::size_of::<CounterKey>() + std::mem::size_of::<CounterEntry>(),
        )]
        .into()
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
struct CounterKey {
    stat_type: StatType,
    detail: DetailType,
    dir: Direction,
}

impl CounterKey {
    fn new(stat_type: StatType, detail: DetailType, dir: Direction) -> Self {
        Self {
            stat_type,
            detail,
            dir,
        }
    }
}

struct StatMutables {
    counters: BTreeMap<CounterKey, CounterEntry>,
    /// Time of last clear() call
    timestamp: Instant,
}

struct CounterEntry(AtomicU64);

impl CounterEntry {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }
}

impl From<&CounterEntry> for u64 {
    fn from(value: &CounterEntry) -> Self {
        value.0.load(Ordering::SeqCst)
    }
}
