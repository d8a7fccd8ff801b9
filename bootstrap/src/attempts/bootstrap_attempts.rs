use super::BootstrapStrategy;
use std::{collections::HashMap, sync::Arc};

/// Container for bootstrap sessions that are active. Owned by `BootstrapInitiator`.
pub struct BootstrapAttempts {
    incremental: u64,
    attempts: HashMap<u64, Arc<BootstrapStrategy>>,
}

impl BootstrapAttempts {
    pub fn new() -> Self {
        Self {
            incremental: 0,
            attempts: HashMap::new(),
        }
    }

    pub fn get_incremental_id(&mut self) -> u64 {
        let id = self.incremental;
        self.incremental += 1;
        id
    }

    pub fn add(&mut self, attempt: Arc<BootstrapStrategy>) {
        self.attempts.insert(attempt.incremental_id(), attempt);
    }

    pub fn remove(&mut self, incremental_id: u64) {
        self.attempts.remove(&incremental_id);
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
    }

    pub fn find(&self, incremental_id: u64) -> Option<&Arc<BootstrapStrategy>> {
        self.attempts.get(&incremental_id)
    }

    pub fn size(&self) -> usize {
        self.attempts.len()
    }

    pub fn total_attempts(&self) -> u64 {
        self.incremental
    }

    pub fn attempts_information(&self) -> Vec<serde_json::Value> {
        let mut attempts: Vec<_> = self.attempts.values().collect();
        attempts.sort_by_key(|a| a.incremental_id());
        attempts.iter().map(|a| a.information()).collect()
    }
}

impl Default for BootstrapAttempts {
    fn default() -> Self {
        Self::new()
    }
}
