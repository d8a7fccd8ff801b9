use crate::ledger::NullLedger;
use rsban_core::UncheckedInfo;
use rsban_output_tracker::{OutputListenerMt, OutputTrackerMt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Validates and stores blocks fetched during bootstrap
pub trait BlockProcessor: Send + Sync {
    /// Queues the block. Returns false if it was dropped.
    fn add(&self, info: UncheckedInfo) -> bool;
    fn half_full(&self) -> bool;
}

/// Accepts every block. With a ledger attached, accepted blocks become known to it immediately.
pub struct NullBlockProcessor {
    ledger: Option<Arc<NullLedger>>,
    half_full: AtomicBool,
    add_listener: OutputListenerMt<UncheckedInfo>,
}

impl NullBlockProcessor {
    pub fn new() -> Self {
        Self {
            ledger: None,
            half_full: AtomicBool::new(false),
            add_listener: OutputListenerMt::new(),
        }
    }

    pub fn with_ledger(ledger: Arc<NullLedger>) -> Self {
        Self {
            ledger: Some(ledger),
            ..Self::new()
        }
    }

    pub fn set_half_full(&self, half_full: bool) {
        self.half_full.store(half_full, Ordering::SeqCst);
    }

    pub fn track(&self) -> Arc<OutputTrackerMt<UncheckedInfo>> {
        self.add_listener.track()
    }
}

impl Default for NullBlockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockProcessor for NullBlockProcessor {
    fn add(&self, info: UncheckedInfo) -> bool {
        if let Some(ledger) = &self.ledger {
            ledger.add_block(info.hash());
        }
        self.add_listener.emit(info);
        true
    }

    fn half_full(&self) -> bool {
        self.half_full.load(Ordering::SeqCst)
    }
}
