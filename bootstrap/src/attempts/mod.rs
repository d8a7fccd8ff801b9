mod bootstrap_attempt;
mod bootstrap_attempts;
mod lazy;
mod legacy;
mod wallet;

pub use bootstrap_attempt::BootstrapAttempt;
pub use bootstrap_attempts::BootstrapAttempts;
pub use lazy::BootstrapAttemptLazy;
pub use legacy::{BootstrapAttemptLegacy, FrontierTarget};
pub use wallet::BootstrapAttemptWallet;

use crate::pulls::PullInfo;
use rsban_core::{Account, Block};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapMode {
    Legacy,
    Lazy,
    WalletLazy,
}

impl BootstrapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapMode::Legacy => "legacy",
            BootstrapMode::Lazy => "lazy",
            BootstrapMode::WalletLazy => "wallet_lazy",
        }
    }
}

/// One bootstrap run. The connection pool consults it before dispatching and
/// when an incomplete pull comes back.
pub enum BootstrapStrategy {
    Lazy(BootstrapAttemptLazy),
    Legacy(Arc<BootstrapAttemptLegacy>),
    Wallet(Arc<BootstrapAttemptWallet>),
}

impl BootstrapStrategy {
    pub fn mode(&self) -> BootstrapMode {
        match self {
            BootstrapStrategy::Lazy(_) => BootstrapMode::Lazy,
            BootstrapStrategy::Legacy(_) => BootstrapMode::Legacy,
            BootstrapStrategy::Wallet(_) => BootstrapMode::WalletLazy,
        }
    }

    pub fn attempt(&self) -> &BootstrapAttempt {
        match self {
            BootstrapStrategy::Lazy(i) => &i.attempt,
            BootstrapStrategy::Legacy(i) => &i.attempt,
            BootstrapStrategy::Wallet(i) => &i.attempt,
        }
    }

    pub fn incremental_id(&self) -> u64 {
        self.attempt().incremental_id
    }

    pub fn id(&self) -> &str {
        &self.attempt().id
    }

    pub fn started(&self) -> bool {
        self.attempt().started()
    }

    pub fn as_lazy(&self) -> Option<&BootstrapAttemptLazy> {
        match self {
            BootstrapStrategy::Lazy(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_wallet(&self) -> Option<&Arc<BootstrapAttemptWallet>> {
        match self {
            BootstrapStrategy::Wallet(i) => Some(i),
            _ => None,
        }
    }

    pub fn run(&self) {
        match self {
            BootstrapStrategy::Lazy(i) => i.run(),
            BootstrapStrategy::Legacy(i) => i.run(),
            BootstrapStrategy::Wallet(i) => i.run(),
        }
    }

    pub fn stop(&self) {
        self.attempt().stop();
    }

    /// Lazy pulls whose target block was processed in the meantime aren't sent
    pub fn pull_is_obsolete(&self, pull: &PullInfo) -> bool {
        match self {
            BootstrapStrategy::Lazy(i) => {
                !pull.account_or_head.is_zero()
                    && i.lazy_processed_or_exists(&pull.account_or_head.into())
            }
            _ => false,
        }
    }

    /// Block count a retried pull asks for
    pub fn retry_batch_size(&self) -> Option<u32> {
        match self {
            BootstrapStrategy::Lazy(i) => Some(i.lazy_batch_size()),
            _ => None,
        }
    }

    /// Returns true if the pull should be stopped
    pub fn process_block(
        &self,
        block: Block,
        known_account: &Account,
        pull_blocks_processed: u64,
        max_blocks: u32,
        block_expected: bool,
        retry_limit: u32,
    ) -> bool {
        match self {
            BootstrapStrategy::Legacy(i) => i.attempt.process_block(block, pull_blocks_processed),
            BootstrapStrategy::Lazy(i) => i.process_block(
                block,
                known_account,
                pull_blocks_processed,
                max_blocks,
                block_expected,
                retry_limit,
            ),
            BootstrapStrategy::Wallet(i) => i.attempt.process_block(block, pull_blocks_processed),
        }
    }

    pub fn information(&self) -> serde_json::Value {
        let attempt = self.attempt();
        let mut info = json!({
            "id": attempt.id,
            "mode": self.mode().as_str(),
            "started": attempt.started(),
            "pulling": attempt.pulling().to_string(),
            "total_blocks": attempt.total_blocks().to_string(),
            "requeued_pulls": attempt.requeued_pulls().to_string(),
            "duration": attempt.duration().as_secs().to_string(),
        });
        let details = match self {
            BootstrapStrategy::Lazy(i) => i.information(),
            BootstrapStrategy::Legacy(i) => i.information(),
            BootstrapStrategy::Wallet(i) => i.information(),
        };
        if let (Some(info), serde_json::Value::Object(details)) = (info.as_object_mut(), details) {
            info.extend(details);
        }
        info
    }
}
