use super::{BootstrapAttempt, BootstrapMode};
use crate::{
    connections::{BootstrapConnections, BootstrapConnectionsExt},
    pulls::PullInfo,
};
use rsban_core::{Account, BlockHash, HashOrAccount};
use serde_json::json;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::info;

const MAX_WALLET_BOOTSTRAP_TIME: Duration = Duration::from_secs(10 * 60);

/// Pulls the account chains of wallet accounts
pub struct BootstrapAttemptWallet {
    pub attempt: BootstrapAttempt,
    wallet_accounts: Mutex<VecDeque<Account>>,
    lazy_retry_limit: u32,
}

impl BootstrapAttemptWallet {
    pub fn new(id: String, incremental_id: u64, connections: Arc<BootstrapConnections>) -> Self {
        let lazy_retry_limit = connections.config.lazy_retry_limit;
        Self {
            attempt: BootstrapAttempt::new(
                id,
                incremental_id,
                BootstrapMode::WalletLazy,
                connections,
            ),
            wallet_accounts: Mutex::new(VecDeque::new()),
            lazy_retry_limit,
        }
    }

    /// Replaces the accounts that are waiting to be pulled
    pub fn wallet_start(&self, accounts: VecDeque<Account>) {
        {
            let _guard = self.attempt.mutex.lock().unwrap();
            *self.wallet_accounts.lock().unwrap() = accounts;
        }
        self.attempt.notify();
    }

    pub fn wallet_size(&self) -> usize {
        self.wallet_accounts.lock().unwrap().len()
    }

    pub fn run(&self) {
        debug_assert!(self.attempt.started());
        self.attempt.connections.populate_connections(false);
        let start_time = Instant::now();
        if self.attempt.wait_for_peer() {
            let mut guard = self.attempt.mutex.lock().unwrap();
            while self.wallet_unfinished() && start_time.elapsed() < MAX_WALLET_BOOTSTRAP_TIME {
                let next = self.wallet_accounts.lock().unwrap().pop_front();
                match next {
                    Some(account) => {
                        drop(guard);
                        self.request_account(account);
                        guard = self.attempt.mutex.lock().unwrap();
                    }
                    None => {
                        guard = self
                            .attempt
                            .condition
                            .wait_timeout(guard, Duration::from_secs(1))
                            .unwrap()
                            .0;
                    }
                }
            }
            drop(guard);
            if !self.attempt.stopped() {
                info!("Completed wallet lazy pulls");
            }
        }
        self.attempt.stop();
    }

    fn wallet_unfinished(&self) -> bool {
        let more_accounts = !self.wallet_accounts.lock().unwrap().is_empty();
        !self.attempt.stopped() && (more_accounts || self.attempt.pulling() > 0)
    }

    /// The frontier of a wallet account is unknown, so the account itself
    /// stands in for the head of the pull.
    fn request_account(&self, account: Account) {
        let account_or_head = HashOrAccount::from(account);
        let pull = PullInfo::new(
            account_or_head,
            BlockHash::from(account_or_head),
            BlockHash::zero(),
            self.attempt.incremental_id,
            0,
            self.lazy_retry_limit,
        );
        self.attempt.pull_started();
        self.attempt.connections.add_pull(pull);
    }

    pub fn information(&self) -> serde_json::Value {
        json!({
            "wallet_accounts": self.wallet_size().to_string(),
        })
    }
}
