mod bootstrap_client;
mod bootstrap_connections;
mod bulk_pull_client;
#[cfg(test)]
pub(crate) mod test_fixture;

pub use bootstrap_client::{BootstrapClient, BootstrapClientId};
pub use bootstrap_connections::*;
pub use bulk_pull_client::BulkPullClient;
