mod bootstrap_channel;
mod bootstrap_peers;
mod null_channel;
mod peer_exclusion;

pub use bootstrap_channel::*;
pub use bootstrap_peers::*;
pub use null_channel::*;
pub use peer_exclusion::PeerExclusion;
