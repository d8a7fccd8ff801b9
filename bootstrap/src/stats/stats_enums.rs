use serde::Serialize;
use serde_variant::to_variant_name;

/// Primary statistics type
#[repr(u8)]
#[derive(Serialize, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    Bootstrap,
    BootstrapConnections,
    BootstrapPull,
    Error,
}

impl StatType {
    pub fn as_str(&self) -> &'static str {
        to_variant_name(self).unwrap_or_default()
    }
}

// Optional detail type
#[repr(u16)]
#[derive(Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[serde(rename_all = "snake_case")]
pub enum DetailType {
    // common
    All = 0,
    Loop,

    // bootstrap
    Initiate,
    InitiateLazy,
    InitiateWalletLazy,
    InitiateLegacyAge,

    // bootstrap connections
    ConnectStart,
    ConnectSuccess,
    ConnectFailed,
    SlowPeerStopped,
    PeerDropped,
    NoPeers,

    // pulls
    BulkPullFailedAccount,
    BulkPullRequestFailure,
    BulkPullErrorBlock,
    RequeuedPull,
    PullCompleted,
    BlocksReceived,
    UnexpectedBlock,
}

impl DetailType {
    pub fn as_str(&self) -> &'static str {
        to_variant_name(self).unwrap_or_default()
    }
}

/// Direction of the stat. If the direction is irrelevant, use In
#[derive(PartialEq, PartialOrd, Eq, Ord, Clone, Copy, Debug)]
#[repr(u8)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}
