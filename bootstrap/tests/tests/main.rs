mod fixture;
mod lazy;
mod legacy;
mod no_peers;
mod wallet;
