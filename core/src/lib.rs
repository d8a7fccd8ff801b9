#[macro_use]
mod u256_struct;

mod amount;
pub use amount::Amount;

mod block_hash;
pub use block_hash::BlockHashBuilder;

mod blocks;
pub use blocks::*;

mod unchecked_info;
pub use unchecked_info::UncheckedInfo;

pub mod utils;

u256_struct!(BlockHash);
u256_struct!(Account);
u256_struct!(HashOrAccount);
u256_struct!(Link);
u256_struct!(Root);

pub fn write_hex_bytes(bytes: &[u8], f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
    for &byte in bytes {
        write!(f, "{:02X}", byte)?;
    }
    Ok(())
}

pub fn to_hex_string(i: u64) -> String {
    format!("{:016X}", i)
}

impl From<HashOrAccount> for Account {
    fn from(source: HashOrAccount) -> Self {
        Account::from_bytes(*source.as_bytes())
    }
}

impl From<&HashOrAccount> for Account {
    fn from(source: &HashOrAccount) -> Self {
        Account::from_bytes(*source.as_bytes())
    }
}

impl From<Link> for Account {
    fn from(link: Link) -> Self {
        Account::from_bytes(*link.as_bytes())
    }
}

impl From<HashOrAccount> for BlockHash {
    fn from(source: HashOrAccount) -> Self {
        BlockHash::from_bytes(*source.as_bytes())
    }
}

impl From<&HashOrAccount> for BlockHash {
    fn from(source: &HashOrAccount) -> Self {
        BlockHash::from_bytes(*source.as_bytes())
    }
}

impl From<Link> for BlockHash {
    fn from(link: Link) -> Self {
        BlockHash::from_bytes(*link.as_bytes())
    }
}

impl From<Root> for BlockHash {
    fn from(root: Root) -> Self {
        BlockHash::from_bytes(*root.as_bytes())
    }
}

impl From<BlockHash> for HashOrAccount {
    fn from(hash: BlockHash) -> Self {
        HashOrAccount::from_bytes(*hash.as_bytes())
    }
}

impl From<&BlockHash> for HashOrAccount {
    fn from(hash: &BlockHash) -> Self {
        HashOrAccount::from_bytes(*hash.as_bytes())
    }
}

impl From<Account> for HashOrAccount {
    fn from(account: Account) -> Self {
        HashOrAccount::from_bytes(*account.as_bytes())
    }
}

impl From<&Account> for HashOrAccount {
    fn from(account: &Account) -> Self {
        HashOrAccount::from_bytes(*account.as_bytes())
    }
}

impl From<Link> for HashOrAccount {
    fn from(link: Link) -> Self {
        HashOrAccount::from_bytes(*link.as_bytes())
    }
}

impl From<Account> for Link {
    fn from(account: Account) -> Self {
        Link::from_bytes(*account.as_bytes())
    }
}

impl From<BlockHash> for Link {
    fn from(hash: BlockHash) -> Self {
        Link::from_bytes(*hash.as_bytes())
    }
}

impl From<Account> for Root {
    fn from(account: Account) -> Self {
        Root::from_bytes(*account.as_bytes())
    }
}

impl From<BlockHash> for Root {
    fn from(hash: BlockHash) -> Self {
        Root::from_bytes(*hash.as_bytes())
    }
}
