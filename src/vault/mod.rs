pub mod list;
pub mod reader;

pub use list::{DefiProduct, VaultWatcher};
pub use reader::RpcVaultReader;
