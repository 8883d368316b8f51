pub mod explorer_store;
pub mod view_registry;

pub use explorer_store::{ExplorerStore, OrderPage, Snapshot, VaultHistory, ViewKey};
pub use view_registry::ViewRegistry;
