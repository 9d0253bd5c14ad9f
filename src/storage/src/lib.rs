mod local_store;
mod server;

pub use local_store::LocalStore;
pub use server::{StorageConfig, StorageServer};
