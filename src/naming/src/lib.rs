pub mod naming_service;

pub mod config;
mod namespace;
mod path_lock;
mod registry;
mod replication;

pub use config::NamingConfig;
pub use naming_service::NamingServer;

#[cfg(test)]
mod test_util;
