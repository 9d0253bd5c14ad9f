use crate::local_store::LocalStore;
use dfs_lib::{ControlHandle, DataHandle, DfsResult, Registration, StorageControl};
use log::{info, warn};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(alias = "root_path", alias = "base_dir")]
    pub root: PathBuf,
    pub host: IpAddr,
    /// Port of the client (data) interface. Per-instance, unlike the naming
    /// server's well-known ports.
    pub data_port: u16,
    /// Port of the command (control) interface.
    pub control_port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage-root"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            data_port: 7000,
            control_port: 7001,
        }
    }
}

/// One storage server: a local byte store plus the endpoints it advertises.
/// A transport serves the store's two interfaces at those endpoints; the
/// handles built here carry the same endpoints so the naming server can key
/// the server's identity on them.
pub struct StorageServer {
    store: Arc<LocalStore>,
    data_endpoint: SocketAddr,
    control_endpoint: SocketAddr,
}

impl StorageServer {
    pub async fn new(config: StorageConfig) -> DfsResult<Self> {
        let store = Arc::new(LocalStore::open(config.root).await?);
        Ok(Self {
            store,
            data_endpoint: SocketAddr::new(config.host, config.data_port),
            control_endpoint: SocketAddr::new(config.host, config.control_port),
        })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn data_handle(&self) -> DataHandle {
        DataHandle::new(self.data_endpoint, self.store.clone())
    }

    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle::new(self.control_endpoint, self.store.clone())
    }

    /// Join the filesystem: advertise every local file to the naming server,
    /// then delete the paths it reports as already taken.
    pub async fn start(&self, registration: &dyn Registration) -> DfsResult<()> {
        let files = self.store.local_files().await?;
        info!(
            "registering storage server {} with {} file(s)",
            self.data_endpoint,
            files.len()
        );
        let to_delete = registration
            .register(self.data_handle(), self.control_handle(), files)
            .await?;
        for path in &to_delete {
            match self.store.delete(path).await {
                Ok(true) => {}
                Ok(false) => warn!("duplicate {} was already gone", path),
                Err(err) => warn!("delete of duplicate {} failed: {}", path, err),
            }
        }
        if !to_delete.is_empty() {
            info!("dropped {} duplicate file(s)", to_delete.len());
        }
        Ok(())
    }
}
