use crate::{DfsPath, DfsResult};
use async_trait::async_trait;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

/// Well-known port for the client-facing service interface. Clients build a
/// stub for the naming server from its hostname and this port alone.
pub const SERVICE_PORT: u16 = 6000;
/// Well-known port for the storage-facing registration interface.
pub const REGISTRATION_PORT: u16 = 6001;

/// Chunk size used when streaming a file between storage servers.
pub const COPY_CHUNK_SIZE: usize = 1024;

/// Client-facing operations of the naming server.
///
/// The transport is a collaborator: a remote skeleton dispatches into an
/// implementation of this trait, and a remote stub implements it over the
/// wire. In-process callers invoke the implementation directly.
#[async_trait]
pub trait NameService: Send + Sync {
    /// Take a lock of the requested mode on `path`, plus shared locks on
    /// every ancestor. Blocks until the whole chain is held.
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()>;

    /// Release the chain taken by `lock`.
    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()>;

    async fn is_directory(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Child component names of a directory.
    async fn list(&self, path: &DfsPath) -> DfsResult<Vec<String>>;

    /// Returns `false` if the path already exists.
    async fn create_file(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Returns `false` if the path already exists.
    async fn create_directory(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Remove a file or directory subtree. Returns `false` for the root.
    async fn delete(&self, path: &DfsPath) -> DfsResult<bool>;

    /// A data handle for one of the storage servers hosting the file.
    async fn get_storage(&self, path: &DfsPath) -> DfsResult<DataHandle>;
}

/// Storage-facing registration interface of the naming server.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Announce a storage server and the files it already holds. The
    /// returned paths duplicate files the namespace already knows; the
    /// storage server must delete them locally.
    async fn register(
        &self,
        data: DataHandle,
        control: ControlHandle,
        paths: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>>;
}

/// Per-file byte access on a storage server, used directly by clients.
#[async_trait]
pub trait StorageData: Send + Sync {
    async fn size(&self, path: &DfsPath) -> DfsResult<u64>;

    /// Read exactly `length` bytes at `offset`. `offset + length` must not
    /// exceed the file size.
    async fn read(&self, path: &DfsPath, offset: u64, length: usize) -> DfsResult<Vec<u8>>;

    /// Write at `offset`, extending the file as needed.
    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()>;
}

/// Control operations on a storage server, used by the naming server.
#[async_trait]
pub trait StorageControl: Send + Sync {
    async fn create(&self, path: &DfsPath) -> DfsResult<bool>;

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool>;

    /// Fetch `path` from `source` in chunks, replacing any local copy.
    async fn copy(&self, path: &DfsPath, source: &DataHandle) -> DfsResult<bool>;
}

/// A remote capability for the data interface of a storage server: the stub
/// plus the endpoint it dials. Two handles are the same capability iff their
/// endpoints are equal, so equality and hashing ignore the stub.
#[derive(Clone)]
pub struct DataHandle {
    endpoint: SocketAddr,
    stub: Arc<dyn StorageData>,
}

impl DataHandle {
    pub fn new(endpoint: SocketAddr, stub: Arc<dyn StorageData>) -> Self {
        Self { endpoint, stub }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

impl Deref for DataHandle {
    type Target = dyn StorageData;

    fn deref(&self) -> &Self::Target {
        &*self.stub
    }
}

impl PartialEq for DataHandle {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for DataHandle {}

impl Hash for DataHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
    }
}

impl fmt::Debug for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataHandle").field(&self.endpoint).finish()
    }
}

/// A remote capability for the control interface of a storage server.
/// Identity follows the endpoint, as for [`DataHandle`].
#[derive(Clone)]
pub struct ControlHandle {
    endpoint: SocketAddr,
    stub: Arc<dyn StorageControl>,
}

impl ControlHandle {
    pub fn new(endpoint: SocketAddr, stub: Arc<dyn StorageControl>) -> Self {
        Self { endpoint, stub }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

impl Deref for ControlHandle {
    type Target = dyn StorageControl;

    fn deref(&self) -> &Self::Target {
        &*self.stub
    }
}

impl PartialEq for ControlHandle {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for ControlHandle {}

impl Hash for ControlHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
    }
}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlHandle").field(&self.endpoint).finish()
    }
}
