use crate::registry::StorageNode;
use async_trait::async_trait;
use dfs_lib::{
    ControlHandle, DataHandle, DfsError, DfsPath, DfsResult, StorageControl, StorageData,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Stub that fails every call; for tests that only need handle identity.
struct NullStub;

#[async_trait]
impl StorageData for NullStub {
    async fn size(&self, _path: &DfsPath) -> DfsResult<u64> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }

    async fn read(&self, _path: &DfsPath, _offset: u64, _length: usize) -> DfsResult<Vec<u8>> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }

    async fn write(&self, _path: &DfsPath, _offset: u64, _data: &[u8]) -> DfsResult<()> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }
}

#[async_trait]
impl StorageControl for NullStub {
    async fn create(&self, _path: &DfsPath) -> DfsResult<bool> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }

    async fn delete(&self, _path: &DfsPath) -> DfsResult<bool> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }

    async fn copy(&self, _path: &DfsPath, _source: &DataHandle) -> DfsResult<bool> {
        Err(DfsError::RemoteError("null stub".to_string()))
    }
}

fn data_endpoint(seed: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, seed], 7000))
}

fn control_endpoint(seed: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, seed], 7001))
}

/// A storage node whose identity is derived from `seed`. Two calls with the
/// same seed produce equal nodes.
pub(crate) fn node(seed: u8) -> StorageNode {
    StorageNode::new(
        DataHandle::new(data_endpoint(seed), Arc::new(NullStub)),
        ControlHandle::new(control_endpoint(seed), Arc::new(NullStub)),
    )
}

/// In-memory storage server double. Holds file bytes for the data plane and
/// records every control-plane call; `fail_remote` turns every control call
/// into a transport error.
pub(crate) struct MockStorage {
    files: Mutex<HashMap<DfsPath, Vec<u8>>>,
    created: Mutex<Vec<DfsPath>>,
    deleted: Mutex<Vec<DfsPath>>,
    copied: Mutex<Vec<DfsPath>>,
    fail_remote: AtomicBool,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            copied: Mutex::new(Vec::new()),
            fail_remote: AtomicBool::new(false),
        })
    }

    pub fn put(&self, path: &DfsPath, bytes: &[u8]) {
        self.files.lock().unwrap().insert(path.clone(), bytes.to_vec());
    }

    pub fn has(&self, path: &DfsPath) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn created(&self) -> Vec<DfsPath> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<DfsPath> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn copied(&self) -> Vec<DfsPath> {
        self.copied.lock().unwrap().clone()
    }

    pub fn set_fail_remote(&self, fail: bool) {
        self.fail_remote.store(fail, Ordering::SeqCst);
    }

    fn check_remote(&self) -> DfsResult<()> {
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(DfsError::RemoteError("simulated transport failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageData for MockStorage {
    async fn size(&self, path: &DfsPath) -> DfsResult<u64> {
        self.check_remote()?;
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| DfsError::NotFound(path.to_string()))
    }

    async fn read(&self, path: &DfsPath, offset: u64, length: usize) -> DfsResult<Vec<u8>> {
        self.check_remote()?;
        let files = self.files.lock().unwrap();
        let bytes = files
            .get(path)
            .ok_or_else(|| DfsError::NotFound(path.to_string()))?;
        let end = offset as usize + length;
        if end > bytes.len() {
            return Err(DfsError::OutOfBounds(format!(
                "file size: {}, offset: {}, len: {}",
                bytes.len(),
                offset,
                length
            )));
        }
        Ok(bytes[offset as usize..end].to_vec())
    }

    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()> {
        self.check_remote()?;
        let mut files = self.files.lock().unwrap();
        let bytes = files
            .get_mut(path)
            .ok_or_else(|| DfsError::NotFound(path.to_string()))?;
        let end = offset as usize + data.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[offset as usize..end].copy_from_slice(data);
        Ok(())
    }
}

#[async_trait]
impl StorageControl for MockStorage {
    async fn create(&self, path: &DfsPath) -> DfsResult<bool> {
        self.created.lock().unwrap().push(path.clone());
        self.check_remote()?;
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(path.clone(), Vec::new());
        Ok(true)
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        self.deleted.lock().unwrap().push(path.clone());
        self.check_remote()?;
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|p, _| !p.starts_with(path));
        Ok(files.len() != before)
    }

    async fn copy(&self, path: &DfsPath, source: &DataHandle) -> DfsResult<bool> {
        self.copied.lock().unwrap().push(path.clone());
        self.check_remote()?;
        let size = source.size(path).await?;
        let bytes = source.read(path, 0, size as usize).await?;
        self.files.lock().unwrap().insert(path.clone(), bytes);
        Ok(true)
    }
}

/// Handles for a mock storage server. The seed determines the endpoints and
/// therefore the node identity.
pub(crate) fn mock_handles(seed: u8, mock: &Arc<MockStorage>) -> (DataHandle, ControlHandle) {
    (
        DataHandle::new(data_endpoint(seed), mock.clone()),
        ControlHandle::new(control_endpoint(seed), mock.clone()),
    )
}
