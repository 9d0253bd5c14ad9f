use crate::config::NamingConfig;
use crate::namespace::Namespace;
use crate::path_lock::PathLockMgr;
use crate::registry::{pick_random, Registry, StorageNode};
use crate::replication::ReplicationPolicy;
use async_trait::async_trait;
use dfs_lib::{
    ControlHandle, DataHandle, DfsError, DfsPath, DfsResult, NameService, Registration,
    StorageControl,
};
use log::{debug, info, warn};
use std::sync::Mutex;

/// Everything guarded by the namespace monitor. The monitor is taken for
/// short sections only: never across a lock wait, never across an outbound
/// storage call.
struct NamingState {
    namespace: Namespace,
    registry: Registry,
    replication: ReplicationPolicy,
}

/// The naming server.
///
/// Owns the directory namespace of the filesystem and maps each file to the
/// storage servers hosting its bytes. Clients resolve a path here, then move
/// bytes directly against a storage server. Storage servers announce
/// themselves through [`Registration`]; clients operate through
/// [`NameService`]. Both surfaces are reachable at the well-known service
/// and registration ports once a transport is attached.
///
/// All state is in-memory and lost on shutdown. One long-lived value per
/// process; pass it explicitly to whatever serves the two interfaces.
pub struct NamingServer {
    state: Mutex<NamingState>,
    locks: PathLockMgr,
    config: NamingConfig,
}

impl Default for NamingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingServer {
    pub fn new() -> Self {
        Self::with_config(NamingConfig::default())
    }

    pub fn with_config(config: NamingConfig) -> Self {
        Self {
            state: Mutex::new(NamingState {
                namespace: Namespace::new(),
                registry: Registry::new(),
                replication: ReplicationPolicy::new(config.replication_threshold),
            }),
            locks: PathLockMgr::new(),
            config,
        }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NamingState> {
        self.state.lock().unwrap()
    }

    /// Write-intent hook: keep one replica, drop the rest. The control-plane
    /// deletes run with the monitor released; a replica is dropped from the
    /// map even when its delete fails in transit, since the file is known to
    /// survive on the retained node.
    async fn invalidate_replicas(&self, path: &DfsPath) {
        let (retained, victims) = {
            let state = self.state();
            let hosts = match state.namespace.hosts(path) {
                Some(hosts) => hosts,
                None => return,
            };
            let mut iter = hosts.iter().cloned();
            let retained = match iter.next() {
                Some(node) => node,
                None => return,
            };
            (retained, iter.collect::<Vec<StorageNode>>())
        };
        if victims.is_empty() {
            return;
        }

        debug!("invalidating {} stale replica(s) of {}", victims.len(), path);
        for node in &victims {
            if let Err(err) = node.control().delete(path).await {
                warn!(
                    "invalidate of {} on {:?} failed, dropping replica anyway: {}",
                    path,
                    node.control(),
                    err
                );
            }
        }

        let mut state = self.state();
        state.namespace.retain_sole_host(path, retained);
    }

    /// Read-intent hook: once a file has been read `replication_threshold`
    /// times, copy it to one more storage server. Best-effort: a transport
    /// failure is swallowed and the counter stays reset.
    async fn replicate_if_hot(&self, path: &DfsPath) {
        let job = {
            let mut state = self.state();
            if !state.namespace.is_file(path) {
                return;
            }
            if !state.replication.note_read(path) {
                return;
            }
            let hosts = match state.namespace.hosts(path) {
                Some(hosts) => hosts.clone(),
                None => return,
            };
            let target = state.registry.random_excluding(&hosts).cloned();
            let source = hosts.iter().next().cloned();
            match (target, source) {
                (Some(target), Some(source)) => Some((target, source)),
                _ => None,
            }
        };
        let (target, source) = match job {
            Some(job) => job,
            None => return,
        };

        debug!("replicating {} to {:?}", path, target.control());
        match target.control().copy(path, source.data()).await {
            Ok(_) => {
                let mut state = self.state();
                state.namespace.add_host_if_present(path, target);
            }
            Err(err) => {
                warn!("replication of {} to {:?} failed: {}", path, target.control(), err);
            }
        }
    }
}

#[async_trait]
impl NameService for NamingServer {
    async fn lock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        {
            let state = self.state();
            if !state.namespace.has_path(path) {
                return Err(DfsError::NotFound(path.to_string()));
            }
        }

        self.locks.acquire(path, exclusive).await;

        // Replication policy runs on the tail of every file lock; directory
        // locks carry no replication action.
        if exclusive {
            self.invalidate_replicas(path).await;
        } else {
            self.replicate_if_hot(path).await;
        }
        Ok(())
    }

    async fn unlock(&self, path: &DfsPath, exclusive: bool) -> DfsResult<()> {
        {
            let state = self.state();
            if !state.namespace.has_path(path) {
                return Err(DfsError::InvalidState(format!("unknown path: {}", path)));
            }
        }
        self.locks.release(path, exclusive)
    }

    async fn is_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        let state = self.state();
        state.namespace.is_directory(path)
    }

    async fn list(&self, path: &DfsPath) -> DfsResult<Vec<String>> {
        let state = self.state();
        state.namespace.list_children(path)
    }

    async fn create_file(&self, path: &DfsPath) -> DfsResult<bool> {
        let node = {
            let state = self.state();
            if state.namespace.has_path(path) {
                return Ok(false);
            }
            // The root always exists, so a missing parent only happens on
            // non-root paths.
            let parent = path
                .parent()
                .ok_or_else(|| DfsError::NotFound(path.to_string()))?;
            if !state.namespace.is_directory(&parent)? {
                return Err(DfsError::NotFound(parent.to_string()));
            }
            state
                .registry
                .random()
                .cloned()
                .ok_or_else(|| DfsError::NoStorage("no storage servers registered".to_string()))?
        };

        let created = node.control().create(path).await?;
        if created {
            let mut state = self.state();
            state.namespace.add_file(path.clone(), node);
        } else {
            // The storage server already had the file. The namespace stays
            // authoritative: report success without recording a host.
            info!("storage-side create of {} reported an existing file", path);
        }
        Ok(true)
    }

    async fn create_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        let mut state = self.state();
        if state.namespace.has_path(path) {
            return Ok(false);
        }
        let parent = path
            .parent()
            .ok_or_else(|| DfsError::NotFound(path.to_string()))?;
        if !state.namespace.is_directory(&parent)? {
            return Err(DfsError::NotFound(parent.to_string()));
        }
        // Purely in-memory: a storage server is picked only when a file is
        // created beneath this directory.
        state.namespace.add_directory(path.clone());
        Ok(true)
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let affected = {
            let mut state = self.state();
            if !state.namespace.has_path(path) {
                return Err(DfsError::NotFound(path.to_string()));
            }
            state.namespace.remove_subtree(path)
        };

        // The namespace mutation is complete; storage-side deletes are issued
        // afterwards, every node attempted, the first failure surfaced.
        let mut first_err = None;
        for node in &affected {
            if let Err(err) = node.control().delete(path).await {
                warn!("delete of {} on {:?} failed: {}", path, node.control(), err);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(true),
        }
    }

    async fn get_storage(&self, path: &DfsPath) -> DfsResult<DataHandle> {
        let state = self.state();
        let hosts = state
            .namespace
            .hosts(path)
            .ok_or_else(|| DfsError::NotFound(format!("not a file: {}", path)))?;
        let node = pick_random(hosts.iter(), hosts.len())
            .ok_or_else(|| DfsError::InvalidState(format!("file {} has no hosts", path)))?;
        Ok(node.data().clone())
    }
}

#[async_trait]
impl Registration for NamingServer {
    async fn register(
        &self,
        data: DataHandle,
        control: ControlHandle,
        paths: Vec<DfsPath>,
    ) -> DfsResult<Vec<DfsPath>> {
        let node = StorageNode::new(data, control);
        let mut state = self.state();
        state.registry.add(node.clone())?;
        info!(
            "registered storage server {:?} advertising {} path(s)",
            node.data(),
            paths.len()
        );

        let mut to_delete = Vec::new();
        for path in paths {
            // The root is neither adopted nor returned for deletion.
            if path.is_root() {
                continue;
            }
            if state.namespace.has_path(&path) {
                to_delete.push(path);
                continue;
            }
            state.namespace.add_file(path.clone(), node.clone());
            // Adopt missing ancestors, stopping at the first known one.
            let mut ancestor = path.parent();
            while let Some(dir) = ancestor {
                if dir.is_root() || state.namespace.contains_directory(&dir) {
                    break;
                }
                ancestor = dir.parent();
                state.namespace.add_directory(dir);
            }
        }
        Ok(to_delete)
    }
}

#[cfg(test)]
impl NamingServer {
    pub(crate) fn locks(&self) -> &PathLockMgr {
        &self.locks
    }

    pub(crate) fn assert_invariants(&self) {
        let state = self.state();
        state.namespace.assert_invariants();
        for node in state.namespace.host_nodes() {
            assert!(
                state.registry.contains(&node),
                "file host {:?} missing from the registry",
                node.data()
            );
        }
    }

    pub(crate) fn read_count(&self, path: &DfsPath) -> u32 {
        self.state().replication.count(path)
    }

    pub(crate) fn host_count(&self, path: &DfsPath) -> usize {
        self.state()
            .namespace
            .hosts(path)
            .map(|hosts| hosts.len())
            .unwrap_or(0)
    }
}
