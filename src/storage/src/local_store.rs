use async_trait::async_trait;
use dfs_lib::{
    DataHandle, DfsError, DfsPath, DfsResult, StorageControl, StorageData, COPY_CHUNK_SIZE,
};
use log::{debug, warn};
use std::path::PathBuf;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// Byte storage under a single local root directory. Filesystem paths map
/// one-to-one onto local paths beneath the root; the root itself stands for
/// the filesystem root and is never created or deleted through this store.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if missing.
    pub async fn open(root: impl Into<PathBuf>) -> DfsResult<Self> {
        let root = root.into();
        if !root.exists() {
            debug!("creating storage root {}", root.display());
            fs::create_dir_all(&root)
                .await
                .map_err(|e| DfsError::IoError(format!("create storage root failed: {}", e)))?;
        } else if !root.is_dir() {
            return Err(DfsError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &DfsPath) -> PathBuf {
        let mut full = self.root.clone();
        for component in path.components() {
            full.push(component);
        }
        full
    }

    /// Paths of every regular file under the root, relative to it. Names
    /// that cannot form a filesystem path (embedded `:`, non-UTF-8) are
    /// skipped with a warning rather than failing the whole walk.
    pub async fn local_files(&self) -> DfsResult<Vec<DfsPath>> {
        let mut files = Vec::new();
        let mut pending = vec![(self.root.clone(), DfsPath::root())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| DfsError::IoError(format!("read {} failed: {}", dir.display(), e)))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DfsError::IoError(format!("read {} failed: {}", dir.display(), e)))?
            {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(name) => {
                        warn!("skipping non-UTF-8 entry {:?} under {}", name, prefix);
                        continue;
                    }
                };
                let child = match prefix.child(&name) {
                    Ok(child) => child,
                    Err(err) => {
                        warn!("skipping unrepresentable entry under {}: {}", prefix, err);
                        continue;
                    }
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| DfsError::IoError(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child));
                } else if file_type.is_file() {
                    files.push(child);
                }
            }
        }
        Ok(files)
    }

    async fn file_size(&self, path: &DfsPath) -> DfsResult<u64> {
        let local = self.resolve(path);
        let meta = fs::metadata(&local)
            .await
            .map_err(|_| DfsError::NotFound(path.to_string()))?;
        if !meta.is_file() {
            return Err(DfsError::NotAFile(path.to_string()));
        }
        Ok(meta.len())
    }

    /// Remove now-empty ancestor directories of a deleted file, stopping at
    /// the store root or the first non-empty directory.
    async fn prune_empty_ancestors(&self, path: &DfsPath) {
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir.is_root() {
                break;
            }
            let local = self.resolve(&dir);
            let empty = match std::fs::read_dir(&local) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => break,
            };
            if !empty {
                break;
            }
            if let Err(err) = fs::remove_dir(&local).await {
                warn!("prune of {} failed: {}", local.display(), err);
                break;
            }
            ancestor = dir.parent();
        }
    }
}

#[async_trait]
impl StorageData for LocalStore {
    async fn size(&self, path: &DfsPath) -> DfsResult<u64> {
        self.file_size(path).await
    }

    async fn read(&self, path: &DfsPath, offset: u64, length: usize) -> DfsResult<Vec<u8>> {
        let size = self.file_size(path).await?;
        if offset + length as u64 > size {
            return Err(DfsError::OutOfBounds(format!(
                "file size: {}, offset: {}, len: {}",
                size, offset, length
            )));
        }
        let mut file = File::open(self.resolve(path)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write(&self, path: &DfsPath, offset: u64, data: &[u8]) -> DfsResult<()> {
        // Only write to files the store already knows; creation goes through
        // the control interface.
        self.file_size(path).await?;
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.resolve(path))
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageControl for LocalStore {
    async fn create(&self, path: &DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = self.resolve(path);
        if local.exists() {
            return Ok(false);
        }
        if let Some(parent) = local.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                warn!("create parents of {} failed: {}", local.display(), err);
                return Ok(false);
            }
        }
        match File::create(&local).await {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!("create of {} failed: {}", local.display(), err);
                Ok(false)
            }
        }
    }

    async fn delete(&self, path: &DfsPath) -> DfsResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let local = self.resolve(path);
        if !local.exists() {
            return Ok(false);
        }
        if local.is_dir() {
            match fs::remove_dir_all(&local).await {
                Ok(()) => Ok(true),
                Err(err) => {
                    warn!("delete of {} failed: {}", local.display(), err);
                    Ok(false)
                }
            }
        } else {
            if let Err(err) = fs::remove_file(&local).await {
                warn!("delete of {} failed: {}", local.display(), err);
                return Ok(false);
            }
            self.prune_empty_ancestors(path).await;
            Ok(true)
        }
    }

    async fn copy(&self, path: &DfsPath, source: &DataHandle) -> DfsResult<bool> {
        // A missing remote file or a transport fault surfaces to the caller;
        // everything beyond this point is best-effort local work.
        let size = source.size(path).await?;

        let local = self.resolve(path);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        if local.exists() {
            fs::remove_file(&local).await?;
        }
        let mut file = File::create(&local).await?;

        let mut offset = 0u64;
        while offset < size {
            let chunk = std::cmp::min(COPY_CHUNK_SIZE as u64, size - offset) as usize;
            let bytes = match source.read(path, offset, chunk).await {
                Ok(bytes) => bytes,
                Err(err) if err.is_remote() => return Err(err),
                Err(err) => {
                    warn!("copy of {} aborted mid-stream: {}", path, err);
                    drop(file);
                    let _ = fs::remove_file(&local).await;
                    return Ok(false);
                }
            };
            if let Err(err) = file.write_all(&bytes).await {
                warn!("copy of {} aborted mid-stream: {}", path, err);
                drop(file);
                let _ = fs::remove_file(&local).await;
                return Ok(false);
            }
            offset += chunk as u64;
        }
        file.flush().await?;
        debug!("copied {} ({} bytes) from {:?}", path, size, source);
        Ok(true)
    }
}
