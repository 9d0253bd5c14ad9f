use crate::registry::StorageNode;
use dfs_lib::{DfsError, DfsPath, DfsResult};
use std::collections::{BTreeSet, HashMap, HashSet};

/// In-memory directory tree of the whole filesystem: the set of known
/// directories plus the map from each file to the storage servers hosting a
/// replica of it. A path is a directory or a file, never both, and every
/// ancestor of a known path is a known directory.
pub(crate) struct Namespace {
    directories: HashSet<DfsPath>,
    files: HashMap<DfsPath, HashSet<StorageNode>>,
}

impl Namespace {
    pub fn new() -> Self {
        let mut directories = HashSet::new();
        directories.insert(DfsPath::root());
        Self {
            directories,
            files: HashMap::new(),
        }
    }

    pub fn has_path(&self, path: &DfsPath) -> bool {
        self.directories.contains(path) || self.files.contains_key(path)
    }

    pub fn is_file(&self, path: &DfsPath) -> bool {
        self.files.contains_key(path)
    }

    pub fn contains_directory(&self, path: &DfsPath) -> bool {
        self.directories.contains(path)
    }

    pub fn is_directory(&self, path: &DfsPath) -> DfsResult<bool> {
        if self.directories.contains(path) {
            return Ok(true);
        }
        if !self.files.contains_key(path) {
            return Err(DfsError::NotFound(path.to_string()));
        }
        Ok(false)
    }

    /// Child component names of `dir`, deduplicated and sorted.
    pub fn list_children(&self, dir: &DfsPath) -> DfsResult<Vec<String>> {
        if !self.is_directory(dir)? {
            return Err(DfsError::NotFound(dir.to_string()));
        }
        let mut children = BTreeSet::new();
        for path in self.known_paths() {
            if path.parent().as_ref() == Some(dir) {
                if let Some(name) = path.last() {
                    children.insert(name.to_string());
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    pub fn hosts(&self, path: &DfsPath) -> Option<&HashSet<StorageNode>> {
        self.files.get(path)
    }

    pub fn add_file(&mut self, path: DfsPath, node: StorageNode) {
        self.files.entry(path).or_default().insert(node);
    }

    pub fn add_directory(&mut self, path: DfsPath) {
        self.directories.insert(path);
    }

    /// Drop every replica of `path` except `retained`. No-op when the file
    /// is no longer known.
    pub fn retain_sole_host(&mut self, path: &DfsPath, retained: StorageNode) {
        if let Some(hosts) = self.files.get_mut(path) {
            hosts.clear();
            hosts.insert(retained);
        }
    }

    /// Record an extra replica, but only while the file is still known.
    pub fn add_host_if_present(&mut self, path: &DfsPath, node: StorageNode) {
        if let Some(hosts) = self.files.get_mut(path) {
            hosts.insert(node);
        }
    }

    /// Remove `root` and everything beneath it, returning the distinct
    /// storage nodes that hosted any removed file.
    pub fn remove_subtree(&mut self, root: &DfsPath) -> HashSet<StorageNode> {
        let doomed: Vec<DfsPath> = self
            .known_paths()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();

        let mut affected = HashSet::new();
        for path in doomed {
            if let Some(hosts) = self.files.remove(&path) {
                affected.extend(hosts);
            } else {
                self.directories.remove(&path);
            }
        }
        affected
    }

    fn known_paths(&self) -> impl Iterator<Item = &DfsPath> {
        self.files.keys().chain(self.directories.iter())
    }
}

#[cfg(test)]
impl Namespace {
    /// Check the joint invariants at a quiescent point: directory/file
    /// disjointness, ancestor closure, and no empty replica set. Host
    /// membership in the registry is checked by the caller, which owns both.
    pub fn assert_invariants(&self) {
        for path in self.files.keys() {
            assert!(
                !self.directories.contains(path),
                "{} is both a file and a directory",
                path
            );
        }
        for path in self.known_paths() {
            let mut ancestor = path.parent();
            while let Some(dir) = ancestor {
                assert!(
                    self.directories.contains(&dir),
                    "missing ancestor directory {} of {}",
                    dir,
                    path
                );
                ancestor = dir.parent();
            }
        }
        for (path, hosts) in &self.files {
            assert!(!hosts.is_empty(), "file {} has no hosts", path);
        }
        assert!(self.directories.contains(&DfsPath::root()));
    }

    pub fn host_nodes(&self) -> HashSet<StorageNode> {
        self.files.values().flatten().cloned().collect()
    }
}
