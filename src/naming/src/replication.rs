use dfs_lib::DfsPath;
use std::collections::HashMap;

/// Read-hotness bookkeeping behind the replicate-on-read policy. Every
/// shared acquire of a file counts one read; when a file reaches the
/// threshold the counter resets and the caller copies the file to one more
/// storage server. Missing entries read as zero.
pub(crate) struct ReplicationPolicy {
    threshold: u32,
    read_counts: HashMap<DfsPath, u32>,
}

impl ReplicationPolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            read_counts: HashMap::new(),
        }
    }

    /// Count one shared acquire of `path`. Returns `true` when the
    /// threshold fires; the counter is then already reset.
    pub fn note_read(&mut self, path: &DfsPath) -> bool {
        let count = self.read_counts.entry(path.clone()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            *count = 0;
            return true;
        }
        false
    }

    #[cfg(test)]
    pub fn count(&self, path: &DfsPath) -> u32 {
        self.read_counts.get(path).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DfsPath {
        DfsPath::new(s).unwrap()
    }

    #[test]
    fn test_threshold_fires_and_resets() {
        let mut policy = ReplicationPolicy::new(3);
        let path = p("/a");
        assert!(!policy.note_read(&path));
        assert!(!policy.note_read(&path));
        assert!(policy.note_read(&path));
        assert_eq!(policy.count(&path), 0);
        assert!(!policy.note_read(&path));
    }

    #[test]
    fn test_paths_count_independently() {
        let mut policy = ReplicationPolicy::new(2);
        let a = p("/a");
        let b = p("/b");
        assert!(!policy.note_read(&a));
        assert!(!policy.note_read(&b));
        assert!(policy.note_read(&a));
        assert_eq!(policy.count(&b), 1);
    }
}
