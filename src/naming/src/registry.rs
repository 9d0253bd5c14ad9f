use dfs_lib::{ControlHandle, DataHandle, DfsError, DfsResult};
use rand::Rng;
use std::collections::HashSet;

/// The naming server's record of one registered storage server: the pair of
/// remote handles it was registered with. Identity follows the endpoint pair,
/// so a server re-registering on the same ports is the same node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StorageNode {
    data: DataHandle,
    control: ControlHandle,
}

impl StorageNode {
    pub fn new(data: DataHandle, control: ControlHandle) -> Self {
        Self { data, control }
    }

    pub fn data(&self) -> &DataHandle {
        &self.data
    }

    pub fn control(&self) -> &ControlHandle {
        &self.control
    }
}

/// Set of known storage servers, in registration order.
pub(crate) struct Registry {
    nodes: Vec<StorageNode>,
}

impl Registry {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &StorageNode) -> bool {
        self.nodes.contains(node)
    }

    pub fn add(&mut self, node: StorageNode) -> DfsResult<()> {
        if self.contains(&node) {
            return Err(DfsError::InvalidState(format!(
                "storage server already registered: {:?}",
                node.data()
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn random(&self) -> Option<&StorageNode> {
        pick_random(self.nodes.iter(), self.nodes.len())
    }

    /// Any node not in the exclusion set, or `None` when every node is
    /// excluded.
    pub fn random_excluding(&self, exclude: &HashSet<StorageNode>) -> Option<&StorageNode> {
        let eligible: Vec<&StorageNode> =
            self.nodes.iter().filter(|n| !exclude.contains(n)).collect();
        pick_random(eligible.iter().copied(), eligible.len())
    }
}

/// Uniform pick from an exact-size iterator.
pub(crate) fn pick_random<'a, I>(mut iter: I, len: usize) -> Option<&'a StorageNode>
where
    I: Iterator<Item = &'a StorageNode>,
{
    if len == 0 {
        return None;
    }
    let index = rand::rng().random_range(0..len);
    iter.nth(index)
}
