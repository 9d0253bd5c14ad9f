use crate::{DfsError, DfsResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Absolute path in the distributed filesystem.
///
/// A path is an immutable sequence of non-empty components. The root
/// directory is the empty sequence and renders as `/`. The forward slash is
/// the component delimiter and the colon is reserved for application use, so
/// neither may appear inside a component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DfsPath {
    components: Vec<String>,
}

impl DfsPath {
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string. The string must begin with a forward slash and
    /// must not contain a colon. Empty components are dropped, so `//a//b/`
    /// parses the same as `/a/b`.
    pub fn new(path: &str) -> DfsResult<Self> {
        if !path.starts_with('/') {
            return Err(DfsError::InvalidPath(format!(
                "path must be absolute: {}",
                path
            )));
        }
        if path.contains(':') {
            return Err(DfsError::InvalidPath(format!(
                "path must not contain ':': {}",
                path
            )));
        }
        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();
        Ok(Self { components })
    }

    /// Append a single component, producing the child path.
    pub fn child(&self, component: &str) -> DfsResult<Self> {
        if component.is_empty() || component.contains('/') || component.contains(':') {
            return Err(DfsError::InvalidComponent(format!(
                "invalid path component: {:?}",
                component
            )));
        }
        let mut components = self.components.clone();
        components.push(component.to_string());
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<DfsPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Last component, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Components from the root downward.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Every prefix of this path, from the root up to and including the path
    /// itself. Hierarchical lock acquisition walks this sequence.
    pub fn prefixes(&self) -> impl Iterator<Item = DfsPath> + '_ {
        (0..=self.components.len()).map(move |n| DfsPath {
            components: self.components[..n].to_vec(),
        })
    }

    /// Prefix test. Every path starts with the root and with itself.
    pub fn starts_with(&self, prefix: &DfsPath) -> bool {
        if prefix.components.len() > self.components.len() {
            return false;
        }
        self.components[..prefix.components.len()] == prefix.components[..]
    }
}

/// The ordering is lexicographic over the rendered string form. Callers that
/// lock multiple sibling paths simultaneously must take them in increasing
/// order; because locking a path locks every ancestor as well, this ordering
/// is what rules out cycles between such callers.
impl Ord for DfsPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for DfsPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for DfsPath {
    type Err = DfsError;

    fn from_str(s: &str) -> DfsResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for DfsPath {
    type Error = DfsError;

    fn try_from(value: String) -> DfsResult<Self> {
        Self::new(&value)
    }
}

impl From<DfsPath> for String {
    fn from(path: DfsPath) -> String {
        path.to_string()
    }
}
