use dfs_lib::{DfsError, DfsResult, REGISTRATION_PORT, SERVICE_PORT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_REPLICATION_THRESHOLD: u32 = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub service_port: u16,
    pub registration_port: u16,
    /// Shared acquires of a file between replications.
    #[serde(alias = "replication_factor")]
    pub replication_threshold: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            service_port: SERVICE_PORT,
            registration_port: REGISTRATION_PORT,
            replication_threshold: DEFAULT_REPLICATION_THRESHOLD,
        }
    }
}

pub fn read_json_config<T: DeserializeOwned>(path: &Path) -> DfsResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DfsError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| DfsError::InvalidData(format!("parse {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: NamingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service_port, SERVICE_PORT);
        assert_eq!(config.registration_port, REGISTRATION_PORT);
        assert_eq!(config.replication_threshold, 20);
    }

    #[test]
    fn test_partial_override() {
        let config: NamingConfig =
            serde_json::from_str(r#"{"replication_threshold": 5}"#).unwrap();
        assert_eq!(config.replication_threshold, 5);
        assert_eq!(config.service_port, SERVICE_PORT);
    }
}
