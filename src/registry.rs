use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{DeployError, Result};

/// Persisted port and label assignments, stored as `<root>/config.json`.
///
/// The whole document is rewritten on every [`Registry::persist`]; the write goes through a
/// temporary file in the same directory followed by a rename, so readers never observe a
/// half-written file. Nothing here coordinates separate processes sharing the same root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "Ports", default)]
    ports: BTreeMap<u16, String>,
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
}

impl Registry {
    /// A missing file is an empty registry, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(DeployError::RegistryIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        // `null` decodes to empty maps as well.
        let registry: Option<Registry> =
            serde_json::from_str(&contents).map_err(|source| DeployError::RegistryParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(registry.unwrap_or_default())
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let io_err = |source: io::Error| DeployError::RegistryIo {
            path: path.to_path_buf(),
            source,
        };
        let contents = serde_json::to_vec_pretty(self)
            .map_err(|err| io_err(io::Error::new(io::ErrorKind::InvalidData, err)))?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(&contents).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    /// Records `port -> deploy_id`, replacing whatever the port pointed at before.
    pub fn assign_port(&mut self, port: u16, deploy_id: &str) -> Option<String> {
        self.ports.insert(port, deploy_id.to_string())
    }

    pub fn release_port(&mut self, port: u16) -> Option<String> {
        self.ports.remove(&port)
    }

    pub fn deploy_on(&self, port: u16) -> Option<&str> {
        self.ports.get(&port).map(String::as_str)
    }

    /// Lowest port currently assigned to `deploy_id`.
    pub fn port_of(&self, deploy_id: &str) -> Option<u16> {
        self.ports
            .iter()
            .find(|(_, id)| id.as_str() == deploy_id)
            .map(|(port, _)| *port)
    }

    pub fn ports(&self) -> &BTreeMap<u16, String> {
        &self.ports
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::load(&temp.path().join("config.json")).unwrap();
        assert!(registry.ports().is_empty());
        assert!(registry.labels().is_empty());
    }

    #[test]
    fn assignment_survives_persist_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut registry = Registry::default();
        registry.assign_port(8050, "d1");
        registry.persist(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded.deploy_on(8050), Some("d1"));
        assert_eq!(loaded, registry);
    }

    #[test]
    fn writes_historical_shape() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut registry = Registry::default();
        registry.assign_port(8050, "2024-01-02-03-04-05");
        registry.persist(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["Ports"]["8050"], "2024-01-02-03-04-05");
        assert!(value["Labels"].as_object().unwrap().is_empty());
    }

    #[test]
    fn reads_partial_documents() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"Labels": {"prod": "d2"}}"#).unwrap();

        let registry = Registry::load(&path).unwrap();
        assert!(registry.ports().is_empty());
        assert_eq!(registry.labels().get("prod").map(String::as_str), Some("d2"));

        fs::write(&path, "null").unwrap();
        assert_eq!(Registry::load(&path).unwrap(), Registry::default());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Registry::load(&path).unwrap_err();
        assert!(
            matches!(err, DeployError::RegistryParse { .. }),
            "expected RegistryParse, got {err:?}"
        );
    }

    #[test]
    fn persist_replaces_the_previous_document() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut registry = Registry::default();
        registry.assign_port(8001, "a");
        registry.assign_port(8002, "b");
        registry.persist(&path).unwrap();

        registry.release_port(8001);
        registry.persist(&path).unwrap();

        let loaded = Registry::load(&path).unwrap();
        assert_eq!(loaded.deploy_on(8001), None);
        assert_eq!(loaded.port_of("b"), Some(8002));

        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files should not linger");
    }
}
