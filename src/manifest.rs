use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::constants::{DEFAULT_HEALTH_PATH, MANIFEST_NAME, PORT_PLACEHOLDER};
use crate::error::{DeployError, Result};

/// What the manager needs from a deploy bundle: how to start it on a port and where to ask
/// whether it is up.
pub trait Application: Send {
    fn run_command(&self, port: u16) -> String;
    fn health_path(&self) -> String;
}

pub trait ManifestResolver: Send + Sync {
    fn resolve(&self, deploy_dir: &Path) -> Result<Box<dyn Application>>;
}

/// `deploy.json` as written into a deploy directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployManifest {
    /// Shell command; every `{port}` is replaced with the allocated port.
    pub run: String,
    #[serde(default)]
    pub health_path: Option<String>,
}

impl Application for DeployManifest {
    fn run_command(&self, port: u16) -> String {
        self.run.replace(PORT_PLACEHOLDER, &port.to_string())
    }

    fn health_path(&self) -> String {
        let path = self
            .health_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_HEALTH_PATH);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonManifestResolver;

impl ManifestResolver for JsonManifestResolver {
    fn resolve(&self, deploy_dir: &Path) -> Result<Box<dyn Application>> {
        Ok(Box::new(load_manifest(deploy_dir)?))
    }
}

pub fn load_manifest(deploy_dir: &Path) -> Result<DeployManifest> {
    if !deploy_dir.is_dir() {
        return Err(DeployError::manifest(deploy_dir, "deploy directory not found"));
    }
    let manifest_path = deploy_dir.join(MANIFEST_NAME);
    let contents = fs::read_to_string(&manifest_path).map_err(|err| {
        let message = match err.kind() {
            io::ErrorKind::NotFound => "manifest not found".to_string(),
            _ => format!("failed to read manifest: {err}"),
        };
        DeployError::manifest(&manifest_path, message)
    })?;
    let manifest: DeployManifest = serde_json::from_str(&contents)
        .map_err(|err| DeployError::manifest(&manifest_path, format!("failed to parse: {err}")))?;
    if manifest.run.trim().is_empty() {
        return Err(DeployError::manifest(&manifest_path, "`run` must not be empty"));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_NAME), contents).unwrap();
    }

    #[test]
    fn substitutes_port_into_run_command() {
        let temp = tempfile::tempdir().unwrap();
        write_manifest(
            temp.path(),
            r#"{"run": "myapp --port={port} --admin={port}", "health_path": "/healthz"}"#,
        );

        let app = JsonManifestResolver.resolve(temp.path()).unwrap();
        assert_eq!(app.run_command(8050), "myapp --port=8050 --admin=8050");
        assert_eq!(app.health_path(), "/healthz");
    }

    #[test]
    fn health_path_defaults_and_normalizes() {
        let manifest = DeployManifest {
            run: "myapp".to_string(),
            health_path: None,
        };
        assert_eq!(manifest.health_path(), "/");

        let manifest = DeployManifest {
            run: "myapp".to_string(),
            health_path: Some("status".to_string()),
        };
        assert_eq!(manifest.health_path(), "/status");
    }

    #[test]
    fn missing_directory_or_file_is_a_manifest_error() {
        let temp = tempfile::tempdir().unwrap();

        let err = load_manifest(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, DeployError::Manifest { .. }), "{err:?}");

        let err = load_manifest(temp.path()).unwrap_err();
        assert!(err.to_string().contains("manifest not found"), "{err}");
    }

    #[test]
    fn rejects_unparsable_or_empty_manifests() {
        let temp = tempfile::tempdir().unwrap();

        write_manifest(temp.path(), "{");
        assert!(matches!(
            load_manifest(temp.path()),
            Err(DeployError::Manifest { .. })
        ));

        write_manifest(temp.path(), r#"{"run": "  "}"#);
        let err = load_manifest(temp.path()).unwrap_err();
        assert!(err.to_string().contains("must not be empty"), "{err}");
    }
}
