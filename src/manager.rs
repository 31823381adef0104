use chrono::{DateTime, Local, TimeZone};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{AssignmentOrder, IdPolicy, ManagerConfig};
use crate::constants::DEPLOY_ID_FORMAT;
use crate::error::{DeployError, Result};
use crate::health::HealthChecker;
use crate::launcher::{DetachedShellLauncher, LaunchSpec, Launcher};
use crate::manifest::{JsonManifestResolver, ManifestResolver};
use crate::ports::{PortAllocator, PortProbe};
use crate::registry::Registry;

pub type Label = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deploy {
    pub id: String,
    pub note: String,
    /// `-1` on the wire when the deploy has no recorded port.
    #[serde(serialize_with = "port_or_sentinel")]
    pub port: Option<u16>,
}

fn port_or_sentinel<S: Serializer>(port: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
    match port {
        Some(port) => serializer.serialize_i32(i32::from(*port)),
        None => serializer.serialize_i32(-1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployDirectory {
    pub deploy_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub deploy_id: String,
    pub port: u16,
    pub pid: u32,
    pub health_attempts: u32,
}

/// The management surface a front end drives.
pub trait DeployService {
    fn list_labels(&self) -> Result<Vec<Label>>;
    fn list_deploys(&self) -> Result<Vec<Deploy>>;
    fn run(&self, deploy_id: &str) -> Result<RunReport>;
    fn stop(&self, deploy_id: &str) -> Result<()>;
    fn label(&self, deploy_id: &str, label: &Label) -> Result<()>;
}

/// Formats `at` as a deploy id. Ids have one-second resolution, so two calls within the same
/// second yield the same id.
pub fn deploy_id_at<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format(DEPLOY_ID_FORMAT).to_string()
}

pub struct DeployManager {
    config: ManagerConfig,
    registry: Mutex<Registry>,
    in_flight: Mutex<BTreeSet<u16>>,
    allocator: PortAllocator,
    manifests: Box<dyn ManifestResolver>,
    launcher: Box<dyn Launcher>,
    health: HealthChecker,
}

impl DeployManager {
    /// Resolves the root to an absolute path, creates `<root>/deploys` when missing and loads the
    /// registry.
    pub fn open(mut config: ManagerConfig) -> Result<Self> {
        if config.root.is_relative() {
            let cwd = std::env::current_dir().map_err(|source| DeployError::Io {
                path: config.root.clone(),
                source,
            })?;
            config.root = cwd.join(&config.root);
        }
        let deploys_dir = config.deploys_dir();
        fs::create_dir_all(&deploys_dir).map_err(|source| DeployError::Io {
            path: deploys_dir.clone(),
            source,
        })?;
        let registry = Registry::load(&config.registry_path())?;
        tracing::debug!(
            root = %config.root.display(),
            ports = registry.ports().len(),
            labels = registry.labels().len(),
            "loaded registry"
        );

        Ok(Self {
            allocator: PortAllocator::tcp(config.port_range, config.connect_timeout),
            health: HealthChecker::new(config.health.clone())?,
            manifests: Box::new(JsonManifestResolver),
            launcher: Box::new(DetachedShellLauncher),
            registry: Mutex::new(registry),
            in_flight: Mutex::new(BTreeSet::new()),
            config,
        })
    }

    pub fn with_port_probe(mut self, probe: Box<dyn PortProbe>) -> Self {
        self.allocator = PortAllocator::new(self.config.port_range, probe);
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_manifest_resolver(mut self, manifests: Box<dyn ManifestResolver>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Snapshot of the in-memory registry.
    pub fn registry(&self) -> Registry {
        lock(&self.registry).clone()
    }

    pub fn new_deploy_directory(&self) -> DeployDirectory {
        self.new_deploy_directory_at(&Local::now())
    }

    pub fn new_deploy_directory_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> DeployDirectory
    where
        Tz::Offset: Display,
    {
        let base = deploy_id_at(at);
        let deploys_dir = self.config.deploys_dir();
        let deploy_id = match self.config.id_policy {
            IdPolicy::Timestamp => base,
            IdPolicy::Suffixed => {
                let mut candidate = base.clone();
                let mut n = 0u32;
                while deploys_dir.join(&candidate).exists() {
                    n += 1;
                    candidate = format!("{base}-{n}");
                }
                candidate
            }
        };
        DeployDirectory {
            path: deploys_dir.join(&deploy_id),
            deploy_id,
        }
    }

    fn deploy_dir(&self, deploy_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(deploy_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.config.deploys_dir().join(deploy_id)),
            _ => Err(DeployError::manifest(
                self.config.deploys_dir(),
                format!("invalid deploy id {deploy_id:?}"),
            )),
        }
    }

    /// Picks a port and holds it against other `run` calls in this process until the returned
    /// reservation is dropped. The scan itself runs under the lock.
    fn reserve_port(&self) -> Result<PortReservation<'_>> {
        let mut in_flight = lock(&self.in_flight);
        let port = self.allocator.find_free_port_excluding(&in_flight)?;
        in_flight.insert(port);
        Ok(PortReservation {
            port,
            in_flight: &self.in_flight,
        })
    }

    fn record_assignment(&self, port: u16, deploy_id: &str) -> Result<()> {
        let mut registry = lock(&self.registry);
        if let Some(previous) = registry.assign_port(port, deploy_id) {
            if previous != deploy_id {
                tracing::warn!(port, previous = %previous, deploy_id, "replacing stale port assignment");
            }
        }
        registry.persist(&self.config.registry_path())?;
        tracing::info!(port, deploy_id, "recorded port assignment");
        Ok(())
    }
}

impl DeployService for DeployManager {
    fn list_labels(&self) -> Result<Vec<Label>> {
        Err(DeployError::NotImplemented("list_labels"))
    }

    fn list_deploys(&self) -> Result<Vec<Deploy>> {
        let deploys_dir = self.config.deploys_dir();
        let io_err = |source| DeployError::Io {
            path: deploys_dir.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&deploys_dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_dir() {
                continue;
            }
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
        ids.sort();

        let registry = lock(&self.registry);
        Ok(ids
            .into_iter()
            .map(|id| Deploy {
                port: registry.port_of(&id),
                note: String::new(),
                id,
            })
            .collect())
    }

    fn run(&self, deploy_id: &str) -> Result<RunReport> {
        let deploy_dir = self.deploy_dir(deploy_id)?;

        let reservation = self.reserve_port()?;
        let port = reservation.port;
        tracing::info!(port, deploy_id, "found port");

        let app = self.manifests.resolve(&deploy_dir)?;

        if self.config.assignment_order == AssignmentOrder::Eager {
            self.record_assignment(port, deploy_id)?;
        }

        let spec = LaunchSpec {
            working_dir: deploy_dir,
            command: app.run_command(port),
            port,
        };
        let process = self.launcher.launch(&spec)?;

        // A failure from here on leaves the process running and any eager assignment in place.
        let healthy = self.health.await_healthy(port, &app.health_path())?;

        if self.config.assignment_order == AssignmentOrder::OnHealthy {
            self.record_assignment(port, deploy_id)?;
        }

        Ok(RunReport {
            deploy_id: deploy_id.to_string(),
            port,
            pid: process.pid,
            health_attempts: healthy.attempts,
        })
    }

    fn stop(&self, _deploy_id: &str) -> Result<()> {
        Err(DeployError::NotImplemented("stop"))
    }

    fn label(&self, _deploy_id: &str, _label: &Label) -> Result<()> {
        Err(DeployError::NotImplemented("label"))
    }
}

struct PortReservation<'a> {
    port: u16,
    in_flight: &'a Mutex<BTreeSet<u16>>,
}

impl Drop for PortReservation<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.port);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
