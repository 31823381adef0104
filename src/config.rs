use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEALTH_CHECK_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, DEFAULT_ROOT, DEFAULT_STARTUP_TIMEOUT_MS,
    DEPLOYS_DIR, REGISTRY_FILE,
};

/// What `new_deploy_directory` does when two ids land in the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdPolicy {
    /// Bare timestamp. Two calls within one second return the same id.
    #[default]
    Timestamp,
    /// Timestamp plus `-N` while `<root>/deploys/<id>` already exists.
    Suffixed,
}

/// When `run` writes the port assignment to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentOrder {
    /// Before the process is launched. A failed launch or health check leaves the entry behind.
    #[default]
    Eager,
    /// Only after the health check confirms the process.
    OnHealthy,
}

impl FromStr for IdPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|err| anyhow!(err))
    }
}

impl FromStr for AssignmentOrder {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|err| anyhow!(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 || start >= end {
            bail!("invalid port range {start}..{end}");
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..self.end).contains(&port)
    }

    pub fn iter(&self) -> std::ops::Range<u16> {
        self.start..self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_RANGE_START,
            end: DEFAULT_PORT_RANGE_END,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Overall deadline for the process to answer its first health check.
    pub startup_timeout: Duration,
    /// Timeout of a single health request.
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_HEALTH_CHECK_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub root: PathBuf,
    pub port_range: PortRange,
    pub connect_timeout: Duration,
    pub health: HealthCheckConfig,
    pub id_policy: IdPolicy,
    pub assignment_order: AssignmentOrder,
}

impl ManagerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            port_range: PortRange::default(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            health: HealthCheckConfig::default(),
            id_policy: IdPolicy::default(),
            assignment_order: AssignmentOrder::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let root = PathBuf::from(env_string("DEPLOYCTL_ROOT", Some(DEFAULT_ROOT.to_string()))?);

        let start = env_u64("DEPLOYCTL_PORT_RANGE_START", Some(DEFAULT_PORT_RANGE_START as u64))?;
        let end = env_u64("DEPLOYCTL_PORT_RANGE_END", Some(DEFAULT_PORT_RANGE_END as u64))?;
        let port_range = PortRange::new(
            u16::try_from(start).context("invalid DEPLOYCTL_PORT_RANGE_START")?,
            u16::try_from(end).context("invalid DEPLOYCTL_PORT_RANGE_END")?,
        )?;

        let connect_timeout = Duration::from_millis(env_u64(
            "DEPLOYCTL_CONNECT_TIMEOUT_MS",
            Some(DEFAULT_CONNECT_TIMEOUT_MS),
        )?);

        let health = HealthCheckConfig {
            startup_timeout: Duration::from_millis(env_u64(
                "DEPLOYCTL_STARTUP_TIMEOUT_MS",
                Some(DEFAULT_STARTUP_TIMEOUT_MS),
            )?),
            request_timeout: Duration::from_millis(env_u64(
                "DEPLOYCTL_HEALTH_TIMEOUT_MS",
                Some(DEFAULT_HEALTH_CHECK_TIMEOUT_MS),
            )?),
            poll_interval: Duration::from_millis(env_u64(
                "DEPLOYCTL_POLL_INTERVAL_MS",
                Some(DEFAULT_POLL_INTERVAL_MS),
            )?),
        };
        if health.poll_interval.is_zero() {
            bail!("DEPLOYCTL_POLL_INTERVAL_MS must be greater than zero");
        }

        let id_policy = match env_optional("DEPLOYCTL_ID_POLICY") {
            Some(raw) => raw.parse().context("invalid DEPLOYCTL_ID_POLICY")?,
            None => IdPolicy::default(),
        };
        let assignment_order = match env_optional("DEPLOYCTL_ASSIGNMENT_ORDER") {
            Some(raw) => raw.parse().context("invalid DEPLOYCTL_ASSIGNMENT_ORDER")?,
            None => AssignmentOrder::default(),
        };

        Ok(Self {
            root,
            port_range,
            connect_timeout,
            health,
            id_policy,
            assignment_order,
        })
    }

    pub fn deploys_dir(&self) -> PathBuf {
        deploys_dir(&self.root)
    }

    pub fn registry_path(&self) -> PathBuf {
        registry_path(&self.root)
    }
}

pub fn deploys_dir(root: &Path) -> PathBuf {
    root.join(DEPLOYS_DIR)
}

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
