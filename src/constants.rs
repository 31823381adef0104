pub const DEPLOYS_DIR: &str = "deploys";
pub const REGISTRY_FILE: &str = "config.json";
pub const MANIFEST_NAME: &str = "deploy.json";

pub const DEFAULT_ROOT: &str = ".";

/// Candidate ports are `[DEFAULT_PORT_RANGE_START, DEFAULT_PORT_RANGE_END)`.
pub const DEFAULT_PORT_RANGE_START: u16 = 8001;
pub const DEFAULT_PORT_RANGE_END: u16 = 8100;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 250;

pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

pub const DEFAULT_HEALTH_PATH: &str = "/";
pub const PORT_PLACEHOLDER: &str = "{port}";
pub const PORT_ENV_VAR: &str = "PORT";

pub const DEPLOY_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
