use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{AssignmentOrder, IdPolicy};

#[derive(Parser)]
#[command(name = "deployctl", version, about = "Single-host deploy manager")]
pub struct Cli {
    /// Directory holding `deploys/` and `config.json` (defaults to DEPLOYCTL_ROOT or `.`).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
    #[arg(long, global = true, value_enum)]
    pub id_policy: Option<IdPolicy>,
    #[arg(long, global = true, value_enum)]
    pub assignment_order: Option<AssignmentOrder>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a fresh deploy id and the directory the bundle should be written to.
    New(NewArgs),
    List(ListArgs),
    /// Launch a deploy on a free port and wait for its health check.
    Run(RunArgs),
    Stop(StopArgs),
    Label(LabelArgs),
    Labels,
}

#[derive(Args)]
pub struct NewArgs {
    /// Create the directory as well.
    #[arg(long, default_value_t = false)]
    pub create: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    pub deploy_id: String,
    /// Override the startup deadline in milliseconds.
    #[arg(long)]
    pub startup_timeout_ms: Option<u64>,
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct StopArgs {
    pub deploy_id: String,
}

#[derive(Args)]
pub struct LabelArgs {
    pub deploy_id: String,
    pub label: String,
}
