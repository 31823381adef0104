use anyhow::{Context, Result};
use std::fs;
use std::time::Duration;

use crate::cli::{Cli, LabelArgs, ListArgs, NewArgs, RunArgs, StopArgs};
use crate::config::ManagerConfig;
use crate::manager::{DeployManager, DeployService};

/// Environment first, then global flags on top.
pub fn manager_config(cli: &Cli) -> Result<ManagerConfig> {
    let mut config = ManagerConfig::from_env()?;
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(policy) = cli.id_policy {
        config.id_policy = policy;
    }
    if let Some(order) = cli.assignment_order {
        config.assignment_order = order;
    }
    Ok(config)
}

pub fn open_manager(config: ManagerConfig) -> Result<DeployManager> {
    let root = config.root.clone();
    DeployManager::open(config)
        .with_context(|| format!("Failed to open deploy root {}", root.display()))
}

pub fn new_deploy(config: ManagerConfig, args: NewArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let dir = manager.new_deploy_directory();
    if args.create {
        fs::create_dir_all(&dir.path)
            .with_context(|| format!("Failed to create {}", dir.path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(&dir)?);
    Ok(())
}

pub fn list(config: ManagerConfig, args: ListArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let deploys = manager.list_deploys()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&deploys)?);
        return Ok(());
    }
    if deploys.is_empty() {
        println!("no deploys");
    }
    for deploy in deploys {
        match deploy.port {
            Some(port) => println!("{}\tport {port}", deploy.id),
            None => println!("{}\t-", deploy.id),
        }
    }
    Ok(())
}

pub fn run(mut config: ManagerConfig, args: RunArgs) -> Result<()> {
    if let Some(ms) = args.startup_timeout_ms {
        config.health.startup_timeout = Duration::from_millis(ms);
    }
    let manager = open_manager(config)?;
    let report = match manager.run(&args.deploy_id) {
        Ok(report) => report,
        Err(err) => {
            if err.process_started() {
                tracing::warn!(
                    deploy_id = %args.deploy_id,
                    "process was started and may still be running"
                );
            }
            return Err(err).with_context(|| format!("Failed to run deploy {}", args.deploy_id));
        }
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} running on port {} (pid {})",
            report.deploy_id, report.port, report.pid
        );
    }
    Ok(())
}

pub fn stop(config: ManagerConfig, args: StopArgs) -> Result<()> {
    let manager = open_manager(config)?;
    manager.stop(&args.deploy_id)?;
    Ok(())
}

pub fn label(config: ManagerConfig, args: LabelArgs) -> Result<()> {
    let manager = open_manager(config)?;
    manager.label(&args.deploy_id, &args.label)?;
    Ok(())
}

pub fn labels(config: ManagerConfig) -> Result<()> {
    let manager = open_manager(config)?;
    for label in manager.list_labels()? {
        println!("{label}");
    }
    Ok(())
}
