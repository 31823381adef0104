use reqwest::blocking::Client as HttpClient;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

use crate::config::HealthCheckConfig;
use crate::error::{DeployError, HealthCheckFailure, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Polling,
    Healthy,
    Failed(HealthCheckFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Healthy {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Maps one completed health response to the next state. A definite non-200 answer ends the
/// check; it is never retried.
pub fn classify(status: StatusCode) -> HealthState {
    if status == StatusCode::OK {
        HealthState::Healthy
    } else if status.is_redirection() {
        HealthState::Failed(HealthCheckFailure::UnexpectedRedirect)
    } else {
        HealthState::Failed(HealthCheckFailure::BadStatus(status.as_u16()))
    }
}

pub fn health_url(port: u16, health_path: &str) -> String {
    format!("http://localhost:{port}{health_path}")
}

pub struct HealthChecker {
    client: HttpClient,
    config: HealthCheckConfig,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .redirect(Policy::none())
            .no_proxy()
            .timeout(config.request_timeout)
            .build()
            .map_err(DeployError::HttpClient)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Polls `http://localhost:<port><health_path>` until it answers 200, answers anything
    /// else, or the startup deadline passes with no answer at all.
    pub fn await_healthy(&self, port: u16, health_path: &str) -> Result<Healthy> {
        let url = health_url(port, health_path);
        let started = Instant::now();
        let deadline = started + self.config.startup_timeout;
        let mut attempts = 0u32;
        let mut state = HealthState::Polling;

        while state == HealthState::Polling {
            attempts += 1;
            state = match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    tracing::debug!(port, attempts, status = status.as_u16(), "health response");
                    classify(status)
                }
                Err(err) => {
                    tracing::debug!(port, attempts, error = %err, "health check not answered");
                    if Instant::now() > deadline {
                        HealthState::Failed(HealthCheckFailure::StartupTimeout)
                    } else {
                        std::thread::sleep(self.config.poll_interval);
                        HealthState::Polling
                    }
                }
            };
        }

        let elapsed = started.elapsed();
        match state {
            HealthState::Failed(reason) => {
                tracing::warn!(port, attempts, ?elapsed, %reason, "health check failed");
                Err(DeployError::health(reason))
            }
            _ => {
                tracing::info!(port, attempts, ?elapsed, "health check ok");
                Ok(Healthy { attempts, elapsed })
            }
        }
    }
}
