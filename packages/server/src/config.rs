use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::kernel::jobs::{DEFAULT_DISPATCH_GRACE, DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_ATTEMPTS};

/// Runtime environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Local environments run jobs in-process instead of on a remote worker.
    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        })
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => anyhow::bail!("unknown APP_ENV: {}", other),
        }
    }
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub database_url: Option<String>,
    /// Remote worker that receives job envelopes outside local environments.
    pub job_worker_url: Option<String>,
    pub worker_port: u16,
    pub job_max_attempts: i32,
    pub redispatch_interval: Duration,
    /// How long a claimed job may run before another invocation may take it.
    pub job_lease_timeout: Duration,
    /// How long a routed job may stay unclaimed before it is routed again.
    pub dispatch_grace: Duration,
    /// Internal API of the intake application (documents, assessments, reports).
    pub intake_api_url: Option<String>,
    pub intake_api_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            database_url: None,
            job_worker_url: None,
            worker_port: 9090,
            job_max_attempts: DEFAULT_MAX_ATTEMPTS,
            redispatch_interval: Duration::from_secs(30),
            job_lease_timeout: DEFAULT_LEASE_TIMEOUT,
            dispatch_grace: DEFAULT_DISPATCH_GRACE,
            intake_api_url: None,
            intake_api_token: None,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let environment = match env::var("APP_ENV") {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };

        let config = Self {
            environment,
            database_url: non_empty_var("DATABASE_URL"),
            job_worker_url: non_empty_var("JOB_WORKER_URL"),
            worker_port: env::var("WORKER_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .context("WORKER_PORT must be a valid number")?,
            job_max_attempts: env::var("JOB_MAX_ATTEMPTS")
                .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
                .parse()
                .context("JOB_MAX_ATTEMPTS must be a valid number")?,
            redispatch_interval: parse_secs(
                "JOB_REDISPATCH_INTERVAL_SECS",
                env::var("JOB_REDISPATCH_INTERVAL_SECS").ok(),
                Duration::from_secs(30),
            )?,
            job_lease_timeout: parse_secs(
                "JOB_LEASE_TIMEOUT_SECS",
                env::var("JOB_LEASE_TIMEOUT_SECS").ok(),
                DEFAULT_LEASE_TIMEOUT,
            )?,
            dispatch_grace: parse_secs(
                "JOB_DISPATCH_GRACE_SECS",
                env::var("JOB_DISPATCH_GRACE_SECS").ok(),
                DEFAULT_DISPATCH_GRACE,
            )?,
            intake_api_url: non_empty_var("INTAKE_API_URL"),
            intake_api_token: non_empty_var("INTAKE_API_TOKEN"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: non_empty_var("OPENAI_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.job_max_attempts < 1 {
            anyhow::bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }
        if self.redispatch_interval.is_zero() {
            anyhow::bail!("JOB_REDISPATCH_INTERVAL_SECS must be at least 1");
        }
        if self.job_lease_timeout.is_zero() {
            anyhow::bail!("JOB_LEASE_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_secs(name: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        Some(value) => {
            let secs: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", name))?;
            Ok(Duration::from_secs(secs))
        }
        None => Ok(default),
    }
}
