use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::request::{Credentials, PollRequest};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub instance: InstanceConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Deserialize, Clone)]
pub struct InstanceConfig {
    pub url: String,
    pub tool_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

// Manual Debug impl to avoid leaking the password and token
impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("url", &self.url)
            .field("tool_id", &self.tool_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Identity of the pipeline run the change request belongs to.
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    pub job_name: String,
    pub repository: String,
    pub workflow: String,
    pub run_id: String,
    #[serde(default = "default_run_attempt")]
    pub run_attempt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_change_creation_timeout")]
    pub change_creation_timeout_secs: u64,
    #[serde(default = "default_abort_on_change_creation_failure")]
    pub abort_on_change_creation_failure: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            change_creation_timeout_secs: default_change_creation_timeout(),
            abort_on_change_creation_failure: default_abort_on_change_creation_failure(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Overall wait budget for the poll loop. Unbounded when absent.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_wait_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HttpConfig {
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_run_attempt() -> String {
    "1".to_string()
}

fn default_change_creation_timeout() -> u64 {
    3600
}

fn default_abort_on_change_creation_failure() -> bool {
    true
}

fn default_interval() -> u64 {
    30
}

/// GitHub Actions run metadata used as defaults for the `run` section.
const GITHUB_RUN_DEFAULTS: &[(&str, &str)] = &[
    ("run.job_name", "GITHUB_JOB"),
    ("run.repository", "GITHUB_REPOSITORY"),
    ("run.workflow", "GITHUB_WORKFLOW"),
    ("run.run_id", "GITHUB_RUN_ID"),
    ("run.run_attempt", "GITHUB_RUN_ATTEMPT"),
];

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        for (key, var) in GITHUB_RUN_DEFAULTS {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("change-gate").required(false));
        }

        // Environment variable overrides with CHANGE_GATE__ prefix. Values stay
        // strings: passwords, tokens and run ids must not be coerced to numbers.
        builder = builder.add_source(
            config::Environment::with_prefix("CHANGE_GATE").separator("__"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance.url.trim().is_empty() {
            return Err(AppError::Config("instance.url must not be empty".to_string()));
        }
        if self.instance.tool_id.trim().is_empty() {
            return Err(AppError::Config("instance.tool_id must not be empty".to_string()));
        }
        if self.instance.token.is_empty()
            && (self.instance.username.is_empty() || self.instance.password.is_empty())
        {
            return Err(AppError::Config(
                "either instance.token or both instance.username and instance.password are required"
                    .to_string(),
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(AppError::Config("poll.interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::select(
            &self.instance.username,
            &self.instance.password,
            &self.instance.token,
        )
    }

    pub fn poll_request(&self) -> PollRequest {
        PollRequest {
            instance_url: self.instance.url.clone(),
            tool_id: self.instance.tool_id.clone(),
            credentials: self.credentials(),
            job_name: self.run.job_name.clone(),
            repository: self.run.repository.clone(),
            workflow: self.run.workflow.clone(),
            run_id: self.run.run_id.clone(),
            run_attempt: self.run.run_attempt.clone(),
        }
    }
}
