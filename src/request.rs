use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const CHANGE_STATUS_PATH: &str = "devops/orchestration/changeStatus";

/// How a poll authenticates against the change-orchestration API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// DevOps integration token, served by the v2 API.
    Token { token: String },
    /// Username and password, served by the v1 API.
    Basic { username: String, password: String },
}

impl Credentials {
    /// Token mode wins whenever a non-empty token is supplied.
    pub fn select(username: &str, password: &str, token: &str) -> Self {
        if token.is_empty() {
            Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }
        } else {
            Credentials::Token {
                token: token.to_string(),
            }
        }
    }

    fn api_version(&self) -> &'static str {
        match self {
            Credentials::Token { .. } => "v2",
            Credentials::Basic { .. } => "v1",
        }
    }

    fn authorization(&self, tool_id: &str) -> String {
        match self {
            Credentials::Token { token } => format!("sn_devops.DevOpsToken {tool_id}:{token}"),
            Credentials::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
        }
    }
}

// Manual Debug impl to avoid leaking the password and token
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token { .. } => f
                .debug_struct("Token")
                .field("token", &"[REDACTED]")
                .finish(),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Everything needed to ask the service about one pipeline step's change.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub instance_url: String,
    pub tool_id: String,
    pub credentials: Credentials,
    pub job_name: String,
    pub repository: String,
    pub workflow: String,
    pub run_id: String,
    pub run_attempt: String,
}

impl PollRequest {
    pub fn pipeline_name(&self) -> String {
        format!("{}/{}", self.repository, self.workflow)
    }

    /// Build the change-status request descriptor. Performs no I/O.
    pub fn build(&self) -> ChangeStatusRequest {
        let pipeline_name = self.pipeline_name();
        let url = format!(
            "{base}/api/sn_devops/{version}/{CHANGE_STATUS_PATH}\
             ?toolId={tool_id}\
             &stageName={stage}\
             &pipelineName={pipeline}\
             &buildNumber={build}\
             &attemptNumber={attempt}",
            base = self.instance_url.trim_end_matches('/'),
            version = self.credentials.api_version(),
            tool_id = self.tool_id,
            stage = urlencoding::encode(&self.job_name),
            pipeline = urlencoding::encode(&pipeline_name),
            build = self.run_id,
            attempt = self.run_attempt,
        );

        let headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("Accept", "application/json".to_string()),
            ("Authorization", self.credentials.authorization(&self.tool_id)),
        ];

        tracing::debug!(endpoint = %url, "Built change status request");
        tracing::debug!(
            pipeline_name = %pipeline_name,
            build_number = %self.run_id,
            attempt_number = %self.run_attempt,
            job_name = %self.job_name,
            "Change status parameters"
        );

        ChangeStatusRequest { url, headers }
    }
}

/// A fully-formed GET request against the change-status endpoint.
#[derive(Clone)]
pub struct ChangeStatusRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
}

impl ChangeStatusRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Manual Debug impl to avoid leaking the Authorization header
impl std::fmt::Debug for ChangeStatusRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (*name, "[REDACTED]")
                } else {
                    (*name, value.as_str())
                }
            })
            .collect();
        f.debug_struct("ChangeStatusRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish()
    }
}
