//! Long-poll server acquisition through the VK API.

use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
    url::Url,
};

use vkbridge_config::VkAccountConfig;

use crate::{POLL_VERSION, error::AcquireError, session::parse_cursor};

/// Time budget for a single API method call.
const API_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Whose updates the session delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollScope {
    /// The account the token belongs to.
    Account,
    /// A community the token administers.
    Group(u64),
}

impl PollScope {
    /// `Some(id)` selects the community scope, `None` the account scope.
    #[must_use]
    pub fn from_group_id(group_id: Option<u64>) -> Self {
        group_id.map_or(Self::Account, Self::Group)
    }
}

/// Server address, key and starting cursor handed out by the API.
#[derive(Debug, Clone)]
pub struct LongPollServer {
    pub server: Url,
    pub key: String,
    pub ts: u64,
    pub pts: Option<u64>,
}

/// Source of long-poll sessions.
#[async_trait]
pub trait SessionAcquirer: Send + Sync {
    async fn acquire(&self, scope: PollScope) -> Result<LongPollServer, AcquireError>;
}

/// [`SessionAcquirer`] backed by `messages.getLongPollServer` and
/// `groups.getLongPollServer`.
pub struct VkApiAcquirer {
    client: Client,
    api_url: Url,
    api_version: String,
    token: Secret<String>,
}

impl VkApiAcquirer {
    pub fn new(config: &VkAccountConfig) -> Result<Self, AcquireError> {
        let mut api_url = Url::parse(&config.api_url)
            .map_err(|e| AcquireError::InvalidApiUrl(format!("{}: {e}", config.api_url)))?;
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            api_url,
            api_version: config.api_version.clone(),
            token: config.token.clone(),
        })
    }

    /// Share a pooled client with the rest of the application.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn method_url(&self, method: &str) -> Result<Url, AcquireError> {
        self.api_url
            .join(&format!("method/{method}"))
            .map_err(|e| AcquireError::InvalidApiUrl(e.to_string()))
    }

    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, AcquireError> {
        let url = self.method_url(method)?;
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[
                ("access_token", self.token.expose_secret().as_str()),
                ("v", self.api_version.as_str()),
            ])
            .timeout(API_CALL_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let envelope: ApiEnvelope = serde_json::from_slice(&body)?;
        if let Some(err) = envelope.error {
            return Err(AcquireError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }
        envelope.response.ok_or(AcquireError::MissingField("response"))
    }
}

#[async_trait]
impl SessionAcquirer for VkApiAcquirer {
    async fn acquire(&self, scope: PollScope) -> Result<LongPollServer, AcquireError> {
        let response = match scope {
            PollScope::Account => {
                self.call("messages.getLongPollServer", &[(
                    "lp_version",
                    POLL_VERSION.to_string(),
                )])
                .await?
            },
            PollScope::Group(id) => {
                self.call("groups.getLongPollServer", &[("group_id", id.to_string())])
                    .await?
            },
        };
        let server = parse_server(&response, scope)?;
        debug!(
            ?scope,
            host = server.server.host_str().unwrap_or_default(),
            ts = server.ts,
            "acquired long-poll server"
        );
        Ok(server)
    }
}

#[derive(Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

fn parse_server(response: &Value, scope: PollScope) -> Result<LongPollServer, AcquireError> {
    let raw_server = response
        .get("server")
        .and_then(Value::as_str)
        .ok_or(AcquireError::MissingField("server"))?;
    let key = response
        .get("key")
        .and_then(Value::as_str)
        .ok_or(AcquireError::MissingField("key"))?;
    let ts = response
        .get("ts")
        .and_then(parse_cursor)
        .ok_or(AcquireError::MissingField("ts"))?;
    let pts = response.get("pts").and_then(parse_cursor);

    Ok(LongPollServer {
        server: server_url(raw_server, scope)?,
        key: key.to_string(),
        ts,
        pts,
    })
}

/// Account servers come back as `host/path`; community servers as full URLs.
fn server_url(raw: &str, scope: PollScope) -> Result<Url, AcquireError> {
    let has_scheme = raw.starts_with("https://") || raw.starts_with("http://");
    let candidate = match scope {
        PollScope::Account if !has_scheme => format!("https://{raw}"),
        _ => raw.to_string(),
    };
    Url::parse(&candidate).map_err(|e| AcquireError::InvalidServer(format!("{raw}: {e}")))
}
