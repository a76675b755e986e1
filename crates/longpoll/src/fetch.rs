//! A single long-poll request and its response.

use std::time::Duration;

use {
    reqwest::{
        Client,
        header::{ACCEPT_ENCODING, CONNECTION},
    },
    serde_json::Value,
    url::Url,
};

use crate::{error::FetchError, session::parse_cursor, update::Update};

/// Successful poll payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBatch {
    pub ts: u64,
    pub pts: Option<u64>,
    pub updates: Vec<Update>,
}

/// Any response body the protocol defines.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResponse {
    Batch(UpdateBatch),
    Failed { code: i64, ts: Option<u64> },
}

impl PollResponse {
    pub fn parse(body: &[u8]) -> Result<Self, FetchError> {
        let Value::Object(mut map) = serde_json::from_slice::<Value>(body)? else {
            return Err(FetchError::Malformed("expected a JSON object".into()));
        };

        if let Some(failed) = map.get("failed") {
            let code = failed
                .as_i64()
                .ok_or_else(|| FetchError::Malformed(format!("non-integer failed code {failed}")))?;
            let ts = map.get("ts").and_then(parse_cursor);
            return Ok(Self::Failed { code, ts });
        }

        let ts = map
            .get("ts")
            .and_then(parse_cursor)
            .ok_or_else(|| FetchError::Malformed("missing ts".into()))?;
        let pts = map.get("pts").and_then(parse_cursor);
        let updates = match map.remove("updates") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.into_iter().map(Update::new).collect(),
            Some(other) => {
                return Err(FetchError::Malformed(format!(
                    "updates is not an array: {other}"
                )));
            },
        };

        Ok(Self::Batch(UpdateBatch { ts, pts, updates }))
    }
}

/// Issue one poll. `timeout` bounds the whole exchange, body included.
pub(crate) async fn fetch_once(
    client: &Client,
    url: Url,
    timeout: Duration,
) -> Result<PollResponse, FetchError> {
    let response = client
        .get(url)
        .header(CONNECTION, "keep-alive")
        .header(ACCEPT_ENCODING, "identity")
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    PollResponse::parse(&body)
}
