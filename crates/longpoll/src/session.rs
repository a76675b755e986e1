//! Long-poll session state.
//!
//! A [`Session`] is owned by exactly one party at a time: the transport
//! handle while stopped, the poll loop while running. The endpoint (server
//! URL plus key) is replaced only as a whole, by [`Session::bind`].

use std::fmt;

use {serde_json::Value, url::Url};

use vkbridge_config::WAIT_HINT_SECS;

use crate::{POLL_VERSION, acquire::LongPollServer};

/// Optional payload fields requested from the long-poll server.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollMode(u32);

impl PollMode {
    /// Include attachments.
    pub const ATTACHMENTS: Self = Self(2);
    /// Extended set of events.
    pub const EXTENDED_EVENTS: Self = Self(8);
    /// Platform id of users coming online.
    pub const PLATFORM_ID: Self = Self(64);
    /// Echo `random_id` of sent messages.
    pub const RANDOM_ID: Self = Self(128);

    /// Every flag the transport asks for.
    pub const DEFAULT: Self = Self(
        Self::ATTACHMENTS.0 | Self::EXTENDED_EVENTS.0 | Self::PLATFORM_ID.0 | Self::RANDOM_ID.0,
    );

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl Default for PollMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PollMode({})", self.0)
    }
}

/// Polling URL with every fixed query parameter already applied.
#[derive(Clone)]
struct Endpoint {
    url: Url,
}

impl Endpoint {
    fn new(server: &LongPollServer, mode: PollMode) -> Self {
        let mut url = server.server.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("key", &server.key)
            .append_pair("act", "a_check")
            .append_pair("wait", &WAIT_HINT_SECS.to_string())
            .append_pair("mode", &mode.bits().to_string())
            .append_pair("version", &POLL_VERSION.to_string());
        Self { url }
    }
}

/// Mutable state of one long-poll session.
pub struct Session {
    endpoint: Option<Endpoint>,
    cursor: u64,
    extended_cursor: Option<u64>,
    mode: PollMode,
    retry_count: u32,
}

impl Session {
    /// An unbound session. A non-zero `cursor` is a position persisted by an
    /// earlier run and wins over the one the server hands out.
    #[must_use]
    pub fn new(mode: PollMode, cursor: u64) -> Self {
        Self {
            endpoint: None,
            cursor,
            extended_cursor: None,
            mode,
            retry_count: 0,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[must_use]
    pub fn extended_cursor(&self) -> Option<u64> {
        self.extended_cursor
    }

    #[must_use]
    pub fn mode(&self) -> PollMode {
        self.mode
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Adopt a freshly acquired server and key.
    pub fn bind(&mut self, server: LongPollServer) {
        self.endpoint = Some(Endpoint::new(&server, self.mode));
        if self.cursor == 0 {
            self.cursor = server.ts;
        }
        if self.extended_cursor.is_none() {
            self.extended_cursor = server.pts;
        }
        self.retry_count = 0;
    }

    /// Drop the server and key; the cursor survives.
    pub fn invalidate(&mut self) {
        self.endpoint = None;
    }

    /// URL for the next poll, or `None` while unbound.
    #[must_use]
    pub fn poll_url(&self) -> Option<Url> {
        let mut url = self.endpoint.as_ref()?.url.clone();
        url.query_pairs_mut()
            .append_pair("ts", &self.cursor.to_string());
        Some(url)
    }

    /// Record a validated batch position.
    pub fn advance(&mut self, ts: u64, pts: Option<u64>) {
        self.cursor = ts;
        if pts.is_some() {
            self.extended_cursor = pts;
        }
        self.retry_count = 0;
    }

    /// Take the corrected cursor from a `failed: 1` response.
    pub fn adopt_cursor(&mut self, ts: u64) {
        self.cursor = ts;
    }

    /// Forget the cursor so the next acquisition supplies a fresh one.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn record_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The endpoint URL embeds the session key.
        f.debug_struct("Session")
            .field("bound", &self.is_bound())
            .field("cursor", &self.cursor)
            .field("extended_cursor", &self.extended_cursor)
            .field("mode", &self.mode)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}

/// Read a cursor sent either as a JSON number or as a decimal string.
pub(crate) fn parse_cursor(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
