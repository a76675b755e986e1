//! VK long-poll update transport.
//!
//! Acquires a long-poll session (`server`, `key`, `ts`) through the VK API,
//! polls it in a single sequential loop and hands every update record to one
//! subscriber, in order. The loop recovers on its own from the failure modes
//! the protocol defines:
//!
//! - `failed: 1` carries a corrected cursor, which is adopted in place;
//! - any other `failed` code drops the cursor and rebuilds the session;
//! - transport errors are retried after a fixed backoff, and rebuild the
//!   session once the retry budget is spent.
//!
//! Only failures at [`LongPollTransport::start`] reach the caller. After that
//! the loop runs until [`LongPollTransport::stop`].

pub mod acquire;
pub mod classify;
pub mod error;
pub mod fetch;
#[cfg(feature = "metrics")]
mod metrics_names;
mod poll_loop;
pub mod session;
pub mod sink;
mod timing;
pub mod transport;
pub mod update;

#[cfg(test)]
mod test_support;

pub use {
    acquire::{LongPollServer, PollScope, SessionAcquirer, VkApiAcquirer},
    classify::{Action, PollFailure, classify},
    error::{AcquireError, Error, FetchError, Result},
    fetch::{PollResponse, UpdateBatch},
    session::{PollMode, Session},
    sink::{CursorHandler, UpdateHandler},
    transport::{LongPollTransport, PollOptions, TransportState},
    update::{Update, UpdateKind},
};

/// Long-poll protocol version, sent both when requesting a server and on
/// every poll.
pub const POLL_VERSION: u32 = 10;

pub use vkbridge_config::WAIT_HINT_SECS;
