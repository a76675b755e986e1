//! The sequential poll loop.
//!
//! One task owns the [`Session`] for as long as polling runs and hands it
//! back when it exits. Every cycle finishes dispatching its updates and the
//! cursor callback before the next request goes out.

use std::{sync::Arc, time::Duration};

use {
    reqwest::Client,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use crate::metrics_names;
use crate::{
    acquire::{PollScope, SessionAcquirer},
    classify::{Action, classify},
    fetch::{UpdateBatch, fetch_once},
    session::Session,
    sink::Handlers,
    timing::sleep_or_cancel,
    transport::{Status, TransportState},
};

/// Everything the loop needs besides the session itself.
pub(crate) struct PollContext {
    pub client: Client,
    pub acquirer: Arc<dyn SessionAcquirer>,
    pub scope: PollScope,
    pub retry_limit: u32,
    pub retry_backoff: Duration,
    pub reacquire_wait: Duration,
    pub request_timeout: Duration,
    pub handlers: Arc<Handlers>,
    pub status: Arc<Status>,
    pub cancel: CancellationToken,
}

impl PollContext {
    fn set_state(&self, state: TransportState) {
        if !self.cancel.is_cancelled() {
            self.status.set_state(state);
        }
    }
}

/// Poll until `ctx.cancel` fires, then return the session.
///
/// A request already in flight when the token fires runs to completion and
/// its batch is still delivered.
pub(crate) async fn run(mut session: Session, ctx: PollContext) -> Session {
    info!(
        cursor = session.cursor(),
        scope = ?ctx.scope,
        "long polling started"
    );

    while !ctx.cancel.is_cancelled() {
        let Some(url) = session.poll_url() else {
            if reacquire(&mut session, &ctx).await {
                continue;
            }
            break;
        };

        ctx.set_state(TransportState::Polling);
        #[cfg(feature = "metrics")]
        metrics::counter!(metrics_names::POLLS_TOTAL).increment(1);

        let outcome = fetch_once(&ctx.client, url, ctx.request_timeout).await;
        match classify(outcome, session.retry_count(), ctx.retry_limit) {
            Action::Deliver(batch) => deliver(&mut session, &ctx, batch).await,
            Action::AdoptCursor(ts) => {
                info!(
                    from = session.cursor(),
                    to = ts,
                    "cursor fell out of server history, adopting corrected cursor"
                );
                session.adopt_cursor(ts);
                ctx.status.set_cursor(ts);
                #[cfg(feature = "metrics")]
                metrics::counter!(metrics_names::CURSOR_CORRECTIONS_TOTAL).increment(1);
            },
            Action::Retry(failure) => {
                session.record_retry();
                ctx.set_state(TransportState::Recovering);
                warn!(
                    error = %failure,
                    retry_count = session.retry_count(),
                    retry_limit = ctx.retry_limit,
                    backoff_ms = ctx.retry_backoff.as_millis() as u64,
                    "long poll failed, retrying"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(metrics_names::RETRIES_TOTAL).increment(1);
                if !sleep_or_cancel(ctx.retry_backoff, &ctx.cancel).await {
                    break;
                }
            },
            Action::Reacquire(failure) => {
                ctx.set_state(TransportState::Recovering);
                warn!(
                    error = %failure,
                    retry_count = session.retry_count(),
                    "long-poll session unusable, reacquiring"
                );
                if failure.resets_cursor() {
                    session.reset_cursor();
                }
                session.invalidate();
            },
        }
    }

    session.reset_retries();
    ctx.status.set_state(TransportState::Stopped);
    info!(cursor = session.cursor(), "long polling stopped");
    session
}

/// Advance the session, then hand every record to the subscriber in order,
/// then report the new cursor.
async fn deliver(session: &mut Session, ctx: &PollContext, batch: UpdateBatch) {
    session.advance(batch.ts, batch.pts);
    let cursor = session.cursor();
    ctx.status.set_cursor(cursor);
    debug!(cursor, updates = batch.updates.len(), "poll cycle complete");

    if !batch.updates.is_empty() {
        match ctx.handlers.updates() {
            Some(handler) => {
                #[cfg(feature = "metrics")]
                let delivered = batch.updates.len() as u64;
                for update in batch.updates {
                    handler.handle(update).await;
                }
                #[cfg(feature = "metrics")]
                metrics::counter!(metrics_names::UPDATES_DELIVERED_TOTAL).increment(delivered);
            },
            None => warn!(
                dropped = batch.updates.len(),
                "no update subscriber registered, dropping updates"
            ),
        }
    }

    if let Some(handler) = ctx.handlers.cursor()
        && let Err(e) = handler.cursor_advanced(cursor).await
    {
        warn!(cursor, error = %e, "cursor handler failed");
    }
}

/// Discard the endpoint and acquire a new one, retrying every
/// `reacquire_wait` until it works or the loop is cancelled.
///
/// Returns `false` when cancelled first.
async fn reacquire(session: &mut Session, ctx: &PollContext) -> bool {
    session.invalidate();
    session.reset_retries();
    ctx.set_state(TransportState::Reacquiring);

    let mut attempt: u32 = 0;
    while !ctx.cancel.is_cancelled() {
        attempt = attempt.saturating_add(1);
        match ctx.acquirer.acquire(ctx.scope).await {
            Ok(server) => {
                session.bind(server);
                ctx.status.set_cursor(session.cursor());
                info!(
                    attempt,
                    cursor = session.cursor(),
                    "long-poll session reacquired"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(metrics_names::REACQUISITIONS_TOTAL).increment(1);
                return true;
            },
            Err(e) => {
                warn!(
                    attempt,
                    error = %e,
                    wait_ms = ctx.reacquire_wait.as_millis() as u64,
                    "long-poll session reacquisition failed"
                );
                if !sleep_or_cancel(ctx.reacquire_wait, &ctx.cancel).await {
                    break;
                }
            },
        }
    }
    false
}
