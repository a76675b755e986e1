//! Maps the outcome of one poll cycle to the loop's next step.

use thiserror::Error;

use crate::{
    error::FetchError,
    fetch::{PollResponse, UpdateBatch},
};

/// `failed` code meaning the cursor fell out of the server's history window.
/// The response carries the position to resume from.
pub const CURSOR_EXPIRED: i64 = 1;

/// A cycle that did not produce updates.
#[derive(Debug, Error)]
pub enum PollFailure {
    /// Network or HTTP failure, or an unreadable body.
    #[error(transparent)]
    Transport(#[from] FetchError),

    /// The server rejected the key or lost the session's history.
    #[error("long-poll session invalid (failed={code}: {})", describe_failed(*code))]
    SessionInvalid { code: i64 },
}

impl PollFailure {
    /// Whether recovery must start from a server-assigned cursor.
    #[must_use]
    pub fn resets_cursor(&self) -> bool {
        matches!(self, Self::SessionInvalid { .. })
    }
}

/// Next step for the poll loop.
#[derive(Debug)]
pub enum Action {
    /// Advance the cursor and hand the batch to the subscriber.
    Deliver(UpdateBatch),
    /// Resume from the server-corrected cursor. Not a retry.
    AdoptCursor(u64),
    /// Wait out the backoff and poll again with the same session.
    Retry(PollFailure),
    /// Throw away server and key and acquire a new session.
    Reacquire(PollFailure),
}

/// Classify one cycle.
///
/// Transport failures respect the retry budget; invalid-session codes skip it
/// and go straight to reacquisition.
#[must_use]
pub fn classify(
    outcome: Result<PollResponse, FetchError>,
    retry_count: u32,
    retry_limit: u32,
) -> Action {
    let failure = match outcome {
        Ok(PollResponse::Batch(batch)) => return Action::Deliver(batch),
        Ok(PollResponse::Failed {
            code: CURSOR_EXPIRED,
            ts: Some(ts),
        }) => return Action::AdoptCursor(ts),
        Ok(PollResponse::Failed {
            code: CURSOR_EXPIRED,
            ts: None,
        }) => PollFailure::Transport(FetchError::Malformed("failed=1 without ts".into())),
        Ok(PollResponse::Failed { code, .. }) => {
            return Action::Reacquire(PollFailure::SessionInvalid { code });
        },
        Err(err) => PollFailure::Transport(err),
    };

    if retry_count < retry_limit {
        Action::Retry(failure)
    } else {
        Action::Reacquire(failure)
    }
}

fn describe_failed(code: i64) -> &'static str {
    match code {
        2 => "key expired",
        3 => "history lost",
        4 => "unsupported version",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn failed(code: i64, ts: Option<u64>) -> Result<PollResponse, FetchError> {
        Ok(PollResponse::Failed { code, ts })
    }

    #[test]
    fn batch_is_delivered() {
        let batch = UpdateBatch {
            ts: 7,
            pts: None,
            updates: Vec::new(),
        };
        let action = classify(Ok(PollResponse::Batch(batch.clone())), 2, 3);
        assert!(matches!(action, Action::Deliver(b) if b == batch));
    }

    #[test]
    fn expired_cursor_is_adopted_even_with_spent_budget() {
        assert!(matches!(
            classify(failed(1, Some(42)), 3, 3),
            Action::AdoptCursor(42)
        ));
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(99)]
    fn other_codes_reacquire_within_budget(#[case] code: i64) {
        let action = classify(failed(code, None), 0, 3);
        let Action::Reacquire(failure) = action else {
            panic!("expected reacquire for failed={code}");
        };
        assert!(failure.resets_cursor());
    }

    #[rstest]
    #[case(0, true)]
    #[case(1, true)]
    #[case(2, true)]
    #[case(3, false)]
    #[case(4, false)]
    fn transport_failures_respect_budget(#[case] retry_count: u32, #[case] retries: bool) {
        let action = classify(Err(FetchError::Status(502)), retry_count, 3);
        match action {
            Action::Retry(failure) => {
                assert!(retries);
                assert!(!failure.resets_cursor());
            },
            Action::Reacquire(failure) => {
                assert!(!retries);
                assert!(!failure.resets_cursor());
            },
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn zero_limit_reacquires_on_first_transport_failure() {
        assert!(matches!(
            classify(Err(FetchError::Timeout), 0, 0),
            Action::Reacquire(PollFailure::Transport(FetchError::Timeout))
        ));
    }

    #[test]
    fn expired_cursor_without_ts_is_transient() {
        assert!(matches!(
            classify(failed(1, None), 0, 3),
            Action::Retry(PollFailure::Transport(FetchError::Malformed(_)))
        ));
    }

    #[test]
    fn session_invalid_display_names_the_code() {
        let failure = PollFailure::SessionInvalid { code: 2 };
        assert_eq!(
            failure.to_string(),
            "long-poll session invalid (failed=2: key expired)"
        );
    }
}
