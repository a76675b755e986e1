//! Subscriber interfaces for delivered updates and cursor positions.

use std::{
    future::Future,
    sync::{Arc, RwLock},
};

use {async_trait::async_trait, tokio::sync::mpsc, tracing::debug};

use crate::update::Update;

/// Receives every update record, one at a time, in server order.
///
/// The next record is not handed over until `handle` returns.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: Update);
}

/// Receives the cursor after each successful cycle, once all of that cycle's
/// updates were handled. The next poll waits for it to finish.
#[async_trait]
pub trait CursorHandler: Send + Sync {
    async fn cursor_advanced(&self, cursor: u64) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> UpdateHandler for F
where
    F: Fn(Update) + Send + Sync,
{
    async fn handle(&self, update: Update) {
        self(update);
    }
}

#[async_trait]
impl UpdateHandler for mpsc::Sender<Update> {
    async fn handle(&self, update: Update) {
        if self.send(update).await.is_err() {
            debug!("update receiver dropped, discarding update");
        }
    }
}

#[async_trait]
impl<F, Fut> CursorHandler for F
where
    F: Fn(u64) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn cursor_advanced(&self, cursor: u64) -> anyhow::Result<()> {
        self(cursor).await
    }
}

/// The single registered update handler and optional cursor handler.
///
/// Registration replaces the previous handler; the poll loop picks up the
/// replacement on its next cycle.
#[derive(Default)]
pub(crate) struct Handlers {
    updates: RwLock<Option<Arc<dyn UpdateHandler>>>,
    cursor: RwLock<Option<Arc<dyn CursorHandler>>>,
}

impl Handlers {
    pub(crate) fn set_updates(&self, handler: Arc<dyn UpdateHandler>) {
        *self.updates.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub(crate) fn set_cursor(&self, handler: Arc<dyn CursorHandler>) {
        *self.cursor.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub(crate) fn updates(&self) -> Option<Arc<dyn UpdateHandler>> {
        self.updates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn cursor(&self) -> Option<Arc<dyn CursorHandler>> {
        self.cursor.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
