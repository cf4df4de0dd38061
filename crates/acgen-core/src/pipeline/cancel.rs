use crate::error::{AcgenError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Caller-held switch that stops a run at its next outbound call.
///
/// Clones share the same switch. Cancelling never undoes writes that have
/// already reached Jira.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Drive `fut` unless the handle fires first.
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if self.is_cancelled() {
            return Err(AcgenError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AcgenError::Cancelled),
            out = fut => out,
        }
    }
}
