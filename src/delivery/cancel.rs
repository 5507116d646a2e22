use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;

/// Run-wide stop signal carrying the first reason given.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,

    reason: Arc<OnceLock<String>>,

    parent: Option<Arc<Cancellation>>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cancellation that stops when `self` does, but can also be
    /// cancelled on its own without touching `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::default(),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Later calls keep the first reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.token.is_cancelled() {
            return;
        }
        // The reason is stored before waking waiters so they always find it.
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .get()
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.reason()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check(&self) -> Result<(), DeliveryError> {
        match self.reason() {
            Some(reason) => Err(DeliveryError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Resolves with the reason once cancelled.
    pub async fn cancelled(&self) -> String {
        self.token.cancelled().await;
        self.reason().unwrap_or_default()
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), DeliveryError> {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            reason = self.cancelled() => Err(DeliveryError::Cancelled(reason)),
        }
    }
}
