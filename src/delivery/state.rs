use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::device::DeviceIdentifier;
use crate::error::DeliveryError;
use crate::protocol::EncodedPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupStage {
    Pre,
    Post,
}

impl BackupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStage::Pre => "pre",
            BackupStage::Post => "post",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    Generated,
    BackupRequested(BackupStage),
    QueuedForFlush,
    Flushed,
    Enqueued,
    AwaitingConfirmation,
    /// Acknowledged by the device.
    Confirmed,
    /// Accepted by the gateway, no acknowledgement requested.
    Delivered,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryState::Confirmed | DeliveryState::Delivered | DeliveryState::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryState::Confirmed | DeliveryState::Delivered)
    }

    pub fn can_advance_to(&self, next: DeliveryState) -> bool {
        use BackupStage::*;
        use DeliveryState::*;

        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Generated, BackupRequested(Pre) | QueuedForFlush | Enqueued) => true,
            (BackupRequested(Pre), QueuedForFlush | Enqueued) => true,
            (QueuedForFlush, Flushed) => true,
            // Flush failure tolerated by policy.
            (QueuedForFlush, Enqueued) => true,
            (Flushed, Enqueued) => true,
            (Enqueued, BackupRequested(Post) | AwaitingConfirmation | Delivered) => true,
            (BackupRequested(Post), AwaitingConfirmation | Delivered) => true,
            (AwaitingConfirmation, Confirmed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Generated => "generated",
            DeliveryState::BackupRequested(BackupStage::Pre) => "backup-requested(pre)",
            DeliveryState::BackupRequested(BackupStage::Post) => "backup-requested(post)",
            DeliveryState::QueuedForFlush => "queued-for-flush",
            DeliveryState::Flushed => "flushed",
            DeliveryState::Enqueued => "enqueued",
            DeliveryState::AwaitingConfirmation => "awaiting-confirmation",
            DeliveryState::Confirmed => "confirmed",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeliveryState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: DeliveryState,

    pub to: DeliveryState,

    pub at: DateTime<Utc>,
}

/// A generated payload and its delivery progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Downlink {
    pub deveui: DeviceIdentifier,

    pub payload: EncodedPayload,

    pub confirmed: bool,

    state: DeliveryState,

    history: Vec<Transition>,

    attempt_count: u32,

    last_error: Option<String>,

    references: Vec<String>,
}

impl Downlink {
    pub fn new(deveui: DeviceIdentifier, payload: EncodedPayload, confirmed: bool) -> Self {
        Self {
            deveui,
            payload,
            confirmed,
            state: DeliveryState::Generated,
            history: Vec::new(),
            attempt_count: 0,
            last_error: None,
            references: Vec::new(),
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Enqueue references of the fragments accepted so far.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn transition(&mut self, next: DeliveryState) -> Result<(), DeliveryError> {
        if !self.state.can_advance_to(next) {
            return Err(DeliveryError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        self.history.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;

        Ok(())
    }

    /// Moves a live downlink to `Failed`; terminal downlinks keep their state.
    pub fn fail(&mut self, err: &DeliveryError) {
        if self.transition(DeliveryState::Failed).is_ok() {
            self.last_error = Some(err.to_string());
        }
    }

    pub fn add_attempts(&mut self, attempts: u32) {
        self.attempt_count = self.attempt_count.saturating_add(attempts);
    }

    pub fn push_reference(&mut self, reference: String) {
        self.references.push(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downlink() -> Downlink {
        Downlink::new(
            "A0B1C2D3E4F500FE".parse().unwrap(),
            EncodedPayload::new(10, [vec![0x04, 0xFC]]),
            true,
        )
    }

    #[test]
    fn confirmed_path_with_backups_and_flush() {
        let mut d = downlink();
        let path = [
            DeliveryState::BackupRequested(BackupStage::Pre),
            DeliveryState::QueuedForFlush,
            DeliveryState::Flushed,
            DeliveryState::Enqueued,
            DeliveryState::BackupRequested(BackupStage::Post),
            DeliveryState::AwaitingConfirmation,
            DeliveryState::Confirmed,
        ];
        for state in path {
            d.transition(state).unwrap();
        }
        assert_eq!(d.history().len(), path.len());
        assert_eq!(d.history()[0].from, DeliveryState::Generated);
        assert!(d.state().is_success());
    }

    #[test]
    fn rejects_skipping_the_enqueue() {
        let mut d = downlink();
        let err = d.transition(DeliveryState::AwaitingConfirmation).unwrap_err();
        assert_eq!(
            err,
            DeliveryError::InvalidTransition {
                from: DeliveryState::Generated,
                to: DeliveryState::AwaitingConfirmation,
            }
        );
        assert_eq!(d.state(), DeliveryState::Generated);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut d = downlink();
        d.transition(DeliveryState::Enqueued).unwrap();
        d.transition(DeliveryState::Delivered).unwrap();

        d.fail(&DeliveryError::Cancelled("late".into()));
        assert_eq!(d.state(), DeliveryState::Delivered);
        assert_eq!(d.last_error(), None);
    }

    #[test]
    fn any_live_state_can_fail() {
        let mut d = downlink();
        d.transition(DeliveryState::QueuedForFlush).unwrap();
        d.fail(&DeliveryError::FlushIncomplete { remaining: 2 });
        assert_eq!(d.state(), DeliveryState::Failed);
        assert_eq!(d.last_error(), Some("queue still holds 2 item(s) after flush"));
    }
}
