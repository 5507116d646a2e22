use std::time::Duration;

use tokio::time::Instant;

/// Gateway tokens are valid for a day.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct GatewaySession {
    token: String,

    acquired_at: Instant,
}

impl GatewaySession {
    pub fn new(token: String) -> Self {
        Self {
            token,
            acquired_at: Instant::now(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= SESSION_LIFETIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_a_day() {
        let session = GatewaySession::new("jwt".into());
        assert!(!session.is_expired());

        tokio::time::advance(SESSION_LIFETIME - Duration::from_secs(1)).await;
        assert!(!session.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(session.is_expired());
    }
}
