use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Expired {
    #[error("invocation deadline exceeded")]
    Deadline,
    #[error("invocation cancelled")]
    Cancelled,
}

/// Host-supplied budget for one invocation. Every external call the handler
/// makes is raced against it.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: CancellationToken,
}

impl Deadline {
    /// No time limit and nothing to cancel it.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.cancel.is_cancelled() || self.remaining() == Some(Duration::ZERO)
    }

    /// Drives `fut` until it completes or the budget runs out, whichever is
    /// first. On expiry `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Expired> {
        let expiry = async {
            match self.at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Expired::Cancelled),
            out = fut => Ok(out),
            _ = expiry => Err(Expired::Deadline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_budget() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(deadline.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn expires_slow_calls() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let slow = tokio::time::sleep(Duration::from_secs(60));
        assert_eq!(deadline.run(slow).await, Err(Expired::Deadline));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let token = CancellationToken::new();
        let deadline = Deadline::none().with_cancellation(token.clone());
        token.cancel();
        assert_eq!(
            deadline.run(std::future::pending::<()>()).await,
            Err(Expired::Cancelled)
        );
    }

    #[test]
    fn unbounded_has_no_remaining() {
        assert_eq!(Deadline::none().remaining(), None);
        assert!(!Deadline::none().is_expired());
    }
}
