//! Cancellable execution context carried by every repository call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RepositoryError, RepositoryResult};

/// Cancellation token plus an optional deadline.
///
/// Cloning shares the token; [`Context::child`] derives a context that is
/// cancelled with its parent but can also be cancelled on its own.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Wrap an existing token, e.g. one owned by a request handler.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Canceled` if the context is done.
    pub fn check(&self) -> RepositoryResult<()> {
        if self.token.is_cancelled() {
            return Err(RepositoryError::Canceled("context canceled"));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RepositoryError::Canceled("deadline exceeded"));
        }
        Ok(())
    }

    /// Await `fut` unless the context is cancelled or times out first.
    ///
    /// `fut` is dropped on cancellation, so it must not have started any
    /// durable write.
    pub async fn run<F>(&self, fut: F) -> RepositoryResult<F::Output>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RepositoryError::Canceled("context canceled")),
            _ = deadline_elapsed(self.deadline) => Err(RepositoryError::Canceled("deadline exceeded")),
            out = fut => Ok(out),
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
