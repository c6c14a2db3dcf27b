//! Cancellable context passed down the call chain.
//!
//! Every function that issues a network request takes a [`Context`], checks it before starting
//! and races the request against cancellation and the deadline.

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Clone, Debug, Default)]
pub struct Context {
    token: tokio_util::sync::CancellationToken,
    deadline: Option<tokio::time::Instant>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context which expires after `timeout` (or earlier, if the parent does).
    pub fn with_timeout(&self, timeout: std::time::Duration) -> Self {
        let deadline = tokio::time::Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(match self.deadline {
                Some(d) if d < deadline => d,
                _ => deadline,
            }),
        }
    }

    /// Derive a child context that is cancelled along with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    /// Returns the reason this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(d) if d <= tokio::time::Instant::now() => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), crate::error::Error> {
        match self.err() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Drive `fut` to completion unless this context is cancelled or its deadline passes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, crate::error::Error>
    where
        F: std::future::Future<Output = Result<T, crate::error::Error>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ContextError::Cancelled.into()),
            _ = deadline => Err(ContextError::DeadlineExceeded.into()),
            r = fut => r,
        }
    }
}
