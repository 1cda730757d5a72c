//! Per-call cancellation and deadline propagation.
//!
//! Every intercepted call carries a [`CallContext`]. Interceptors wrap each
//! cache round-trip and each remote call with [`CallContext::run`] or
//! [`CallContext::scope`], so cancelling the caller's context stops both and
//! no cache write starts after the caller has gone away.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{CirrusError, CirrusResult};

/// Cancellation and deadline of one logical call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighten the deadline to `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach to an existing cancellation token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// A context cancelled with this one, which can also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// `Err` once the context is cancelled or past its deadline.
    pub fn check(&self) -> CirrusResult<()> {
        if self.token.is_cancelled() {
            return Err(CirrusError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CirrusError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Drive `fut` until it completes or the context ends, whichever is first.
    ///
    /// `fut` is not polled at all when the context has already ended.
    pub async fn run<F, T>(&self, fut: F) -> CirrusResult<T>
    where
        F: Future<Output = CirrusResult<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CirrusError::Cancelled),
            _ = deadline => Err(CirrusError::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// [`run`](Self::run) for futures that cannot fail on their own.
    pub async fn scope<F, T>(&self, fut: F) -> CirrusResult<T>
    where
        F: Future<Output = T>,
    {
        self.run(async { Ok(fut.await) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_run_completes_without_cancellation() {
        let ctx = CallContext::new();
        let value = ctx.run(async { Ok::<_, CirrusError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_context_does_not_poll_future() {
        let ctx = CallContext::new();
        ctx.cancel();

        let polled = AtomicBool::new(false);
        let result = ctx
            .scope(async {
                polled.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(result, Err(CirrusError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let result = ctx.scope(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(CirrusError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let result = ctx.scope(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(CirrusError::DeadlineExceeded)));
        assert!(ctx.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let ctx = CallContext::new()
            .with_timeout(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(60));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= Instant::now() + Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = CallContext::new();
        let child = parent.child();
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(matches!(child.check(), Err(CirrusError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelling_child_leaves_parent_running() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(parent.check().is_ok());
    }
}
