//! Request-scoped cancellation and deadlines.
//!
//! Every potential suspension point (adapter calls, flatten child branches)
//! calls `RequestContext::checkpoint` first; a failed checkpoint aborts the
//! whole request and no partial result is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::ExecError;

/// Shared cancellation flag. Child tokens observe their parent's state but
/// cancelling a child never cancels the parent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    pub fn child(&self) -> CancelToken {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    id: Uuid,
    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel: CancelToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Same request, same deadline, but a cancellation token that can be
    /// tripped without affecting the caller's token.
    pub fn branch(&self) -> RequestContext {
        RequestContext {
            id: self.id,
            cancel: self.cancel.child(),
            deadline: self.deadline,
        }
    }

    pub fn checkpoint(&self) -> Result<(), ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ExecError::Timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_tokens_follow_their_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn checkpoint_reports_cancel_before_timeout() {
        let token = CancelToken::new();
        let ctx = RequestContext::new()
            .with_cancel(token.clone())
            .with_timeout(Duration::ZERO);
        assert_eq!(ctx.checkpoint(), Err(ExecError::Timeout));
        token.cancel();
        assert_eq!(ctx.checkpoint(), Err(ExecError::Cancelled));
    }
}
