//! Commit lock signalling
//!
//! The commit lock marks the in-flight span of an execute-then-place
//! sequence. It is not mutual exclusion: it only tells a [`FillObserver`]
//! when the span starts and ends. Callers that need exclusion across
//! invocations go through [`FillQueue`](super::queue::FillQueue).

use log::debug;

use super::types::TradeCommitment;

/// Receives lock transitions and trade commitments while a fill runs
///
/// Callbacks are invoked synchronously from the filling task, so
/// implementations should return quickly.
pub trait FillObserver: Send + Sync {
    /// `true` when the commit lock is acquired, `false` when released
    fn on_commit_lock(&self, locked: bool);

    /// Called by the executor once a blockchain commitment is made
    fn on_trade_commitment(&self, _commitment: &TradeCommitment) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl FillObserver for NoOpObserver {
    fn on_commit_lock(&self, _locked: bool) {}
}

/// Commit lock held for the duration of one fill invocation
///
/// Released explicitly with [`CommitLock::release`] or, failing that, when
/// dropped. Either way the release is signalled exactly once.
#[must_use = "dropping the lock releases it immediately"]
pub struct CommitLock<'a> {
    observer: &'a dyn FillObserver,
    held: bool,
}

impl<'a> CommitLock<'a> {
    /// Acquire the lock and signal `true`
    pub fn acquire(observer: &'a dyn FillObserver) -> Self {
        debug!("commit lock acquired");
        observer.on_commit_lock(true);
        Self {
            observer,
            held: true,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Release the lock and signal `false`
    pub fn release(mut self) {
        self.signal_release();
    }

    fn signal_release(&mut self) {
        if self.held {
            self.held = false;
            debug!("commit lock released");
            self.observer.on_commit_lock(false);
        }
    }
}

impl Drop for CommitLock<'_> {
    fn drop(&mut self) {
        self.signal_release();
    }
}
