//! Per-account async locks and the scheduler single-flight guard.
//!
//! All mutating flows (webhook application, renewal charging, lifecycle
//! commands) serialize on a per-account lock so that concurrent work on the
//! same account observes each other's writes. Locks are keyed by account id;
//! work on different accounts never contends.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::AccountId;

/// Map of per-account mutexes, created on first use.
///
/// Guards are owned so they can be held across `.await` points for the whole
/// mutation. Entries are never removed; the map grows with the number of
/// distinct accounts touched by one process, which is bounded in practice.
#[derive(Default)]
pub struct AccountLockMap {
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AccountLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one account, waiting if another task holds it.
    pub async fn acquire(&self, id: AccountId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Single-flight guard for the renewal scheduler.
///
/// A tick that starts while the previous pass is still running must skip
/// rather than queue, so slow passes never pile up behind each other.
pub struct TickGuard {
    busy: Arc<Mutex<()>>,
}

impl TickGuard {
    pub fn new() -> Self {
        Self {
            busy: Arc::new(Mutex::new(())),
        }
    }

    /// Try to claim the guard without waiting. Returns `None` while another
    /// pass holds it.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        self.busy.clone().try_lock_owned().ok()
    }
}

impl Default for TickGuard {
    fn default() -> Self {
        Self::new()
    }
}
