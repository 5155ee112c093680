use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::debug;

/// Identifies one registration of a name. A task holding an older token can
/// no longer release (or observe) a newer registration under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobToken(u64);

struct LiveJob {
    token: JobToken,
    handle: AbortHandle,
}

/// Process-local map of armed timers and cron registrations, keyed by
/// deterministic job name. Empty on every start; recovery repopulates it.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, LiveJob>,
    next_token: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already spawned task. Returns `false` (and leaves the
    /// existing entry alone) when the name is taken.
    pub fn register(&self, name: &str, handle: AbortHandle) -> bool {
        self.arm(name, |_| handle)
    }

    /// Existence check and registration under one shard lock.
    ///
    /// `spawn` runs only when `name` is free and receives the token the new
    /// entry is stored under. It must not call back into the registry.
    pub fn arm<F>(&self, name: &str, spawn: F) -> bool
    where
        F: FnOnce(JobToken) -> AbortHandle,
    {
        match self.jobs.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let token = JobToken(self.next_token.fetch_add(1, Ordering::Relaxed));
                let handle = spawn(token);
                slot.insert(LiveJob { token, handle });
                debug!(job = %name, "job armed");
                true
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Whether `name` is still registered under `token`.
    pub fn is_current(&self, name: &str, token: JobToken) -> bool {
        self.jobs.get(name).is_some_and(|job| job.token == token)
    }

    /// Drop the entry without aborting its task. Used by a task to deregister
    /// itself; an entry armed under a different token is left alone.
    pub fn release(&self, name: &str, token: JobToken) -> bool {
        self.jobs.remove_if(name, |_, job| job.token == token).is_some()
    }

    /// Like [`release`](Self::release), but also aborts the task.
    pub fn retire(&self, name: &str, token: JobToken) -> bool {
        match self.jobs.remove_if(name, |_, job| job.token == token) {
            Some((_, job)) => {
                job.handle.abort();
                debug!(job = %name, "job retired");
                true
            }
            None => false,
        }
    }

    /// Abort and remove. No-op when absent.
    pub fn cancel(&self, name: &str) -> bool {
        match self.jobs.remove(name) {
            Some((_, job)) => {
                job.handle.abort();
                debug!(job = %name, "job cancelled");
                true
            }
            None => false,
        }
    }

    /// Abort every live job. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let names = self.names();
        names.iter().filter(|name| self.cancel(name)).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Sorted snapshot of the registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
