use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pids of tracked external processes that are still executing.
///
/// The lock covers only set mutation and reads. It is never held while a
/// child is spawned, written to or waited on.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    pids: Mutex<BTreeSet<u32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the pid is already registered.
    pub fn register(&self, pid: u32) -> bool {
        self.lock().insert(pid)
    }

    pub fn unregister(&self, pid: u32) -> bool {
        self.lock().remove(&pid)
    }

    /// Sorted copy of the registered pids.
    pub fn snapshot(&self) -> Vec<u32> {
        self.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn scope(&self) -> RegistrationScope<'_> {
        RegistrationScope {
            registry: self,
            pids: Vec::new(),
        }
    }

    fn unregister_all(&self, pids: &[u32]) {
        let mut guard = self.lock();
        for pid in pids {
            guard.remove(pid);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        // The set stays consistent even if a holder panicked.
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pids registered by one invocation; all of them are released when the
/// scope is dropped, whichever way the invocation ends.
pub(crate) struct RegistrationScope<'a> {
    registry: &'a ProcessRegistry,
    pids: Vec<u32>,
}

impl RegistrationScope<'_> {
    pub(crate) fn register(&mut self, pid: u32) {
        if self.registry.register(pid) {
            tracing::debug!(pid, "tracking process");
            self.pids.push(pid);
        } else {
            tracing::warn!(pid, "pid already tracked");
        }
    }

    /// Unregisters one pid ahead of the scope ending, e.g. once it is reaped.
    pub(crate) fn release(&mut self, pid: u32) {
        if let Some(index) = self.pids.iter().position(|tracked| *tracked == pid) {
            self.pids.swap_remove(index);
            self.registry.unregister(pid);
        }
    }
}

impl Drop for RegistrationScope<'_> {
    fn drop(&mut self) {
        if self.pids.is_empty() {
            return;
        }
        self.registry.unregister_all(&self.pids);
        tracing::debug!(pids = ?self.pids, "released tracked processes");
    }
}
