// Invocation Tracker - live invocation states and completion counters

use crate::domain::{DomainError, InvocationId, InvocationPhase, InvocationState, InvocationStatus, ValidatedArgs};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of in-flight invocations, used for introspection only.
/// Each state is mutated solely by the task that owns its handle.
#[derive(Debug, Default)]
pub struct InvocationTracker {
    live: Mutex<HashMap<InvocationId, Arc<Mutex<InvocationState>>>>,
    completed: Mutex<BTreeMap<InvocationStatus, u64>>,
}

/// Point-in-time view for admin/stats
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub in_flight: usize,
    pub by_phase: BTreeMap<String, usize>,
    pub completed: BTreeMap<String, u64>,
}

impl InvocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking; the returned handle untracks on drop
    pub fn track(self: &Arc<Self>, state: InvocationState) -> TrackedInvocation {
        let id = state.id.clone();
        let state = Arc::new(Mutex::new(state));
        lock(&self.live).insert(id.clone(), Arc::clone(&state));
        TrackedInvocation {
            id,
            state,
            tracker: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> Vec<InvocationState> {
        lock(&self.live).values().map(|s| lock(s).clone()).collect()
    }

    pub fn stats(&self) -> TrackerStats {
        let live = self.snapshot();
        let mut by_phase = BTreeMap::new();
        for state in &live {
            *by_phase.entry(state.phase.to_string()).or_insert(0) += 1;
        }
        let completed = lock(&self.completed)
            .iter()
            .map(|(status, count)| (status.as_str().to_string(), *count))
            .collect();
        TrackerStats {
            in_flight: live.len(),
            by_phase,
            completed,
        }
    }

    pub(crate) fn record(&self, status: InvocationStatus) {
        *lock(&self.completed).entry(status).or_insert(0) += 1;
    }
}

/// Exclusive handle to one invocation's state.
/// Transitions go through the per-invocation lock.
pub struct TrackedInvocation {
    id: InvocationId,
    state: Arc<Mutex<InvocationState>>,
    tracker: Arc<InvocationTracker>,
}

impl TrackedInvocation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> InvocationPhase {
        lock(&self.state).phase
    }

    pub fn transition(&self, next: InvocationPhase) -> Result<(), DomainError> {
        lock(&self.state).transition(next)
    }

    pub fn validated(&self, args: ValidatedArgs) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        state.transition(InvocationPhase::Validated)?;
        state.args = Some(args);
        Ok(())
    }

    pub fn running(&self, deadline: i64) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        state.transition(InvocationPhase::Running)?;
        state.deadline = Some(deadline);
        Ok(())
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        lock(&self.state).pid = pid;
    }

    /// Enter the terminal phase for `status`. Returns false when another
    /// terminal transition already happened (first one wins).
    pub fn finish(&self, status: InvocationStatus) -> bool {
        match self.transition(status.into()) {
            Ok(()) => {
                self.tracker.record(status);
                true
            }
            Err(e) => {
                warn!(invocation_id = %self.id, error = %e, "Terminal transition rejected");
                false
            }
        }
    }
}

impl Drop for TrackedInvocation {
    fn drop(&mut self) {
        lock(&self.tracker.live).remove(&self.id);
    }
}
