use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::channel::{BatchChannel, BatchKind, BatchPipe, PipeState};
use crate::error::ProtocolResult;

/// Idle pipes of one [`BatchKind`], reused across leases.
///
/// Only pipes returned as [`PipeState::Aligned`] go back on the shelf; a
/// desynchronised pipe is dropped, which for a process pipe terminates the
/// process.
pub struct PipePool {
    kind: BatchKind,
    idle: Mutex<Vec<Box<dyn BatchPipe>>>,
    max_idle: usize,
}

impl PipePool {
    pub fn new(kind: BatchKind, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            idle: Mutex::new(Vec::new()),
            max_idle,
        })
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Lease an idle pipe, or one produced by `spawn` when none is idle.
    pub fn checkout(
        self: &Arc<Self>,
        spawn: impl FnOnce() -> ProtocolResult<Box<dyn BatchPipe>>,
    ) -> ProtocolResult<BatchChannel> {
        let reused = self.idle.lock().expect("lock poisoned").pop();
        let pipe = match reused {
            Some(pipe) => pipe,
            None => spawn()?,
        };
        let pool = Arc::clone(self);
        Ok(BatchChannel::new(
            self.kind,
            pipe,
            Box::new(move |pipe, state| pool.check_in(pipe, state)),
        ))
    }

    fn check_in(&self, pipe: Box<dyn BatchPipe>, state: PipeState) {
        if state == PipeState::Desynced {
            debug!(kind = %self.kind, "dropping desynchronised batch pipe");
            return;
        }
        let mut idle = self.idle.lock().expect("lock poisoned");
        if idle.len() < self.max_idle {
            idle.push(pipe);
        } else {
            debug!(kind = %self.kind, max_idle = self.max_idle, "idle pool full; closing batch pipe");
        }
    }

    /// Number of pipes waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for PipePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipePool")
            .field("kind", &self.kind)
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::channel::testing::ScriptedPipe;
    use crate::error::ProtocolError;

    fn spawner(count: &AtomicUsize) -> impl FnOnce() -> ProtocolResult<Box<dyn BatchPipe>> + '_ {
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedPipe::new(Vec::new())) as Box<dyn BatchPipe>)
        }
    }

    #[test]
    fn released_pipes_are_reused() {
        let pool = PipePool::new(BatchKind::Content, 1);
        let spawned = AtomicUsize::new(0);

        pool.checkout(spawner(&spawned)).unwrap().release();
        assert_eq!(pool.idle_count(), 1);
        pool.checkout(spawner(&spawned)).unwrap().release();
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn desynced_pipes_are_never_reused() {
        let pool = PipePool::new(BatchKind::Check, 4);
        let spawned = AtomicUsize::new(0);

        pool.checkout(spawner(&spawned)).unwrap().cancel();
        assert_eq!(pool.idle_count(), 0);
        drop(pool.checkout(spawner(&spawned)).unwrap());
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_leases_get_distinct_pipes() {
        let pool = PipePool::new(BatchKind::Content, 1);
        let spawned = AtomicUsize::new(0);

        let a = pool.checkout(spawner(&spawned)).unwrap();
        let b = pool.checkout(spawner(&spawned)).unwrap();
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        a.release();
        b.release();
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn spawn_failure_propagates() {
        let pool = PipePool::new(BatchKind::Content, 1);
        let err = pool
            .checkout(|| Err(ProtocolError::Acquire("no git".into())))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Acquire(_)));
    }
}
