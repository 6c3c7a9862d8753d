//! In-flight request tracking
//!
//! Every operation holds a guard while it runs. Removal closes the gate and
//! blocks on a condition variable until the last guard is dropped.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct GateState {
    active: usize,
    closed: bool,
}

/// Admission gate for LUN operations
#[derive(Default)]
pub(crate) struct Quiesce {
    state: Mutex<GateState>,
    idle: Condvar,
}

impl Quiesce {
    /// Register an operation; `None` once the gate is closed
    pub(crate) fn enter(self: &Arc<Self>) -> Option<InFlightGuard> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.active += 1;
        Some(InFlightGuard {
            gate: Arc::clone(self),
        })
    }

    /// Refuse new operations and wait for the running ones to finish
    pub(crate) fn close_and_wait(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        while state.active > 0 {
            self.idle.wait(&mut state);
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.state.lock().active
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Held for the lifetime of one operation
pub(crate) struct InFlightGuard {
    gate: Arc<Quiesce>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.active -= 1;
        if state.active == 0 {
            self.gate.idle.notify_all();
        }
    }
}
