// Fabric counter mode arbitration
//
// The fabric bank watches either the whole device or a single port, and
// every fabric event being counted shares that choice. The arbiter admits
// a new user only if it wants the scope the bank is already bound to, or if
// nobody is using the bank.

use parking_lot::Mutex;

use crate::counters::events::Target;
use crate::error::{FmeError, Result};

/// Arbiter bookkeeping, guarded by one lock per device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterState {
    /// Active fabric sessions
    pub users: u32,
    /// Scope the bank is (or was last) programmed for; only binding while
    /// `users > 0`
    pub scope: Target,
}

/// Externally visible arbiter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricMode {
    Idle,
    Bound(Target),
}

impl ArbiterState {
    pub fn mode(&self) -> FabricMode {
        if self.users == 0 {
            FabricMode::Idle
        } else {
            FabricMode::Bound(self.scope)
        }
    }
}

pub struct FabricArbiter {
    state: Mutex<ArbiterState>,
}

impl FabricArbiter {
    /// Start idle, remembering the scope the hardware currently has
    pub fn new(scope: Target) -> Self {
        Self {
            state: Mutex::new(ArbiterState { users: 0, scope }),
        }
    }

    /// Admit a user for `target`
    ///
    /// When the bank is idle, `program` is called with the new scope while
    /// the arbiter lock is held, before any other acquire can observe the
    /// new binding.
    pub fn acquire(&self, target: Target, program: impl FnOnce(Target)) -> Result<()> {
        let mut state = self.state.lock();

        if state.users > 0 {
            if state.scope != target {
                tracing::debug!(
                    "conflicting fabric monitoring mode: bound to {}, requested {}",
                    state.scope,
                    target
                );
                return Err(FmeError::ScopeConflict {
                    requested: target,
                    bound: state.scope,
                });
            }
            state.users += 1;
            return Ok(());
        }

        program(target);
        state.scope = target;
        state.users = 1;
        tracing::debug!("fabric counters bound to {}", target);
        Ok(())
    }

    /// Drop one user; the bank goes idle when the last one leaves
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.users == 0 {
            tracing::warn!("fabric counter release without a matching acquire");
            return;
        }

        state.users -= 1;
        if state.users == 0 {
            tracing::debug!("fabric counters idle (last scope {})", state.scope);
        }
    }

    pub fn state(&self) -> ArbiterState {
        *self.state.lock()
    }
}
