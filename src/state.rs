//! Lock-free state holder shared by connections and nodes.
//!
//! A [`StateManager`] stores the current state of its owner as a single byte so it
//! can be read from any thread without tearing. It does not enforce a transition
//! table; owners check legality themselves and either overwrite the state with
//! [`StateManager::set_state`] or apply an atomic transition with
//! [`StateManager::compare_and_set`].
use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU8, Ordering},
};

/// A closed set of states that can be stored in a [`StateManager`].
pub trait ManagedState: Copy + Eq + fmt::Debug {
    fn as_byte(self) -> u8;

    /// Inverse of [`ManagedState::as_byte`]. Only called with bytes the manager
    /// itself stored.
    fn from_byte(byte: u8) -> Option<Self>;

    fn name(self) -> &'static str;
}

#[derive(Debug)]
pub struct StateManager<S: ManagedState> {
    state: AtomicU8,
    _marker: PhantomData<S>,
}

impl<S: ManagedState> StateManager<S> {
    pub fn from_enum(initial: S) -> Self {
        Self {
            state: AtomicU8::new(initial.as_byte()),
            _marker: PhantomData,
        }
    }

    pub fn get_state(&self) -> S {
        let byte = self.state.load(Ordering::Acquire);
        // Only bytes produced by `as_byte` are ever stored.
        S::from_byte(byte).unwrap_or_else(|| unreachable!("invalid state byte {byte}"))
    }

    pub fn set_state(&self, state: S) {
        self.state.store(state.as_byte(), Ordering::Release);
    }

    pub fn is_current_state(&self, state: S) -> bool {
        self.state.load(Ordering::Acquire) == state.as_byte()
    }

    /// Moves to `to` only if the current state is `from`. Returns whether the
    /// transition happened.
    pub fn compare_and_set(&self, from: S, to: S) -> bool {
        self.state
            .compare_exchange(
                from.as_byte(),
                to.as_byte(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl<S: ManagedState> fmt::Display for StateManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get_state().name())
    }
}
