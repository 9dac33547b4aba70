//! The state machine contract.

use crate::{Action, Event};
use std::time::Duration;

/// A synchronous, deterministic state machine.
///
/// Implementations mutate themselves but perform no I/O; the runner delivers
/// events, executes the returned actions, and feeds results back as further
/// events. `set_time` is called before each `handle` so the machine never
/// reads a clock.
pub trait StateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action>;

    fn set_time(&mut self, now: Duration);
}
