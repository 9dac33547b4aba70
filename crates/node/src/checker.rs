//! The checker chain pattern.
//!
//! A chain is an ordered list of stages run against a shared mutable
//! context. Each stage either passes control on, stops the chain without an
//! error, or aborts it with one. Chains stay data-driven: the stage list is a
//! plain slice, so tests can run partial chains and reorder freely.

use crate::NodeError;

/// What one stage decided.
pub enum StageOutcome {
    /// Continue with the next stage.
    Next,
    /// Finish the chain early, successfully.
    Stop,
    /// Abort the chain with an error.
    Err(NodeError),
}

/// Run `stages` in order against `ctx` with the stage interpreter `run`.
pub fn run_chain<S: Copy, C>(
    stages: &[S],
    ctx: &mut C,
    run: impl Fn(S, &mut C) -> StageOutcome,
) -> Result<(), NodeError> {
    for &stage in stages {
        match run(stage, ctx) {
            StageOutcome::Next => continue,
            StageOutcome::Stop => return Ok(()),
            StageOutcome::Err(e) => return Err(e),
        }
    }
    Ok(())
}
