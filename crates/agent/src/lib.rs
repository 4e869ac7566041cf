//! The two-phase tool-calling loop.
//!
//! 1. **Select**: send the history and the registry's tool schemas
//! 2. **Dispatch**: if the reply names a tool, check its arguments and run it
//! 3. **Answer**: append the tool result and ask again with no tools offered
//!
//! A reply that requests no tool ends the run after step 1.

pub mod dispatcher;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{DispatchOutcome, Dispatcher, ToolInvocation};
pub use orchestrator::{Orchestrator, RunOutcome, RunState};
