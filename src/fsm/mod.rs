//! Table-driven state machine engine.
//!
//! ## Contents
//! - [`State`], [`Transition`], [`StateId`]: table entries (`fn` pointer callbacks over a context `C`)
//! - [`FsmConfig`], [`Shadowed`]: machine configuration and the unreachable-rule check
//! - [`Fsm`]: the interpreter (`start`, `stop`, `process_event`, `set_state`, `run`)
//!
//! The orchestrator in `core` is one concrete instantiation of this engine.

mod machine;
mod table;

pub use machine::Fsm;
pub use table::{ActionFn, FsmConfig, GuardFn, Shadowed, State, StateFn, StateId, Transition};
