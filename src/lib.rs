// Machine
mod runtime;
pub use runtime::{Memory, RunEnvironment};
mod instruction;

// Control
mod exec;
pub use exec::Interrupt;

// Debugger
#[macro_use]
mod output;
mod debugger;
pub use debugger::DebuggerOptions;

mod term;
