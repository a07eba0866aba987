mod builtins;
#[allow(clippy::module_inception)]
mod executor;

pub use builtins::BuiltinRegistry;
pub use executor::{ExitSignal, Executor};
