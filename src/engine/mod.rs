//! Code-variant execution engine
//!
//! Variant source is parsed with tree-sitter into an owned tree, calls to tool
//! operations are marked as suspension points, and the result is interpreted
//! inside a restricted allow-list context. The sequencer tries variants in name
//! order until one succeeds.

pub mod ast;
pub mod builtins;
pub mod context;
pub mod error;
pub mod format;
pub mod interp;
pub mod methods;
pub mod ops;
pub mod parser;
pub mod rewrite;
pub mod runner;
pub mod sequencer;
pub mod stdlib;
pub mod value;

#[cfg(test)]
mod tests;

pub use context::{ExecutionContext, JsonMap, Layer};
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use rewrite::{rewrite_source, SuspendableUnit, UNIT_NAME};
pub use runner::{run_variant, OutcomeStatus, RunEnv, VariantOutcome};
pub use sequencer::{run_variants, CodePhaseResult};
