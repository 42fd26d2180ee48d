//! Cosmos executor library crate
//!
//! Exposes the engine and orchestration modules so benchmarks and embedding
//! hosts can run variants without going through CLI startup.

pub mod config;
pub mod engine;
pub mod files;
pub mod orchestrator;
pub mod session;
pub mod tools;
pub mod util;
