//! mycelium library crate — re-exports the orchestrator's domain crates.
//!
//! The primary interface is the `mycelium` CLI binary (in the mycelium-cli crate).
//! Domain logic lives in mycelium-core (data model, scheduler, state store),
//! mycelium-git (git plumbing), and mycelium-orchestrator (engine, worker loop,
//! validators, merge/integration).

pub use mycelium_core as core;
pub use mycelium_git as git;
pub use mycelium_orchestrator as orchestrator;
