//! The `mycelium` binary's library half: everything `main.rs` dispatches
//! into, kept separate so integration tests can drive commands without
//! spawning a subprocess.

pub mod adapters;
pub mod logs_cmd;
pub mod plan_cmd;
pub mod run_cmd;
pub mod runtime;
pub mod task_dirs;
pub mod telemetry;
