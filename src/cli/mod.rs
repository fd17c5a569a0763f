//! Command-line front end: argument parsing, telemetry setup and the session
//! actions the `compendium` binary runs.

pub mod actions;
pub mod commands;
pub mod dispatch;
mod start;
pub mod telemetry;

pub use start::start;
