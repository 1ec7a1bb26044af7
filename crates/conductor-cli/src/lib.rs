//! Conductor CLI — interactive client for conductor hosts.
//!
//! - [`config`]: `conductor.toml` loading and defaults.
//! - [`dispatcher`]: the read/dispatch loop over operator input.
//! - [`logging`]: tracing subscriber setup.

pub mod config;
pub mod dispatcher;
pub mod logging;

pub use config::ConductorConfig;
pub use dispatcher::{DispatchError, Dispatcher, Outcome};
