//! Conductor Core — command model, wire documents and session state for
//! driving conductor hosts.
//!
//! - [`peer`]: discovered hosts and the immutable directory indexing them.
//! - [`session`]: the selected host.
//! - [`command`]: operator commands, their arguments and validation.
//! - [`document`]: the XML documents commands are sent as.

pub mod command;
pub mod document;
pub mod error;
pub mod peer;
pub mod session;

pub use command::{parse_use, Command, CommandKind};
pub use error::CoreError;
pub use peer::{PeerDescriptor, PeerDirectory};
pub use session::SessionState;
