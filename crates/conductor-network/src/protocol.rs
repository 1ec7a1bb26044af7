//! The conductor stream protocol.
//!
//! One request per stream: the client writes a single XML document and reads
//! the host's reply. Replies carry no length prefix, so how much of a reply is
//! read is governed by [`ResponseMode`].

use std::fmt;

use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

/// The protocol identifier conductor hosts register their handler under.
pub const CONDUCTOR_PROTOCOL: StreamProtocol = StreamProtocol::new("/conductor/0.0.1");

/// Reply buffer size used by hosts that predate read-to-end replies.
pub const DEFAULT_RESPONSE_CAPACITY: usize = 1024;

/// How the client collects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseMode {
    /// Exactly one read into a buffer of the configured capacity. Whatever that
    /// read returns is the reply; anything the host sent beyond it is dropped.
    #[default]
    Bounded,
    /// Close the write half, then read until the host closes the stream,
    /// keeping at most the configured capacity.
    ToEnd,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded => write!(f, "bounded"),
            Self::ToEnd => write!(f, "to-end"),
        }
    }
}

/// Stages of a single request exchange.
///
/// `Idle → Connecting → StreamOpen → Writing → AwaitingResponse → Closed`.
/// A failure in any stage ends the exchange; once `StreamOpen` has been
/// reached the stream is still closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    Idle,
    Connecting,
    StreamOpen,
    Writing,
    AwaitingResponse,
    Closed,
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::StreamOpen => "stream-open",
            Self::Writing => "writing",
            Self::AwaitingResponse => "awaiting-response",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
