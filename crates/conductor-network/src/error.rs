//! Network error types for the conductor P2P layer.

use libp2p::{kad, swarm::DialError, TransportError};

/// Errors that can occur in the conductor network layer.
///
/// Errors raised during a request exchange are returned to the caller per
/// request; none of them terminate the node.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Transport-level error (TCP, Noise, Yamux).
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to connect to a peer.
    #[error("dial error: {0}")]
    Dial(String),

    /// The peer refused or failed to open a stream under our protocol.
    #[error("stream open error: {0}")]
    OpenStream(String),

    /// Writing the request payload failed.
    #[error("write error: {0}")]
    Write(String),

    /// Reading the response failed.
    #[error("read error: {0}")]
    Read(String),

    /// Kademlia DHT error.
    #[error("kademlia error: {0}")]
    Kademlia(String),

    /// Provider lookup finished without a usable result.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Error listening on an address.
    #[error("listen error: {0}")]
    Listen(String),

    /// The node keypair could not be loaded or stored.
    #[error("identity error: {0}")]
    Identity(String),

    /// The node has not been started yet.
    #[error("node not started")]
    NotStarted,

    /// The node is already running.
    #[error("node already running")]
    AlreadyRunning,

    /// Channel send/receive failure.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T: std::fmt::Debug> From<TransportError<T>> for NetworkError {
    fn from(err: TransportError<T>) -> Self {
        NetworkError::Transport(format!("{:?}", err))
    }
}

impl From<libp2p::multiaddr::Error> for NetworkError {
    fn from(err: libp2p::multiaddr::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}

impl From<DialError> for NetworkError {
    fn from(err: DialError) -> Self {
        NetworkError::Dial(err.to_string())
    }
}

impl From<kad::NoKnownPeers> for NetworkError {
    fn from(err: kad::NoKnownPeers) -> Self {
        NetworkError::Kademlia(err.to_string())
    }
}

impl From<libp2p_stream::OpenStreamError> for NetworkError {
    fn from(err: libp2p_stream::OpenStreamError) -> Self {
        NetworkError::OpenStream(err.to_string())
    }
}
