//! Conductor Network — libp2p plumbing for reaching conductor hosts.
//!
//! - [`behaviour`]: Kademlia (client mode), Identify and raw streams.
//! - [`transport`]: TCP + Noise + Yamux swarm construction.
//! - [`node`]: the swarm event loop and the [`NodeHandle`] talking to it.
//! - [`discovery`]: content identifiers and provider lookup.
//! - [`client`]: the one-request-per-stream protocol client.
//! - [`identity`]: the persisted node keypair.

pub mod behaviour;
pub mod client;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod node;
pub mod protocol;
pub mod transport;

pub use client::{ProtocolClient, Response, Transport};
pub use discovery::{ContentId, PeerDiscovery, ProviderLookup};
pub use error::NetworkError;
pub use identity::load_or_generate_keypair;
pub use node::{ConductorNode, NetworkCommand, NodeConfig, NodeHandle};
pub use protocol::{ExchangeStage, ResponseMode, CONDUCTOR_PROTOCOL, DEFAULT_RESPONSE_CAPACITY};
