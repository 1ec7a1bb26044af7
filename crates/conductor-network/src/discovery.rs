//! Provider discovery for conductor hosts.
//!
//! Hosts announce themselves as DHT providers of a content identifier chosen
//! by the operator. The lookup key is the raw bytes of that identifier, which
//! is how hosts announce it. Discovery state tracks the bootstrap peers and
//! every address learned for a peer so that providers can be handed to the
//! session with their addresses.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use libp2p::multiaddr::Protocol;
use libp2p::{kad, Multiaddr, PeerId};

use conductor_core::PeerDescriptor;

use crate::error::NetworkError;

/// Opaque key under which conductor hosts announce themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(raw: impl Into<String>) -> Result<Self, NetworkError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(NetworkError::Discovery("content identifier is empty".into()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The Kademlia key providers are stored under.
    pub fn record_key(&self) -> kad::RecordKey {
        kad::RecordKey::new(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Looks up the hosts providing a content identifier.
#[async_trait]
pub trait ProviderLookup: Send + Sync {
    /// Providers of `content_id`, in the order they were found.
    async fn find_providers(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<PeerDescriptor>, NetworkError>;
}

/// Discovery state of a conductor node.
#[derive(Debug, Default)]
pub struct PeerDiscovery {
    /// Bootstrap peer addresses to connect to on startup.
    bootstrap_addrs: Vec<Multiaddr>,
    /// Addresses learned per peer, in the order they were first seen.
    addresses: HashMap<PeerId, Vec<Multiaddr>>,
}

impl PeerDiscovery {
    /// Create a PeerDiscovery with the given bootstrap addresses.
    pub fn new(bootstrap_addrs: Vec<String>) -> Result<Self, NetworkError> {
        let mut parsed_addrs = Vec::new();
        for addr_str in &bootstrap_addrs {
            let addr = Multiaddr::from_str(addr_str).map_err(|e| {
                NetworkError::Transport(format!("invalid bootstrap addr '{}': {}", addr_str, e))
            })?;
            parsed_addrs.push(addr);
        }

        Ok(Self {
            bootstrap_addrs: parsed_addrs,
            addresses: HashMap::new(),
        })
    }

    /// Get the parsed bootstrap multiaddresses.
    pub fn bootstrap_addrs(&self) -> &[Multiaddr] {
        &self.bootstrap_addrs
    }

    /// Bootstrap peers whose address ends in `/p2p/<peer id>`, split into the
    /// peer id and the transport address. Only these can seed Kademlia.
    pub fn bootstrap_peers(&self) -> Vec<(PeerId, Multiaddr)> {
        self.bootstrap_addrs
            .iter()
            .filter_map(|addr| {
                let mut transport = addr.clone();
                match transport.pop() {
                    Some(Protocol::P2p(peer_id)) => Some((peer_id, transport)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Remember addresses seen for `peer_id`.
    pub fn record_addresses(&mut self, peer_id: PeerId, addrs: impl IntoIterator<Item = Multiaddr>) {
        let known = self.addresses.entry(peer_id).or_default();
        for addr in addrs {
            if !known.contains(&addr) {
                tracing::trace!(%peer_id, %addr, "address learned");
                known.push(addr);
            }
        }
    }

    /// Known addresses of `peer_id`.
    pub fn addresses_of(&self, peer_id: &PeerId) -> &[Multiaddr] {
        self.addresses
            .get(peer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Describe `peer_id` with every address learned for it so far.
    pub fn descriptor(&self, peer_id: PeerId) -> PeerDescriptor {
        PeerDescriptor::new(peer_id, self.addresses_of(&peer_id).to_vec())
    }
}
