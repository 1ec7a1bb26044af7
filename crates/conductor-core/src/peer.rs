//! Discovered conductor hosts.

use std::fmt;

use libp2p::{Multiaddr, PeerId};

use crate::error::CoreError;

/// A provider found through discovery: its identity and known addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDescriptor {
    /// The host's peer identity.
    pub id: PeerId,
    /// Addresses the host was seen at, in discovery order.
    pub addresses: Vec<Multiaddr>,
}

impl PeerDescriptor {
    /// Create a descriptor.
    pub fn new(id: PeerId, addresses: Vec<Multiaddr>) -> Self {
        Self { id, addresses }
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [", self.id)?;
        for (i, addr) in self.addresses.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", addr)?;
        }
        f.write_str("]")
    }
}

/// The hosts discovered at startup, indexed from zero.
///
/// Built once before the first command is dispatched and never refreshed, so
/// an index handed to `use` keeps naming the same host for the whole process.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: Vec<PeerDescriptor>,
}

impl PeerDirectory {
    /// Freeze the discovery result.
    pub fn new(peers: Vec<PeerDescriptor>) -> Self {
        Self { peers }
    }

    /// All hosts, in index order.
    pub fn list(&self) -> &[PeerDescriptor] {
        &self.peers
    }

    /// The host at `index`.
    pub fn get(&self, index: i64) -> Result<&PeerDescriptor, CoreError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.peers.get(i))
            .ok_or(CoreError::IndexOutOfRange {
                index,
                len: self.peers.len(),
            })
    }

    /// `(index, host)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PeerDescriptor)> {
        self.peers.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
