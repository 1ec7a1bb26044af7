//! The combined libp2p behaviour of a conductor client node.

use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{identify, kad, PeerId};

use crate::error::NetworkError;

/// Identify protocol version shared with IPFS/DHT peers.
pub const IDENTIFY_PROTOCOL_VERSION: &str = "/ipfs/id/1.0.0";

/// Kademlia provider lookups on large DHTs can take a while.
const KADEMLIA_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Behaviours composed into the client swarm.
///
/// - **Kademlia** (client mode, IPFS DHT protocol) to find conductor hosts.
/// - **Identify** to learn peers' listen addresses.
/// - **Stream** to open raw request streams under the conductor protocol.
#[derive(NetworkBehaviour)]
pub struct ConductorBehaviour {
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub stream: libp2p_stream::Behaviour,
}

impl ConductorBehaviour {
    /// Build the behaviour for the node identified by `keypair`.
    pub fn new(keypair: &Keypair) -> Result<Self, NetworkError> {
        let local_peer_id = PeerId::from(keypair.public());

        let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
        kad_config.set_query_timeout(KADEMLIA_QUERY_TIMEOUT);
        let store = kad::store::MemoryStore::new(local_peer_id);
        let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
        // We only query the DHT; we never serve records.
        kademlia.set_mode(Some(kad::Mode::Client));

        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL_VERSION.to_string(), keypair.public())
                .with_agent_version(format!("conductor-client/{}", env!("CARGO_PKG_VERSION"))),
        );

        Ok(Self {
            kademlia,
            identify,
            stream: libp2p_stream::Behaviour::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behaviour_creation() {
        let keypair = Keypair::generate_ed25519();
        let behaviour = ConductorBehaviour::new(&keypair);
        assert!(behaviour.is_ok());
    }

    #[test]
    fn test_stream_control_available() {
        let keypair = Keypair::generate_ed25519();
        let behaviour = ConductorBehaviour::new(&keypair).expect("behaviour");
        let _control = behaviour.stream.new_control();
    }
}
