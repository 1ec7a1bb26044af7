//! libp2p transport stack construction for the conductor client.
//!
//! Builds a transport layer using TCP + Noise (encryption) + Yamux
//! (multiplexing), the stack conductor hosts accept.

use std::time::Duration;

use libp2p::identity::Keypair;

use crate::behaviour::ConductorBehaviour;
use crate::error::NetworkError;

/// Configuration for building the client transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Idle connection timeout in seconds.
    pub idle_connection_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            idle_connection_timeout_secs: 60,
        }
    }
}

/// Build a libp2p Swarm with the conductor behaviour using TCP + Noise + Yamux.
pub fn build_swarm(
    keypair: Keypair,
    config: &TransportConfig,
) -> Result<libp2p::Swarm<ConductorBehaviour>, NetworkError> {
    let idle_timeout = Duration::from_secs(config.idle_connection_timeout_secs);

    let swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            libp2p::tcp::Config::default().nodelay(true),
            libp2p::noise::Config::new,
            libp2p::yamux::Config::default,
        )
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_behaviour(|key| {
            ConductorBehaviour::new(key)
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
        })
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_swarm_config(|cfg: libp2p::swarm::Config| cfg.with_idle_connection_timeout(idle_timeout))
        .build();

    Ok(swarm)
}
