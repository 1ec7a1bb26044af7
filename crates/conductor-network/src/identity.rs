//! Persistent node identity.
//!
//! The keypair is stored in the libp2p protobuf encoding so that keys written
//! by other libp2p implementations can be reused.

use std::path::Path;

use libp2p::identity::Keypair;

use crate::error::NetworkError;

/// Load the keypair at `path`, or generate an ed25519 keypair and save it there.
pub fn load_or_generate_keypair(path: &Path) -> Result<Keypair, NetworkError> {
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let keypair = Keypair::from_protobuf_encoding(&bytes).map_err(|e| {
            NetworkError::Identity(format!("invalid keypair in {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), peer_id = %keypair.public().to_peer_id(), "loaded node keypair");
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    save_keypair(&keypair, path)?;
    tracing::info!(path = %path.display(), peer_id = %keypair.public().to_peer_id(), "generated node keypair");
    Ok(keypair)
}

/// Write `keypair` to `path`, creating parent directories.
pub fn save_keypair(keypair: &Keypair, path: &Path) -> Result<(), NetworkError> {
    let bytes = keypair
        .to_protobuf_encoding()
        .map_err(|e| NetworkError::Identity(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
