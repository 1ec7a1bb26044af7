//! Request/response client for conductor hosts.
//!
//! [`ProtocolClient::send`] runs one exchange to completion: connect, open a
//! stream under the conductor protocol, write the payload, read the reply and
//! close the stream. Exchanges never overlap and are never retried.

use std::borrow::Cow;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{PeerId, StreamProtocol};

use conductor_core::PeerDescriptor;

use crate::error::NetworkError;
use crate::protocol::{ExchangeStage, ResponseMode, CONDUCTOR_PROTOCOL, DEFAULT_RESPONSE_CAPACITY};

/// Connection and stream establishment towards a peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bidirectional byte stream opened per request.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Make sure a connection to `peer` exists, dialing its addresses if needed.
    async fn connect(&self, peer: &PeerDescriptor) -> Result<(), NetworkError>;

    /// Open a new stream to `peer` negotiated under `protocol`.
    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError>;
}

/// The raw bytes a host replied with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Vec<u8>,
}

impl Response {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The reply as text. Invalid UTF-8, e.g. a multi-byte character cut by
    /// a bounded read, is replaced rather than rejected.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Sends encoded commands to conductor hosts over a [`Transport`].
pub struct ProtocolClient<T> {
    transport: T,
    protocol: StreamProtocol,
    mode: ResponseMode,
    capacity: usize,
}

impl<T: Transport> ProtocolClient<T> {
    /// A client speaking `/conductor/0.0.1` with 1024-byte bounded replies.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            protocol: CONDUCTOR_PROTOCOL,
            mode: ResponseMode::Bounded,
            capacity: DEFAULT_RESPONSE_CAPACITY,
        }
    }

    /// Use a different protocol identifier.
    pub fn with_protocol(mut self, protocol: StreamProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Change how replies are read. `capacity` bounds the reply in both modes.
    pub fn with_response_mode(mut self, mode: ResponseMode, capacity: usize) -> Self {
        self.mode = mode;
        self.capacity = capacity;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn protocol(&self) -> &StreamProtocol {
        &self.protocol
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run one exchange with `peer` and return its reply.
    pub async fn send(
        &self,
        peer: &PeerDescriptor,
        payload: &[u8],
    ) -> Result<Response, NetworkError> {
        let peer_id = peer.id;
        trace_stage(&peer_id, ExchangeStage::Idle);

        trace_stage(&peer_id, ExchangeStage::Connecting);
        self.transport.connect(peer).await?;

        let mut stream = self
            .transport
            .open_stream(peer_id, self.protocol.clone())
            .await?;
        trace_stage(&peer_id, ExchangeStage::StreamOpen);

        let outcome = self.exchange(&mut stream, &peer_id, payload).await;

        if let Err(e) = stream.close().await {
            tracing::warn!(%peer_id, error = %e, "failed to close stream");
        }
        trace_stage(&peer_id, ExchangeStage::Closed);

        match &outcome {
            Ok(response) => {
                tracing::info!(%peer_id, bytes = response.len(), "exchange completed")
            }
            Err(e) => tracing::warn!(%peer_id, error = %e, "exchange failed"),
        }
        outcome
    }

    async fn exchange(
        &self,
        stream: &mut T::Stream,
        peer_id: &PeerId,
        payload: &[u8],
    ) -> Result<Response, NetworkError> {
        trace_stage(peer_id, ExchangeStage::Writing);
        stream
            .write_all(payload)
            .await
            .map_err(|e| NetworkError::Write(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| NetworkError::Write(e.to_string()))?;

        trace_stage(peer_id, ExchangeStage::AwaitingResponse);
        let bytes = match self.mode {
            ResponseMode::Bounded => read_once(stream, self.capacity).await,
            ResponseMode::ToEnd => {
                stream
                    .close()
                    .await
                    .map_err(|e| NetworkError::Write(e.to_string()))?;
                read_to_end(stream, self.capacity).await
            }
        }
        .map_err(|e| NetworkError::Read(e.to_string()))?;

        Ok(Response { bytes })
    }
}

/// A single read into a `capacity`-byte buffer. End of stream yields an
/// empty reply.
async fn read_once<S: AsyncRead + Unpin>(stream: &mut S, capacity: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; capacity];
    let n = stream.read(&mut buffer).await?;
    buffer.truncate(n);
    Ok(buffer)
}

async fn read_to_end<S: AsyncRead + Unpin>(stream: &mut S, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    (&mut *stream).take(limit as u64).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

fn trace_stage(peer_id: &PeerId, stage: ExchangeStage) {
    tracing::debug!(%peer_id, %stage, "exchange stage");
}
