//! In-memory hosts for exercising the dispatcher without a network.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::io::Cursor;
use futures::{AsyncRead, AsyncWrite};
use libp2p::{PeerId, StreamProtocol};

use conductor_core::document;
use conductor_core::{Command, PeerDescriptor, PeerDirectory, SessionState};
use conductor_network::{NetworkError, ProtocolClient, Transport};

/// One request as a host received it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub peer: PeerId,
    pub protocol: StreamProtocol,
    pub payload: Vec<u8>,
}

impl Exchange {
    /// Decode the payload the way a conductor host would.
    pub fn command(&self) -> Command {
        document::decode(&self.payload).expect("payload should be a valid command document")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Default)]
struct Hosts {
    replies: HashMap<PeerId, Vec<u8>>,
    exchanges: Vec<Exchange>,
    connects: usize,
}

/// A set of fake hosts, each answering every request with a fixed reply.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hosts: Arc<Mutex<Hosts>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host replying `reply` to every request.
    pub fn add_host(&self, reply: impl Into<Vec<u8>>) -> PeerDescriptor {
        let id = PeerId::random();
        let addr = format!("/memory/{}", self.lock().replies.len() + 1)
            .parse()
            .expect("memory multiaddr");
        self.lock().replies.insert(id, reply.into());
        PeerDescriptor::new(id, vec![addr])
    }

    /// Every completed request, in order.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().exchanges.clone()
    }

    /// Number of connection attempts, including ones that found no host.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Hosts> {
        self.hosts.lock().expect("hosts lock")
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Stream = MemoryStream;

    async fn connect(&self, peer: &PeerDescriptor) -> Result<(), NetworkError> {
        let mut hosts = self.lock();
        hosts.connects += 1;
        if hosts.replies.contains_key(&peer.id) {
            Ok(())
        } else {
            Err(NetworkError::Dial(format!("no route to {}", peer.id)))
        }
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError> {
        let reply = self
            .lock()
            .replies
            .get(&peer)
            .cloned()
            .ok_or_else(|| NetworkError::OpenStream(format!("{} is not connected", peer)))?;
        Ok(MemoryStream {
            peer,
            protocol,
            written: Vec::new(),
            reply: Cursor::new(reply),
            hosts: Arc::clone(&self.hosts),
        })
    }
}

/// The client side of a request stream to a [`MemoryTransport`] host.
pub struct MemoryStream {
    peer: PeerId,
    protocol: StreamProtocol,
    written: Vec<u8>,
    reply: Cursor<Vec<u8>>,
    hosts: Arc<Mutex<Hosts>>,
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.reply).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if !self.written.is_empty() {
            let exchange = Exchange {
                peer: self.peer,
                protocol: self.protocol.clone(),
                payload: std::mem::take(&mut self.written),
            };
            self.hosts.lock().expect("hosts lock").exchanges.push(exchange);
        }
        Poll::Ready(Ok(()))
    }
}

/// A session over `peers` with a default bounded client.
pub fn session_over(peers: Vec<PeerDescriptor>) -> SessionState {
    SessionState::new(PeerDirectory::new(peers))
}

/// A client on `transport` with the default protocol and response mode.
pub fn client_on(transport: &MemoryTransport) -> ProtocolClient<MemoryTransport> {
    ProtocolClient::new(transport.clone())
}
