//! The conductor client node.
//!
//! `ConductorNode` owns the libp2p `Swarm` and drives it from a background
//! task. Everything else talks to it through a [`NodeHandle`]: dials and
//! DHT queries go over an `mpsc` command channel with `oneshot` replies, and
//! request streams are opened directly through the stream behaviour's
//! `Control`.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::identity::Keypair;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{identify, kad, Multiaddr, PeerId, StreamProtocol, Swarm};
use tokio::sync::{mpsc, oneshot};

use conductor_core::PeerDescriptor;

use crate::behaviour::{ConductorBehaviour, ConductorBehaviourEvent};
use crate::client::Transport;
use crate::discovery::{ContentId, PeerDiscovery, ProviderLookup};
use crate::error::NetworkError;
use crate::transport::{self, TransportConfig};

/// Configuration for the ConductorNode.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The listen address, e.g. "/ip4/0.0.0.0/tcp/0".
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Idle connection timeout in seconds.
    pub idle_connection_timeout_secs: u64,
    /// Capacity of the command channel towards the event loop.
    pub command_channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/0".into(),
            bootstrap_peers: Vec::new(),
            idle_connection_timeout_secs: 60,
            command_channel_capacity: 64,
        }
    }
}

/// Commands that can be sent to the network event loop from external tasks.
#[derive(Debug)]
pub enum NetworkCommand {
    /// Make sure a connection to the peer exists.
    Connect {
        peer: PeerDescriptor,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    /// Look up the providers of a content identifier in the DHT.
    FindProviders {
        content_id: ContentId,
        reply: oneshot::Sender<Result<Vec<PeerDescriptor>, NetworkError>>,
    },
    /// Number of peers in the Kademlia routing table.
    RoutingTableSize { reply: oneshot::Sender<usize> },
    /// Addresses the swarm is currently listening on.
    ListenAddrs { reply: oneshot::Sender<Vec<Multiaddr>> },
    /// Stop the event loop.
    Shutdown,
}

/// A provider query in flight.
struct PendingProviders {
    content_id: ContentId,
    providers: Vec<PeerId>,
    error: Option<String>,
    reply: oneshot::Sender<Result<Vec<PeerDescriptor>, NetworkError>>,
}

/// The conductor P2P client node.
pub struct ConductorNode {
    /// The libp2p keypair for this node.
    keypair: Keypair,
    /// Our local PeerId.
    local_peer_id: PeerId,
    /// Node configuration.
    config: NodeConfig,
    /// Bootstrap peers and learned addresses.
    discovery: PeerDiscovery,
    /// The libp2p swarm (set after start).
    swarm: Option<Swarm<ConductorBehaviour>>,
    /// Command sender (cloneable, handed out via `handle()`).
    command_tx: mpsc::Sender<NetworkCommand>,
    /// Command receiver, taken by the event loop.
    command_rx: Option<mpsc::Receiver<NetworkCommand>>,
    /// Connect requests waiting for a dial outcome.
    pending_dials: HashMap<PeerId, Vec<oneshot::Sender<Result<(), NetworkError>>>>,
    /// Provider queries waiting for their last step.
    pending_providers: HashMap<kad::QueryId, PendingProviders>,
}

impl ConductorNode {
    /// Create a new ConductorNode with the given keypair and config.
    pub fn new(keypair: Keypair, config: NodeConfig) -> Result<Self, NetworkError> {
        let local_peer_id = PeerId::from(keypair.public());
        let discovery = PeerDiscovery::new(config.bootstrap_peers.clone())?;
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity.max(1));

        tracing::info!(%local_peer_id, "creating conductor node");

        Ok(Self {
            keypair,
            local_peer_id,
            config,
            discovery,
            swarm: None,
            command_tx,
            command_rx: Some(command_rx),
            pending_dials: HashMap::new(),
            pending_providers: HashMap::new(),
        })
    }

    /// Get the local PeerId.
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Get the peer discovery state.
    pub fn discovery(&self) -> &PeerDiscovery {
        &self.discovery
    }

    /// Check if the node's swarm has been started.
    pub fn is_running(&self) -> bool {
        self.swarm.is_some()
    }

    /// Start the node: build the swarm, listen on the configured address,
    /// dial the bootstrap peers and bootstrap Kademlia.
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        if self.swarm.is_some() {
            return Err(NetworkError::AlreadyRunning);
        }

        tracing::info!(
            listen_addr = %self.config.listen_addr,
            peer_id = %self.local_peer_id,
            "starting conductor node"
        );

        let transport_config = TransportConfig {
            idle_connection_timeout_secs: self.config.idle_connection_timeout_secs,
        };
        let mut swarm = transport::build_swarm(self.keypair.clone(), &transport_config)?;

        let listen_addr = Multiaddr::from_str(&self.config.listen_addr)
            .map_err(|e| NetworkError::Listen(format!("invalid listen address: {}", e)))?;
        swarm
            .listen_on(listen_addr)
            .map_err(|e| NetworkError::Listen(e.to_string()))?;

        for (peer_id, addr) in self.discovery.bootstrap_peers() {
            swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer_id, addr.clone());
            self.discovery.record_addresses(peer_id, [addr]);
        }

        for addr in self.discovery.bootstrap_addrs() {
            tracing::info!(addr = %addr, "dialing bootstrap peer");
            if let Err(e) = swarm.dial(addr.clone()) {
                tracing::warn!(addr = %addr, error = %e, "failed to dial bootstrap peer");
            }
        }

        if !self.discovery.bootstrap_peers().is_empty() {
            if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
                tracing::warn!(error = %e, "kademlia bootstrap failed");
            }
        }

        self.swarm = Some(swarm);
        Ok(())
    }

    /// A handle for talking to the node once its event loop runs.
    ///
    /// Must be called after [`start`](Self::start).
    pub fn handle(&mut self) -> Result<NodeHandle, NetworkError> {
        let swarm = self.swarm.as_mut().ok_or(NetworkError::NotStarted)?;
        let bootstrap = self
            .discovery
            .bootstrap_peers()
            .into_iter()
            .map(|(peer_id, addr)| PeerDescriptor::new(peer_id, vec![addr]))
            .collect();
        Ok(NodeHandle {
            local_peer_id: self.local_peer_id,
            commands: self.command_tx.clone(),
            control: swarm.behaviour().stream.new_control(),
            bootstrap,
        })
    }

    /// Run the event loop. This should be called in a tokio::spawn after start().
    ///
    /// Returns when a shutdown command is received or every handle is dropped.
    pub async fn run(&mut self) -> Result<(), NetworkError> {
        if self.swarm.is_none() {
            return Err(NetworkError::NotStarted);
        }

        let mut command_rx = self.command_rx.take().ok_or(NetworkError::AlreadyRunning)?;

        tracing::info!(peer_id = %self.local_peer_id, "conductor node event loop started");

        enum Action {
            SwarmEvent(SwarmEvent<ConductorBehaviourEvent>),
            Command(NetworkCommand),
            CommandChannelClosed,
        }

        loop {
            let action = {
                let swarm = match self.swarm.as_mut() {
                    Some(s) => s,
                    None => break,
                };
                tokio::select! {
                    event = swarm.select_next_some() => Action::SwarmEvent(event),
                    cmd = command_rx.recv() => match cmd {
                        Some(c) => Action::Command(c),
                        None => Action::CommandChannelClosed,
                    },
                }
            };

            match action {
                Action::SwarmEvent(event) => self.handle_swarm_event(event),
                Action::Command(NetworkCommand::Shutdown) => {
                    tracing::info!("conductor node shutting down (signal)");
                    break;
                }
                Action::Command(cmd) => self.handle_command(cmd),
                Action::CommandChannelClosed => {
                    tracing::info!("conductor node shutting down (command channel closed)");
                    break;
                }
            }
        }

        self.fail_pending("node shut down");
        Ok(())
    }

    /// Stop the node gracefully.
    pub async fn stop(&mut self) -> Result<(), NetworkError> {
        self.fail_pending("node stopped");
        self.swarm = None;
        tracing::info!(peer_id = %self.local_peer_id, "conductor node stopped");
        Ok(())
    }

    fn fail_pending(&mut self, reason: &str) {
        for (_, replies) in self.pending_dials.drain() {
            for reply in replies {
                let _ = reply.send(Err(NetworkError::Channel(reason.to_string())));
            }
        }
        for (_, pending) in self.pending_providers.drain() {
            let _ = pending
                .reply
                .send(Err(NetworkError::Channel(reason.to_string())));
        }
    }

    /// Handle a command from a [`NodeHandle`].
    fn handle_command(&mut self, cmd: NetworkCommand) {
        match cmd {
            NetworkCommand::Connect { peer, reply } => self.connect(peer, reply),
            NetworkCommand::FindProviders { content_id, reply } => {
                self.find_providers(content_id, reply)
            }
            NetworkCommand::RoutingTableSize { reply } => {
                let size = self.swarm.as_mut().map_or(0, |swarm| {
                    swarm
                        .behaviour_mut()
                        .kademlia
                        .kbuckets()
                        .map(|bucket| bucket.num_entries())
                        .sum()
                });
                let _ = reply.send(size);
            }
            NetworkCommand::ListenAddrs { reply } => {
                let addrs = self
                    .swarm
                    .as_ref()
                    .map(|swarm| swarm.listeners().cloned().collect())
                    .unwrap_or_default();
                let _ = reply.send(addrs);
            }
            NetworkCommand::Shutdown => {}
        }
    }

    fn connect(&mut self, peer: PeerDescriptor, reply: oneshot::Sender<Result<(), NetworkError>>) {
        let Some(swarm) = self.swarm.as_mut() else {
            let _ = reply.send(Err(NetworkError::NotStarted));
            return;
        };

        if swarm.is_connected(&peer.id) {
            let _ = reply.send(Ok(()));
            return;
        }

        self.discovery.record_addresses(peer.id, peer.addresses.iter().cloned());
        let opts = DialOpts::peer_id(peer.id)
            .addresses(self.discovery.addresses_of(&peer.id).to_vec())
            .extend_addresses_through_behaviour()
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();

        tracing::debug!(peer_id = %peer.id, "dialing peer");
        match swarm.dial(opts) {
            Ok(()) | Err(DialError::DialPeerConditionFalse(_)) => {
                self.pending_dials.entry(peer.id).or_default().push(reply);
            }
            Err(e) => {
                tracing::warn!(peer_id = %peer.id, error = %e, "dial failed");
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    fn find_providers(
        &mut self,
        content_id: ContentId,
        reply: oneshot::Sender<Result<Vec<PeerDescriptor>, NetworkError>>,
    ) {
        let Some(swarm) = self.swarm.as_mut() else {
            let _ = reply.send(Err(NetworkError::NotStarted));
            return;
        };

        let query_id = swarm
            .behaviour_mut()
            .kademlia
            .get_providers(content_id.record_key());
        tracing::info!(%content_id, ?query_id, "looking up providers");

        self.pending_providers.insert(
            query_id,
            PendingProviders {
                content_id,
                providers: Vec::new(),
                error: None,
                reply,
            },
        );
    }

    fn resolve_dials(&mut self, peer_id: &PeerId, result: Result<(), String>) {
        if let Some(replies) = self.pending_dials.remove(peer_id) {
            for reply in replies {
                let _ = reply.send(result.clone().map_err(NetworkError::Dial));
            }
        }
    }

    /// Handle a swarm event dispatched from the event loop.
    fn handle_swarm_event(&mut self, event: SwarmEvent<ConductorBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                tracing::info!(%peer_id, num_established, "connection established");
                if endpoint.is_dialer() {
                    self.discovery
                        .record_addresses(peer_id, [endpoint.get_remote_address().clone()]);
                }
                self.resolve_dials(&peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, num_established, "connection closed");
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(address = %address, "listening on new address");
            }
            SwarmEvent::NewExternalAddrOfPeer { peer_id, address } => {
                self.discovery.record_addresses(peer_id, [address]);
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, error = %error, "outgoing connection error");
                if let Some(peer_id) = peer_id {
                    let connected = self
                        .swarm
                        .as_ref()
                        .is_some_and(|swarm| swarm.is_connected(&peer_id));
                    if !connected {
                        self.resolve_dials(&peer_id, Err(error.to_string()));
                    }
                }
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                tracing::debug!(error = %error, "incoming connection error");
            }
            SwarmEvent::ListenerError { error, .. } => {
                tracing::error!(error = %error, "listener error");
            }
            _ => {}
        }
    }

    /// Handle a behaviour-level event from one of the sub-behaviours.
    fn handle_behaviour_event(&mut self, event: ConductorBehaviourEvent) {
        match event {
            ConductorBehaviourEvent::Kademlia(kad::Event::RoutingUpdated {
                peer,
                is_new_peer,
                addresses,
                ..
            }) => {
                tracing::debug!(%peer, is_new_peer, "kademlia routing updated");
                self.discovery
                    .record_addresses(peer, addresses.iter().cloned());
            }
            ConductorBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                id,
                result: kad::QueryResult::GetProviders(result),
                step,
                ..
            }) => self.on_providers_progress(id, result, step.last),
            ConductorBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                result: kad::QueryResult::Bootstrap(result),
                ..
            }) => match result {
                Ok(ok) => tracing::debug!(
                    peer = %ok.peer,
                    remaining = ok.num_remaining,
                    "kademlia bootstrap progressed"
                ),
                Err(e) => tracing::warn!(error = %e, "kademlia bootstrap error"),
            },
            ConductorBehaviourEvent::Kademlia(_) => {}

            ConductorBehaviourEvent::Identify(identify::Event::Received {
                peer_id, info, ..
            }) => {
                tracing::debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    "identify: received peer info"
                );
                self.discovery
                    .record_addresses(peer_id, info.listen_addrs.iter().cloned());
            }
            ConductorBehaviourEvent::Identify(_) => {}
            ConductorBehaviourEvent::Stream(()) => {}
        }
    }

    fn on_providers_progress(
        &mut self,
        id: kad::QueryId,
        result: kad::GetProvidersResult,
        last: bool,
    ) {
        let local_peer_id = self.local_peer_id;
        let Some(pending) = self.pending_providers.get_mut(&id) else {
            return;
        };

        match result {
            Ok(kad::GetProvidersOk::FoundProviders { providers, .. }) => {
                let mut found: Vec<PeerId> = providers.into_iter().collect();
                found.sort();
                for peer_id in found {
                    if peer_id != local_peer_id && !pending.providers.contains(&peer_id) {
                        tracing::debug!(%peer_id, content_id = %pending.content_id, "provider found");
                        pending.providers.push(peer_id);
                    }
                }
            }
            Ok(kad::GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => {}
            Err(e) => pending.error = Some(e.to_string()),
        }

        if !last {
            return;
        }

        let Some(pending) = self.pending_providers.remove(&id) else {
            return;
        };
        let result = match pending.error {
            Some(error) if pending.providers.is_empty() => Err(NetworkError::Kademlia(error)),
            _ => Ok(pending
                .providers
                .iter()
                .map(|peer_id| self.discovery.descriptor(*peer_id))
                .collect::<Vec<_>>()),
        };
        if let Ok(providers) = &result {
            tracing::info!(
                content_id = %pending.content_id,
                count = providers.len(),
                "provider lookup finished"
            );
        }
        let _ = pending.reply.send(result);
    }
}

/// Cloneable handle to a running [`ConductorNode`].
#[derive(Clone)]
pub struct NodeHandle {
    local_peer_id: PeerId,
    commands: mpsc::Sender<NetworkCommand>,
    control: libp2p_stream::Control,
    /// Bootstrap peers with a known peer id.
    bootstrap: Vec<PeerDescriptor>,
}

impl NodeHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// The stream control, for accepting inbound streams under a protocol.
    pub fn stream_control(&self) -> libp2p_stream::Control {
        self.control.clone()
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> NetworkCommand,
    ) -> Result<R, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|e| NetworkError::Channel(e.to_string()))?;
        rx.await.map_err(|e| NetworkError::Channel(e.to_string()))
    }

    /// Wait until the bootstrap peers are connected.
    ///
    /// Returns how many were reached. Fails when none is configured or none
    /// answers, since provider lookups cannot succeed without one.
    pub async fn connect_bootstrap(&self) -> Result<usize, NetworkError> {
        if self.bootstrap.is_empty() {
            return Err(NetworkError::Discovery(
                "no bootstrap peer with a /p2p peer id configured".into(),
            ));
        }

        let mut connected = 0;
        for peer in &self.bootstrap {
            match self.connect(peer).await {
                Ok(()) => {
                    tracing::info!(peer_id = %peer.id, "connected to bootstrap peer");
                    connected += 1;
                }
                Err(e) => tracing::warn!(peer_id = %peer.id, error = %e, "bootstrap peer unreachable"),
            }
        }

        if connected == 0 {
            return Err(NetworkError::Discovery(format!(
                "none of the {} bootstrap peer(s) is reachable",
                self.bootstrap.len()
            )));
        }
        Ok(connected)
    }

    /// Number of peers in the Kademlia routing table.
    pub async fn routing_table_size(&self) -> Result<usize, NetworkError> {
        self.request(|reply| NetworkCommand::RoutingTableSize { reply })
            .await
    }

    /// Addresses the node is listening on.
    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>, NetworkError> {
        self.request(|reply| NetworkCommand::ListenAddrs { reply })
            .await
    }

    /// Ask the event loop to stop.
    pub async fn shutdown(&self) -> Result<(), NetworkError> {
        self.commands
            .send(NetworkCommand::Shutdown)
            .await
            .map_err(|e| NetworkError::Channel(e.to_string()))
    }
}

#[async_trait]
impl Transport for NodeHandle {
    type Stream = libp2p::Stream;

    async fn connect(&self, peer: &PeerDescriptor) -> Result<(), NetworkError> {
        let peer = peer.clone();
        self.request(|reply| NetworkCommand::Connect { peer, reply })
            .await?
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: StreamProtocol,
    ) -> Result<Self::Stream, NetworkError> {
        let mut control = self.control.clone();
        Ok(control.open_stream(peer, protocol).await?)
    }
}

#[async_trait]
impl ProviderLookup for NodeHandle {
    async fn find_providers(
        &self,
        content_id: &ContentId,
    ) -> Result<Vec<PeerDescriptor>, NetworkError> {
        let content_id = content_id.clone();
        self.request(|reply| NetworkCommand::FindProviders { content_id, reply })
            .await?
    }
}
