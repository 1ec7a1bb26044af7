//! Integration test: a real libp2p exchange between two local nodes.
//!
//! One node plays the conductor host by accepting streams under the
//! conductor protocol; the other drives it through the dispatcher.

use std::time::Duration;

use futures::{AsyncReadExt, AsyncWriteExt, StreamExt};
use libp2p::identity::Keypair;
use libp2p::Multiaddr;

use conductor_cli::Dispatcher;
use conductor_core::{document, Command, PeerDescriptor, PeerDirectory, SessionState};
use conductor_network::{
    ConductorNode, NodeConfig, NodeHandle, ProtocolClient, CONDUCTOR_PROTOCOL,
};

async fn spawn_node() -> NodeHandle {
    let config = NodeConfig {
        listen_addr: "/ip4/127.0.0.1/tcp/0".into(),
        ..NodeConfig::default()
    };
    let mut node = ConductorNode::new(Keypair::generate_ed25519(), config).expect("node");
    node.start().await.expect("start");
    let handle = node.handle().expect("handle");
    tokio::spawn(async move { node.run().await });
    handle
}

async fn wait_for_listen_addr(handle: &NodeHandle) -> Multiaddr {
    for _ in 0..50 {
        if let Some(addr) = handle.listen_addrs().await.expect("listen addrs").into_iter().next() {
            return addr;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("node never reported a listen address");
}

/// Answer every request with the closing tag of the decoded document.
fn serve_host(handle: &NodeHandle) -> tokio::task::JoinHandle<Vec<Command>> {
    let mut incoming = handle
        .stream_control()
        .accept(CONDUCTOR_PROTOCOL)
        .expect("protocol not yet registered");

    tokio::spawn(async move {
        let mut received = Vec::new();
        while let Some((_peer, mut stream)) = incoming.next().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 256];
            let command = loop {
                let n = stream.read(&mut buf).await.expect("read request");
                if n == 0 {
                    break None;
                }
                request.extend_from_slice(&buf[..n]);
                if let Ok(command) = document::decode(&request) {
                    break Some(command);
                }
            };
            let Some(command) = command else { continue };

            let reply = format!("handled {}", command.kind());
            stream.write_all(reply.as_bytes()).await.expect("write reply");
            stream.close().await.expect("close");
            received.push(command);
            if received.len() == 2 {
                break;
            }
        }
        received
    })
}

#[tokio::test]
async fn test_dispatch_over_loopback() {
    let host = spawn_node().await;
    let served = serve_host(&host);
    let host_addr = wait_for_listen_addr(&host).await;

    let client_node = spawn_node().await;
    let host_peer = PeerDescriptor::new(host.local_peer_id(), vec![host_addr]);
    let session = SessionState::new(PeerDirectory::new(vec![host_peer]));
    let mut dispatcher = Dispatcher::new(session, ProtocolClient::new(client_node.clone()));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    dispatcher.dispatch_line("status u1", &mut out).await.expect("dispatch");

    let received = tokio::time::timeout(Duration::from_secs(10), served)
        .await
        .expect("host finished in time")
        .expect("host task");
    assert_eq!(
        received,
        vec![
            Command::Use,
            Command::PodStatus {
                unique_id: "u1".into()
            }
        ]
    );
    assert_eq!(
        String::from_utf8_lossy(&out),
        "Received response: handled use\nReceived response: handled status\n"
    );

    client_node.shutdown().await.expect("shutdown client");
    host.shutdown().await.expect("shutdown host");
}

#[tokio::test]
async fn test_connect_to_missing_host_fails() {
    let client_node = spawn_node().await;
    let ghost = PeerDescriptor::new(
        libp2p::PeerId::random(),
        vec!["/ip4/127.0.0.1/tcp/1".parse().expect("addr")],
    );
    let session = SessionState::new(PeerDirectory::new(vec![ghost]));
    let mut dispatcher = Dispatcher::new(session, ProtocolClient::new(client_node.clone()));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");

    assert!(String::from_utf8_lossy(&out).starts_with("Request failed: dial error"));
    assert!(dispatcher.session().current().is_some());
    client_node.shutdown().await.expect("shutdown");
}
