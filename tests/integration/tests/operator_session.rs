//! Integration test: operator sessions driven through the dispatcher.
//!
//! Uses conductor-cli's dispatcher with conductor-core's session and command
//! model over conductor-network's protocol client, talking to in-memory hosts.

use conductor_cli::{Dispatcher, Outcome};
use conductor_core::Command;
use conductor_integration_tests::{client_on, session_over, MemoryTransport};
use conductor_network::{ProtocolClient, ResponseMode};

fn output_text(out: &[u8]) -> String {
    String::from_utf8_lossy(out).into_owned()
}

// =========================================================================
// Listing and selecting hosts
// =========================================================================

#[tokio::test]
async fn test_providers_lists_directory_without_network() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let p1 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(
        session_over(vec![p0.clone(), p1.clone()]),
        client_on(&transport),
    );
    let mut out = Vec::new();

    dispatcher
        .dispatch_line("providers", &mut out)
        .await
        .expect("dispatch");

    assert_eq!(output_text(&out), format!("0 {}\n1 {}\n", p0, p1));
    assert_eq!(transport.connects(), 0);
    assert!(transport.exchanges().is_empty());
}

#[tokio::test]
async fn test_use_selects_host_and_sends_auth() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("welcome");
    let p1 = transport.add_host("welcome");
    let mut dispatcher =
        Dispatcher::new(session_over(vec![p0.clone(), p1]), client_on(&transport));
    let mut out = Vec::new();

    assert_eq!(dispatcher.prompt(), ">");
    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");

    assert_eq!(dispatcher.session().current(), Some(&p0));
    assert_eq!(dispatcher.prompt(), format!("{}>", p0.id));
    assert_eq!(output_text(&out), "Received response: welcome\n");

    let exchanges = transport.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].peer, p0.id);
    assert_eq!(exchanges[0].protocol.as_ref(), "/conductor/0.0.1");
    assert_eq!(exchanges[0].command(), Command::Use);
    assert!(exchanges[0].text().contains("<Password>examplePass</Password>"));
}

#[tokio::test]
async fn test_reselecting_switches_target() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("a");
    let p1 = transport.add_host("b");
    let mut dispatcher = Dispatcher::new(
        session_over(vec![p0.clone(), p1.clone()]),
        client_on(&transport),
    );
    let mut out = Vec::new();

    for line in ["use 0", "running", "use 1", "running"] {
        dispatcher.dispatch_line(line, &mut out).await.expect("dispatch");
    }

    let targets: Vec<_> = transport.exchanges().iter().map(|e| e.peer).collect();
    assert_eq!(targets, vec![p0.id, p0.id, p1.id, p1.id]);
    assert_eq!(
        output_text(&out),
        "Received response: a\nReceived response: a\nReceived response: b\nReceived response: b\n"
    );
}

#[tokio::test]
async fn test_out_of_range_use_is_recoverable() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0.clone()]), client_on(&transport));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    dispatcher.dispatch_line("use 1", &mut out).await.expect("dispatch");
    dispatcher.dispatch_line("use -3", &mut out).await.expect("dispatch");
    dispatcher.dispatch_line("list", &mut out).await.expect("dispatch");

    assert_eq!(dispatcher.session().current(), Some(&p0));
    let exchanges = transport.exchanges();
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges[1].command(), Command::ListPods);
}

// =========================================================================
// Pod commands
// =========================================================================

#[tokio::test]
async fn test_add_sends_document_and_prints_reply() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("pod added");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    out.clear();
    dispatcher
        .dispatch_line("add myapp 8080 img1,img2 img1 meta1,meta2", &mut out)
        .await
        .expect("dispatch");

    assert_eq!(output_text(&out), "Received response: pod added\n");
    let exchanges = transport.exchanges();
    assert_eq!(
        exchanges[1].command(),
        Command::AddPod {
            name: "myapp".into(),
            internal_port: 8080,
            images: vec!["img1".into(), "img2".into()],
            external_image: "img1".into(),
            metadata: vec!["meta1".into(), "meta2".into()],
        }
    );
    let doc = exchanges[1].text();
    let first = doc.find("<Image>img1</Image>").expect("img1");
    let second = doc.find("<Image>img2</Image>").expect("img2");
    assert!(first < second);
}

#[tokio::test]
async fn test_run_stop_status_round_trip() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    for line in ["use 0", "run h1 u1 24", "status u1", "stop u1"] {
        dispatcher.dispatch_line(line, &mut out).await.expect("dispatch");
    }

    let commands: Vec<_> = transport.exchanges().iter().map(|e| e.command()).collect();
    assert_eq!(
        commands,
        vec![
            Command::Use,
            Command::RunPod {
                hash: "h1".into(),
                unique_id: "u1".into(),
                ttl_hours: "24".into(),
            },
            Command::PodStatus {
                unique_id: "u1".into()
            },
            Command::StopPod {
                unique_id: "u1".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_missing_argument_prints_usage_without_network() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    out.clear();
    dispatcher.dispatch_line("stop", &mut out).await.expect("dispatch");

    assert_eq!(output_text(&out), "Example: stop <Unique ID>\n");
    assert_eq!(transport.exchanges().len(), 1);
}

#[tokio::test]
async fn test_add_with_wrong_arity_never_sends() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    for line in ["add", "add a 80 img", "add a 80 img img meta extra"] {
        out.clear();
        dispatcher.dispatch_line(line, &mut out).await.expect("dispatch");
        assert!(output_text(&out).starts_with("Example of calling the add command:"));
    }

    assert_eq!(transport.exchanges().len(), 1);
}

#[tokio::test]
async fn test_run_without_selection_asks_for_host() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("ok");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    dispatcher
        .dispatch_line("run h1 u1 24", &mut out)
        .await
        .expect("dispatch");

    assert_eq!(
        output_text(&out),
        "Select the host on which you want to run the pod.\n"
    );
    assert_eq!(transport.connects(), 0);
}

// =========================================================================
// Replies
// =========================================================================

#[tokio::test]
async fn test_long_reply_truncated_to_capacity() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host(vec![b'x'; 2000]);
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client_on(&transport));
    let mut out = Vec::new();

    let outcome = dispatcher.execute("use 0", &mut out).await.expect("execute");

    let Outcome::Response(response) = outcome else {
        panic!("expected a response, got {:?}", outcome);
    };
    assert_eq!(response.len(), 1024);
    assert!(response.as_bytes().iter().all(|b| *b == b'x'));
}

#[tokio::test]
async fn test_to_end_mode_reads_whole_reply() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host(vec![b'y'; 2000]);
    let client = ProtocolClient::new(transport.clone()).with_response_mode(ResponseMode::ToEnd, 4096);
    let mut dispatcher = Dispatcher::new(session_over(vec![p0]), client);
    let mut out = Vec::new();

    let outcome = dispatcher.execute("use 0", &mut out).await.expect("execute");

    let Outcome::Response(response) = outcome else {
        panic!("expected a response, got {:?}", outcome);
    };
    assert_eq!(response.len(), 2000);
}

#[tokio::test]
async fn test_unreachable_host_keeps_session_alive() {
    let transport = MemoryTransport::new();
    let reachable = transport.add_host("ok");
    let unreachable = conductor_core::PeerDescriptor::new(libp2p::PeerId::random(), vec![]);
    let mut dispatcher = Dispatcher::new(
        session_over(vec![unreachable.clone(), reachable.clone()]),
        client_on(&transport),
    );
    let mut out = Vec::new();

    dispatcher.dispatch_line("use 0", &mut out).await.expect("dispatch");
    assert!(output_text(&out).contains("dial error"));
    assert_eq!(dispatcher.session().current(), Some(&unreachable));

    out.clear();
    dispatcher.dispatch_line("use 1", &mut out).await.expect("dispatch");
    assert_eq!(output_text(&out), "Received response: ok\n");
}

#[tokio::test]
async fn test_scripted_session_until_end_of_input() {
    let transport = MemoryTransport::new();
    let p0 = transport.add_host("done");
    let mut dispatcher = Dispatcher::new(session_over(vec![p0.clone()]), client_on(&transport));
    let input: &[u8] = b"help\nuse 0\nlist\n";
    let mut out = Vec::new();

    dispatcher.run(input, &mut out).await.expect("run");

    let printed = output_text(&out);
    assert!(printed.contains("providers - Print out all the providers."));
    assert!(printed.ends_with(&format!("{}>\n", p0.id)));
    assert_eq!(transport.exchanges().len(), 2);
}
