use tether::net::protocol::{ClientPacketType, ServerPacketType, encode_session};
use tether::{
    Client, ClientConfig, ConnectionState, DenyReason, DisconnectReason, Failure,
    PacketLossSimulation, Peer, Server, ServerConfig, ServerEvent, SimNetwork, SimSocket,
};

const DT: f32 = 0.05;

fn open_server(network: &SimNetwork, config: ServerConfig) -> Server<SimSocket> {
    Server::with_transport(network.bind_ephemeral().unwrap(), config)
}

fn open_client(network: &SimNetwork, server: &Server<SimSocket>, password: &str) -> Client<SimSocket> {
    Client::with_transport(
        network.bind_ephemeral().unwrap(),
        server.local_addr().unwrap(),
        ClientConfig::with_password(password),
    )
}

fn connect(server: &mut Server<SimSocket>, client: &mut Client<SimSocket>) {
    for _ in 0..200 {
        client.update(DT).unwrap();
        server.update(DT).unwrap();
        if client.is_connected() {
            return;
        }
    }
    panic!("client never connected");
}

fn run_until_failure(server: &mut Server<SimSocket>, client: &mut Client<SimSocket>) -> Failure {
    for _ in 0..200 {
        if let Err(err) = client.update(DT) {
            return err.failure().unwrap();
        }
        server.update(DT).unwrap();
    }
    panic!("client never failed");
}

#[test]
fn test_handshake_without_password() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");

    assert!(client.is_connection_pending());
    connect(&mut server, &mut client);

    let addr = client.local_addr().unwrap();
    assert_eq!(server.connected_count(), 1);
    assert_eq!(server.clients().collect::<Vec<_>>(), vec![addr]);

    let session = server.client(addr).unwrap();
    assert!(session.is_connected());
    assert_eq!(session.identifier(), client.identifier());
    assert!(client.identifier().is_some());
}

#[test]
fn test_handshake_with_password() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::new("hunter2", 8));
    let mut client = open_client(&network, &server, "hunter2");

    connect(&mut server, &mut client);

    let addr = client.local_addr().unwrap();
    assert_eq!(server.client(addr).unwrap().identifier(), client.identifier());

    let events: Vec<_> = server.drain_events().collect();
    assert_eq!(
        events,
        vec![
            ServerEvent::ClientConnecting { addr },
            ServerEvent::ClientConnected {
                addr,
                identifier: client.identifier().unwrap(),
            },
        ]
    );
}

#[test]
fn test_client_password_ignored_by_open_server() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "unneeded");

    connect(&mut server, &mut client);
    assert_eq!(server.connected_count(), 1);
}

#[test]
fn test_password_rejection() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::new("right", 8));
    let mut client = open_client(&network, &server, "wrong");
    let addr = client.local_addr().unwrap();

    let failure = run_until_failure(&mut server, &mut client);

    assert_eq!(failure, Failure::IncorrectPassword);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.failure(), Some(Failure::IncorrectPassword));
    assert_eq!(server.connected_count(), 0);
    assert!(server.client(addr).is_none());
    assert!(server.drain_events().any(|e| e
        == ServerEvent::ConnectionDenied {
            addr,
            reason: DenyReason::IncorrectPassword,
        }));
}

#[test]
fn test_capacity_enforced_and_recovered() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::new("", 2));

    let mut first = open_client(&network, &server, "");
    let mut second = open_client(&network, &server, "");
    connect(&mut server, &mut first);
    connect(&mut server, &mut second);
    assert_eq!(server.connected_count(), 2);

    let mut third = open_client(&network, &server, "");
    let failure = run_until_failure(&mut server, &mut third);
    assert_eq!(failure, Failure::ServerFull);
    assert!(third.is_disconnected());
    assert_eq!(server.connected_count(), 2);
    assert_eq!(server.session_count(), 2);

    first.close().unwrap();
    server.update(DT).unwrap();
    assert_eq!(server.connected_count(), 1);

    let mut fourth = open_client(&network, &server, "");
    connect(&mut server, &mut fourth);
    assert_eq!(server.connected_count(), 2);
    assert!(second.is_connected());
}

#[test]
fn test_capacity_rechecked_when_pending_session_responds() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::new("", 1));
    let mut first = open_client(&network, &server, "");
    let mut second = open_client(&network, &server, "");

    first.update(DT).unwrap();
    second.update(DT).unwrap();
    server.update(DT).unwrap();
    assert_eq!(server.session_count(), 2);
    assert_eq!(server.connected_count(), 0);

    first.update(DT).unwrap();
    second.update(DT).unwrap();
    assert_eq!(first.state(), ConnectionState::Challenged);
    assert_eq!(second.state(), ConnectionState::Challenged);
    server.update(DT).unwrap();

    assert_eq!(server.connected_count(), 1);
    assert_eq!(server.session_count(), 1);
    let second_addr = second.local_addr().unwrap();
    assert!(server.client(second_addr).is_none());
    assert!(server.drain_events().any(|e| e
        == ServerEvent::ConnectionDenied {
            addr: second_addr,
            reason: DenyReason::ServerFull,
        }));

    let mut replies = network.intercept(second_addr);
    assert_eq!(replies.len(), 1);
    let (rejection, from) = replies.remove(0);
    assert_eq!(rejection.len(), 21);
    assert_eq!(rejection[4], ServerPacketType::ServerFull as u8);

    network.inject(&rejection, from, second_addr);
    let err = second.update(DT).unwrap_err();
    assert_eq!(err.failure(), Some(Failure::ServerFull));
    assert!(second.is_disconnected());

    first.update(DT).unwrap();
    assert!(first.is_connected());
    assert_eq!(server.session_count(), 1);
}

#[test]
fn test_forged_datagrams_rejected() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);

    let server_addr = server.local_addr().unwrap();
    let client_addr = client.local_addr().unwrap();
    let mut forged = client.identifier().unwrap();
    forged[7] = forged[7].wrapping_add(1);

    for kind in [ClientPacketType::Message, ClientPacketType::Keepalive, ClientPacketType::Disconnect] {
        network.inject(&encode_session(kind as u8, &forged, b"x"), client_addr, server_addr);
    }
    for kind in [ServerPacketType::Message, ServerPacketType::Disconnect] {
        network.inject(&encode_session(kind as u8, &forged, b"x"), server_addr, client_addr);
    }

    server.update(DT).unwrap();
    client.update(DT).unwrap();

    let session = server.client(client_addr).unwrap();
    assert!(session.is_connected());
    assert!(!session.has_datagrams());
    assert!(client.is_connected());
    assert!(!client.has_datagrams());
    assert_eq!(server.stats().datagrams_discarded, 3);
    assert_eq!(client.stats().datagrams_discarded, 2);
}

#[test]
fn test_client_times_out_without_input() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);
    network.intercept(client.local_addr().unwrap());

    let err = client.update(61.0).unwrap_err();
    assert_eq!(err.failure(), Some(Failure::TimedOut));
    assert!(client.is_disconnected());

    // Reported once.
    client.update(DT).unwrap();
    assert_eq!(client.failure(), Some(Failure::TimedOut));
}

#[test]
fn test_server_evicts_silent_client() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);
    let addr = client.local_addr().unwrap();
    server.drain_events().for_each(drop);

    network.sever(addr);
    for _ in 0..130 {
        let _ = client.update(0.5);
        server.update(0.5).unwrap();
    }

    assert_eq!(server.connected_count(), 0);
    assert!(server.client(addr).is_none());
    assert!(server.drain_events().any(|e| e
        == ServerEvent::ClientDisconnected {
            addr,
            reason: DisconnectReason::TimedOut,
        }));
}

#[test]
fn test_close_is_idempotent() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);
    let addr = client.local_addr().unwrap();
    server.client(addr).unwrap().send(b"unread").unwrap();
    client.update(DT).unwrap();
    assert!(client.has_datagrams());

    client.close().unwrap();
    client.close().unwrap();
    assert!(client.is_disconnected());
    assert!(client.receive().is_none());
    assert!(client.failure().is_none());

    let mut other = open_client(&network, &server, "");
    connect(&mut server, &mut other);
    let other_addr = other.local_addr().unwrap();
    let mut session = server.client(other_addr).unwrap();
    session.close().unwrap();
    session.close().unwrap();
    assert!(session.is_disconnected());
    assert!(session.receive().is_none());

    server.close().unwrap();
    server.close().unwrap();
    assert!(server.is_closed());
}

#[test]
fn test_payload_round_trip() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);
    let addr = client.local_addr().unwrap();

    let payload: Vec<u8> = (0..=255).collect();
    client.send(&payload).unwrap();
    client.send(b"").unwrap();
    server.update(DT).unwrap();

    let mut session = server.client(addr).unwrap();
    assert_eq!(session.receive(), Some(payload.clone()));
    assert_eq!(session.receive(), Some(Vec::new()));
    assert_eq!(session.receive(), None);

    session.send(b"pong").unwrap();
    client.update(DT).unwrap();
    assert!(client.has_datagrams());
    assert_eq!(client.receive(), Some(b"pong".to_vec()));
    assert_eq!(client.receive(), None);
}

#[test]
fn test_lost_confirmation_recovered_by_redundant_response() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    let client_addr = client.local_addr().unwrap();

    while client.state() != ConnectionState::Challenged {
        client.update(DT).unwrap();
        server.update(DT).unwrap();
    }
    assert_eq!(server.connected_count(), 1);

    // The keepalive confirming the session never arrives.
    let lost = network.intercept(client_addr);
    assert_eq!(lost.len(), 1);

    connect(&mut server, &mut client);
    assert_eq!(server.connected_count(), 1);
    assert_eq!(server.client(client_addr).unwrap().identifier(), client.identifier());
}

#[test]
fn test_handshake_converges_over_lossy_network() {
    let network = SimNetwork::with_seed(7);
    network.set_conditions(PacketLossSimulation {
        enabled: true,
        loss_percent: 25.0,
        duplicate_percent: 10.0,
    });

    let mut server = open_server(&network, ServerConfig::new("pw", 4));
    let mut client = open_client(&network, &server, "pw");
    connect(&mut server, &mut client);

    assert_eq!(server.connected_count(), 1);
}

#[test]
fn test_server_close_notifies_clients() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);
    let addr = client.local_addr().unwrap();
    server.drain_events().for_each(drop);

    server.close().unwrap();
    let err = client.update(DT).unwrap_err();
    assert_eq!(err.failure(), Some(Failure::ServerDisconnected));

    let events: Vec<_> = server.drain_events().collect();
    assert_eq!(
        events,
        vec![ServerEvent::ClientDisconnected {
            addr,
            reason: DisconnectReason::ServerClosed,
        }]
    );
}

#[test]
fn test_kicked_client_sees_disconnect() {
    let network = SimNetwork::new();
    let mut server = open_server(&network, ServerConfig::default());
    let mut client = open_client(&network, &server, "");
    connect(&mut server, &mut client);

    let addr = client.local_addr().unwrap();
    server.client(addr).unwrap().close().unwrap();

    let err = client.update(DT).unwrap_err();
    assert_eq!(err.failure(), Some(Failure::ServerDisconnected));
    assert_eq!(server.connected_count(), 0);
}
