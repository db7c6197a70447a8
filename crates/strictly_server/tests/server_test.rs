//! End-to-end tests against a real server on an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;
use strictly_connect_four::{Cell, GameStatus, ROWS, Seat};
use strictly_server::{Envelope, GameClient, GameServer, MessageKind, Payload, ServerConfig};

async fn start_server() -> SocketAddr {
    let config = ServerConfig::default().with_host("127.0.0.1").with_port(0);
    let server = GameServer::bind(config).await.expect("Failed to bind");
    let addr = server.local_addr().expect("Bound address");
    tokio::spawn(server.run());
    addr
}

async fn login(addr: SocketAddr, name: &str) -> GameClient {
    let mut client = GameClient::connect(addr).await.expect("Failed to connect");
    client.login(name).await.expect("Login failed");
    client
}

/// Reads until a message with exactly `content` arrives.
async fn wait_for_content(client: &mut GameClient, content: &str) -> Envelope {
    let wait = async {
        loop {
            let envelope = client.next_message().await.expect("message");
            if envelope.content == content {
                return envelope;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", content))
}

async fn wait_for(client: &mut GameClient, kind: MessageKind) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), client.wait_for(kind))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
        .expect("message")
}

async fn pair(addr: SocketAddr) -> (GameClient, GameClient) {
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;
    alice.request_game().await.expect("request");
    wait_for_content(&mut alice, "Waiting for an opponent...").await;
    bob.request_game().await.expect("request");
    for client in [&mut alice, &mut bob] {
        wait_for(client, MessageKind::GameStarted).await;
        let state = client.next_message().await.expect("initial state");
        assert_eq!(state.kind, MessageKind::GameState);
    }
    (alice, bob)
}

#[tokio::test]
async fn test_full_game_horizontal_win() {
    let addr = start_server().await;
    let mut alice = login(addr, "alice").await;
    let mut bob = login(addr, "bob").await;

    alice.request_game().await.expect("request");
    wait_for_content(&mut alice, "Waiting for an opponent...").await;
    bob.request_game().await.expect("request");

    for (client, seat, opponent) in [
        (&mut alice, Seat::First, "bob"),
        (&mut bob, Seat::Second, "alice"),
    ] {
        let started = wait_for(client, MessageKind::GameStarted).await;
        assert_eq!(started.payload, Payload::Seat(seat));
        assert!(started.content.contains(opponent));

        let state = client.next_message().await.expect("initial state");
        assert_eq!(state.kind, MessageKind::GameState);
        let snapshot = state.snapshot().expect("board");
        assert_eq!(snapshot.current_seat, Seat::First);
        assert_eq!(snapshot.status, GameStatus::InProgress);
        assert!(snapshot.grid.iter().flatten().all(|c| *c == Cell::Empty));
    }

    // Out of turn: only the mover hears about it.
    bob.make_move(0).await.expect("send");
    let rejected = wait_for(&mut bob, MessageKind::Chat).await;
    assert!(rejected.content.starts_with("Invalid move: Not your turn"));

    let moves = [
        (true, 0),
        (false, 0),
        (true, 1),
        (false, 1),
        (true, 2),
        (false, 2),
    ];
    for (alice_moves, column) in moves {
        let mover = if alice_moves { &mut alice } else { &mut bob };
        mover.make_move(column).await.expect("send");
        for client in [&mut alice, &mut bob] {
            let state = wait_for(client, MessageKind::GameState).await;
            assert_eq!(
                state.snapshot().map(|s| s.status),
                Some(GameStatus::InProgress)
            );
        }
    }

    alice.make_move(3).await.expect("send");
    for client in [&mut alice, &mut bob] {
        let state = wait_for(client, MessageKind::GameState).await;
        let snapshot = state.snapshot().expect("board");
        assert_eq!(snapshot.grid[ROWS - 1][3], Cell::Occupied(Seat::First));

        let over = client.next_message().await.expect("game over");
        assert_eq!(over.kind, MessageKind::GameOver);
        assert_eq!(over.content, "alice wins!");
        assert_eq!(
            over.snapshot().map(|s| s.status),
            Some(GameStatus::Won(Seat::First))
        );
    }

    // The finished board is frozen.
    bob.make_move(4).await.expect("send");
    let frozen = wait_for(&mut bob, MessageKind::Chat).await;
    assert_eq!(frozen.content, "Invalid move: The game is already over");
}

#[tokio::test]
async fn test_rematch_keeps_seats() {
    let addr = start_server().await;
    let (mut alice, mut bob) = pair(addr).await;

    let moves = [
        (true, 6),
        (false, 5),
        (true, 6),
        (false, 5),
        (true, 6),
        (false, 5),
        (true, 6),
    ];
    for (alice_moves, column) in moves {
        let mover = if alice_moves { &mut alice } else { &mut bob };
        mover.make_move(column).await.expect("send");
        // Both must see the move before the other seat replies.
        wait_for(&mut alice, MessageKind::GameState).await;
        wait_for(&mut bob, MessageKind::GameState).await;
    }
    wait_for(&mut alice, MessageKind::GameOver).await;
    wait_for(&mut bob, MessageKind::GameOver).await;

    bob.play_again().await.expect("send");
    for client in [&mut alice, &mut bob] {
        wait_for_content(client, "New game started!").await;
        let state = client.next_message().await.expect("state");
        let snapshot = state.snapshot().expect("board");
        assert_eq!(snapshot.current_seat, Seat::First);
        assert!(snapshot.grid.iter().flatten().all(|c| *c == Cell::Empty));
    }

    // Seat one still moves first.
    alice.make_move(0).await.expect("send");
    let state = wait_for(&mut bob, MessageKind::GameState).await;
    assert_eq!(state.snapshot().map(|s| s.current_seat), Some(Seat::Second));
}

#[tokio::test]
async fn test_duplicate_login_rejected_until_holder_leaves() {
    let addr = start_server().await;
    let mut first = login(addr, "alice").await;

    let mut second = GameClient::connect(addr).await.expect("connect");
    let err = second.login("alice").await.unwrap_err();
    assert!(err.to_string().contains("already taken"));

    first.quit().await.expect("send");
    while first.recv().await.expect("read").is_some() {}

    second.login("alice").await.expect("name is free again");
    assert_eq!(second.name(), Some("alice"));
}

#[tokio::test]
async fn test_chat_routing() {
    let addr = start_server().await;
    let (mut alice, mut bob) = pair(addr).await;
    let mut carol = login(addr, "carol").await;
    let mut dave = login(addr, "dave").await;

    // Lobby chat reaches everyone, sender stamped by the server.
    carol.chat("anyone around?").await.expect("send");
    for client in [&mut alice, &mut bob, &mut carol, &mut dave] {
        let chat = wait_for_content(client, "anyone around?").await;
        assert_eq!(chat.sender, "carol");
    }

    // Game chat stays inside the pairing; a marker from carol proves dave
    // never saw it.
    alice.chat("good luck").await.expect("send");
    wait_for_content(&mut alice, "good luck").await;
    wait_for_content(&mut bob, "good luck").await;
    carol.chat("marker").await.expect("send");
    let wait = async {
        loop {
            let envelope = dave.next_message().await.expect("message");
            assert_ne!(envelope.content, "good luck");
            if envelope.content == "marker" {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("marker arrives");
}

#[tokio::test]
async fn test_disconnect_notifies_opponent() {
    let addr = start_server().await;
    let (alice, mut bob) = pair(addr).await;

    drop(alice);
    wait_for_content(&mut bob, "alice has left the game.").await;
    wait_for_content(&mut bob, "alice has disconnected.").await;

    // Bob is free to queue again.
    bob.request_game().await.expect("send");
    wait_for_content(&mut bob, "Waiting for an opponent...").await;
}

#[tokio::test]
async fn test_actions_require_login() {
    let addr = start_server().await;
    let mut client = GameClient::connect(addr).await.expect("connect");
    let welcome = client.next_message().await.expect("welcome");
    assert!(welcome.content.starts_with("Welcome!"));

    client.request_game().await.expect("send");
    let reply = client.next_message().await.expect("reply");
    assert_eq!(reply.content, "You must login first!");
}
