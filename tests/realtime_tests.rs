//! Realtime hub tests
//!
//! Drive the hub directly with recording connections and check who
//! receives what.

mod common;

use common::{RecordingConnection, TestApp, UnreliableStore, test_config};
use neon_chat_server::models::{Chatroom, User, UserStatus};
use neon_chat_server::services::CreateRoomRequest;
use neon_chat_server::services::realtime::{
    AuthPayload, ReactionPayload, RoomPayload, SendMessagePayload, StatusPayload,
};
use serde_json::Value;
use std::sync::Arc;

async fn create_room(app: &TestApp, creator_id: &str, name: &str, max_users: usize) -> Chatroom {
    app.state
        .chat
        .create_room(
            creator_id,
            CreateRoomRequest {
                name: Some(name.to_string()),
                topic: Some("music".to_string()),
                max_users: Some(max_users),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

async fn join(app: &TestApp, conn: &Arc<RecordingConnection>, room_id: &str) {
    app.state
        .hub
        .join_room(
            conn_id(conn),
            RoomPayload {
                room_id: room_id.to_string(),
            },
        )
        .await;
}

fn conn_id(conn: &Arc<RecordingConnection>) -> &str {
    use neon_chat_server::services::Connection;
    conn.id()
}

fn message(room_id: &str, content: &str) -> SendMessagePayload {
    SendMessagePayload {
        room_id: room_id.to_string(),
        content: content.to_string(),
        message_type: Some("public".to_string()),
        whisper_target: None,
        has_neon_effect: false,
        neon_color: None,
    }
}

fn error_message(conn: &RecordingConnection) -> Option<String> {
    conn.last("error")
        .and_then(|payload| payload["message"].as_str().map(str::to_string))
}

fn contents(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e["content"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_public_message_reaches_room_and_full_room_rejects() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;

    let room = create_room(&app, &alice.user.id, "neon-lounge", 2).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    let carol_conn = app.connect("c-carol", &carol.token).await;

    join(&app, &alice_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;

    let joined = bob_conn.last("room_joined").expect("bob receives room snapshot");
    assert_eq!(joined["room"]["name"], "neon-lounge");
    assert_eq!(joined["activeUsers"].as_array().unwrap().len(), 2);

    let notice = alice_conn.last("user_joined").expect("alice sees bob join");
    assert_eq!(notice["user"]["username"], "bob");
    assert_eq!(notice["message"], "bob joined the room!");

    app.state.hub.send_message("c-alice", message(&room.id, "hi")).await;

    for conn in [&alice_conn, &bob_conn] {
        let received = conn.last("new_message").expect("room member receives message");
        assert_eq!(received["sender"]["username"], "alice");
        assert_eq!(received["content"], "hi");
        assert_eq!(received["messageType"], "public");
    }
    let ack = alice_conn.last("message_sent").expect("sender gets acknowledgement");
    assert_eq!(ack["success"], true);
    assert!(ack["messageId"].as_str().unwrap().starts_with("msg_"));
    assert!(bob_conn.events_named("message_sent").is_empty());

    join(&app, &carol_conn, &room.id).await;
    assert_eq!(error_message(&carol_conn).as_deref(), Some("Chatroom is full"));
    assert!(carol_conn.events_named("room_joined").is_empty());
    assert!(carol_conn.events_named("new_message").is_empty());
}

#[tokio::test]
async fn test_rejoin_does_not_duplicate_occupancy_or_notices() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;

    assert_eq!(bob_conn.events_named("room_joined").len(), 2);
    assert_eq!(alice_conn.events_named("user_joined").len(), 1);

    let stored = app.store.find_room(&room.id).await.unwrap().unwrap();
    assert_eq!(stored.occupants.len(), 2);
}

#[tokio::test]
async fn test_whisper_reaches_only_sender_and_target() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;
    let room = create_room(&app, &alice.user.id, "whisper-den", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    let carol_conn = app.connect("c-carol", &carol.token).await;
    for conn in [&alice_conn, &bob_conn, &carol_conn] {
        join(&app, conn, &room.id).await;
    }

    let mut whisper = message(&room.id, "just between us");
    whisper.message_type = Some("whisper".to_string());
    whisper.whisper_target = Some(bob.user.id.clone());
    app.state.hub.send_message("c-alice", whisper).await;

    assert_eq!(contents(&alice_conn.events_named("new_message")), vec!["just between us"]);
    assert_eq!(contents(&bob_conn.events_named("new_message")), vec!["just between us"]);
    assert!(carol_conn.events_named("new_message").is_empty());

    let received = bob_conn.last("new_message").unwrap();
    assert_eq!(received["messageType"], "whisper");
    assert_eq!(received["whisperTarget"]["username"], "bob");
}

#[tokio::test]
async fn test_whisper_to_offline_target_is_dropped() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;
    let room = create_room(&app, &alice.user.id, "quiet-room", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let carol_conn = app.connect("c-carol", &carol.token).await;
    join(&app, &alice_conn, &room.id).await;
    join(&app, &carol_conn, &room.id).await;

    let mut whisper = message(&room.id, "are you there?");
    whisper.message_type = Some("whisper".to_string());
    whisper.whisper_target = Some(bob.user.id.clone());
    app.state.hub.send_message("c-alice", whisper).await;

    assert_eq!(alice_conn.events_named("new_message").len(), 1);
    assert_eq!(alice_conn.events_named("message_sent").len(), 1);
    assert!(carol_conn.events_named("new_message").is_empty());
}

#[tokio::test]
async fn test_whisper_without_target_is_rejected() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;
    let alice_conn = app.connect("c-alice", &alice.token).await;
    join(&app, &alice_conn, &room.id).await;

    let mut whisper = message(&room.id, "hello?");
    whisper.message_type = Some("whisper".to_string());
    app.state.hub.send_message("c-alice", whisper).await;

    assert_eq!(error_message(&alice_conn).as_deref(), Some("Whisper target is required"));
    assert!(alice_conn.events_named("new_message").is_empty());
}

#[tokio::test]
async fn test_send_requires_occupancy_and_content() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let bob_conn = app.connect("c-bob", &bob.token).await;
    app.state.hub.send_message("c-bob", message(&room.id, "let me in")).await;
    assert_eq!(
        error_message(&bob_conn).as_deref(),
        Some("You must join the chatroom first")
    );

    join(&app, &bob_conn, &room.id).await;
    app.state.hub.send_message("c-bob", message(&room.id, "   ")).await;
    assert_eq!(error_message(&bob_conn).as_deref(), Some("Message content is required"));

    app.state.hub.send_message("c-bob", message("room_missing", "hi")).await;
    assert_eq!(error_message(&bob_conn).as_deref(), Some("Chatroom not found"));
}

#[tokio::test]
async fn test_disconnect_leaves_every_room_and_goes_offline() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;
    let room_a = create_room(&app, &bob.user.id, "room-a", 10).await;
    let room_b = create_room(&app, &carol.user.id, "room-b", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    let carol_conn = app.connect("c-carol", &carol.token).await;

    join(&app, &bob_conn, &room_a.id).await;
    join(&app, &carol_conn, &room_b.id).await;
    join(&app, &alice_conn, &room_a.id).await;
    join(&app, &alice_conn, &room_b.id).await;

    app.state.hub.disconnect("c-alice").await;

    for (conn, room) in [(&bob_conn, &room_a), (&carol_conn, &room_b)] {
        let notice = conn.last("user_left").expect("remaining member is notified");
        assert_eq!(notice["user"]["username"], "alice");
        assert_eq!(notice["roomId"], room.id.as_str());
        assert_eq!(notice["message"], "alice disconnected");
    }

    for room in [&room_a, &room_b] {
        let stored = app.store.find_room(&room.id).await.unwrap().unwrap();
        assert!(!stored.is_occupant(&alice.user.id));
    }

    let stored = app.store.find_user(&alice.user.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UserStatus::Offline);
    assert!(app.state.hub.presence().connection_of(&alice.user.id).is_none());
    assert_eq!(app.state.hub.stats().connected_users, 2);
}

#[tokio::test]
async fn test_explicit_leave_notifies_caller_and_room() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;

    app.state
        .hub
        .leave_room(
            "c-bob",
            RoomPayload {
                room_id: room.id.clone(),
            },
        )
        .await;

    assert_eq!(bob_conn.last("room_left").unwrap()["roomId"], room.id.as_str());
    assert!(app.state.hub.presence().rooms_of(&bob.user.id).is_empty());
    assert_eq!(app.state.hub.presence().rooms_of(&alice.user.id), vec![room.id.clone()]);
    assert_eq!(alice_conn.last("user_left").unwrap()["message"], "bob left the room");

    app.state.hub.send_message("c-alice", message(&room.id, "still here")).await;
    assert!(bob_conn.events_named("new_message").is_empty());
}

#[tokio::test]
async fn test_reaction_toggle_broadcasts_counts() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;

    app.state.hub.send_message("c-alice", message(&room.id, "react to me")).await;
    let message_id = alice_conn.last("message_sent").unwrap()["messageId"]
        .as_str()
        .unwrap()
        .to_string();

    let react = |emoji: &str| ReactionPayload {
        message_id: message_id.clone(),
        emoji: emoji.to_string(),
    };

    app.state.hub.add_reaction("c-bob", react("🔥")).await;
    let update = alice_conn.last("reaction_updated").expect("room sees the reaction");
    assert_eq!(update["messageId"], message_id.as_str());
    assert_eq!(update["reactions"]["🔥"], 1);
    assert_eq!(update["totalReactions"], 1);

    app.state.hub.add_reaction("c-bob", react("🔥")).await;
    let update = bob_conn.last("reaction_updated").unwrap();
    assert_eq!(update["totalReactions"], 0);
    assert!(update["reactions"].as_object().unwrap().is_empty());

    app.state
        .hub
        .add_reaction(
            "c-bob",
            ReactionPayload {
                message_id: "msg_missing".to_string(),
                emoji: "🔥".to_string(),
            },
        )
        .await;
    assert_eq!(error_message(&bob_conn).as_deref(), Some("Message not found"));
}

#[tokio::test]
async fn test_authentication_errors() {
    let app = TestApp::new();
    let alice = app.register("alice").await;

    let conn = RecordingConnection::new("c-anon");
    app.state.hub.connect(conn.clone());

    app.state
        .hub
        .join_room(
            "c-anon",
            RoomPayload {
                room_id: "room_x".to_string(),
            },
        )
        .await;
    assert_eq!(error_message(&conn).as_deref(), Some("Not authenticated"));

    app.state
        .hub
        .authenticate("c-anon", AuthPayload::Object { token: None })
        .await;
    assert_eq!(conn.last("auth_error").unwrap()["message"], "No token provided");

    app.state
        .hub
        .authenticate("c-anon", AuthPayload::Token("not-a-token".to_string()))
        .await;
    assert_eq!(conn.last("auth_error").unwrap()["message"], "Token is invalid");

    app.state
        .hub
        .authenticate(
            "c-anon",
            AuthPayload::Object {
                token: Some(alice.token.clone()),
            },
        )
        .await;
    let authenticated = conn.last("authenticated").expect("valid token authenticates");
    assert_eq!(authenticated["user"]["username"], "alice");
    assert!(authenticated["user"].get("passwordHash").is_none());

    app.state
        .hub
        .authenticate("c-anon", AuthPayload::Token(alice.token.clone()))
        .await;
    assert_eq!(error_message(&conn).as_deref(), Some("Already authenticated"));

    let stored = app.store.find_user(&alice.user.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UserStatus::Online);
}

#[tokio::test]
async fn test_deactivated_account_cannot_authenticate() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    app.store
        .update_user(
            &alice.user.id,
            Box::new(|user: &mut User| {
                user.is_active = false;
                Ok(())
            }),
        )
        .await
        .unwrap();

    let conn = RecordingConnection::new("c-alice");
    app.state.hub.connect(conn.clone());
    app.state
        .hub
        .authenticate("c-alice", AuthPayload::Token(alice.token.clone()))
        .await;

    assert_eq!(conn.last("auth_error").unwrap()["message"], "Account is deactivated");
    assert!(conn.events_named("authenticated").is_empty());
}

#[tokio::test]
async fn test_second_login_replaces_previous_connection() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &bob.user.id, "lounge", 10).await;

    let old_conn = app.connect("c-alice-1", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &bob_conn, &room.id).await;
    join(&app, &old_conn, &room.id).await;

    let new_conn = app.connect("c-alice-2", &alice.token).await;

    assert!(old_conn.is_closed());
    assert_eq!(
        error_message(&old_conn).as_deref(),
        Some("Signed in from another connection")
    );
    assert_eq!(
        bob_conn.last("user_left").unwrap()["message"],
        "alice signed in elsewhere"
    );
    let stored = app.store.find_room(&room.id).await.unwrap().unwrap();
    assert!(!stored.is_occupant(&alice.user.id));

    // The replaced connection can no longer act for the user
    old_conn.clear();
    join(&app, &old_conn, &room.id).await;
    assert_eq!(
        error_message(&old_conn).as_deref(),
        Some("Session was replaced by a newer connection")
    );

    // Its transport closing later must not sign the user out
    app.state.hub.disconnect("c-alice-1").await;
    let stored = app.store.find_user(&alice.user.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UserStatus::Online);

    join(&app, &new_conn, &room.id).await;
    assert!(new_conn.last("room_joined").is_some());
}

#[tokio::test]
async fn test_typing_requires_subscription_and_skips_sender() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;

    let typing_in = || RoomPayload {
        room_id: room.id.clone(),
    };

    app.state.hub.typing("c-bob", typing_in(), true).await;
    assert_eq!(
        error_message(&bob_conn).as_deref(),
        Some("You must join the chatroom first")
    );
    assert!(alice_conn.events_named("user_typing").is_empty());

    join(&app, &bob_conn, &room.id).await;
    app.state.hub.typing("c-bob", typing_in(), true).await;
    app.state.hub.typing("c-bob", typing_in(), false).await;

    let typing = alice_conn.events_named("user_typing");
    assert_eq!(typing.len(), 2);
    assert_eq!(typing[0]["username"], "bob");
    assert_eq!(typing[0]["isTyping"], true);
    assert_eq!(typing[1]["isTyping"], false);
    assert!(bob_conn.events_named("user_typing").is_empty());
}

#[tokio::test]
async fn test_status_update_notifies_room_peers() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;
    join(&app, &bob_conn, &room.id).await;

    app.state
        .hub
        .update_status(
            "c-alice",
            StatusPayload {
                status: "busy".to_string(),
            },
        )
        .await;

    assert_eq!(alice_conn.last("status_updated").unwrap()["status"], "busy");
    let update = bob_conn.last("user_status_updated").expect("peer sees status change");
    assert_eq!(update["username"], "alice");
    assert_eq!(update["status"], "busy");

    let stored = app.store.find_user(&alice.user.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UserStatus::Busy);
    let snapshot = app.state.hub.presence().profile_of(&alice.user.id).unwrap();
    assert_eq!(snapshot.status, UserStatus::Busy);

    app.state
        .hub
        .update_status(
            "c-alice",
            StatusPayload {
                status: "sleeping".to_string(),
            },
        )
        .await;
    assert_eq!(
        error_message(&alice_conn).as_deref(),
        Some("Invalid status. Use: online, busy, away, or offline")
    );
}

#[tokio::test]
async fn test_join_still_succeeds_when_occupant_lookup_fails() {
    let store = UnreliableStore::new();
    let app = TestApp::with_store(test_config(), store.clone());
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room = create_room(&app, &alice.user.id, "lounge", 10).await;

    let alice_conn = app.connect("c-alice", &alice.token).await;
    let bob_conn = app.connect("c-bob", &bob.token).await;
    join(&app, &alice_conn, &room.id).await;

    store.fail_user_lookups(true);
    join(&app, &bob_conn, &room.id).await;

    assert!(bob_conn.events_named("error").is_empty());
    let joined = bob_conn.last("room_joined").expect("join is acknowledged");
    assert!(joined["activeUsers"].as_array().unwrap().is_empty());
    assert_eq!(alice_conn.last("user_joined").unwrap()["user"]["username"], "bob");
    assert_eq!(app.state.hub.presence().rooms_of(&bob.user.id), vec![room.id.clone()]);
}
