use std::sync::Arc;
use std::time::Duration;

use viberoom::shared::AppError;
use viberoom::{ClientFrame, GatewayFrameHandler, RoomEvent};

mod utils;

use utils::*;

#[tokio::test]
async fn test_two_seat_room_rejects_the_third_member() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 2, true).await;

    setup.join(room_id, "alice").await; // host attaches
    setup.join(room_id, "bob").await;

    let result = setup
        .state
        .coordinator
        .join(room_id, &TestSetup::identity("carol"))
        .await;
    assert!(matches!(result, Err(AppError::RoomFull)));

    let room = setup.room(room_id).await;
    assert_eq!(room.member_count(), 2);
    assert!(room.is_active);
}

#[tokio::test]
async fn test_concurrent_joins_never_overfill_a_room() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 3, true).await;

    let coordinator = setup.state.coordinator.clone();
    let handles = (0..10)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .join(room_id, &TestSetup::identity(&format!("user-{}", i)))
                    .await
            })
        })
        .collect::<Vec<_>>();

    let results = futures::future::join_all(handles).await;
    let admitted = results
        .into_iter()
        .filter(|r| r.as_ref().unwrap().is_ok())
        .count();

    // Host holds one seat, two contenders win the rest
    assert_eq!(admitted, 2);
    let room = setup.room(room_id).await;
    assert_eq!(room.member_count(), 3);
}

#[tokio::test]
async fn test_member_count_tracks_active_flag_through_lifecycle() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;

    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;
    assert!(setup.room(room_id).await.is_active);

    setup.state.coordinator.leave(room_id, "alice").await.unwrap();
    assert!(setup.room(room_id).await.is_active);

    setup.state.coordinator.leave(room_id, "bob").await.unwrap();
    let room = setup.room(room_id).await;
    assert_eq!(room.member_count(), 0);
    assert!(!room.is_active, "empty room must not stay active");
}

#[tokio::test]
async fn test_leaving_releases_every_device_and_session() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;

    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;
    setup
        .state
        .coordinator
        .enable_video(room_id, "bob")
        .await
        .unwrap();

    // bob holds audio + video, alice holds audio
    assert_eq!(setup.backend.open_device_count(), 3);

    setup.state.coordinator.leave(room_id, "bob").await.unwrap();

    assert!(setup
        .state
        .coordinator
        .media_session(room_id, "bob")
        .await
        .is_none());
    assert_eq!(
        setup.backend.open_device_count(),
        1,
        "only alice's audio may remain"
    );

    // A second leave is a harmless no-op
    setup.state.coordinator.leave(room_id, "bob").await.unwrap();
    assert_eq!(setup.backend.open_device_count(), 1);
}

#[tokio::test]
async fn test_host_departure_promotes_earliest_joined_member() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;

    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;
    setup.join(room_id, "carol").await;

    let mut events = setup.event_bus.subscribe_to_room(room_id).await;

    setup.state.coordinator.leave(room_id, "alice").await.unwrap();

    let room = setup.room(room_id).await;
    assert_eq!(room.host_id, "bob");
    assert!(room.is_active);
    assert_eq!(room.member_count(), 2);

    let mut saw_host_change = false;
    while let Ok(event) = events.try_recv() {
        if let RoomEvent::HostChanged { new_host_id, .. } = event {
            assert_eq!(new_host_id, "bob");
            saw_host_change = true;
        }
    }
    assert!(saw_host_change, "host change must be broadcast");
}

#[tokio::test]
async fn test_concurrent_chat_posts_keep_room_total_order() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;
    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;

    let (_, mut chat_rx) = setup.state.coordinator.chat().subscribe(room_id, None);

    // Alice posts "hello" then "world" while bob posts "hi" concurrently
    let coordinator = setup.state.coordinator.clone();
    let alice = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .post_chat(room_id, "alice", "name-alice", "hello")
                .await
                .unwrap();
            coordinator
                .post_chat(room_id, "alice", "name-alice", "world")
                .await
                .unwrap();
        })
    };
    let bob = tokio::spawn(async move {
        coordinator
            .post_chat(room_id, "bob", "name-bob", "hi")
            .await
            .unwrap();
    });
    alice.await.unwrap();
    bob.await.unwrap();

    let mut seqs = Vec::new();
    let mut alice_texts = Vec::new();
    for _ in 0..3 {
        let message = chat_rx.recv().await.unwrap();
        seqs.push(message.seq);
        if message.user_id == "alice" {
            alice_texts.push(message.text);
        }
    }

    // Distinct, room-unique, gap-free sequence numbers
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, vec![1, 2, 3]);

    // Every subscriber observes alice's messages in her posting order
    assert_eq!(alice_texts, vec!["hello", "world"]);
}

#[tokio::test]
async fn test_single_use_invite_admits_exactly_one_of_many() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 10, false).await;
    setup.join(room_id, "alice").await;

    let token = setup
        .state
        .invite_service
        .issue(room_id, "alice", Duration::from_secs(60), 1)
        .await
        .unwrap();

    let coordinator = setup.state.coordinator.clone();
    let handles = (0..5)
        .map(|i| {
            let coordinator = coordinator.clone();
            let token = token.token.clone();
            tokio::spawn(async move {
                coordinator
                    .join_with_invite(&token, &TestSetup::identity(&format!("guest-{}", i)))
                    .await
            })
        })
        .collect::<Vec<_>>();

    let results = futures::future::join_all(handles).await;
    let admitted = results
        .into_iter()
        .filter(|r| r.as_ref().unwrap().is_ok())
        .count();

    assert_eq!(admitted, 1, "one use admits one guest");
    assert_eq!(setup.room(room_id).await.member_count(), 2);
}

#[tokio::test]
async fn test_enable_video_mid_call_keeps_audio_running() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;
    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;

    let alice = setup
        .state
        .coordinator
        .media_session(room_id, "alice")
        .await
        .unwrap();
    let audio_before = alice.audio_handle().await.unwrap();

    setup
        .state
        .coordinator
        .enable_video(room_id, "alice")
        .await
        .unwrap();

    // The bob pair renegotiated and now carries video
    assert!(alice.has_video().await);
    assert_eq!(alice.peer_has_video("bob").await, Some(true));

    // Audio never dropped: same capture handle before and after
    assert_eq!(alice.audio_handle().await.unwrap(), audio_before);

    setup
        .state
        .coordinator
        .disable_video(room_id, "alice")
        .await
        .unwrap();
    assert!(!alice.has_video().await);
    assert_eq!(alice.audio_handle().await.unwrap(), audio_before);
}

#[tokio::test]
async fn test_silent_member_is_swept_out_like_an_explicit_leave() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;
    setup.join(room_id, "alice").await;
    setup.join(room_id, "bob").await;

    let _sweeper = setup.state.coordinator.spawn_presence_sweeper();

    // Alice heartbeats, bob goes silent past timeout + grace
    for _ in 0..12 {
        setup.state.coordinator.heartbeat(room_id, "alice").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let room = setup.room(room_id).await;
    assert!(room.has_member("alice"));
    assert!(!room.has_member("bob"), "silent member must be removed");
    assert!(setup
        .state
        .coordinator
        .media_session(room_id, "bob")
        .await
        .is_none());
    assert_eq!(setup.backend.open_device_count(), 1);
}

#[tokio::test]
async fn test_leave_frame_through_the_gateway_tears_down() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;
    setup.join(room_id, "alice").await;

    let handler = Arc::new(GatewayFrameHandler::new(
        setup.state.clone(),
        TestSetup::identity("alice"),
    ));

    let raw = serde_json::to_string(&ClientFrame::Chat {
        text: "last words".to_string(),
    })
    .unwrap();
    use viberoom::gateway::FrameHandler;
    assert!(handler.handle_frame(room_id, "alice", raw).await);

    let raw = serde_json::to_string(&ClientFrame::Leave).unwrap();
    assert!(!handler.handle_frame(room_id, "alice", raw).await);

    let room = setup.room(room_id).await;
    assert!(!room.is_active);
    assert_eq!(setup.backend.open_device_count(), 0);
}

#[tokio::test]
async fn test_rejoining_member_does_not_duplicate_membership() {
    let setup = TestSetupBuilder::new().build();
    let room_id = setup.create_room("alice", 4, true).await;

    setup.join(room_id, "alice").await;
    setup.join(room_id, "alice").await; // reconnect

    let room = setup.room(room_id).await;
    assert_eq!(room.member_count(), 1);

    // The stale session was replaced, not leaked
    assert_eq!(setup.backend.open_device_count(), 1);
}
