use beacon_client::{MediaKind, RemoteTrack};
use beacon_core::{Role, RoomId};

use super::TestEngine;
use crate::utils::{LoopbackHub, init_tracing};

#[tokio::test]
async fn test_tracks_merge_into_one_stream() {
    init_tracing();

    let hub = LoopbackHub::new();
    let mut responder = TestEngine::new(&hub, &RoomId::from("ABC123"), Role::Responder).await;
    let mut remote = responder.outputs.remote_stream.subscribe();
    assert!(remote.borrow().is_none());

    responder
        .engine
        .on_remote_track(RemoteTrack::new("a1", "remote-1", MediaKind::Audio));
    responder
        .engine
        .on_remote_track(RemoteTrack::new("v1", "remote-1", MediaKind::Video));

    {
        let stream = remote.borrow_and_update();
        let stream = stream.as_ref().expect("remote stream published");
        assert_eq!(stream.id, "remote-1");
        assert_eq!(stream.tracks.len(), 2);
        assert!(stream.track(MediaKind::Audio).is_some());
        assert!(stream.track(MediaKind::Video).is_some());
    }

    // Same track again is not a change
    responder
        .engine
        .on_remote_track(RemoteTrack::new("a1", "remote-1", MediaKind::Audio));
    assert!(!remote.has_changed().unwrap());
}

#[tokio::test]
async fn test_closed_engine_ignores_tracks() {
    init_tracing();

    let hub = LoopbackHub::new();
    let mut responder = TestEngine::new(&hub, &RoomId::from("ABC123"), Role::Responder).await;
    let remote = responder.outputs.remote_stream.subscribe();

    responder.engine.close().await;
    responder
        .engine
        .on_remote_track(RemoteTrack::new("a1", "remote-1", MediaKind::Audio));

    assert!(remote.borrow().is_none());
}
