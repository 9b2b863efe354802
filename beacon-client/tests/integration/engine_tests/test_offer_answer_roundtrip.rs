use beacon_client::negotiation::SdpKind;
use beacon_client::{EngineState, MediaSource, SyntheticMedia};
use beacon_core::{Role, RoomId};
use tokio::sync::mpsc;

use super::TestEngine;
use crate::utils::{LoopbackHub, ScriptedConnector, init_tracing};

#[tokio::test]
async fn test_offer_answer_roundtrip() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let room = RoomId::from("ABC123");

    let mut responder = TestEngine::new(&hub, &room, Role::Responder).await;
    let mut initiator = TestEngine::new(&hub, &room, Role::Initiator).await;
    let (responder_events, _responder_rx) = mpsc::channel(16);
    let (initiator_events, _initiator_rx) = mpsc::channel(16);

    responder
        .engine
        .start(connector.as_ref(), responder_events, None)
        .await
        .expect("responder start");
    assert_eq!(responder.engine.state(), EngineState::AwaitingOffer);

    let media = SyntheticMedia::new("initiator").acquire().await.unwrap();
    initiator
        .engine
        .start(connector.as_ref(), initiator_events, Some(&media))
        .await
        .expect("initiator start");
    assert_eq!(
        initiator.engine.state(),
        EngineState::AwaitingRemoteDescription
    );
    assert_eq!(hub.published_of_type("offer").await.len(), 1);

    // Responder answers the offer
    responder.pump().await;
    assert_eq!(responder.engine.state(), EngineState::Established);
    assert_eq!(hub.published_of_type("answer").await.len(), 1);

    // Initiator applies the answer; its own offer echo is ignored
    initiator.pump().await;
    assert_eq!(initiator.engine.state(), EngineState::Established);
    assert!(initiator.engine.remote_description_set());

    // Exactly one of each, after everything has settled
    responder.pump().await;
    assert_eq!(hub.published_of_type("offer").await.len(), 1);
    assert_eq!(hub.published_of_type("answer").await.len(), 1);

    let responder_peer = connector.peer(0).await.calls().await;
    let initiator_peer = connector.peer(1).await.calls().await;

    assert_eq!(initiator_peer.tracks, vec!["audio", "video"]);
    assert!(responder_peer.tracks.is_empty());
    assert_eq!(
        initiator_peer.local,
        vec![(SdpKind::Offer, "v=0 offer-1".to_owned())]
    );
    assert_eq!(
        responder_peer.remote,
        vec![(SdpKind::Offer, "v=0 offer-1".to_owned())]
    );
    assert_eq!(
        initiator_peer.remote,
        vec![(SdpKind::Answer, "v=0 answer-0".to_owned())]
    );

    let stats = initiator.outputs.stats.snapshot();
    assert_eq!(stats.signals_received, 1);
    assert_eq!(stats.protocol_violations, 0);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let mut initiator = TestEngine::new(&hub, &RoomId::from("ABC123"), Role::Initiator).await;
    let (events, _rx) = mpsc::channel(16);

    initiator
        .engine
        .start(connector.as_ref(), events.clone(), None)
        .await
        .unwrap();

    assert!(
        initiator
            .engine
            .start(connector.as_ref(), events, None)
            .await
            .is_err()
    );
    assert_eq!(connector.created().await, 1);
    assert_eq!(hub.published_of_type("offer").await.len(), 1);
}
