use beacon_core::{Role, RoomId, SignalMessage};
use tokio::sync::mpsc;

use super::TestEngine;
use crate::utils::{LoopbackHub, ScriptedConnector, candidate, init_tracing};

fn kinds(published: &[(String, String)]) -> Vec<&'static str> {
    published
        .iter()
        .map(|(_, payload)| SignalMessage::from_json(payload).unwrap().kind())
        .collect()
}

#[tokio::test]
async fn test_initiator_holds_candidates_until_offer_is_sent() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let mut initiator = TestEngine::new(&hub, &RoomId::from("ABC123"), Role::Initiator).await;
    let (events, _rx) = mpsc::channel(16);

    initiator.engine.on_local_candidate(candidate(1)).await;
    initiator.engine.on_local_candidate(candidate(2)).await;
    assert_eq!(initiator.engine.pending_candidates(), 2);
    assert!(hub.published().await.is_empty());

    initiator
        .engine
        .start(connector.as_ref(), events, None)
        .await
        .unwrap();

    assert_eq!(initiator.engine.pending_candidates(), 0);
    assert_eq!(
        kinds(&hub.published().await),
        vec!["offer", "candidate", "candidate"]
    );
    assert_eq!(initiator.outputs.stats.snapshot().candidates_sent, 2);
}

#[tokio::test]
async fn test_responder_holds_candidates_until_answer_is_sent() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let room = RoomId::from("ABC123");
    let mut responder = TestEngine::new(&hub, &room, Role::Responder).await;
    let (events, _rx) = mpsc::channel(16);

    responder
        .engine
        .start(connector.as_ref(), events, None)
        .await
        .unwrap();
    responder.engine.on_local_candidate(candidate(7)).await;
    assert_eq!(responder.engine.pending_candidates(), 1);

    hub.inject(
        &room.signal_topic(),
        &SignalMessage::Offer {
            sdp: "v=0 remote".to_owned(),
        }
        .to_json()
        .unwrap(),
    )
    .await;
    responder.pump().await;

    assert_eq!(kinds(&hub.published().await), vec!["answer", "candidate"]);
}

#[tokio::test]
async fn test_remote_candidates_apply_after_remote_description() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let room = RoomId::from("ABC123");
    let mut initiator = TestEngine::new(&hub, &room, Role::Initiator).await;
    let (events, _rx) = mpsc::channel(16);

    initiator
        .engine
        .start(connector.as_ref(), events, None)
        .await
        .unwrap();

    let topic = room.signal_topic();
    hub.inject(
        &topic,
        &SignalMessage::Answer {
            sdp: "v=0 answer".to_owned(),
        }
        .to_json()
        .unwrap(),
    )
    .await;
    hub.inject(
        &topic,
        r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
    )
    .await;
    initiator.pump().await;

    let applied = connector.peer(0).await.calls().await.candidates;
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].sdp_mid.as_deref(), Some("0"));
}

#[tokio::test]
async fn test_candidates_dropped_while_relay_disconnected() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let mut initiator = TestEngine::new(&hub, &RoomId::from("ABC123"), Role::Initiator).await;
    let (events, _rx) = mpsc::channel(16);

    initiator
        .engine
        .start(connector.as_ref(), events, None)
        .await
        .unwrap();
    initiator.relay.disconnect().await;

    initiator.engine.on_local_candidate(candidate(3)).await;

    let stats = initiator.outputs.stats.snapshot();
    assert_eq!(stats.candidates_dropped, 1);
    assert_eq!(stats.candidates_sent, 0);
    assert!(hub.published_of_type("candidate").await.is_empty());
}
