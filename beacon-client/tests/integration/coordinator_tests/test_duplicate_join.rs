use beacon_client::{ClientConfig, SessionStatus};
use beacon_core::{Role, RoomId};
use std::sync::Arc;

use super::synthetic;
use crate::utils::{
    GatedMedia, LoopbackHub, ScriptedConnector, eventually, init_tracing, test_coordinator,
};

#[tokio::test]
async fn test_duplicate_join_is_rejected() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let coordinator = test_coordinator(&hub, &connector, synthetic(), ClientConfig::default());

    coordinator
        .join("ABC123", Role::Initiator)
        .await
        .expect("first join");

    let second = coordinator.join("ABC123", Role::Initiator).await;
    assert!(second.unwrap_err().is_already_active());

    assert_eq!(connector.created().await, 1);
    assert_eq!(hub.connects(), 1);
    assert_eq!(hub.disconnects(), 0);
    assert_eq!(hub.published_of_type("offer").await.len(), 1);
    assert_eq!(
        coordinator.status(),
        SessionStatus::Active {
            room: RoomId::from("ABC123"),
            role: Role::Initiator,
        }
    );
}

#[tokio::test]
async fn test_join_during_setup_is_rejected() {
    init_tracing();

    let hub = LoopbackHub::new();
    let connector = ScriptedConnector::new();
    let media = Arc::new(GatedMedia::new());
    let coordinator = test_coordinator(&hub, &connector, media.clone(), ClientConfig::default());

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.join("ABC123", Role::Initiator).await }
    });

    assert!(
        eventually(|| {
            let status = coordinator.status();
            async move { matches!(status, SessionStatus::SettingUp { .. }) }
        })
        .await
    );

    // Any room is refused while a setup runs
    let other = coordinator.join("XYZ789", Role::Responder).await;
    assert!(other.unwrap_err().is_already_active());

    media.open();
    first.await.unwrap().expect("first join completes");

    assert_eq!(connector.created().await, 1);
    assert_eq!(coordinator.status().room(), Some(&RoomId::from("ABC123")));
}
