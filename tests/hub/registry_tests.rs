//! Connection registry and room index behavior through the hub.

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use tokio_test::assert_err;

use chat_hub::application::Hub;
use chat_hub::config::HubSettings;
use chat_hub::domain::{ChannelId, ChannelRetention, PresenceState, SessionId, SessionPolicy, UserId};
use chat_hub::shared::HubError;

use crate::common::{hub_settings, TestTransport};

#[test]
fn test_register_then_lookup() {
    let hub = Hub::new(hub_settings());

    let id = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();

    let session = hub.lookup(&id).unwrap();
    assert_eq!(session.id, id);
    assert_eq!(session.user_id, UserId::from("alice"));
    assert_eq!(session.presence, PresenceState::Active);
    assert!(session.subscriptions.is_empty());
}

#[test]
fn test_session_ids_are_unique() {
    let hub = Hub::new(hub_settings());

    let ids: HashSet<SessionId> = (0..50)
        .map(|_| {
            hub.accept_connection(UserId::from("alice"), TestTransport::accepting())
                .unwrap()
        })
        .collect();

    assert_eq!(ids.len(), 50);
    assert_eq!(hub.stats().sessions, 50);
    assert_eq!(hub.stats().users, 1);
}

#[test]
fn test_single_session_policy() {
    let settings = HubSettings {
        session_policy: SessionPolicy::Single,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let first = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();

    let err = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap_err();
    assert_eq!(err, HubError::DuplicateConnection(UserId::from("alice")));

    hub.unregister(&first);
    assert!(hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .is_ok());
}

#[test]
fn test_unregister_removes_from_every_channel() {
    let hub = Hub::new(hub_settings());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let bob = hub
        .accept_connection(UserId::from("bob"), TestTransport::accepting())
        .unwrap();
    let channels: Vec<ChannelId> = ["a", "b", "c"].into_iter().map(ChannelId::from).collect();
    for channel in &channels {
        hub.subscribe(&alice, channel).unwrap();
    }
    hub.subscribe(&bob, &channels[0]).unwrap();

    assert!(hub.unregister(&alice));

    for channel in &channels {
        assert!(!hub.subscribers(channel).contains(&alice));
    }
    // Only the channel bob is still in survives.
    assert_eq!(hub.stats().channels, 1);
    assert_eq!(hub.subscribers(&channels[0]), HashSet::from([bob]));
    assert_eq!(hub.lookup(&alice).unwrap_err(), HubError::NotFound(alice.clone()));
    assert!(!hub.unregister(&alice));
}

#[test]
fn test_subscribe_requires_live_session() {
    let hub = Hub::new(hub_settings());
    let ghost = SessionId::from("ghost");

    let err = assert_err!(hub.subscribe(&ghost, &ChannelId::from("general")));
    assert_eq!(err, HubError::SessionNotFound(ghost.clone()));
    let err = assert_err!(hub.unsubscribe(&ghost, &ChannelId::from("general")));
    assert_eq!(err, HubError::SessionNotFound(ghost));
}

#[test]
fn test_subscribe_is_idempotent() {
    let hub = Hub::new(hub_settings());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let general = ChannelId::from("general");

    hub.subscribe(&alice, &general).unwrap();
    hub.subscribe(&alice, &general).unwrap();
    assert_eq!(hub.subscribers(&general).len(), 1);

    // Unsubscribing from a channel never joined is a no-op.
    hub.unsubscribe(&alice, &ChannelId::from("random")).unwrap();
    assert!(hub.lookup(&alice).unwrap().is_subscribed(&general));
}

#[test]
fn test_session_and_channel_views_agree() {
    let hub = Hub::new(hub_settings());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let general = ChannelId::from("general");
    let random = ChannelId::from("random");

    hub.subscribe(&alice, &general).unwrap();
    hub.subscribe(&alice, &random).unwrap();
    hub.unsubscribe(&alice, &random).unwrap();

    let session = hub.lookup(&alice).unwrap();
    assert_eq!(session.subscriptions, HashSet::from([general.clone()]));
    assert!(hub.subscribers(&general).contains(&alice));
    assert!(!hub.subscribers(&random).contains(&alice));
}

#[test]
fn test_empty_channel_destroyed_by_default() {
    let hub = Hub::new(hub_settings());
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let general = ChannelId::from("general");

    hub.subscribe(&alice, &general).unwrap();
    hub.unsubscribe(&alice, &general).unwrap();

    assert_eq!(hub.channel(&general).unwrap_err(), HubError::ChannelNotFound(general.clone()));
    assert!(hub.subscribers(&general).is_empty());
}

#[test]
fn test_empty_channel_retained_when_configured() {
    let settings = HubSettings {
        channel_retention: ChannelRetention::Retain,
        ..hub_settings()
    };
    let hub = Hub::new(settings);
    let alice = hub
        .accept_connection(UserId::from("alice"), TestTransport::accepting())
        .unwrap();
    let general = ChannelId::from("general");

    hub.subscribe(&alice, &general).unwrap();
    hub.unregister(&alice);

    let channel = hub.channel(&general).unwrap();
    assert!(channel.subscribers.is_empty());
    assert_eq!(hub.stats().channels, 1);
}
