//! Two real sessions negotiating with each other over an in-memory bus.

mod common;

use std::sync::Arc;

use common::*;
use pulse_voice::{MemoryBus, PeerState};

fn loopback(remote_level: f32) -> Arc<LoopbackTransport> {
    Arc::new(LoopbackTransport { remote_level })
}

#[tokio::test]
async fn two_participants_connect_and_part() {
    let bus = MemoryBus::new();
    let a1 = join(
        &bus,
        "a1",
        FakeCapture::ready(FakeLocalStream::new()),
        loopback(0.0),
        FakeOutput::new(),
    );
    let b2_output = FakeOutput::new();
    let b2 = join(
        &bus,
        "b2",
        FakeCapture::ready(FakeLocalStream::new()),
        loopback(0.0),
        b2_output.clone(),
    );

    let a_view = wait_view(&a1.handle, "a1 connected", |v| {
        v.peer_state(&id("b2")) == Some(PeerState::Connected)
    })
    .await;
    let b_view = wait_view(&b2.handle, "b2 connected", |v| {
        v.peer_state(&id("a1")) == Some(PeerState::Connected)
    })
    .await;

    let a_peer = a_view.peers.iter().find(|p| p.id == id("b2")).unwrap();
    let b_peer = b_view.peers.iter().find(|p| p.id == id("a1")).unwrap();
    assert!(a_peer.is_initiator);
    assert!(!b_peer.is_initiator);
    assert_eq!(a_view.roster.len(), 1);
    assert_eq!(b_view.roster.len(), 1);
    assert_eq!(b2_output.attached("a1"), 1);

    b2.session.leave().await.unwrap();
    let a_view = wait_view(&a1.handle, "b2 gone", |v| v.roster.is_empty()).await;
    assert!(a_view.peers.is_empty());
    assert!(b2.handle.view().left);

    a1.handle.leave().await.unwrap();
}

#[tokio::test]
async fn three_participants_form_a_full_mesh() {
    let bus = MemoryBus::new();
    let names = ["a1", "b2", "c3"];
    let participants: Vec<Participant> = names
        .iter()
        .map(|name| {
            join(
                &bus,
                name,
                FakeCapture::ready(FakeLocalStream::new()),
                loopback(0.0),
                FakeOutput::new(),
            )
        })
        .collect();

    for (participant, name) in participants.iter().zip(names) {
        let view = wait_view(&participant.handle, name, |v| {
            v.peers.len() == 2 && v.peers.iter().all(|p| p.state == PeerState::Connected)
        })
        .await;
        for peer in &view.peers {
            assert_eq!(
                peer.is_initiator,
                name < peer.id.as_str(),
                "{name} -> {}",
                peer.id
            );
        }
    }

    for participant in &participants {
        participant.handle.leave().await.unwrap();
    }
}

#[tokio::test]
async fn participants_hear_each_other_speak() {
    let bus = MemoryBus::new();
    let a1 = join(
        &bus,
        "a1",
        FakeCapture::ready(FakeLocalStream::new()),
        loopback(90.0),
        FakeOutput::new(),
    );
    let b2 = join(
        &bus,
        "b2",
        FakeCapture::ready(FakeLocalStream::new()),
        loopback(90.0),
        FakeOutput::new(),
    );

    wait_view(&a1.handle, "a1 hears b2", |v| v.speaking.contains(&id("b2"))).await;
    wait_view(&b2.handle, "b2 hears a1", |v| v.speaking.contains(&id("a1"))).await;

    a1.handle.leave().await.unwrap();
    b2.handle.leave().await.unwrap();
}
