//! End-to-end sessions over the in-process relay.
//!
//! Every test runs on paused tokio time. Peers share one `WallClock`, so
//! epoch millis advance only when the test sleeps.

use std::sync::Arc;
use std::time::Duration;

use campconf::SessionSeedConfig;
use campfire::{
    DraftOp, LocalRelay, Peer, PeerConfig, PeerError, PeerEvent, PeerHandle, Rejection, Relay,
    WallClock,
};
use campproto::{
    DrumVoice, Envelope, Instrument, Participant, ParticipantId, Pitch, SessionState,
};
use pretty_assertions::assert_eq;

const EPOCH: i64 = 1_700_000_000_000;

fn clock() -> WallClock {
    WallClock::starting_at(EPOCH)
}

fn config(clock: WallClock, window_cycles: u32) -> PeerConfig {
    PeerConfig {
        history_limit: 25,
        relay_timeout: Duration::from_millis(500),
        arbitration_interval: Duration::from_millis(1_000),
        bpm_ramp: Duration::from_millis(250),
        seed: SessionSeedConfig {
            bpm: 120.0,
            window_cycles,
            autoplay: true,
        },
        clock,
    }
}

fn participant(id: &str, joined_at: i64) -> Participant {
    Participant::new(id, "#f97316", joined_at).with_id(id)
}

async fn join(relay: &LocalRelay, id: &str, joined_at: i64, clock: WallClock) -> PeerHandle {
    join_with(relay, id, joined_at, config(clock, 4)).await
}

async fn join_with(relay: &LocalRelay, id: &str, joined_at: i64, config: PeerConfig) -> PeerHandle {
    Peer::join(Arc::new(relay.clone()), participant(id, joined_at), config)
        .await
        .expect("join should succeed")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn id(s: &str) -> ParticipantId {
    ParticipantId::from(s)
}

async fn holder(peer: &PeerHandle) -> Option<ParticipantId> {
    peer.turn_holder().await.expect("peer running")
}

async fn state(peer: &PeerHandle) -> SessionState {
    peer.state()
        .await
        .expect("peer running")
        .expect("session exists")
}

#[tokio::test(start_paused = true)]
async fn test_first_peer_bootstraps_and_takes_first_turn() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    settle().await;

    let s = state(&p0).await;
    assert_eq!(s.creator_id, id("p0"));
    assert_eq!(s.bpm, 120.0);
    assert_eq!(s.window_cycles, 4);
    assert!(s.version >= EPOCH as u64);
    assert!(s.is_playing());

    let turn = s.active_turn.expect("turn started");
    assert_eq!(turn.user_id, id("p0"));
    assert_eq!(turn.ends_at - turn.started_at, 32_000);

    let snapshot = p0.snapshot().await.unwrap();
    assert!(snapshot.is_leader);
    assert!(snapshot.transport_position.is_some());
    assert!(relay.history_len().await >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_adopts_from_history() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    settle().await;

    // No live delivery yet; the state must come from history during join.
    let p1 = join(&relay, "p1", 1, clock).await;
    assert_eq!(p1.state().await.unwrap(), Some(state(&p0).await));

    settle().await;
    let queue: Vec<ParticipantId> = p1.queue().await.unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(queue, vec![id("p0"), id("p1")]);
    assert!(!p1.snapshot().await.unwrap().is_leader);
}

#[tokio::test(start_paused = true)]
async fn test_only_queue_head_bootstraps() {
    let relay = LocalRelay::new();
    let clock = clock();

    // A silent member heads the queue but never creates anything.
    let silent = participant("p0", 0);
    relay.enter(silent.clone()).await.unwrap();

    let p1 = join(&relay, "p1", 1, clock).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(p1.state().await.unwrap(), None);

    // Once the head is gone, p1 is head at its next check.
    relay.leave(&silent).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let s = state(&p1).await;
    assert_eq!(s.creator_id, id("p1"));
    assert_eq!(holder(&p1).await, Some(id("p1")));
}

#[tokio::test(start_paused = true)]
async fn test_departed_holder_hands_turn_to_successor() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    let p2 = join(&relay, "p2", 2, clock).await;
    settle().await;
    assert_eq!(holder(&p0).await, Some(id("p0")));

    let passed = p0.pass().await.unwrap();
    assert!(passed.delivered);
    settle().await;
    assert_eq!(holder(&p2).await, Some(id("p1")));

    p1.leave().await;
    settle().await;

    let queue: Vec<ParticipantId> = p0.queue().await.unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(queue, vec![id("p0"), id("p2")]);
    assert_eq!(holder(&p0).await, Some(id("p2")));
    assert_eq!(holder(&p2).await, Some(id("p2")));
    assert_eq!(state(&p0).await, state(&p2).await);
}

#[tokio::test(start_paused = true)]
async fn test_expired_turn_rotates_within_one_tick() {
    let relay = LocalRelay::new();
    let clock = clock();
    // 120 bpm, 2 cycles: a 16 second window.
    let p0 = join_with(&relay, "p0", 0, config(clock, 2)).await;
    let p1 = join_with(&relay, "p1", 1, config(clock, 2)).await;
    settle().await;

    let first = state(&p0).await.active_turn.unwrap();
    assert_eq!(first.user_id, id("p0"));
    assert_eq!(first.ends_at - first.started_at, 16_000);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(holder(&p1).await, Some(id("p0")));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(holder(&p1).await, Some(id("p1")));
    assert_eq!(holder(&p0).await, Some(id("p1")));
}

#[tokio::test(start_paused = true)]
async fn test_commit_publishes_loop_and_next_turn_together() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;

    let mut events = p1.events();
    let kick = Pitch::Drum(DrumVoice::Kick);
    p0.toggle(kick.clone(), 0).await.unwrap();
    p0.toggle(kick.clone(), 8).await.unwrap();
    let receipt = p0.commit().await.unwrap();
    assert!(receipt.publication.delivered);
    assert_eq!(receipt.replaced, None);
    settle().await;

    let s = state(&p1).await;
    assert_eq!(s.version, receipt.publication.version);
    assert_eq!(s.loops.len(), 1);
    assert_eq!(s.loops[0].user_id, id("p0"));
    assert_eq!(s.turn_holder(), Some(&id("p1")));
    assert!(p1.is_step_active(&receipt.loop_id, &kick, 8).await.unwrap());
    assert!(!p1.is_step_active(&receipt.loop_id, &kick, 4).await.unwrap());

    // One adoption carried both the loop and the turn change.
    let mut adopted = 0;
    let mut turn_changes = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            PeerEvent::StateAdopted { .. } => adopted += 1,
            PeerEvent::TurnChanged { holder, .. } => {
                assert_eq!(holder, Some(id("p1")));
                turn_changes += 1;
            }
            _ => {}
        }
    }
    assert_eq!(adopted, 1);
    assert_eq!(turn_changes, 1);

    // The committer's draft was cleared.
    assert!(p0.snapshot().await.unwrap().draft.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_commits_change_nothing() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;
    let before = state(&p0).await;

    p1.toggle(Pitch::Drum(DrumVoice::Snare), 4).await.unwrap();
    match p1.commit().await {
        Err(PeerError::Rejected(Rejection::NotYourTurn(who))) => assert_eq!(who, id("p1")),
        other => panic!("expected NotYourTurn, got {:?}", other),
    }

    match p0.commit().await {
        Err(PeerError::Rejected(Rejection::EmptyDraft)) => {}
        other => panic!("expected EmptyDraft, got {:?}", other),
    }

    match p0.toggle(Pitch::tone("C4"), 0).await {
        Err(PeerError::Rejected(Rejection::PitchMismatch { .. })) => {}
        other => panic!("expected PitchMismatch, got {:?}", other),
    }

    settle().await;
    assert_eq!(state(&p0).await, before);
    assert_eq!(state(&p1).await, before);
}

#[tokio::test(start_paused = true)]
async fn test_drum_conflict_is_reported_until_resolved() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;

    let kick = Pitch::Drum(DrumVoice::Kick);
    p0.toggle(kick.clone(), 0).await.unwrap();
    p0.commit().await.unwrap();
    settle().await;

    p1.toggle(kick.clone(), 2).await.unwrap();
    p1.toggle(Pitch::Drum(DrumVoice::HiHat), 3).await.unwrap();
    match p1.commit().await {
        Err(PeerError::Rejected(Rejection::SoundConflict { voices })) => {
            assert_eq!(voices, vec![DrumVoice::Kick])
        }
        other => panic!("expected SoundConflict, got {:?}", other),
    }

    let draft = p1.toggle(kick, 2).await.unwrap();
    assert_eq!(draft.len(), 1);
    let receipt = p1.commit().await.unwrap();
    settle().await;

    let s = state(&p0).await;
    assert_eq!(s.loop_count(Instrument::Drums), 2);
    assert!(s.find_loop(&receipt.loop_id).is_some());
    assert_eq!(s.turn_holder(), Some(&id("p0")));
}

#[tokio::test(start_paused = true)]
async fn test_failed_publish_keeps_local_state_and_heals() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;

    let mut events = p0.events();
    p0.edit_draft(DraftOp::SetInstrument(Instrument::Bass))
        .await
        .unwrap();
    p0.toggle(Pitch::tone("C2"), 0).await.unwrap();

    relay.fail_next_publishes(1).await;
    let receipt = p0.commit().await.unwrap();
    assert!(!receipt.publication.delivered);

    // Adopted optimistically on the committer only.
    assert_eq!(state(&p0).await.loops.len(), 1);
    settle().await;
    assert!(state(&p1).await.loops.is_empty());

    let mut lost = false;
    while let Ok(event) = events.try_recv() {
        if let PeerEvent::ConnectivityLost { operation, .. } = event {
            assert_eq!(operation, "publish");
            lost = true;
        }
    }
    assert!(lost);

    // The next arbitration tick offers it again.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let healed = state(&p1).await;
    assert_eq!(healed.version, receipt.publication.version);
    assert_eq!(healed.loops.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicates_and_stale_messages_do_not_disturb() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;
    relay.set_duplicate_delivery(true).await;

    let genesis_era = state(&p1).await;
    p0.toggle(Pitch::Drum(DrumVoice::Clap), 1).await.unwrap();
    p0.commit().await.unwrap();
    settle().await;
    let latest = state(&p0).await;
    assert_eq!(state(&p1).await, latest);

    // A late copy of an older state arrives.
    relay.inject(Envelope::state(id("p0"), genesis_era));
    settle().await;
    assert_eq!(state(&p1).await, latest);
    assert_eq!(state(&p0).await, latest);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_geneses_settle_on_higher_version() {
    let creator_a = SessionState::genesis(id("a"), 100.0, 4, None);
    let creator_b = SessionState::genesis(id("b"), 150.0, 2, None);
    let mut v1000 = creator_a;
    v1000.version = 1_000;
    let mut v1001 = creator_b;
    v1001.version = 1_001;

    for order in [[&v1000, &v1001], [&v1001, &v1000]] {
        let relay = LocalRelay::new();
        for s in order {
            relay
                .publish(Envelope::state(s.creator_id.clone(), s.clone()))
                .await
                .unwrap();
        }

        // A silent head keeps the observer from publishing turn changes.
        relay.enter(participant("a0", 0)).await.unwrap();
        let observer = join(&relay, "z", 9, clock()).await;
        settle().await;
        assert_eq!(observer.state().await.unwrap(), Some(v1001.clone()));
        observer.leave().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_leave_hands_admin_to_new_head() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;

    match p1.set_bpm(90.0).await {
        Err(PeerError::Rejected(Rejection::NotAdmin(who, _))) => assert_eq!(who, id("p1")),
        other => panic!("expected NotAdmin, got {:?}", other),
    }

    p0.leave().await;
    settle().await;
    assert!(!relay
        .members()
        .await
        .unwrap()
        .iter()
        .any(|p| p.id == id("p0")));
    assert_eq!(holder(&p1).await, Some(id("p1")));

    let publication = p1.set_bpm(90.0).await.unwrap().expect("tempo changed");
    assert!(publication.delivered);
    let s = state(&p1).await;
    assert_eq!(s.bpm, 90.0);
    let turn = s.active_turn.clone().unwrap();
    assert_eq!(turn.ends_at - turn.started_at, s.composition_window_ms());
}

#[tokio::test(start_paused = true)]
async fn test_tempo_change_and_pause_reach_every_transport() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;
    assert!(p1.snapshot().await.unwrap().transport_position.is_some());

    let mut events = p1.events();
    p0.set_bpm(150.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut tempo_resyncs = 0;
    while let Ok(event) = events.try_recv() {
        if let PeerEvent::Resynced {
            reason: campfire::ResyncReason::TempoChanged,
            position,
        } = event
        {
            assert!(position.is_some());
            tempo_resyncs += 1;
        }
    }
    assert_eq!(tempo_resyncs, 1);

    // Anyone present may stop the shared transport.
    assert!(p1.stop_playback().await.unwrap().is_some());
    assert_eq!(p1.stop_playback().await.unwrap(), None);
    settle().await;
    assert!(p0.snapshot().await.unwrap().transport_position.is_none());
    assert!(!state(&p0).await.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_every_adopted_state_respects_capacity() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock).await;
    settle().await;

    let peers = [&p0, &p1];
    let pitches = ["C4", "D4", "E4", "G4", "A4"];
    for round in 0..5 {
        let peer = peers[round % 2];
        peer.set_instrument(Instrument::Lead).await.unwrap();
        peer.toggle(Pitch::tone(pitches[round]), round as u8).await.unwrap();
        peer.commit().await.unwrap();
        settle().await;

        let s = state(&p0).await;
        assert!(s.loop_count(Instrument::Lead) <= Instrument::Lead.capacity());
    }

    let s = state(&p1).await;
    assert_eq!(s.loop_count(Instrument::Lead), 2);
    let newest: Vec<String> = s.loops.iter().map(|l| l.notes[0].pitch.to_string()).collect();
    assert_eq!(newest, vec!["G4".to_string(), "A4".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_skewed_peer_stays_within_its_skew() {
    let relay = LocalRelay::new();
    let clock = clock();
    let p0 = join(&relay, "p0", 0, clock).await;
    let p1 = join(&relay, "p1", 1, clock.skewed(120)).await;
    settle().await;

    let mut events = p1.events();
    // Two loop durations at 120 bpm.
    tokio::time::sleep(Duration::from_millis(16_500)).await;

    let mut periodic = 0;
    while let Ok(event) = events.try_recv() {
        if let PeerEvent::Resynced {
            reason: campfire::ResyncReason::Periodic,
            ..
        } = event
        {
            periodic += 1;
        }
    }
    assert!(periodic >= 1);

    let loop_secs = campproto::loop_duration_secs(120.0);
    let a = p0.snapshot().await.unwrap().transport_position.unwrap();
    let b = p1.snapshot().await.unwrap().transport_position.unwrap();
    let ahead = (b - a).rem_euclid(loop_secs);
    let drift = ahead.min(loop_secs - ahead);
    assert!((drift - 0.12).abs() < 0.01, "transports {a} and {b} drifted {drift}s");
}
