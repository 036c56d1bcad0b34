//! Bot composers sharing one in-process relay.
//!
//! Each bot waits for its turn, sketches a pattern on an instrument chosen
//! by seat and round, and commits it. A drum conflict makes the bot drop
//! the clashing voices; if nothing is left it passes instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use campconf::CampConfig;
use campfire::{
    identity, DraftOp, LocalRelay, Peer, PeerConfig, PeerError, PeerEvent, PeerHandle, Rejection,
    Relay,
};
use campproto::{DrumVoice, Instrument, Pitch, Scale, STEP_COUNT};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pause between bot arrivals, so the join order is unambiguous.
const ARRIVAL_GAP: Duration = Duration::from_millis(200);

/// How long a bot "thinks" before committing.
const THINK_TIME: Duration = Duration::from_millis(750);

pub async fn run(
    config: &CampConfig,
    peers: usize,
    duration: Duration,
    json: bool,
) -> Result<()> {
    let history = config.infra.relay.history_limit.max(1);
    let relay = Arc::new(LocalRelay::with_history_capacity(history));
    let peer_config = PeerConfig::from_config(config);
    let cancel = CancellationToken::new();

    info!(
        "seating {} peers on {} for {:?}",
        peers, config.infra.relay.channel, duration
    );

    let mut bots = Vec::with_capacity(peers);
    for seat in 0..peers {
        let me = identity::generate(&config.bootstrap.identity, peer_config.clock.now_ms());
        let relay: Arc<dyn Relay> = relay.clone();
        let handle = Peer::join(relay, me, peer_config.clone())
            .await
            .with_context(|| format!("seat {} failed to join", seat))?;
        bots.push(tokio::spawn(compose(handle, seat, cancel.clone())));
        tokio::time::sleep(ARRIVAL_GAP).await;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    cancel.cancel();

    let mut handles = Vec::with_capacity(bots.len());
    for bot in bots {
        handles.push(bot.await.context("bot task panicked")?);
    }

    if let Some(first) = handles.first() {
        print_summary(first, json).await?;
    }
    for handle in handles {
        handle.leave().await;
    }
    Ok(())
}

async fn compose(handle: PeerHandle, seat: usize, cancel: CancellationToken) -> PeerHandle {
    let mut events = handle.events();
    // The reactor may have granted our first turn before we subscribed.
    let mut pending = granted_turn(&handle).await;
    let mut served = None;
    let mut round = 0usize;

    loop {
        let ends_at = match pending.take() {
            Some(ends_at) => ends_at,
            None => {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(PeerEvent::TurnChanged {
                        holder: Some(holder),
                        ends_at: Some(ends_at),
                    }) if holder == handle.me().id => ends_at,
                    Ok(PeerEvent::ConnectivityLost { operation, error }) => {
                        warn!(
                            "{}: connectivity lost during {}: {}",
                            handle.me().name,
                            operation,
                            error
                        );
                        continue;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        };
        if served == Some(ends_at) {
            continue;
        }
        served = Some(ends_at);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(THINK_TIME) => {}
        }
        if let Err(e) = take_turn(&handle, seat, round).await {
            warn!("{}: turn went wrong: {}", handle.me().name, e);
        }
        round += 1;
    }
    handle
}

/// End of the turn this peer currently holds, if any.
async fn granted_turn(handle: &PeerHandle) -> Option<i64> {
    let state = handle.snapshot().await.ok()?.state?;
    state
        .active_turn
        .filter(|turn| turn.user_id == handle.me().id)
        .map(|turn| turn.ends_at)
}

async fn take_turn(handle: &PeerHandle, seat: usize, round: usize) -> Result<(), PeerError> {
    let instrument = Instrument::ALL[(seat + round) % Instrument::ALL.len()];
    handle.set_instrument(instrument).await?;
    handle
        .edit_draft(DraftOp::SetScale(
            Scale::ALL[seat % Scale::ALL.len()],
        ))
        .await?;

    for (pitch, step) in pattern(instrument, seat, round) {
        handle.toggle(pitch, step).await?;
    }

    match handle.commit().await {
        Ok(receipt) => {
            info!(
                "{}: committed {} loop {}",
                handle.me().name,
                instrument,
                receipt.loop_id
            );
            Ok(())
        }
        Err(PeerError::Rejected(Rejection::SoundConflict { voices })) => {
            let draft = handle.snapshot().await?.draft;
            for note in draft.notes() {
                if note.pitch.drum_voice().is_some_and(|v| voices.contains(&v)) {
                    handle.toggle(note.pitch.clone(), note.step).await?;
                }
            }
            if handle.snapshot().await?.draft.is_empty() {
                info!("{}: every voice taken, passing", handle.me().name);
                handle.pass().await?;
            } else {
                handle.commit().await?;
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// A few notes derived from seat and round.
fn pattern(instrument: Instrument, seat: usize, round: usize) -> Vec<(Pitch, u8)> {
    let offset = ((seat + round) % 4) as u8;
    match instrument {
        Instrument::Drums => {
            let voice = DrumVoice::ALL[(seat + round) % DrumVoice::ALL.len()];
            (0..4)
                .map(|i| (Pitch::Drum(voice), (i * 4 + offset) % STEP_COUNT))
                .collect()
        }
        melodic => {
            let pitches = Scale::ALL[seat % Scale::ALL.len()].pitches(melodic);
            (0..6usize)
                .map(|i| {
                    let name = pitches[(seat + round + i * 2) % pitches.len()].clone();
                    (Pitch::tone(name), ((i as u8) * 3 + offset) % STEP_COUNT)
                })
                .collect()
        }
    }
}

async fn print_summary(handle: &PeerHandle, json: bool) -> Result<()> {
    let snapshot = handle.snapshot().await?;
    let Some(state) = snapshot.state else {
        println!("no session was created");
        return Ok(());
    };

    if json {
        let text = serde_json::to_string_pretty(&state).context("Failed to encode state")?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "session v{} at {} bpm, {} cycle window, {}",
        state.version,
        state.bpm,
        state.window_cycles,
        if state.is_playing() { "playing" } else { "paused" }
    );
    println!("queue:");
    for (i, p) in snapshot.queue.iter().enumerate() {
        let marker = if state.turn_holder() == Some(&p.id) { "*" } else { " " };
        println!("  {}{} {} {}", marker, i, p.name, p.color);
    }
    println!("loops:");
    for l in &state.loops {
        println!(
            "  {:<5} by {:<16} {:>2} notes",
            l.instrument.as_str(),
            l.user_name,
            l.notes.len()
        );
    }
    Ok(())
}
