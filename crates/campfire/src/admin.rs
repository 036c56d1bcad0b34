//! Session controls: tempo, window length, transport, loop removal.
//!
//! Each action returns the unstamped next state, or `None` when the request
//! would not change anything and there is nothing to publish.

use campproto::{
    clamp_bpm, clamp_window_cycles, composition_window_ms, LoopId, Participant, ParticipantId,
    SessionState,
};

use crate::arbiter::rescale_turn;
use crate::commit::require_turn;
use crate::error::Rejection;
use crate::presence;

/// The creator administers the session. Once the creator has gone, the
/// queue head takes over.
pub fn is_admin(state: &SessionState, queue: &[Participant], id: &ParticipantId) -> bool {
    if &state.creator_id == id {
        return true;
    }
    !presence::contains(queue, &state.creator_id) && presence::is_leader(queue, id)
}

fn require_admin(
    state: &SessionState,
    queue: &[Participant],
    id: &ParticipantId,
    action: &'static str,
) -> Result<(), Rejection> {
    if is_admin(state, queue, id) {
        Ok(())
    } else {
        Err(Rejection::NotAdmin(id.clone(), action))
    }
}

fn require_present(queue: &[Participant], id: &ParticipantId) -> Result<(), Rejection> {
    if presence::contains(queue, id) {
        Ok(())
    } else {
        Err(Rejection::NotPresent(id.clone()))
    }
}

/// Change the shared tempo. The value is clamped; an in-flight turn is
/// rescaled to the new window.
pub fn set_bpm(
    state: &SessionState,
    queue: &[Participant],
    requester: &ParticipantId,
    bpm: f64,
    now: i64,
) -> Result<Option<SessionState>, Rejection> {
    require_admin(state, queue, requester, "change tempo")?;
    let bpm = clamp_bpm(bpm);
    if bpm == state.bpm {
        return Ok(None);
    }
    Ok(Some(retimed(state, bpm, state.window_cycles, now)))
}

/// Change the composition window length. The value snaps to a valid cycle count.
pub fn set_window_cycles(
    state: &SessionState,
    queue: &[Participant],
    requester: &ParticipantId,
    cycles: u32,
    now: i64,
) -> Result<Option<SessionState>, Rejection> {
    require_admin(state, queue, requester, "change window length")?;
    let cycles = clamp_window_cycles(cycles);
    if cycles == state.window_cycles {
        return Ok(None);
    }
    Ok(Some(retimed(state, state.bpm, cycles, now)))
}

fn retimed(state: &SessionState, bpm: f64, cycles: u32, now: i64) -> SessionState {
    let old_window = state.composition_window_ms();
    let new_window = composition_window_ms(bpm, cycles);
    let mut next = state.clone();
    next.bpm = bpm;
    next.window_cycles = cycles;
    next.active_turn = state
        .active_turn
        .as_ref()
        .map(|turn| rescale_turn(turn, old_window, new_window, now));
    next
}

/// Start the shared transport with loop position zero at `now`.
pub fn start_playback(
    state: &SessionState,
    queue: &[Participant],
    requester: &ParticipantId,
    now: i64,
) -> Result<Option<SessionState>, Rejection> {
    require_present(queue, requester)?;
    if state.is_playing() {
        return Ok(None);
    }
    let mut next = state.clone();
    next.playback_started_at = Some(now);
    Ok(Some(next))
}

pub fn stop_playback(
    state: &SessionState,
    queue: &[Participant],
    requester: &ParticipantId,
) -> Result<Option<SessionState>, Rejection> {
    require_present(queue, requester)?;
    if !state.is_playing() {
        return Ok(None);
    }
    let mut next = state.clone();
    next.playback_started_at = None;
    Ok(Some(next))
}

/// Drop a committed loop without adding one. Same precondition as a
/// commit; the turn does not move.
pub fn remove_loop(
    state: &SessionState,
    requester: &ParticipantId,
    loop_id: &LoopId,
    now: i64,
) -> Result<SessionState, Rejection> {
    require_turn(state, requester, now)?;
    if state.find_loop(loop_id).is_none() {
        return Err(Rejection::UnknownLoop(loop_id.clone()));
    }
    let mut next = state.clone();
    next.loops.retain(|l| &l.id != loop_id);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campproto::{Instrument, Loop, Turn, BPM_MAX, MIN_TURN_BUFFER_MS};

    fn p(id: &str, joined_at: i64) -> Participant {
        Participant::new(id, "#fff", joined_at).with_id(id)
    }

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn state() -> SessionState {
        SessionState::genesis(id("p0"), 120.0, 4, None)
    }

    #[test]
    fn test_creator_then_head_administers() {
        let s = state();
        let with_creator = vec![p("p0", 0), p("p1", 1)];
        assert!(is_admin(&s, &with_creator, &id("p0")));
        assert!(!is_admin(&s, &with_creator, &id("p1")));

        let without_creator = vec![p("p1", 1), p("p2", 2)];
        assert!(is_admin(&s, &without_creator, &id("p1")));
        assert!(!is_admin(&s, &without_creator, &id("p2")));
    }

    #[test]
    fn test_bpm_is_clamped_and_unchanged_is_noop() {
        let queue = vec![p("p0", 0)];
        let next = set_bpm(&state(), &queue, &id("p0"), 400.0, 0).unwrap().unwrap();
        assert_eq!(next.bpm, BPM_MAX);
        assert_eq!(set_bpm(&state(), &queue, &id("p0"), 120.0, 0), Ok(None));
        assert_eq!(
            set_bpm(&state(), &queue, &id("p9"), 90.0, 0),
            Err(Rejection::NotAdmin(id("p9"), "change tempo"))
        );
    }

    #[test]
    fn test_tempo_change_rescales_running_turn() {
        let queue = vec![p("p0", 0), p("p1", 1)];
        let mut s = state();
        s.active_turn = Some(Turn::new(id("p1"), 0, 32_000));

        // Halving the tempo doubles the window; 24s remaining becomes 48s.
        let next = set_bpm(&s, &queue, &id("p0"), 60.0, 8_000).unwrap().unwrap();
        let turn = next.active_turn.clone().unwrap();
        assert_eq!(turn.user_id, id("p1"));
        assert_eq!(turn.ends_at, 56_000);
        assert_eq!(turn.ends_at - turn.started_at, next.composition_window_ms());
    }

    #[test]
    fn test_window_shrink_keeps_buffer() {
        let queue = vec![p("p0", 0)];
        let mut s = state();
        s.active_turn = Some(Turn::new(id("p0"), 0, 32_000));

        let next = set_window_cycles(&s, &queue, &id("p0"), 2, 31_500)
            .unwrap()
            .unwrap();
        assert_eq!(next.window_cycles, 2);
        assert_eq!(next.active_turn.unwrap().ends_at, 31_500 + MIN_TURN_BUFFER_MS);

        let snapped = set_window_cycles(&s, &queue, &id("p0"), 7, 0).unwrap().unwrap();
        assert_eq!(snapped.window_cycles, 8);
    }

    #[test]
    fn test_playback_toggles() {
        let queue = vec![p("p0", 0), p("p1", 1)];
        let started = start_playback(&state(), &queue, &id("p1"), 5_000)
            .unwrap()
            .unwrap();
        assert_eq!(started.playback_started_at, Some(5_000));
        assert_eq!(start_playback(&started, &queue, &id("p0"), 9_000), Ok(None));

        let stopped = stop_playback(&started, &queue, &id("p0")).unwrap().unwrap();
        assert!(!stopped.is_playing());
        assert_eq!(
            stop_playback(&started, &queue, &id("ghost")),
            Err(Rejection::NotPresent(id("ghost")))
        );
    }

    #[test]
    fn test_remove_loop_needs_turn() {
        let mut s = state();
        let l = Loop::new(&p("p0", 0), Instrument::Lead, vec![], 1);
        let loop_id = l.id.clone();
        s.loops.push(l);

        assert_eq!(
            remove_loop(&s, &id("p0"), &loop_id, 0),
            Err(Rejection::NotYourTurn(id("p0")))
        );

        s.active_turn = Some(Turn::new(id("p0"), 0, 32_000));
        let next = remove_loop(&s, &id("p0"), &loop_id, 10).unwrap();
        assert!(next.loops.is_empty());
        assert_eq!(
            remove_loop(&next, &id("p0"), &loop_id, 10),
            Err(Rejection::UnknownLoop(loop_id))
        );
    }
}
