//! Turn arbitration.
//!
//! Evaluation is level-triggered: every tick recomputes the desired turn
//! from the latest state and queue, so a missed publish is retried on the
//! next tick without extra bookkeeping. Every peer evaluates; only the
//! queue head publishes the result.

use campproto::{Participant, ParticipantId, SessionState, Turn, MIN_TURN_BUFFER_MS};
use tracing::debug;

use crate::error::Rejection;
use crate::presence;

/// Why the turn moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    Expired,
    Departed,
    Passed,
    Committed,
}

impl RotationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationReason::Expired => "expired",
            RotationReason::Departed => "departed",
            RotationReason::Passed => "passed",
            RotationReason::Committed => "committed",
        }
    }
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition the state machine wants to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDecision {
    /// No turn was active and the queue is non-empty.
    Start(Turn),
    Rotate {
        from: ParticipantId,
        turn: Turn,
        reason: RotationReason,
    },
}

impl TurnDecision {
    pub fn turn(&self) -> &Turn {
        match self {
            TurnDecision::Start(turn) | TurnDecision::Rotate { turn, .. } => turn,
        }
    }

    /// The unstamped state that carries this decision.
    pub fn apply_to(&self, state: &SessionState) -> SessionState {
        let mut next = state.clone();
        next.active_turn = Some(self.turn().clone());
        next
    }
}

/// Who holds the turn after `current`.
///
/// The member right after `current` in the queue, wrapping around. If
/// `current` has left, the member now sitting at its last known index takes
/// over, which is the one that was right behind it.
pub fn next_holder<'a>(
    queue: &'a [Participant],
    current: &ParticipantId,
    last_known_index: Option<usize>,
) -> Option<&'a Participant> {
    if queue.is_empty() {
        return None;
    }
    let index = match presence::position_of(queue, current) {
        Some(i) => (i + 1) % queue.len(),
        None => last_known_index.unwrap_or(0) % queue.len(),
    };
    queue.get(index)
}

/// Adjust an in-flight turn to a new composition window.
///
/// Progress through the turn is kept proportional, so a turn half done
/// stays half done. The result never ends sooner than
/// [`MIN_TURN_BUFFER_MS`] from `now`, and `ends_at - started_at` always
/// equals `new_window_ms`.
pub fn rescale_turn(turn: &Turn, old_window_ms: i64, new_window_ms: i64, now: i64) -> Turn {
    let remaining = turn.remaining_ms(now);
    let scaled = if old_window_ms > 0 {
        (remaining as f64 * new_window_ms as f64 / old_window_ms as f64).round() as i64
    } else {
        new_window_ms
    };
    let ends_at = (now + scaled).max(now + MIN_TURN_BUFFER_MS);
    Turn {
        user_id: turn.user_id.clone(),
        started_at: ends_at - new_window_ms,
        ends_at,
    }
}

/// Per-peer arbitration memory: the current holder's last seen queue index.
#[derive(Debug, Default, Clone)]
pub struct TurnArbiter {
    last_known: Option<(ParticipantId, usize)>,
}

impl TurnArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember where the turn holder sits while they are still present.
    pub fn observe(&mut self, state: &SessionState, queue: &[Participant]) {
        let Some(holder) = state.turn_holder() else {
            return;
        };
        if let Some(index) = presence::position_of(queue, holder) {
            self.last_known = Some((holder.clone(), index));
        }
    }

    /// Last queue index seen for `holder`, if they were the one remembered.
    pub fn last_known_index(&self, holder: &ParticipantId) -> Option<usize> {
        self.last_known
            .as_ref()
            .filter(|(id, _)| id == holder)
            .map(|(_, index)| *index)
    }

    /// The transition due right now, if any.
    pub fn evaluate(
        &mut self,
        state: &SessionState,
        queue: &[Participant],
        now: i64,
    ) -> Option<TurnDecision> {
        self.observe(state, queue);
        let window = state.composition_window_ms();

        let Some(turn) = &state.active_turn else {
            let head = presence::queue_head(queue)?;
            return Some(TurnDecision::Start(Turn::new(head.id.clone(), now, window)));
        };

        let reason = if !presence::contains(queue, &turn.user_id) {
            RotationReason::Departed
        } else if turn.is_expired(now) {
            RotationReason::Expired
        } else {
            return None;
        };

        self.rotate(turn, queue, reason, window, now)
    }

    /// Hand the turn on because its holder asked to.
    pub fn pass(
        &mut self,
        state: &SessionState,
        queue: &[Participant],
        requester: &ParticipantId,
        now: i64,
    ) -> Result<TurnDecision, Rejection> {
        self.observe(state, queue);
        let turn = state
            .active_turn
            .as_ref()
            .filter(|t| &t.user_id == requester)
            .ok_or_else(|| Rejection::NotYourTurn(requester.clone()))?;

        self.rotate(
            turn,
            queue,
            RotationReason::Passed,
            state.composition_window_ms(),
            now,
        )
        .ok_or_else(|| Rejection::NotPresent(requester.clone()))
    }

    /// The turn that follows `turn`, for any reason.
    pub fn rotate(
        &self,
        turn: &Turn,
        queue: &[Participant],
        reason: RotationReason,
        window_ms: i64,
        now: i64,
    ) -> Option<TurnDecision> {
        let next = next_holder(queue, &turn.user_id, self.last_known_index(&turn.user_id))?;
        debug!(from = %turn.user_id, to = %next.id, %reason, "turn rotation");
        Some(TurnDecision::Rotate {
            from: turn.user_id.clone(),
            turn: Turn::new(next.id.clone(), now, window_ms),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(id: &str, joined_at: i64) -> Participant {
        Participant::new(id, "#fff", joined_at).with_id(id)
    }

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn session() -> SessionState {
        SessionState::genesis(id("p0"), 120.0, 4, None)
    }

    #[test]
    fn test_start_goes_to_head() {
        let queue = presence::compute_queue(&[p("p1", 1), p("p0", 0)]);
        let mut arbiter = TurnArbiter::new();

        let decision = arbiter.evaluate(&session(), &queue, 1_000).unwrap();
        assert_eq!(
            decision,
            TurnDecision::Start(Turn {
                user_id: id("p0"),
                started_at: 1_000,
                ends_at: 33_000,
            })
        );
    }

    #[test]
    fn test_nothing_to_do_without_queue_or_while_turn_runs() {
        let mut arbiter = TurnArbiter::new();
        assert!(arbiter.evaluate(&session(), &[], 0).is_none());

        let queue = vec![p("p0", 0)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("p0"), 0, 32_000));
        assert!(arbiter.evaluate(&state, &queue, 31_999).is_none());
    }

    #[test]
    fn test_expired_turn_rotates_to_next() {
        let queue = vec![p("p0", 0), p("p1", 1), p("p2", 2)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("p2"), 0, 32_000));
        let mut arbiter = TurnArbiter::new();

        let decision = arbiter.evaluate(&state, &queue, 32_000).unwrap();
        match decision {
            TurnDecision::Rotate { from, turn, reason } => {
                assert_eq!(from, id("p2"));
                assert_eq!(turn.user_id, id("p0"));
                assert_eq!(reason, RotationReason::Expired);
            }
            other => panic!("expected rotation, got {:?}", other),
        }
    }

    #[test]
    fn test_departed_holder_hands_off_to_successor() {
        let mut queue = vec![p("p0", 0), p("p1", 1), p("p2", 2)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("p1"), 0, 32_000));
        let mut arbiter = TurnArbiter::new();
        assert!(arbiter.evaluate(&state, &queue, 100).is_none());
        assert_eq!(arbiter.last_known_index(&id("p1")), Some(1));

        queue.remove(1);
        let decision = arbiter.evaluate(&state, &queue, 200).unwrap();
        assert_eq!(decision.turn().user_id, id("p2"));
        assert!(matches!(
            decision,
            TurnDecision::Rotate {
                reason: RotationReason::Departed,
                ..
            }
        ));
    }

    #[test]
    fn test_departed_last_member_wraps_to_head() {
        let mut queue = vec![p("p0", 0), p("p1", 1), p("p2", 2)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("p2"), 0, 32_000));
        let mut arbiter = TurnArbiter::new();
        arbiter.observe(&state, &queue);

        queue.pop();
        let decision = arbiter.evaluate(&state, &queue, 10).unwrap();
        assert_eq!(decision.turn().user_id, id("p0"));
    }

    #[test]
    fn test_unknown_departed_holder_falls_back_to_head() {
        let queue = vec![p("p0", 0), p("p2", 2)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("stranger"), 0, 32_000));

        let decision = TurnArbiter::new().evaluate(&state, &queue, 10).unwrap();
        assert_eq!(decision.turn().user_id, id("p0"));
    }

    #[test]
    fn test_pass_requires_holder() {
        let queue = vec![p("p0", 0), p("p1", 1)];
        let mut state = session();
        state.active_turn = Some(Turn::new(id("p0"), 0, 32_000));
        let mut arbiter = TurnArbiter::new();

        assert_eq!(
            arbiter.pass(&state, &queue, &id("p1"), 5),
            Err(Rejection::NotYourTurn(id("p1")))
        );

        let decision = arbiter.pass(&state, &queue, &id("p0"), 5).unwrap();
        assert_eq!(decision.turn().user_id, id("p1"));
        assert_eq!(decision.turn().started_at, 5);
        let next = decision.apply_to(&state);
        assert_eq!(next.turn_holder(), Some(&id("p1")));
    }

    #[test]
    fn test_solo_player_keeps_the_turn() {
        let queue = vec![p("p0", 0)];
        assert_eq!(next_holder(&queue, &id("p0"), Some(0)).unwrap().id, id("p0"));
        assert!(next_holder(&[], &id("p0"), Some(0)).is_none());
    }

    #[test]
    fn test_rescale_is_proportional() {
        // Half way through a 32s turn; the window doubles.
        let turn = Turn::new(id("p0"), 0, 32_000);
        let rescaled = rescale_turn(&turn, 32_000, 64_000, 16_000);
        assert_eq!(rescaled.ends_at, 48_000);
        assert_eq!(rescaled.ends_at - rescaled.started_at, 64_000);
        assert_eq!(rescaled.user_id, id("p0"));
    }

    #[test]
    fn test_rescale_never_ends_inside_buffer() {
        let turn = Turn::new(id("p0"), 0, 32_000);
        let rescaled = rescale_turn(&turn, 32_000, 8_000, 31_000);
        assert_eq!(rescaled.ends_at, 31_000 + MIN_TURN_BUFFER_MS);
        assert_eq!(rescaled.ends_at - rescaled.started_at, 8_000);

        // Already expired turns also get the buffer.
        let late = rescale_turn(&turn, 32_000, 64_000, 40_000);
        assert_eq!(late.ends_at, 40_000 + MIN_TURN_BUFFER_MS);
    }
}
