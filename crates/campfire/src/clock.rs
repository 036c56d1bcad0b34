//! Playback clock synchronization.
//!
//! Every peer derives loop position from one shared epoch timestamp,
//! `playbackStartedAt`, so no clock needs to be exchanged. The local
//! transport free-runs between corrections; it is forced back onto the
//! shared position when playback starts or stops, shortly after a tempo
//! change, and every two loop lengths.

use std::time::Duration;

use campproto::{loop_duration_secs, SessionState};
use tokio::time::Instant;
use tracing::debug;

/// Position in seconds within the loop, or `None` while paused.
///
/// `bpm` is assumed to be clamped already.
pub fn position_in_loop(started_at: Option<i64>, bpm: f64, now_ms: i64) -> Option<f64> {
    let started_at = started_at?;
    let loop_secs = loop_duration_secs(bpm);
    let elapsed = (now_ms - started_at) as f64 / 1000.0;
    Some(elapsed.rem_euclid(loop_secs))
}

/// The audio side's transport, as far as synchronization cares.
pub trait LocalTransport: Send + Sync {
    fn is_running(&self) -> bool;

    /// Current position in seconds within the loop.
    fn position_secs(&self) -> f64;

    fn seek(&mut self, secs: f64);

    fn start(&mut self);

    /// Stop advancing without resetting position.
    fn pause(&mut self);

    fn set_loop_length(&mut self, secs: f64);
}

/// Monotonic free-running transport.
///
/// Stores the instant play started and the position at that moment; the
/// current position is the start position plus elapsed time, wrapped to the
/// loop length.
#[derive(Debug, Clone)]
pub struct TickTransport {
    start_instant: Option<Instant>,
    start_position: f64,
    current_position: f64,
    loop_secs: f64,
}

impl Default for TickTransport {
    fn default() -> Self {
        Self::new(loop_duration_secs(campproto::DEFAULT_BPM))
    }
}

impl TickTransport {
    pub fn new(loop_secs: f64) -> Self {
        Self {
            start_instant: None,
            start_position: 0.0,
            current_position: 0.0,
            loop_secs,
        }
    }

    /// Advance the cached position from elapsed time.
    pub fn tick(&mut self) -> f64 {
        let Some(start) = self.start_instant else {
            return self.current_position;
        };
        let elapsed = start.elapsed().as_secs_f64();
        self.current_position = (self.start_position + elapsed).rem_euclid(self.loop_secs);
        self.current_position
    }

    pub fn loop_secs(&self) -> f64 {
        self.loop_secs
    }
}

impl LocalTransport for TickTransport {
    fn is_running(&self) -> bool {
        self.start_instant.is_some()
    }

    fn position_secs(&self) -> f64 {
        match self.start_instant {
            Some(start) => {
                (self.start_position + start.elapsed().as_secs_f64()).rem_euclid(self.loop_secs)
            }
            None => self.current_position,
        }
    }

    fn seek(&mut self, secs: f64) {
        self.current_position = secs.rem_euclid(self.loop_secs);
        self.start_position = self.current_position;
        if self.start_instant.is_some() {
            self.start_instant = Some(Instant::now());
        }
    }

    fn start(&mut self) {
        if self.start_instant.is_none() {
            self.start_instant = Some(Instant::now());
            self.start_position = self.current_position;
        }
    }

    fn pause(&mut self) {
        if self.start_instant.is_some() {
            self.tick();
            self.start_instant = None;
        }
    }

    fn set_loop_length(&mut self, secs: f64) {
        if secs > 0.0 && secs != self.loop_secs {
            let position = self.tick();
            self.loop_secs = secs;
            self.seek(position);
        }
    }
}

/// Epoch milliseconds that advance with tokio's clock.
///
/// Anchored to the wall clock once; later readings add monotonic elapsed
/// time, so paused-time tests see time move only when they advance it.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    anchor_ms: i64,
    anchor: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::starting_at(campproto::now_ms())
    }
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.anchor_ms.saturating_add(elapsed)
    }

    /// Shift this clock, as a skewed peer would be.
    pub fn skewed(self, offset_ms: i64) -> Self {
        Self {
            anchor_ms: self.anchor_ms + offset_ms,
            anchor: self.anchor,
        }
    }
}

/// Why the transport was repositioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    PlaybackChanged,
    TempoChanged,
    Periodic,
}

/// Decides when the local transport must be forced onto the shared position.
#[derive(Debug, Clone)]
pub struct ClockSync {
    ramp: Duration,
    observed: Option<(Option<i64>, f64)>,
    ramp_deadline: Option<Instant>,
    periodic_deadline: Option<Instant>,
}

impl ClockSync {
    pub fn new(ramp: Duration) -> Self {
        Self {
            ramp,
            observed: None,
            ramp_deadline: None,
            periodic_deadline: None,
        }
    }

    /// Note a newly adopted state.
    ///
    /// Returns a reason when the transport must be resynced right away. A
    /// tempo change alone only arms the post-ramp deadline.
    pub fn observe(&mut self, state: &SessionState, now: Instant) -> Option<ResyncReason> {
        let current = (state.playback_started_at, state.bpm);
        let previous = self.observed.replace(current);

        match previous {
            None => Some(ResyncReason::PlaybackChanged),
            Some((started_at, _)) if started_at != current.0 => {
                Some(ResyncReason::PlaybackChanged)
            }
            Some((_, bpm)) if bpm != current.1 => {
                self.ramp_deadline = Some(now + self.ramp);
                None
            }
            Some(_) => None,
        }
    }

    /// A deadline that has passed, tempo ramps first.
    pub fn due(&self, now: Instant) -> Option<ResyncReason> {
        if self.ramp_deadline.is_some_and(|d| d <= now) {
            return Some(ResyncReason::TempoChanged);
        }
        if self.periodic_deadline.is_some_and(|d| d <= now) {
            return Some(ResyncReason::Periodic);
        }
        None
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.ramp_deadline, self.periodic_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Force the transport onto the shared position and rearm the
    /// periodic correction. Returns the position applied, if playing.
    pub fn resync(
        &mut self,
        transport: &mut dyn LocalTransport,
        state: &SessionState,
        now_ms: i64,
        now: Instant,
    ) -> Option<f64> {
        self.ramp_deadline = None;
        let loop_secs = loop_duration_secs(state.bpm);
        transport.set_loop_length(loop_secs);

        let Some(position) = position_in_loop(state.playback_started_at, state.bpm, now_ms) else {
            transport.pause();
            self.periodic_deadline = None;
            debug!("transport paused");
            return None;
        };

        transport.seek(position);
        if !transport.is_running() {
            transport.start();
        }
        self.periodic_deadline = Some(now + Duration::from_secs_f64(loop_secs * 2.0));
        debug!(position, loop_secs, "transport resynced");
        Some(position)
    }
}
