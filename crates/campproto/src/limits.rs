//! Fixed musical limits shared by every peer.
//!
//! These are compile-time constants, not negotiated at runtime: two peers
//! with different limits would disagree about which states are valid.

/// Steps in one loop.
pub const STEP_COUNT: u8 = 16;

pub const BPM_MIN: f64 = 60.0;
pub const BPM_MAX: f64 = 180.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Composition window lengths, in full loop cycles. Sorted ascending.
pub const VALID_WINDOW_CYCLES: [u32; 3] = [2, 4, 8];
pub const DEFAULT_WINDOW_CYCLES: u32 = 4;

/// Maximum committed drum loops at once.
pub const DRUM_LOOP_CAP: usize = 4;
/// Maximum committed loops per melodic instrument at once.
pub const MELODIC_LOOP_CAP: usize = 2;

const _: () = assert!(DRUM_LOOP_CAP > MELODIC_LOOP_CAP);

/// A rescaled turn never ends sooner than this far in the future.
pub const MIN_TURN_BUFFER_MS: i64 = 3_000;

/// Clamp a tempo into `[BPM_MIN, BPM_MAX]`. Non-finite input falls back to the default.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if !bpm.is_finite() {
        return DEFAULT_BPM;
    }
    bpm.clamp(BPM_MIN, BPM_MAX)
}

/// Snap a cycle count to the nearest valid value. Ties go to the smaller one.
pub fn clamp_window_cycles(cycles: u32) -> u32 {
    VALID_WINDOW_CYCLES
        .iter()
        .copied()
        .min_by_key(|valid| valid.abs_diff(cycles))
        .unwrap_or(DEFAULT_WINDOW_CYCLES)
}

/// Seconds per step at `bpm`. One step is one beat.
pub fn step_duration_secs(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Seconds for one pass through all steps.
pub fn loop_duration_secs(bpm: f64) -> f64 {
    step_duration_secs(bpm) * STEP_COUNT as f64
}

/// Length of a composition turn in milliseconds.
pub fn composition_window_ms(bpm: f64, window_cycles: u32) -> i64 {
    (loop_duration_secs(bpm) * window_cycles as f64 * 1000.0).round() as i64
}
