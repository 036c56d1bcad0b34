//! campfire - turn-based collaborative loop sessions without a server
//!
//! A handful of peers share one [`SessionState`](campproto::SessionState)
//! over a publish/subscribe relay. Nobody owns it. Each peer keeps a local
//! copy and replaces it whenever a higher version arrives; the participant
//! who joined first leads, deciding whose turn it is; the turn holder
//! composes a loop and commits it, which hands the turn on.
//!
//! Components, leaves first:
//! - [`presence`]: deterministic participant queue from presence membership
//! - [`reconciler`]: version-stamped last-writer-wins merge and bootstrap
//! - [`arbiter`]: level-triggered turn start, expiry, departure, and pass
//! - [`commit`]: capacity, drum exclusivity, and scale rules for commits
//! - [`clock`]: shared loop position from one epoch timestamp
//!
//! [`peer`] wires them into a single reactor task per peer, talking to the
//! transport through the [`relay::Relay`] trait.

pub mod admin;
pub mod arbiter;
pub mod clock;
pub mod commit;
pub mod draft;
pub mod error;
pub mod identity;
pub mod peer;
pub mod presence;
pub mod reconciler;
pub mod relay;
pub mod telemetry;

pub use arbiter::{RotationReason, TurnArbiter, TurnDecision};
pub use clock::{ClockSync, LocalTransport, ResyncReason, TickTransport, WallClock};
pub use draft::Draft;
pub use error::{PeerError, Rejection};
pub use peer::{
    AdminOp, CommitReceipt, DraftOp, Peer, PeerConfig, PeerEvent, PeerHandle, PeerSnapshot,
    Publication,
};
pub use presence::{compute_queue, PresenceRoster};
pub use reconciler::{ApplyOutcome, StateReconciler};
pub use relay::{LocalRelay, PresenceEvent, Relay, RelayError, RelayEvent, Subscription};
