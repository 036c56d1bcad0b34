//! Ephemeral per-join identity.
//!
//! Ids are random v4 uuids and are never persisted. Unset display fields
//! are derived from the id bytes so the same id always looks the same.

use campconf::IdentityConfig;
use campproto::{Participant, ParticipantId};
use uuid::Uuid;

const COLORS: [&str; 8] = [
    "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#a855f7", "#ec4899", "#ef4444",
];

const ADJECTIVES: [&str; 8] = [
    "amber", "brisk", "cosmic", "dusky", "ember", "fuzzy", "glowing", "hazy",
];

const CRITTERS: [&str; 8] = [
    "otter", "heron", "lynx", "moth", "newt", "owl", "fox", "wren",
];

/// A fresh participant joining at `joined_at`.
pub fn generate(config: &IdentityConfig, joined_at: i64) -> Participant {
    let uuid = Uuid::new_v4();
    let bytes = uuid.as_bytes();

    let name = config.name.clone().unwrap_or_else(|| {
        format!(
            "{}-{}",
            ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()],
            CRITTERS[bytes[1] as usize % CRITTERS.len()]
        )
    });
    let color = config
        .color
        .clone()
        .unwrap_or_else(|| COLORS[bytes[2] as usize % COLORS.len()].to_string());

    Participant {
        id: ParticipantId::from(uuid.to_string()),
        name,
        color,
        joined_at,
    }
}
