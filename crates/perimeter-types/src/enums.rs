//! Enumeration types shared across the Perimeter workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Kind of geofence alert raised by a containment transition.
///
/// Exactly one kind is produced per (entity, zone, position) evaluation:
/// `Enter` on the outside-to-inside flip, `Exit` on the inside-to-outside
/// flip, and `Dwell` at most once per continuous stay once the configured
/// dwell duration has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// The entity crossed from outside the zone to inside.
    Enter,
    /// The entity crossed from inside the zone to outside.
    Exit,
    /// The entity has remained inside the zone for at least the
    /// configured dwell duration.
    Dwell,
}

impl AlertKind {
    /// Stable wire name for the alert kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Dwell => "dwell",
        }
    }
}

impl core::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
