//! Input Intents
//!
//! Held-key state reported by the input collaborator each frame. Only the
//! booleans that matter to action state and combat are carried; movement
//! itself is applied by the physics layer, which reports back through
//! `ClientContext::set_local_pose`.

use serde::{Serialize, Deserialize};

use crate::game::combat::AttackKind;

/// Intent flags for a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputIntents {
    /// Packed bits:
    /// - Bit 0: Moving
    /// - Bit 1: Jump held
    /// - Bit 2: Block held
    /// - Bit 3: Punch held
    /// - Bit 4: Kick held
    /// - Bit 5-7: Reserved
    pub flags: u8,
}

impl InputIntents {
    /// Moving flag bit
    pub const FLAG_MOVE: u8 = 0x01;

    /// Jump flag bit
    pub const FLAG_JUMP: u8 = 0x02;

    /// Block flag bit
    pub const FLAG_BLOCK: u8 = 0x04;

    /// Punch flag bit
    pub const FLAG_PUNCH: u8 = 0x08;

    /// Kick flag bit
    pub const FLAG_KICK: u8 = 0x10;

    /// No intents held.
    pub const fn none() -> Self {
        Self { flags: 0 }
    }

    /// Build from raw flags.
    pub const fn from_flags(flags: u8) -> Self {
        Self { flags }
    }

    /// Copy with a flag set or cleared.
    pub const fn with(self, flag: u8, held: bool) -> Self {
        if held {
            Self { flags: self.flags | flag }
        } else {
            Self { flags: self.flags & !flag }
        }
    }

    /// Movement held.
    #[inline]
    pub fn moving(&self) -> bool {
        self.flags & Self::FLAG_MOVE != 0
    }

    /// Jump held.
    #[inline]
    pub fn jumping(&self) -> bool {
        self.flags & Self::FLAG_JUMP != 0
    }

    /// Block held.
    #[inline]
    pub fn blocking(&self) -> bool {
        self.flags & Self::FLAG_BLOCK != 0
    }

    /// Whether the intent for `kind` is held.
    #[inline]
    pub fn attack_held(&self, kind: AttackKind) -> bool {
        let flag = match kind {
            AttackKind::Punch => Self::FLAG_PUNCH,
            AttackKind::Kick => Self::FLAG_KICK,
        };
        self.flags & flag != 0
    }

    /// Attack requested this frame. Punch wins when both are held.
    pub fn attack(&self) -> Option<AttackKind> {
        if self.attack_held(AttackKind::Punch) {
            Some(AttackKind::Punch)
        } else if self.attack_held(AttackKind::Kick) {
            Some(AttackKind::Kick)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let intents = InputIntents::none()
            .with(InputIntents::FLAG_MOVE, true)
            .with(InputIntents::FLAG_KICK, true);

        assert!(intents.moving());
        assert!(!intents.jumping());
        assert!(!intents.blocking());
        assert_eq!(intents.attack(), Some(AttackKind::Kick));

        let released = intents.with(InputIntents::FLAG_KICK, false);
        assert_eq!(released.attack(), None);
    }

    #[test]
    fn test_punch_wins_tie() {
        let intents = InputIntents::from_flags(InputIntents::FLAG_PUNCH | InputIntents::FLAG_KICK);
        assert_eq!(intents.attack(), Some(AttackKind::Punch));
    }
}
