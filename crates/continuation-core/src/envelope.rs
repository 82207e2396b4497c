//! Migration envelope sent to instantiate the target-side ability.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AbilityDescriptor, StateBag};

/// Opaque token identifying the local ability instance to the ability manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityToken(pub Uuid);

impl AbilityToken {
    /// Allocate a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AbilityToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AbilityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Continuation flag set carried by an envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationFlags(u32);

impl ContinuationFlags {
    /// The ability is being created as the target of a continuation.
    pub const IS_CONTINUATION: Self = Self(0x0000_0008);
    /// The replica may later hand control back to the primary.
    pub const IS_REVERSIBLE: Self = Self(0x0000_0400);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ContinuationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Descriptor + state bag + flags.
///
/// Built fresh for every outbound migration and never mutated after it is
/// handed to the ability manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEnvelope {
    /// Target ability, with `device_id` set to the target device.
    pub descriptor: AbilityDescriptor,
    /// Serialized ability state.
    pub state: StateBag,
    /// Continuation flags.
    pub flags: ContinuationFlags,
    /// Directory-service session id, filled in by the directory service
    /// before the envelope reaches the replica.
    #[serde(default)]
    pub session_id: i32,
    /// Device the migration originated from, filled in by the directory service.
    #[serde(default)]
    pub origin_device_id: String,
}

impl MigrationEnvelope {
    /// Build an outbound continuation envelope addressed to `target_device`.
    #[must_use]
    pub fn continuation(
        descriptor: &AbilityDescriptor,
        target_device: &str,
        state: StateBag,
        reversible: bool,
    ) -> Self {
        let mut flags = ContinuationFlags::IS_CONTINUATION;
        if reversible {
            flags.insert(ContinuationFlags::IS_REVERSIBLE);
        }
        Self {
            descriptor: descriptor.addressed_to(target_device),
            state,
            flags,
            session_id: 0,
            origin_device_id: String::new(),
        }
    }

    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        self.flags.contains(ContinuationFlags::IS_CONTINUATION)
    }

    #[must_use]
    pub const fn is_reversible(&self) -> bool {
        self.flags.contains(ContinuationFlags::IS_REVERSIBLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_envelope_flags() {
        let desc = AbilityDescriptor::new("b", "m", "a");
        let env = MigrationEnvelope::continuation(&desc, "deviceB", StateBag::new(), false);
        assert!(env.is_continuation());
        assert!(!env.is_reversible());
        assert_eq!(env.descriptor.device_id, "deviceB");

        let env = MigrationEnvelope::continuation(&desc, "deviceB", StateBag::new(), true);
        assert!(env.is_continuation());
        assert!(env.is_reversible());
    }

    #[test]
    fn test_flag_bits() {
        let both = ContinuationFlags::IS_CONTINUATION | ContinuationFlags::IS_REVERSIBLE;
        assert_eq!(both.bits(), 0x408);
        assert!(both.contains(ContinuationFlags::IS_REVERSIBLE));
        assert!(!ContinuationFlags::empty().contains(ContinuationFlags::IS_CONTINUATION));
    }

    #[test]
    fn test_envelope_serialization() {
        let desc = AbilityDescriptor::new("b", "m", "a");
        let state = StateBag::new().with("k", "v");
        let env = MigrationEnvelope::continuation(&desc, "deviceB", state, true);

        let json = serde_json::to_string(&env).unwrap();
        let parsed: MigrationEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.state.get_string("k"), Some("v"));
    }
}
