//! Identity of the ability being continued.

use serde::{Deserialize, Serialize};

/// Identifies one ability: which bundle, module and ability class,
/// and (only while in transit) which device it is addressed to.
///
/// The device fields are scrubbed when a coordinator takes ownership of the
/// descriptor, so a descriptor never leaks the originating device to the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityDescriptor {
    /// Bundle identifier, e.g. `com.example.notes`.
    pub bundle_name: String,

    /// Module identifier inside the bundle.
    pub module_name: String,

    /// Ability identifier inside the module.
    pub ability_name: String,

    /// Device the descriptor is addressed to. Empty when local.
    #[serde(default)]
    pub device_id: String,

    /// Device types the ability was declared for.
    #[serde(default)]
    pub device_types: Vec<String>,
}

impl AbilityDescriptor {
    /// Create a descriptor with no device information.
    #[must_use]
    pub fn new(
        bundle_name: impl Into<String>,
        module_name: impl Into<String>,
        ability_name: impl Into<String>,
    ) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            module_name: module_name.into(),
            ability_name: ability_name.into(),
            device_id: String::new(),
            device_types: Vec::new(),
        }
    }

    /// Clear the originating device id and device types.
    pub fn clear_device_info(&mut self) {
        self.device_id.clear();
        self.device_types.clear();
    }

    /// Copy of this descriptor addressed to `device_id`.
    #[must_use]
    pub fn addressed_to(&self, device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            ..self.clone()
        }
    }

    /// Whether the descriptor names a concrete ability.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.bundle_name.is_empty() && !self.ability_name.is_empty()
    }
}

impl std::fmt::Display for AbilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.bundle_name, self.module_name, self.ability_name)
    }
}
