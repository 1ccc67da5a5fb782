//! # Engine Configuration
//!
//! Two layers of configuration:
//!
//! - [`ManagerSettings`]: process-wide values (dynamic chunk cap, debris
//!   lifetime, debug visualization). The application owns a
//!   [`SettingsHandle`] and may change it from any thread; the manager
//!   picks the values up at the end of every tick.
//! - [`DestructibleParameters`]: per-actor damage tuning, usually loaded
//!   from TOML next to the asset.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shatter_shared::constants::{DEFAULT_DEBRIS_LIFETIME, DEFAULT_MAX_DYNAMIC_CHUNKS};

use crate::error::{FractureError, FractureResult};

// =============================================================================
// MANAGER SETTINGS
// =============================================================================

/// Process-wide fracture settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Cap on simultaneously simulated dynamic chunks across all structures.
    pub max_dynamic_chunks: usize,
    /// Seconds before an un-anchored dynamic chunk is crumbled.
    pub debris_lifetime: f32,
    /// Draw the support graph through the effect backend every tick.
    pub visualize_support: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_dynamic_chunks: DEFAULT_MAX_DYNAMIC_CHUNKS, // 1000
            debris_lifetime: DEFAULT_DEBRIS_LIFETIME,       // 60 seconds
            visualize_support: false,
        }
    }
}

impl ManagerSettings {
    /// Parses settings from a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::InvalidConfig`] if the document does not parse.
    pub fn from_toml_str(source: &str) -> FractureResult<Self> {
        let settings: Self =
            toml::from_str(source).map_err(|e| FractureError::InvalidConfig(e.to_string()))?;
        Ok(settings.normalized())
    }

    /// Clamps values into their legal ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_dynamic_chunks = self.max_dynamic_chunks.max(1);
        self.debris_lifetime = self.debris_lifetime.max(0.0);
        self
    }
}

/// Shared, cloneable handle to the live [`ManagerSettings`].
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<ManagerSettings>>,
}

impl SettingsHandle {
    /// Wraps initial settings.
    #[must_use]
    pub fn new(settings: ManagerSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings.normalized())),
        }
    }

    /// Copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> ManagerSettings {
        self.inner.read().clone()
    }

    /// Mutates the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut ManagerSettings)) {
        let mut guard = self.inner.write();
        f(&mut *guard);
        let normalized = guard.clone().normalized();
        *guard = normalized;
    }
}

// =============================================================================
// PER-ACTOR PARAMETERS
// =============================================================================

/// Behavior switches for chunks at one tree depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthParameters {
    /// Bodies at this depth report contacts for impact damage.
    pub take_impact_damage: bool,
    /// Hiding a chunk at this depth requests the fracture sound.
    pub play_sound_effect: bool,
    /// Hiding a chunk at this depth spawns a particle effect.
    pub play_particle_effect: bool,
    /// Debris at this depth never expires.
    pub do_not_timeout: bool,
}

impl DepthParameters {
    /// The expensive settings used for the top level of an actor.
    pub const TOP_LEVEL: Self = Self {
        take_impact_damage: true,
        play_sound_effect: true,
        play_particle_effect: true,
        do_not_timeout: true,
    };
}

/// Damage tuning for one destructible actor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestructibleParameters {
    /// Accumulated damage at which a chunk fractures.
    pub damage_threshold: f32,
    /// Damage radius per unit damage, relative to the actor size.
    pub damage_to_radius: f32,
    /// Upper bound on a single damage event. Zero disables the cap.
    pub damage_cap: f32,
    /// Contact force to damage factor. Zero disables impact damage.
    pub force_to_damage: f32,
    /// Keep damage between events instead of resetting it every call.
    pub accumulate_damage: bool,
    /// Crumbled chunks request a particle volume fill.
    pub crumble_particles: bool,
    /// Spacing between sampled crumble particle positions.
    pub crumble_particle_size: f32,
    /// Per-depth switches, index 0 being the unfractured actor.
    pub depth_parameters: Vec<DepthParameters>,
}

impl Default for DestructibleParameters {
    fn default() -> Self {
        Self {
            damage_threshold: 1.0,
            damage_to_radius: 0.1,
            damage_cap: 0.0,
            force_to_damage: 0.0,
            accumulate_damage: true,
            crumble_particles: false,
            crumble_particle_size: 1.0,
            depth_parameters: Vec::new(),
        }
    }
}

impl DestructibleParameters {
    /// Parses parameters from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::InvalidConfig`] if the document does not parse.
    pub fn from_toml_str(source: &str) -> FractureResult<Self> {
        toml::from_str(source).map_err(|e| FractureError::InvalidConfig(e.to_string()))
    }

    /// Pads `depth_parameters` so every depth up to `max_depth + 1` exists.
    ///
    /// A freshly created level 0 gets [`DepthParameters::TOP_LEVEL`].
    pub fn pad_depths(&mut self, max_depth: u32) {
        let wanted = max_depth as usize + 2;
        while self.depth_parameters.len() < wanted {
            let params = if self.depth_parameters.is_empty() {
                DepthParameters::TOP_LEVEL
            } else {
                DepthParameters::default()
            };
            self.depth_parameters.push(params);
        }
    }

    /// Parameters for `depth`, clamped to the last configured level.
    #[must_use]
    pub fn depth(&self, depth: usize) -> DepthParameters {
        match self.depth_parameters.len() {
            0 => DepthParameters::default(),
            len => self.depth_parameters[depth.min(len - 1)],
        }
    }

    /// Caps a damage amount by `damage_cap` when the cap is enabled.
    #[inline]
    #[must_use]
    pub fn capped(&self, damage: f32) -> f32 {
        if self.damage_cap > 0.0 {
            damage.min(self.damage_cap)
        } else {
            damage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_settings_from_toml() {
        let settings = ManagerSettings::from_toml_str(
            r#"
            max_dynamic_chunks = 0
            debris_lifetime = -3.0
            "#,
        )
        .unwrap();
        assert_eq!(settings.max_dynamic_chunks, 1);
        assert_eq!(settings.debris_lifetime, 0.0);
        assert!(!settings.visualize_support);

        assert!(ManagerSettings::from_toml_str("max_dynamic_chunks = \"lots\"").is_err());
    }

    #[test]
    fn test_settings_handle_is_shared() {
        let handle = SettingsHandle::new(ManagerSettings::default());
        let other = handle.clone();
        other.update(|s| s.max_dynamic_chunks = 12);
        assert_eq!(handle.snapshot().max_dynamic_chunks, 12);
    }

    #[test]
    fn test_pad_depths() {
        let mut params = DestructibleParameters::default();
        params.pad_depths(2);
        assert_eq!(params.depth_parameters.len(), 4);
        assert_eq!(params.depth(0), DepthParameters::TOP_LEVEL);
        assert!(!params.depth(1).do_not_timeout);
        assert_eq!(params.depth(99), params.depth(3));
    }

    #[test]
    fn test_parameters_from_toml() {
        let params = DestructibleParameters::from_toml_str(
            r#"
            damage_threshold = 25.0
            damage_cap = 40.0
            accumulate_damage = false

            [[depth_parameters]]
            do_not_timeout = true
            "#,
        )
        .unwrap();
        assert_eq!(params.damage_threshold, 25.0);
        assert_eq!(params.capped(100.0), 40.0);
        assert!(!params.accumulate_damage);
        assert!(params.depth(0).do_not_timeout);
        assert!(!params.depth(0).play_sound_effect);
    }
}
