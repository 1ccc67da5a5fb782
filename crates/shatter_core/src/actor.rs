//! # Destructible Actors
//!
//! An actor is one placed destructible object: a set of fragment assets
//! under one transform, with its own damage parameters. Registering an
//! actor with the [`Manager`](crate::manager::Manager) turns its fragments
//! into chunks of a structure.

use serde::{Deserialize, Serialize};
use shatter_shared::math::{Aabb, Transform};

use crate::asset::FragmentAsset;
use crate::config::DestructibleParameters;
use crate::effects::PendingEffects;
use crate::error::FractureResult;

/// Application-assigned actor identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

/// Everything needed to register a destructible actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorDesc {
    /// Identifier, unique among registered actors.
    pub id: ActorId,
    /// World placement.
    pub transform: Transform,
    /// The unfractured actor is a simulated rigid body.
    pub simulated: bool,
    /// Never moves, even when simulated.
    pub is_static: bool,
    /// Tree depth at which support is evaluated.
    pub support_depth: u32,
    /// Maximum chunks rerouted per tick, summed over a structure's actors.
    pub per_frame_budget: usize,
    /// Support chunks touching world geometry are anchored.
    pub support_chunks_touch_world: bool,
    /// Support chunks of support fragments are anchored.
    pub support_chunks_in_support_fragment: bool,
    /// Damage tuning.
    pub parameters: DestructibleParameters,
    /// Fracture trees, one per fragment.
    pub fragments: Vec<FragmentAsset>,
}

impl ActorDesc {
    /// A fixed actor with default parameters.
    #[must_use]
    pub fn new(id: ActorId, fragments: Vec<FragmentAsset>) -> Self {
        Self {
            id,
            transform: Transform::IDENTITY,
            simulated: false,
            is_static: false,
            support_depth: 0,
            per_frame_budget: 10,
            support_chunks_touch_world: true,
            support_chunks_in_support_fragment: false,
            parameters: DestructibleParameters::default(),
            fragments,
        }
    }

    /// Places the actor.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Sets the support depth.
    #[must_use]
    pub fn with_support_depth(mut self, depth: u32) -> Self {
        self.support_depth = depth;
        self
    }

    /// Sets the per-frame reroute budget.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.per_frame_budget = budget;
        self
    }

    /// Replaces the damage parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: DestructibleParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Makes the whole actor a simulated rigid body.
    #[must_use]
    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    /// Chunks of a fixed actor start static and take part in support.
    #[inline]
    #[must_use]
    pub const fn starts_fixed(&self) -> bool {
        !self.simulated
    }

    /// Spawned parts of this actor start kinematic.
    #[inline]
    #[must_use]
    pub const fn spawns_fixed(&self) -> bool {
        !self.simulated || self.is_static
    }

    /// Deepest chunk level over all fragments.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.fragments.iter().map(FragmentAsset::max_depth).max().unwrap_or(0)
    }

    /// World bounds of one fragment.
    #[must_use]
    pub fn fragment_world_bounds(&self, fragment: usize) -> Option<Aabb> {
        self.fragments
            .get(fragment)
            .map(|f| f.bounds.transformed(&self.transform))
    }

    /// World bounds of the unfractured actor.
    #[must_use]
    pub fn world_bounds(&self) -> Aabb {
        self.fragments
            .iter()
            .map(|f| f.bounds.transformed(&self.transform))
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Aabb::new(self.transform.position, self.transform.position))
    }

    /// Validates every fragment asset.
    ///
    /// # Errors
    ///
    /// Returns the first [`FragmentAsset::validate`] failure.
    pub fn validate(&self) -> FractureResult<()> {
        self.fragments.iter().try_for_each(FragmentAsset::validate)
    }
}

// =============================================================================
// RUNTIME STATE
// =============================================================================

/// Spawned representation of one fragment.
#[derive(Clone, Debug)]
pub(crate) struct Part {
    /// Visible chunks left per mesh.
    pub(crate) chunks_remaining: Vec<usize>,
    /// Meshes still attached.
    pub(crate) meshes_remaining: usize,
}

impl Part {
    pub(crate) fn new(asset: &FragmentAsset) -> Self {
        let chunks_remaining = asset.chunks_per_mesh();
        Self {
            meshes_remaining: chunks_remaining.len(),
            chunks_remaining,
        }
    }
}

/// An actor as owned by a structure.
#[derive(Clone, Debug)]
pub(crate) struct ActorSlot {
    pub(crate) desc: ActorDesc,
    /// Indices of overlapping actors in the same structure.
    pub(crate) neighbors: Vec<usize>,
    /// `part_first_chunk[f]..part_first_chunk[f + 1]` are fragment `f`'s chunks.
    pub(crate) part_first_chunk: Vec<usize>,
    pub(crate) parts: Vec<Option<Part>>,
    /// Fragments still drawn by the unfractured mesh.
    pub(crate) fragment_visible: Vec<bool>,
    pub(crate) parts_remaining: usize,
    pub(crate) scaled_damage_to_radius: f32,
    pub(crate) effects: PendingEffects,
}

impl ActorSlot {
    /// Prepares a registered actor: clamps the support depth, pads the
    /// depth parameters and derives the damage radius scale.
    pub(crate) fn new(mut desc: ActorDesc, neighbors: Vec<usize>) -> Self {
        let max_depth = desc.max_depth();
        desc.support_depth = desc.support_depth.min(max_depth);
        desc.parameters.pad_depths(max_depth);

        let linear_size = desc
            .fragments
            .iter()
            .map(|f| f.bounds.half_extent())
            .reduce(shatter_shared::math::Vec3::max)
            .map_or(0.0, |extent| (extent * desc.transform.scale).max_element());
        let scaled_damage_to_radius = if desc.parameters.damage_threshold > 0.0 {
            linear_size * desc.parameters.damage_to_radius / desc.parameters.damage_threshold
        } else {
            0.0
        };

        let fragment_count = desc.fragments.len();
        Self {
            desc,
            neighbors,
            part_first_chunk: Vec::with_capacity(fragment_count + 1),
            parts: vec![None; fragment_count],
            fragment_visible: vec![true; fragment_count],
            parts_remaining: fragment_count,
            scaled_damage_to_radius,
            effects: PendingEffects::default(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> ActorId {
        self.desc.id
    }

    /// Chunk index range of a fragment.
    pub(crate) fn fragment_chunks(&self, fragment: usize) -> std::ops::Range<usize> {
        match (self.part_first_chunk.get(fragment), self.part_first_chunk.get(fragment + 1)) {
            (Some(&first), Some(&stop)) => first..stop,
            _ => 0..0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shatter_shared::math::Vec3;

    fn cube(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 10.0, 10.0, 10.0))
    }

    #[test]
    fn test_slot_clamps_support_depth_and_pads_params() {
        let desc = ActorDesc::new(ActorId(3), vec![FragmentAsset::with_children(&[cube(0.0), cube(10.0)])])
            .with_support_depth(5);
        let slot = ActorSlot::new(desc, Vec::new());
        assert_eq!(slot.desc.support_depth, 1);
        assert_eq!(slot.desc.parameters.depth_parameters.len(), 3);
        assert_eq!(slot.parts_remaining, 1);
        // linear size 10, damage_to_radius 0.1, threshold 1.0
        assert!((slot.scaled_damage_to_radius - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let desc = ActorDesc::new(ActorId(1), vec![FragmentAsset::single_chunk(cube(0.0))])
            .with_transform(Transform::from_position(Vec3::new(100.0, 0.0, 0.0)));
        let bounds = desc.world_bounds();
        assert_eq!(bounds.min.x, 100.0);
        assert_eq!(bounds.max.x, 110.0);
        assert!(desc.starts_fixed());
        assert!(desc.spawns_fixed());
        assert!(!desc.clone().simulated().spawns_fixed());
    }
}
