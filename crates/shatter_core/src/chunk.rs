//! # Chunks
//!
//! A chunk is one node of an actor's fracture tree, stored flat in its
//! structure's chunk array. Tree links, support-route bookkeeping, damage
//! and lifecycle state all live on the same record.

use shatter_shared::math::{Transform, Vec3};

use crate::asset::AssetChunk;
use crate::fifo::FifoHandle;

/// Lifecycle state of a chunk.
///
/// ```text
///   StaticChild ──fracture──► DynamicRoot ──crumble/evict/expire──► Hidden
///        │                        ▲
///        └─sibling fractured─► StaticRoot ──hidden en masse/crumble─► Hidden
///   DynamicChild ─fracture──────┘
/// ```
///
/// Nothing leaves `Hidden`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// No visual or physical representation.
    Hidden,
    /// Kinematic, rendered, root of its rigid hierarchy.
    StaticRoot,
    /// Kinematic, rendered as part of a static ancestor.
    StaticChild,
    /// Simulated rigid body, tracked by the global FIFO.
    DynamicRoot,
    /// Simulated implicitly as part of a dynamic ancestor.
    DynamicChild,
}

impl ChunkState {
    /// Root states own a rigid body.
    #[inline]
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::StaticRoot | Self::DynamicRoot)
    }

    /// Child states are represented by an ancestor.
    #[inline]
    #[must_use]
    pub const fn is_child(self) -> bool {
        matches!(self, Self::StaticChild | Self::DynamicChild)
    }
}

/// One rigid sub-piece of a destructible mesh.
#[derive(Clone, Debug)]
pub struct Chunk {
    // Identity
    /// Owning actor's slot in the structure.
    pub actor_index: usize,
    /// Fragment within the actor.
    pub fragment_index: usize,
    /// Mesh within the fragment's part.
    pub mesh_index: u32,
    /// Convex body within the mesh.
    pub body_index: u32,
    /// Bone driving the chunk.
    pub bone_index: u32,
    /// Bone name.
    pub bone_name: String,

    // Hierarchy
    /// Parent chunk, in structure indices.
    pub parent: Option<usize>,
    /// First child, in structure indices. Children are contiguous.
    pub first_child: Option<usize>,
    /// Number of children.
    pub num_children: usize,
    /// Children not yet detached, counted down by passive fracture.
    pub num_children_dup: usize,
    /// Distance from the fragment root.
    pub depth: u32,

    // Geometry
    /// Cached world placement of the chunk's rigid frame.
    pub world_transform: Transform,
    /// `world_transform` is current.
    pub world_transform_valid: bool,
    /// Cached world centroid.
    pub world_centroid: Vec3,
    /// `world_centroid` is current.
    pub world_centroid_valid: bool,
    /// Centroid in the chunk's rigid frame.
    pub relative_centroid: Vec3,
    /// Bounding radius.
    pub radius: f32,

    // Support
    /// Anchored to world geometry or a support fragment.
    pub is_environment_supported: bool,
    /// Hops to the nearest anchored chunk, -1 if none.
    pub shortest_route: i32,
    /// `shortest_route` is trustworthy.
    pub is_route_valid: bool,
    /// Queued for relaxation.
    pub is_routing: bool,
    /// Valid neighbors one hop closer to an anchor.
    pub num_supporters: u32,
    /// Removed from routing for good.
    pub is_route_blocker: bool,
    /// First entry in the structure's overlap array.
    pub first_overlap: usize,
    /// Number of overlap entries.
    pub num_overlaps: usize,

    // Damage & lifecycle
    /// Accumulated damage, at most the threshold.
    pub damage: f32,
    /// The next fracture crumbles this chunk instead.
    pub crumble: bool,
    /// Lifecycle state.
    pub state: ChunkState,
    /// Seconds spent as active debris.
    pub age: f32,
    /// Slot in the global dynamic-chunk FIFO.
    pub fifo_handle: Option<FifoHandle>,
}

impl Chunk {
    /// Builds a chunk from its asset node. `base` is the structure index of
    /// the fragment's first chunk.
    #[must_use]
    pub fn from_asset(asset: &AssetChunk, base: usize, actor_index: usize, fragment_index: usize) -> Self {
        Self {
            actor_index,
            fragment_index,
            mesh_index: asset.mesh_index,
            body_index: asset.body_index,
            bone_index: asset.bone_index,
            bone_name: asset.bone_name.clone(),
            parent: asset.parent.map(|p| p + base),
            first_child: asset.first_child.map(|c| c + base),
            num_children: asset.num_children,
            num_children_dup: asset.num_children,
            depth: asset.depth,
            world_transform: Transform::IDENTITY,
            world_transform_valid: false,
            world_centroid: Vec3::ZERO,
            world_centroid_valid: false,
            relative_centroid: Vec3::ZERO,
            radius: 0.0,
            is_environment_supported: false,
            shortest_route: -1,
            is_route_valid: false,
            is_routing: false,
            num_supporters: 0,
            is_route_blocker: false,
            first_overlap: 0,
            num_overlaps: 0,
            damage: 0.0,
            crumble: false,
            state: ChunkState::StaticChild,
            age: 0.0,
            fifo_handle: None,
        }
    }

    /// Structure indices of the children.
    #[inline]
    #[must_use]
    pub fn children(&self) -> std::ops::Range<usize> {
        match self.first_child {
            Some(first) => first..first + self.num_children,
            None => 0..0,
        }
    }

    /// Indices into the structure's overlap array.
    #[inline]
    #[must_use]
    pub fn overlaps(&self) -> std::ops::Range<usize> {
        self.first_overlap..self.first_overlap + self.num_overlaps
    }

    /// Leaf of the fracture tree.
    #[inline]
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.num_children == 0
    }
}
