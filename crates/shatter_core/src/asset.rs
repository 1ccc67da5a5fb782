//! # Fragment Assets
//!
//! Immutable description of one fragment's chunk tree, as produced by the
//! offline fracturing tools. Chunks are stored parents-first with
//! contiguous child ranges, so a whole subtree can be addressed by index.

use serde::{Deserialize, Serialize};
use shatter_shared::math::Aabb;

use crate::error::{FractureError, FractureResult};

/// One node of a fragment's fracture tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetChunk {
    /// Parent chunk within the fragment.
    pub parent: Option<usize>,
    /// First child within the fragment. Children are contiguous.
    pub first_child: Option<usize>,
    /// Number of children.
    pub num_children: usize,
    /// Distance from the fragment root.
    pub depth: u32,
    /// Skeletal mesh that renders this chunk.
    pub mesh_index: u32,
    /// Convex body within the mesh's physics asset.
    pub body_index: u32,
    /// Bone driving this chunk.
    pub bone_index: u32,
    /// Bone name, used by backends that address bones by name.
    pub bone_name: String,
    /// Bounds in actor space, before actor scale.
    pub bounds: Aabb,
}

impl AssetChunk {
    /// A root chunk with no children.
    #[must_use]
    pub fn leaf(bounds: Aabb, bone_index: u32) -> Self {
        Self {
            parent: None,
            first_child: None,
            num_children: 0,
            depth: 0,
            mesh_index: 0,
            body_index: bone_index.saturating_sub(1),
            bone_index,
            bone_name: format!("chunk_{bone_index}"),
            bounds,
        }
    }
}

/// The fracture tree of one fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentAsset {
    /// Chunks, parents before children.
    pub chunks: Vec<AssetChunk>,
    /// Number of skeletal meshes the chunks are spread over.
    pub mesh_count: usize,
    /// Bounds of the unfractured fragment in actor space.
    pub bounds: Aabb,
    /// Support chunks of this fragment count as anchored.
    pub is_support_fragment: bool,
}

impl FragmentAsset {
    /// A fragment made of a single unbreakable chunk.
    #[must_use]
    pub fn single_chunk(bounds: Aabb) -> Self {
        Self {
            chunks: vec![AssetChunk::leaf(bounds, 1)],
            mesh_count: 1,
            bounds,
            is_support_fragment: false,
        }
    }

    /// A two-level fragment: one root and a row of children.
    ///
    /// The root bounds are the union of the children.
    #[must_use]
    pub fn with_children(children: &[Aabb]) -> Self {
        let bounds = children
            .iter()
            .copied()
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();

        let mut root = AssetChunk::leaf(bounds, 1);
        if !children.is_empty() {
            root.first_child = Some(1);
            root.num_children = children.len();
        }

        let mut chunks = Vec::with_capacity(children.len() + 1);
        chunks.push(root);
        for (i, child) in children.iter().enumerate() {
            let mut chunk = AssetChunk::leaf(*child, i as u32 + 2);
            chunk.parent = Some(0);
            chunk.depth = 1;
            chunks.push(chunk);
        }

        Self {
            chunks,
            mesh_count: 1,
            bounds,
            is_support_fragment: false,
        }
    }

    /// Marks the fragment as an anchor for support calculations.
    #[must_use]
    pub fn as_support_fragment(mut self) -> Self {
        self.is_support_fragment = true;
        self
    }

    /// Deepest chunk level in the tree.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.chunks.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// Number of chunks rendered by each mesh.
    #[must_use]
    pub fn chunks_per_mesh(&self) -> Vec<usize> {
        let mut counts = vec![0; self.mesh_count];
        for chunk in &self.chunks {
            if let Some(count) = counts.get_mut(chunk.mesh_index as usize) {
                *count += 1;
            }
        }
        counts
    }

    /// Checks the tree links.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::InvalidAsset`] when a parent does not precede
    /// its children, a child range is out of bounds or does not point back
    /// at its parent, depths do not increase by one, or a mesh index is out
    /// of range.
    pub fn validate(&self) -> FractureResult<()> {
        let len = self.chunks.len();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.mesh_index as usize >= self.mesh_count {
                return Err(FractureError::InvalidAsset(format!(
                    "chunk {i} uses mesh {} of {}",
                    chunk.mesh_index, self.mesh_count
                )));
            }

            match chunk.parent {
                Some(p) if p >= i => {
                    return Err(FractureError::InvalidAsset(format!(
                        "chunk {i} has parent {p} stored after it"
                    )));
                }
                Some(p) if self.chunks[p].depth + 1 != chunk.depth => {
                    return Err(FractureError::InvalidAsset(format!(
                        "chunk {i} at depth {} under parent at depth {}",
                        chunk.depth, self.chunks[p].depth
                    )));
                }
                None if chunk.depth != 0 => {
                    return Err(FractureError::InvalidAsset(format!(
                        "root chunk {i} at depth {}",
                        chunk.depth
                    )));
                }
                _ => {}
            }

            if chunk.num_children == 0 {
                continue;
            }
            let first = chunk.first_child.ok_or_else(|| {
                FractureError::InvalidAsset(format!("chunk {i} has children but no first child"))
            })?;
            if first + chunk.num_children > len {
                return Err(FractureError::InvalidAsset(format!(
                    "chunk {i} child range {first}..{} exceeds {len}",
                    first + chunk.num_children
                )));
            }
            if let Some(bad) = (first..first + chunk.num_children).find(|&c| self.chunks[c].parent != Some(i)) {
                return Err(FractureError::InvalidAsset(format!(
                    "chunk {bad} is listed as a child of {i} but points elsewhere"
                )));
            }
        }
        Ok(())
    }
}
