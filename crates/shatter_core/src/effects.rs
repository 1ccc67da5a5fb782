//! # Effect Requests
//!
//! Data handed to the effect backend: crumble volume fills, particle spawn
//! bases and debug lines. The engine only describes effects; spawning them
//! is the backend's business.

use shatter_shared::math::{Aabb, Vec3};

use crate::backend::RigidBodyState;

/// Rigid-body state of one crumbled chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedRbState {
    /// Offset of the chunk's first position in [`VolumeFill::positions`].
    pub index: usize,
    /// Sampled state.
    pub state: RigidBodyState,
}

/// Particle debris request for crumbled chunks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeFill {
    /// Velocity field, one entry per crumbled chunk.
    pub rb_states: Vec<IndexedRbState>,
    /// World positions filling the crumbled volumes.
    pub positions: Vec<Vec3>,
}

impl VolumeFill {
    /// Positions as raw bytes, ready for upload.
    #[must_use]
    pub fn positions_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// True if nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rb_states.is_empty() && self.positions.is_empty()
    }
}

/// Where to spawn a fracture particle effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnBasis {
    /// World position of the hidden chunk.
    pub location: Vec3,
    /// Effect scale relative to the whole fragment, at most 1.
    pub scale: f32,
}

/// Colored line segment for support visualization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    /// Start point.
    pub start: Vec3,
    /// End point.
    pub end: Vec3,
    /// RGBA color.
    pub color: [u8; 4],
}

impl DebugLine {
    /// Edge between two chunks that both have a valid route.
    pub const SUPPORTED: [u8; 4] = [0, 255, 0, 255];
    /// Edge touching a chunk that is still being rerouted.
    pub const PENDING: [u8; 4] = [255, 255, 0, 255];
    /// Marker for an environment-supported chunk.
    pub const ANCHOR: [u8; 4] = [0, 128, 255, 255];
}

/// Effects queued by one actor during a frame.
#[derive(Clone, Debug, Default)]
pub(crate) struct PendingEffects {
    pub(crate) volume_fill: Option<VolumeFill>,
    pub(crate) play_sound: bool,
    pub(crate) bases: Vec<SpawnBasis>,
}

/// Samples `bounds` on a grid with `spacing`, appending at most `max_total`
/// positions in total to `out`. Returns the number of positions added.
pub fn fill_volume(bounds: &Aabb, spacing: f32, max_total: usize, out: &mut Vec<Vec3>) -> usize {
    if spacing <= 0.0 || out.len() >= max_total {
        return 0;
    }
    let size = bounds.max - bounds.min;
    let steps = |extent: f32| ((extent / spacing).floor().max(0.0) as usize) + 1;
    let (nx, ny, nz) = (steps(size.x), steps(size.y), steps(size.z));
    let offset = Vec3::new(
        (size.x - (nx - 1) as f32 * spacing) * 0.5,
        (size.y - (ny - 1) as f32 * spacing) * 0.5,
        (size.z - (nz - 1) as f32 * spacing) * 0.5,
    );

    let before = out.len();
    'fill: for ix in 0..nx {
        for iy in 0..ny {
            for iz in 0..nz {
                if out.len() >= max_total {
                    break 'fill;
                }
                out.push(
                    bounds.min
                        + offset
                        + Vec3::new(ix as f32 * spacing, iy as f32 * spacing, iz as f32 * spacing),
                );
            }
        }
    }
    out.len() - before
}
