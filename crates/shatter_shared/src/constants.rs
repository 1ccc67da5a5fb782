//! # Engine Constants
//!
//! Default tuning values for the fracture engine.
//!
//! Values that the surrounding application may change at runtime are only
//! defaults here; the live values are held by the manager settings.

// =============================================================================
// MANAGER DEFAULTS
// =============================================================================

/// Default cap on simultaneously simulated dynamic chunks (all structures).
pub const DEFAULT_MAX_DYNAMIC_CHUNKS: usize = 1000;

/// Default seconds a dynamic chunk may live before it is crumbled.
pub const DEFAULT_DEBRIS_LIFETIME: f32 = 60.0;

// =============================================================================
// GEOMETRY
// =============================================================================

/// Padding used for actor merging and support-chunk bounds.
///
/// The narrow phase of the overlap graph uses twice this value.
pub const SUPPORT_PADDING: f32 = 1.0;

/// Half size of the playable world along one axis.
pub const WORLD_MAX: f32 = 524_288.0;

/// Dynamic chunks farther than this from their actor are hidden.
pub const MAX_DEBRIS_DISTANCE: f32 = 0.1 * WORLD_MAX;

// =============================================================================
// DAMAGE & EFFECTS
// =============================================================================

/// Converts an accumulated contact force into a per-frame impulse.
pub const MAX_FORCE_NORMALIZATION_TIME: f32 = 1.0 / 250.0;

/// Upper bound on sampled positions in one crumble volume fill.
pub const MAX_CRUMBLE_PARTICLES: usize = 4000;
