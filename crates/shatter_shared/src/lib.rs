//! # SHATTER Shared
//!
//! Plain-old-data types used by the fracture engine and by every backend
//! that plugs into it.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain engine logic. If it needs to know what a
//! chunk is, it belongs in `shatter_core`.

pub mod constants;
pub mod math;

pub use constants::{
    DEFAULT_DEBRIS_LIFETIME, DEFAULT_MAX_DYNAMIC_CHUNKS, MAX_CRUMBLE_PARTICLES,
    MAX_DEBRIS_DISTANCE, MAX_FORCE_NORMALIZATION_TIME, SUPPORT_PADDING, WORLD_MAX,
};
pub use math::{Aabb, Quaternion, Transform, Vec3};
