//! # SHATTER Core
//!
//! Support-graph maintenance for destructible actors. Decides, frame by
//! frame, which chunks of a fractured structure are still held up by the
//! world and which fall away as dynamic debris.
//!
//! ## Architecture Rules
//!
//! 1. **Flat arenas** - Chunks and overlaps are arrays linked by index
//! 2. **Bounded work** - Every tick reroutes at most the per-frame budget
//! 3. **Deferred destruction** - Actors and structures die through kill lists
//! 4. **No hidden globals** - The dynamic-chunk FIFO is owned by the [`Manager`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use shatter_core::{ActorDesc, ActorId, Manager, RecordingBackend};
//!
//! let mut backend = RecordingBackend::new();
//! let mut manager = Manager::default();
//! manager.register_actor(ActorDesc::new(ActorId(1), fragments), &backend)?;
//! manager.tick(1.0 / 60.0, &mut backend);
//! ```

pub mod actor;
pub mod asset;
pub mod backend;
pub mod chunk;
pub mod config;
pub mod effects;
pub mod error;
pub mod fifo;
pub mod manager;
pub mod overlap;
pub mod structure;

pub use actor::{ActorDesc, ActorId};
pub use asset::{AssetChunk, FragmentAsset};
pub use backend::{
    BodyKey, ChunkShape, DestructionBackend, EffectBackend, GeometryQuery, MeshKey, PhysicsBackend,
    RecordingBackend, RigidBodyState, VisualBackend,
};
pub use chunk::{Chunk, ChunkState};
pub use config::{DepthParameters, DestructibleParameters, ManagerSettings, SettingsHandle};
pub use error::{FractureError, FractureResult};
pub use fifo::{ChunkRef, DynamicChunkFifo, FifoHandle};
pub use manager::{Manager, StructureId};
pub use structure::{CollisionEvent, DamageEvent, FrameContext, HitTarget, PropagationStats, Structure};
