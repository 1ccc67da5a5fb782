//! # Backend Traits
//!
//! The fracture engine decides *when* and *which* chunks change state. The
//! actual geometry tests, rigid bodies, meshes and particles belong to
//! other subsystems, which plug in through these traits.
//!
//! ```text
//! shatter_core defines:      A backend implements:
//! ┌──────────────────┐      ┌──────────────────┐
//! │ trait Physics... │  ←─  │ impl Physics...  │
//! └──────────────────┘      └──────────────────┘
//! ```
//!
//! Every request is assumed to complete synchronously from the engine's
//! point of view.

mod recording;

pub use recording::{BackendCall, BodyRecord, RecordingBackend};

use shatter_shared::math::{Aabb, Transform, Vec3};

use crate::actor::{ActorDesc, ActorId};
use crate::effects::{DebugLine, SpawnBasis, VolumeFill};

// ============================================================================
// HANDLES
// ============================================================================

/// Addresses one skeletal mesh of a spawned part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshKey {
    /// Owning actor.
    pub actor: ActorId,
    /// Fragment the part was spawned for.
    pub fragment: usize,
    /// Mesh within the part.
    pub mesh: u32,
}

/// Addresses one rigid body of a spawned part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyKey {
    /// Mesh the body belongs to.
    pub mesh: MeshKey,
    /// Body index within the mesh's physics asset.
    pub body: u32,
}

/// Kinematic state sampled from a rigid body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RigidBodyState {
    /// World center of mass.
    pub center_of_mass: Vec3,
    /// Linear velocity.
    pub linear_velocity: Vec3,
    /// Angular velocity (radians per second, world axes).
    pub angular_velocity: Vec3,
}

impl RigidBodyState {
    /// Velocity of the material point at `point`.
    #[must_use]
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(point - self.center_of_mass)
    }
}

/// Geometry of one support chunk, as seen by the overlap query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkShape {
    /// Owning actor.
    pub actor: ActorId,
    /// Fragment index within the actor.
    pub fragment: usize,
    /// Mesh index within the fragment.
    pub mesh: u32,
    /// Convex body index within the mesh.
    pub body: u32,
    /// Actor placement.
    pub transform: Transform,
    /// World bounds of the chunk, unpadded.
    pub world_bounds: Aabb,
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Collision queries used once, while a structure is built.
pub trait GeometryQuery {
    /// Do the convex bodies of two chunks overlap, allowing `padding`?
    fn chunks_overlap(&self, a: &ChunkShape, b: &ChunkShape, padding: f32) -> bool;

    /// Do the convex hulls of two unfractured actors overlap, allowing `padding`?
    fn actors_overlap(&self, a: &ActorDesc, b: &ActorDesc, padding: f32) -> bool;

    /// Is this volume touching immovable world geometry?
    fn touches_world_geometry(&self, bounds: &Aabb) -> bool;
}

// ============================================================================
// PHYSICS
// ============================================================================

/// Rigid-body backend.
pub trait PhysicsBackend {
    /// Creates (or re-creates) the body for a chunk.
    ///
    /// `contact_force_threshold` requests contact reports above that force.
    fn init_body(&mut self, body: BodyKey, transform: &Transform, fixed: bool, contact_force_threshold: Option<f32>);

    /// Destroys a chunk's body. Unknown bodies are ignored.
    fn term_body(&mut self, body: BodyKey);

    /// Switches a body between kinematic and simulated.
    fn set_body_fixed(&mut self, body: BodyKey, fixed: bool);

    /// Wakes a sleeping body.
    fn wake_body(&mut self, body: BodyKey);

    /// Samples a body's state, if the body exists.
    fn body_state(&self, body: BodyKey) -> Option<RigidBodyState>;

    /// Current placement of a body, if the body exists.
    fn body_transform(&self, body: BodyKey) -> Option<Transform>;

    /// Sets a body's velocities.
    fn set_body_velocity(&mut self, body: BodyKey, linear: Vec3, angular: Vec3);

    /// Applies an impulse at a world point.
    fn add_impulse(&mut self, body: BodyKey, impulse: Vec3, point: Vec3);

    /// State of the unfractured actor's own body, if it is simulated.
    fn actor_state(&self, actor: ActorId) -> Option<RigidBodyState>;

    /// Current placement of the unfractured actor, if it is simulated.
    fn actor_transform(&self, actor: ActorId) -> Option<Transform>;

    /// Destroys the unfractured actor's own body.
    fn term_actor_body(&mut self, actor: ActorId);
}

// ============================================================================
// VISUALS
// ============================================================================

/// Mesh and part backend.
pub trait VisualBackend {
    /// Shows or hides a fragment of the unfractured mesh.
    fn set_fragment_visible(&mut self, actor: ActorId, fragment: usize, visible: bool);

    /// Spawns the part object for a fragment. Returns false on failure.
    fn spawn_part(&mut self, actor: ActorId, fragment: usize, mesh_count: usize) -> bool;

    /// Shows a chunk's bone.
    fn show_bone(&mut self, mesh: MeshKey, bone: u32);

    /// Hides a chunk's bone.
    fn hide_bone(&mut self, mesh: MeshKey, bone: u32);

    /// Detaches a mesh whose chunks are all gone.
    fn detach_mesh(&mut self, mesh: MeshKey);

    /// Destroys a part whose meshes are all gone.
    fn destroy_part(&mut self, actor: ActorId, fragment: usize);

    /// Destroys an actor whose parts are all gone.
    fn destroy_actor(&mut self, actor: ActorId);
}

// ============================================================================
// EFFECTS
// ============================================================================

/// Particle, sound and debug-draw backend.
pub trait EffectBackend {
    /// Spawns crumble debris.
    fn spawn_volume_fill(&mut self, actor: ActorId, fill: VolumeFill);

    /// Plays the actor's fracture sound.
    fn play_fracture_sound(&mut self, actor: ActorId);

    /// Spawns fracture particle effects.
    fn spawn_fracture_effects(&mut self, actor: ActorId, bases: &[SpawnBasis]);

    /// Draws support visualization lines for one frame.
    fn draw_debug_lines(&mut self, lines: &[DebugLine]);
}

/// Everything the engine needs from the outside world.
pub trait DestructionBackend: GeometryQuery + PhysicsBackend + VisualBackend + EffectBackend {}

impl<T> DestructionBackend for T where T: GeometryQuery + PhysicsBackend + VisualBackend + EffectBackend {}
