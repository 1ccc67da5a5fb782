//! In-memory backend that records every request.
//!
//! Geometry queries are answered with padded bounding boxes, and world
//! geometry is a list of anchor boxes. Good enough to drive the engine in
//! tests, benches and tools.

use std::collections::BTreeMap;

use shatter_shared::math::{Aabb, Transform, Vec3};

use super::{
    BodyKey, ChunkShape, EffectBackend, GeometryQuery, MeshKey, PhysicsBackend, RigidBodyState,
    VisualBackend,
};
use crate::actor::{ActorDesc, ActorId};
use crate::effects::{DebugLine, SpawnBasis, VolumeFill};

/// One recorded backend request.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    /// `init_body`
    InitBody {
        /// Body.
        body: BodyKey,
        /// Kinematic at creation.
        fixed: bool,
    },
    /// `term_body`
    TermBody(BodyKey),
    /// `set_body_fixed`
    SetFixed {
        /// Body.
        body: BodyKey,
        /// New mode.
        fixed: bool,
    },
    /// `set_body_velocity`
    SetVelocity {
        /// Body.
        body: BodyKey,
        /// Linear velocity.
        linear: Vec3,
    },
    /// `add_impulse`
    Impulse {
        /// Body.
        body: BodyKey,
        /// Impulse vector.
        impulse: Vec3,
    },
    /// `term_actor_body`
    TermActorBody(ActorId),
    /// `set_fragment_visible`
    FragmentVisible {
        /// Actor.
        actor: ActorId,
        /// Fragment.
        fragment: usize,
        /// Visibility.
        visible: bool,
    },
    /// `spawn_part`
    SpawnPart {
        /// Actor.
        actor: ActorId,
        /// Fragment.
        fragment: usize,
    },
    /// `show_bone`
    ShowBone(MeshKey, u32),
    /// `hide_bone`
    HideBone(MeshKey, u32),
    /// `detach_mesh`
    DetachMesh(MeshKey),
    /// `destroy_part`
    DestroyPart {
        /// Actor.
        actor: ActorId,
        /// Fragment.
        fragment: usize,
    },
    /// `destroy_actor`
    DestroyActor(ActorId),
    /// `spawn_volume_fill`
    VolumeFill {
        /// Actor.
        actor: ActorId,
        /// Number of sampled positions.
        positions: usize,
    },
    /// `play_fracture_sound`
    FractureSound(ActorId),
    /// `spawn_fracture_effects`
    FractureEffects {
        /// Actor.
        actor: ActorId,
        /// Number of spawn bases.
        count: usize,
    },
    /// `draw_debug_lines`
    DebugLines(usize),
}

/// A live body tracked by [`RecordingBackend`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyRecord {
    /// Placement at creation.
    pub transform: Transform,
    /// Kinematic flag.
    pub fixed: bool,
    /// Linear velocity.
    pub linear_velocity: Vec3,
    /// Angular velocity.
    pub angular_velocity: Vec3,
}

/// Backend that keeps everything in memory and records each call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    bodies: BTreeMap<BodyKey, BodyRecord>,
    actor_states: BTreeMap<ActorId, RigidBodyState>,
    anchors: Vec<Aabb>,
    fail_spawns: bool,
}

impl RecordingBackend {
    /// Creates an empty backend with no world geometry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a box of immovable world geometry.
    #[must_use]
    pub fn with_anchor(mut self, bounds: Aabb) -> Self {
        self.anchors.push(bounds);
        self
    }

    /// Makes every `spawn_part` request fail.
    pub fn set_fail_spawns(&mut self, fail: bool) {
        self.fail_spawns = fail;
    }

    /// Gives a simulated actor a rigid-body state.
    pub fn set_actor_state(&mut self, actor: ActorId, state: RigidBodyState) {
        self.actor_states.insert(actor, state);
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Forgets recorded calls, keeping live bodies.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Live body, if one exists.
    #[must_use]
    pub fn body(&self, key: BodyKey) -> Option<&BodyRecord> {
        self.bodies.get(&key)
    }

    /// Number of live bodies.
    #[must_use]
    pub fn live_bodies(&self) -> usize {
        self.bodies.len()
    }
}

impl GeometryQuery for RecordingBackend {
    fn chunks_overlap(&self, a: &ChunkShape, b: &ChunkShape, padding: f32) -> bool {
        a.world_bounds.expanded(padding).intersects(&b.world_bounds)
    }

    fn actors_overlap(&self, a: &ActorDesc, b: &ActorDesc, padding: f32) -> bool {
        a.world_bounds().expanded(padding).intersects(&b.world_bounds())
    }

    fn touches_world_geometry(&self, bounds: &Aabb) -> bool {
        self.anchors.iter().any(|anchor| anchor.intersects(bounds))
    }
}

impl PhysicsBackend for RecordingBackend {
    fn init_body(&mut self, body: BodyKey, transform: &Transform, fixed: bool, _contact_force_threshold: Option<f32>) {
        self.bodies.insert(
            body,
            BodyRecord {
                transform: *transform,
                fixed,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            },
        );
        self.calls.push(BackendCall::InitBody { body, fixed });
    }

    fn term_body(&mut self, body: BodyKey) {
        if self.bodies.remove(&body).is_some() {
            self.calls.push(BackendCall::TermBody(body));
        }
    }

    fn set_body_fixed(&mut self, body: BodyKey, fixed: bool) {
        if let Some(record) = self.bodies.get_mut(&body) {
            record.fixed = fixed;
            self.calls.push(BackendCall::SetFixed { body, fixed });
        }
    }

    fn wake_body(&mut self, _body: BodyKey) {
        // Mock: bodies never sleep
    }

    fn body_state(&self, body: BodyKey) -> Option<RigidBodyState> {
        self.bodies.get(&body).map(|record| RigidBodyState {
            center_of_mass: record.transform.position,
            linear_velocity: record.linear_velocity,
            angular_velocity: record.angular_velocity,
        })
    }

    fn body_transform(&self, body: BodyKey) -> Option<Transform> {
        self.bodies.get(&body).map(|record| record.transform)
    }

    fn set_body_velocity(&mut self, body: BodyKey, linear: Vec3, angular: Vec3) {
        if let Some(record) = self.bodies.get_mut(&body) {
            record.linear_velocity = linear;
            record.angular_velocity = angular;
            self.calls.push(BackendCall::SetVelocity { body, linear });
        }
    }

    fn add_impulse(&mut self, body: BodyKey, impulse: Vec3, _point: Vec3) {
        if let Some(record) = self.bodies.get_mut(&body) {
            record.linear_velocity += impulse;
            self.calls.push(BackendCall::Impulse { body, impulse });
        }
    }

    fn actor_state(&self, actor: ActorId) -> Option<RigidBodyState> {
        self.actor_states.get(&actor).copied()
    }

    fn actor_transform(&self, _actor: ActorId) -> Option<Transform> {
        None
    }

    fn term_actor_body(&mut self, actor: ActorId) {
        self.actor_states.remove(&actor);
        self.calls.push(BackendCall::TermActorBody(actor));
    }
}

impl VisualBackend for RecordingBackend {
    fn set_fragment_visible(&mut self, actor: ActorId, fragment: usize, visible: bool) {
        self.calls.push(BackendCall::FragmentVisible { actor, fragment, visible });
    }

    fn spawn_part(&mut self, actor: ActorId, fragment: usize, _mesh_count: usize) -> bool {
        if self.fail_spawns {
            return false;
        }
        self.calls.push(BackendCall::SpawnPart { actor, fragment });
        true
    }

    fn show_bone(&mut self, mesh: MeshKey, bone: u32) {
        self.calls.push(BackendCall::ShowBone(mesh, bone));
    }

    fn hide_bone(&mut self, mesh: MeshKey, bone: u32) {
        self.calls.push(BackendCall::HideBone(mesh, bone));
    }

    fn detach_mesh(&mut self, mesh: MeshKey) {
        self.calls.push(BackendCall::DetachMesh(mesh));
    }

    fn destroy_part(&mut self, actor: ActorId, fragment: usize) {
        self.bodies
            .retain(|key, _| !(key.mesh.actor == actor && key.mesh.fragment == fragment));
        self.calls.push(BackendCall::DestroyPart { actor, fragment });
    }

    fn destroy_actor(&mut self, actor: ActorId) {
        self.bodies.retain(|key, _| key.mesh.actor != actor);
        self.calls.push(BackendCall::DestroyActor(actor));
    }
}

impl EffectBackend for RecordingBackend {
    fn spawn_volume_fill(&mut self, actor: ActorId, fill: VolumeFill) {
        self.calls.push(BackendCall::VolumeFill {
            actor,
            positions: fill.positions.len(),
        });
    }

    fn play_fracture_sound(&mut self, actor: ActorId) {
        self.calls.push(BackendCall::FractureSound(actor));
    }

    fn spawn_fracture_effects(&mut self, actor: ActorId, bases: &[SpawnBasis]) {
        self.calls.push(BackendCall::FractureEffects {
            actor,
            count: bases.len(),
        });
    }

    fn draw_debug_lines(&mut self, lines: &[DebugLine]) {
        self.calls.push(BackendCall::DebugLines(lines.len()));
    }
}
