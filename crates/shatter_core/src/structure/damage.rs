//! Damage, fracture, crumble and hide transitions.
//!
//! Damage is applied to a chunk and recursively to its children until a
//! chunk crumbles. Chunks whose damage reaches the threshold are fractured:
//! the chunk becomes a dynamic root, its ancestors are hidden and its
//! siblings become roots of their own. Hidden chunks are counted down per
//! mesh so parts and actors are released once nothing of them is left.

use std::ops::Range;

use shatter_shared::constants::{MAX_CRUMBLE_PARTICLES, MAX_FORCE_NORMALIZATION_TIME};
use shatter_shared::math::{Aabb, Vec3};

use super::{FrameContext, Structure};
use crate::actor::{ActorId, Part};
use crate::backend::{DestructionBackend, MeshKey, PhysicsBackend, RigidBodyState};
use crate::chunk::ChunkState;
use crate::effects::{fill_volume, IndexedRbState, SpawnBasis, VolumeFill};

// =============================================================================
// EVENTS
// =============================================================================

/// Damage spread from a point over a radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageEvent {
    /// Damage at the origin.
    pub amount: f32,
    /// Reach of the damage.
    pub radius: f32,
    /// Impulse magnitude given to fractured chunks, directed away from the origin.
    pub momentum: f32,
    /// World origin.
    pub origin: Vec3,
    /// No falloff inside the radius.
    pub full_damage: bool,
    /// New dynamic chunks inherit the velocity of the body they broke from.
    pub inherit_root_velocity: bool,
}

impl DamageEvent {
    /// Damage with linear falloff, no momentum.
    #[must_use]
    pub const fn new(amount: f32, radius: f32, origin: Vec3) -> Self {
        Self {
            amount,
            radius,
            momentum: 0.0,
            origin,
            full_damage: false,
            inherit_root_velocity: false,
        }
    }

    /// Sets the momentum.
    #[must_use]
    pub const fn with_momentum(mut self, momentum: f32) -> Self {
        self.momentum = momentum;
        self
    }

    /// Disables the falloff.
    #[must_use]
    pub const fn full(mut self) -> Self {
        self.full_damage = true;
        self
    }
}

/// What a point hit landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    /// The actor as a whole.
    Actor,
    /// One fragment, by index within the actor.
    Fragment(usize),
    /// One chunk, by structure index.
    Chunk(usize),
}

/// Contact reported by the physics backend.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionEvent {
    /// Actor that was hit.
    pub actor: ActorId,
    /// Chunk that was hit, if the contact was on a spawned part.
    pub chunk: Option<usize>,
    /// The other side of the contact, if it is an actor.
    pub other_actor: Option<ActorId>,
    /// Sum of the contact normal forces.
    pub total_normal_force: Vec3,
    /// Contact points.
    pub contact_positions: Vec<Vec3>,
}

// =============================================================================
// DAMAGE
// =============================================================================

impl Structure {
    /// Damages the root chunks in `chunks` and fractures every chunk that
    /// reached the threshold. Returns the fractured chunks.
    pub fn apply_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        chunks: Range<usize>,
        damage: &DamageEvent,
        ctx: &mut FrameContext<'_, B>,
    ) -> Vec<usize> {
        let mut affected = Vec::new();
        let stop = chunks.end.min(self.chunks.len());
        for index in chunks.start..stop {
            if self.chunks[index].state.is_root() {
                self.damage_chunk(
                    index,
                    damage.origin,
                    damage.amount,
                    damage.radius,
                    damage.full_damage,
                    &mut affected,
                    &*ctx.backend,
                );
            }
        }

        for &index in &affected {
            let direction = (self.chunk_centroid(index, &*ctx.backend) - damage.origin).normalize_or_zero();
            self.fracture_chunk(
                index,
                damage.origin,
                direction * damage.momentum,
                damage.inherit_root_velocity,
                ctx,
            );
        }
        affected
    }

    /// Adds falloff damage to a chunk and its subtree, appending chunks that
    /// reached the threshold to `out`. Returns true if anything was added.
    ///
    /// The damage that broke a chunk is used up: children see only what is
    /// left of `base`.
    #[allow(clippy::too_many_arguments)]
    pub fn damage_chunk<P: PhysicsBackend + ?Sized>(
        &mut self,
        index: usize,
        point: Vec3,
        mut base: f32,
        radius: f32,
        full_damage: bool,
        out: &mut Vec<usize>,
        backend: &P,
    ) -> bool {
        let Some(chunk) = self.chunks.get(index) else {
            return false;
        };
        if chunk.state == ChunkState::Hidden {
            return false;
        }
        let Some(slot) = self.actors.get(chunk.actor_index).and_then(Option::as_ref) else {
            return false;
        };
        let threshold = slot.desc.parameters.damage_threshold;
        let accumulate = slot.desc.parameters.accumulate_damage;
        let max_depth = slot
            .desc
            .fragments
            .get(chunk.fragment_index)
            .map_or(0, |f| f.max_depth());
        let at_max_depth = chunk.depth == max_depth;
        let chunk_radius = chunk.radius;

        let added_before = out.len();
        let mut distance = self.chunk_centroid(index, backend).distance(point);
        if at_max_depth {
            distance -= chunk_radius;
        }

        let chunk = &mut self.chunks[index];
        if distance < radius {
            let fraction = if full_damage {
                1.0
            } else {
                1.0 - (distance / radius).max(0.0)
            };
            let old_damage = chunk.damage;
            chunk.damage += fraction * base;
            if chunk.damage >= threshold {
                chunk.damage = threshold;
                if chunk.state == ChunkState::DynamicRoot {
                    // Loose debris only breaks further at the leaves.
                    if chunk.is_leaf() {
                        out.push(index);
                        chunk.crumble = true;
                    }
                } else {
                    base -= chunk.damage - old_damage;
                    out.push(index);
                    if chunk.is_leaf() && fraction * base >= threshold {
                        chunk.crumble = true;
                    }
                }
            }
            if !accumulate {
                chunk.damage = 0.0;
            }
        }

        if !chunk.crumble {
            let children: Vec<usize> = chunk.children().collect();
            for child in children {
                self.damage_chunk(child, point, base, radius, full_damage, out, backend);
            }
        }
        out.len() > added_before
    }

    // =========================================================================
    // FRACTURE
    // =========================================================================

    /// Breaks a chunk off its hierarchy and turns it into a dynamic root.
    ///
    /// Spawns the fragment's part first if needed. Ancestors up to the
    /// nearest root are hidden; their other children become roots.
    pub fn fracture_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        index: usize,
        point: Vec3,
        impulse: Vec3,
        inherit_root_velocity: bool,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let Some(chunk) = self.chunks.get(index) else {
            return;
        };
        let fragment = chunk.fragment_index;
        let Some(slot) = self.actors.get(chunk.actor_index).and_then(Option::as_ref) else {
            return;
        };

        let mut root_state: Option<RigidBodyState> = None;
        if self.part(index).is_none() {
            if inherit_root_velocity && !slot.desc.spawns_fixed() {
                root_state = ctx.backend.actor_state(slot.id());
            }
            if !self.ensure_part(index, ctx) {
                tracing::warn!(structure = ?self.id, chunk = index, fragment, "part could not be spawned, fracture skipped");
                return;
            }
        }

        if !self.chunks[index].is_route_blocker {
            self.fracture_origin_chunks.push(index);
        }

        let state = self.chunks[index].state;
        if self.chunks[index].crumble && state.is_root() {
            if !inherit_root_velocity {
                ctx.backend.set_body_velocity(self.body_key(index), Vec3::ZERO, Vec3::ZERO);
            }
            self.crumble_chunk(index, ctx);
            return;
        }
        match state {
            ChunkState::DynamicRoot => {
                if !impulse.is_zero() {
                    ctx.backend.add_impulse(self.body_key(index), impulse, point);
                }
                return;
            }
            ChunkState::Hidden => return,
            _ => {}
        }

        let mut new_roots = vec![index];
        self.chunks[index].state = ChunkState::DynamicRoot;

        let mut parent = self.chunks[index].parent;
        while let Some(p) = parent {
            let siblings: Vec<usize> = self.chunks[p].children().collect();
            for sibling in siblings {
                match self.chunks[sibling].state {
                    ChunkState::DynamicChild => {
                        self.chunks[sibling].state = ChunkState::DynamicRoot;
                        new_roots.push(sibling);
                    }
                    ChunkState::StaticChild => {
                        self.show_chunk(sibling, true, ctx);
                        self.chunks[sibling].state = ChunkState::StaticRoot;
                    }
                    _ => {}
                }
            }

            match self.chunks[p].state {
                ChunkState::DynamicRoot => {
                    if let Some(state) = ctx.backend.body_state(self.body_key(p)) {
                        root_state = Some(state);
                    }
                    self.hide_chunk(p, true, ctx);
                    break;
                }
                ChunkState::StaticRoot => {
                    self.hide_chunk(p, true, ctx);
                    break;
                }
                ChunkState::Hidden => break,
                _ => {
                    self.hide_chunk(p, false, ctx);
                }
            }
            parent = self.chunks[p].parent;
        }

        // Roots beyond the FIFO's capacity would only evict each other.
        let first_tracked = new_roots.len().saturating_sub(ctx.fifo.max());
        for (i, &root) in new_roots.iter().enumerate() {
            self.show_chunk(root, true, ctx);
            let body = self.body_key(root);
            ctx.backend.set_body_fixed(body, false);
            self.switch_to_dynamic(root);
            self.active.push(root);
            ctx.backend.wake_body(body);

            if inherit_root_velocity {
                if let Some(state) = root_state {
                    let center = match ctx.backend.body_state(body) {
                        Some(own) => own.center_of_mass,
                        None => self.chunk_centroid(root, &*ctx.backend),
                    };
                    ctx.backend.set_body_velocity(body, state.velocity_at(center), state.angular_velocity);
                }
            }
            if i == 0 && !impulse.is_zero() {
                ctx.backend.add_impulse(body, impulse, point);
            }

            if self.chunks[root].crumble || i < first_tracked {
                self.crumble_chunk(root, ctx);
            } else {
                self.track_in_fifo(root, ctx.fifo);
            }
        }
    }

    /// Hides a root chunk and requests a particle volume fill for it,
    /// spawning its part first if the fragment is still whole.
    ///
    /// Returns false if nothing was crumbled: the chunk was already hidden
    /// or its part could not be spawned.
    pub fn crumble_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        index: usize,
        ctx: &mut FrameContext<'_, B>,
    ) -> bool {
        match self.chunks.get(index) {
            Some(chunk) if chunk.state != ChunkState::Hidden => {}
            _ => return false,
        }
        if !self.ensure_part(index, ctx) {
            tracing::warn!(structure = ?self.id, chunk = index, "part could not be spawned, crumble skipped");
            return false;
        }

        let crumble_particles = self.actors[self.chunks[index].actor_index]
            .as_ref()
            .is_some_and(|slot| slot.desc.parameters.crumble_particles);
        if crumble_particles {
            if let Some(state) = ctx.backend.body_state(self.body_key(index)) {
                let centroid = self.chunk_centroid(index, &*ctx.backend);
                let chunk = &self.chunks[index];
                if let Some(slot) = self.actors[chunk.actor_index].as_mut() {
                    let local = index - slot.part_first_chunk[chunk.fragment_index];
                    let half_extent = slot.desc.fragments[chunk.fragment_index].chunks[local]
                        .bounds
                        .half_extent()
                        * slot.desc.transform.scale;
                    let bounds = Aabb::from_center_half_extent(centroid, half_extent);
                    let spacing = slot.desc.parameters.crumble_particle_size;
                    let fill = slot.effects.volume_fill.get_or_insert_with(VolumeFill::default);
                    fill.rb_states.push(IndexedRbState {
                        index: fill.positions.len(),
                        state,
                    });
                    fill_volume(&bounds, spacing, MAX_CRUMBLE_PARTICLES, &mut fill.positions);
                }
            }
        }

        self.hide_chunk(index, true, ctx) > 0
    }

    // =========================================================================
    // VISIBILITY
    // =========================================================================

    /// Hides a chunk, and its child-state subtree if `recurse`, releasing
    /// the mesh, part and actor once nothing of them is visible.
    ///
    /// Returns the number of chunks hidden. Hiding a hidden chunk is a no-op.
    pub fn hide_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        index: usize,
        recurse: bool,
        ctx: &mut FrameContext<'_, B>,
    ) -> usize {
        match self.chunks.get(index) {
            Some(chunk) if chunk.state != ChunkState::Hidden => {}
            _ => return 0,
        }
        self.ensure_part(index, ctx);

        self.release_fifo(index, ctx.fifo);
        ctx.backend.term_body(self.body_key(index));
        if let Some(mesh) = self.mesh_key(index) {
            ctx.backend.hide_bone(mesh, self.chunks[index].bone_index);
        }
        self.mark_hidden(index);

        let mut hidden = 1;
        if recurse {
            hidden += self.switch_to_hidden(index);
        }
        self.queue_effects(index, 1);
        self.count_hidden(index, hidden, ctx);
        hidden
    }

    /// Subtracts `hidden` chunks from the mesh counter of `index`'s part.
    fn count_hidden<B: DestructionBackend + ?Sized>(
        &mut self,
        index: usize,
        hidden: usize,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let chunk = &self.chunks[index];
        let (actor_index, fragment, mesh) = (chunk.actor_index, chunk.fragment_index, chunk.mesh_index);
        let Some(slot) = self.actors.get_mut(actor_index).and_then(Option::as_mut) else {
            return;
        };
        let actor = slot.id();
        let Some(part) = slot.parts.get_mut(fragment).and_then(Option::as_mut) else {
            tracing::warn!(structure = ?self.id, chunk = index, fragment, "hidden chunk has no spawned part");
            return;
        };
        let Some(remaining) = part.chunks_remaining.get_mut(mesh as usize) else {
            return;
        };

        if hidden < *remaining {
            *remaining -= hidden;
            return;
        }
        if hidden > *remaining {
            tracing::warn!(
                structure = ?self.id,
                ?actor,
                fragment,
                mesh,
                hidden,
                remaining = *remaining,
                "more chunks hidden than the mesh has left, clamping"
            );
        }
        *remaining = 0;
        part.meshes_remaining = part.meshes_remaining.saturating_sub(1);
        let part_empty = part.meshes_remaining == 0;
        let range = slot.fragment_chunks(fragment);

        for i in range {
            if self.chunks[i].mesh_index == mesh && self.chunks[i].state != ChunkState::Hidden {
                self.mark_hidden(i);
                self.release_fifo(i, ctx.fifo);
                ctx.backend.term_body(self.body_key(i));
            }
        }
        ctx.backend.detach_mesh(MeshKey { actor, fragment, mesh });

        if !part_empty {
            return;
        }
        ctx.backend.destroy_part(actor, fragment);
        let Some(slot) = self.actors[actor_index].as_mut() else {
            return;
        };
        slot.parts[fragment] = None;
        slot.parts_remaining = slot.parts_remaining.saturating_sub(1);
        if slot.parts_remaining == 0 {
            tracing::debug!(structure = ?self.id, ?actor, "last part released, actor queued for removal");
            self.remove_actor(actor_index);
        }
    }

    /// Hides every child-state chunk below `index`. Returns how many.
    fn switch_to_hidden(&mut self, index: usize) -> usize {
        let mut hidden = 0;
        let mut stack: Vec<usize> = self.chunks[index].children().collect();
        while let Some(i) = stack.pop() {
            if self.chunks[i].state.is_child() {
                self.mark_hidden(i);
                hidden += 1;
                stack.extend(self.chunks[i].children());
            }
        }
        hidden
    }

    /// Moves a chunk to `Hidden`. A chunk at or below the support depth
    /// that still routes is queued as a fracture origin, so it leaves the
    /// support graph and the chunks leaning on it are rerouted.
    fn mark_hidden(&mut self, index: usize) {
        let support_depth = self.support_depth;
        let chunk = &mut self.chunks[index];
        chunk.state = ChunkState::Hidden;
        if chunk.depth >= support_depth && !chunk.is_route_blocker {
            self.fracture_origin_chunks.push(index);
        }
    }

    /// Turns the static-child subtree of `index` dynamic.
    fn switch_to_dynamic(&mut self, index: usize) {
        let mut stack: Vec<usize> = self.chunks[index].children().collect();
        while let Some(i) = stack.pop() {
            let chunk = &mut self.chunks[i];
            if chunk.state == ChunkState::StaticChild {
                chunk.state = ChunkState::DynamicChild;
                stack.extend(chunk.children());
            }
        }
    }

    /// Shows a chunk's bone and creates its rigid body.
    fn show_chunk<B: DestructionBackend + ?Sized>(&mut self, index: usize, fixed: bool, ctx: &mut FrameContext<'_, B>) {
        let Some(chunk) = self.chunks.get(index) else {
            return;
        };
        if chunk.state == ChunkState::Hidden {
            return;
        }
        let Some(slot) = self.actors.get(chunk.actor_index).and_then(Option::as_ref) else {
            return;
        };

        let params = &slot.desc.parameters;
        let contact_force_threshold = (params.force_to_damage > 0.0
            && params.depth(chunk.depth as usize + 1).take_impact_damage)
            .then(|| params.damage_threshold / (params.force_to_damage * MAX_FORCE_NORMALIZATION_TIME));

        if let Some(mesh) = self.mesh_key(index) {
            ctx.backend.show_bone(mesh, chunk.bone_index);
        }
        let transform = self.chunk_transform(index, &*ctx.backend);
        ctx.backend
            .init_body(self.body_key(index), &transform, fixed, contact_force_threshold);
    }

    /// Spawns the part holding `index` unless it exists. Returns false if
    /// there is still no part afterwards.
    fn ensure_part<B: DestructionBackend + ?Sized>(&mut self, index: usize, ctx: &mut FrameContext<'_, B>) -> bool {
        if self.part(index).is_some() {
            return true;
        }
        let Some(chunk) = self.chunks.get(index) else {
            return false;
        };
        let (actor_index, fragment) = (chunk.actor_index, chunk.fragment_index);
        let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
            return false;
        };
        let fixed = slot.desc.spawns_fixed();
        self.spawn_part(actor_index, fragment, fixed, ctx);
        self.part(index).is_some()
    }

    /// Replaces the unfractured mesh of one fragment with its chunk part.
    ///
    /// Root chunks get bodies, fixed or dynamic; all others start as
    /// children of their root.
    fn spawn_part<B: DestructionBackend + ?Sized>(
        &mut self,
        actor_index: usize,
        fragment: usize,
        fixed: bool,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
            return;
        };
        if !slot.fragment_visible.get(fragment).copied().unwrap_or(false) {
            return;
        }
        let actor = slot.id();
        let mesh_count = slot.desc.fragments[fragment].mesh_count;
        if !ctx.backend.spawn_part(actor, fragment, mesh_count) {
            tracing::warn!(structure = ?self.id, ?actor, fragment, "backend failed to spawn part");
            return;
        }
        let actor_state = ctx.backend.actor_state(actor);
        let actor_tm = Self::actor_transform(slot, &*ctx.backend);

        let Some(slot) = self.actors[actor_index].as_mut() else {
            return;
        };
        slot.fragment_visible[fragment] = false;
        let range = slot.fragment_chunks(fragment);
        let mut part = Part::new(&slot.desc.fragments[fragment]);
        // Chunks hidden before the part existed stay hidden.
        for chunk in &self.chunks[range.clone()] {
            if chunk.state == ChunkState::Hidden {
                if let Some(remaining) = part.chunks_remaining.get_mut(chunk.mesh_index as usize) {
                    *remaining = remaining.saturating_sub(1);
                }
            }
        }
        slot.parts[fragment] = Some(part);
        let nothing_visible = slot.fragment_visible.iter().all(|visible| !visible);

        ctx.backend.set_fragment_visible(actor, fragment, false);
        if nothing_visible {
            ctx.backend.term_actor_body(actor);
        }

        for index in range {
            let chunk = &mut self.chunks[index];
            if chunk.state == ChunkState::Hidden {
                continue;
            }
            chunk.world_transform = actor_tm;
            chunk.world_transform_valid = fixed;
            chunk.world_centroid_valid = false;

            if chunk.parent.is_none() {
                self.show_chunk(index, fixed, ctx);
                if fixed {
                    self.chunks[index].state = ChunkState::StaticRoot;
                    continue;
                }
                self.chunks[index].state = ChunkState::DynamicRoot;
                self.track_in_fifo(index, ctx.fifo);
                self.active.push(index);
                let body = self.body_key(index);
                ctx.backend.wake_body(body);
                if let Some(state) = actor_state {
                    let centroid = self.chunk_centroid(index, &*ctx.backend);
                    ctx.backend.set_body_velocity(body, state.velocity_at(centroid), state.angular_velocity);
                }
            } else {
                chunk.state = if fixed {
                    ChunkState::StaticChild
                } else {
                    ChunkState::DynamicChild
                };
                if let Some(mesh) = self.mesh_key(index) {
                    ctx.backend.hide_bone(mesh, self.chunks[index].bone_index);
                }
                ctx.backend.term_body(self.body_key(index));
            }
        }
        tracing::debug!(structure = ?self.id, ?actor, fragment, fixed, "part spawned");
    }

    /// Queues the sound and particle effects for hiding `index`, using the
    /// settings `depth_offset` levels below it.
    fn queue_effects(&mut self, index: usize, depth_offset: usize) {
        let chunk = &self.chunks[index];
        let Some(slot) = self.actors.get_mut(chunk.actor_index).and_then(Option::as_mut) else {
            return;
        };
        let params = slot.desc.parameters.depth(chunk.depth as usize + depth_offset);
        slot.effects.play_sound |= params.play_sound_effect;
        if params.play_particle_effect {
            let fragment_radius = slot
                .desc
                .fragment_world_bounds(chunk.fragment_index)
                .map_or(0.0, |b| b.half_extent().length());
            let scale = if fragment_radius > 0.0 {
                (chunk.radius / fragment_radius).min(1.0)
            } else {
                1.0
            };
            slot.effects.bases.push(SpawnBasis {
                location: chunk.world_centroid,
                scale,
            });
        }
    }

    // =========================================================================
    // ACTOR-LEVEL DAMAGE
    // =========================================================================

    /// Radius damage to every still unfractured fragment of an actor.
    ///
    /// Fractured chunks inherit the actor's velocity. If anything broke,
    /// all remaining fragments are swapped for their parts. Returns true if
    /// any chunk fractured.
    pub fn take_radius_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        actor_index: usize,
        damage: &DamageEvent,
        ctx: &mut FrameContext<'_, B>,
    ) -> bool {
        let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
            return false;
        };
        let event = DamageEvent {
            amount: slot.desc.parameters.capped(damage.amount),
            inherit_root_velocity: true,
            ..*damage
        };
        let fixed = slot.desc.spawns_fixed();
        let targets: Vec<Range<usize>> = (0..slot.desc.fragments.len())
            .filter(|&f| slot.fragment_visible[f])
            .filter(|&f| {
                slot.desc.fragment_world_bounds(f).is_some_and(|bounds| {
                    let reach = event.radius + bounds.half_extent().length();
                    bounds.center().distance_squared(event.origin) < reach * reach
                })
            })
            .map(|f| slot.fragment_chunks(f))
            .collect();

        let mut fractured = false;
        for range in targets {
            fractured |= !self.apply_damage(range, &event, ctx).is_empty();
        }

        if fractured {
            let fragments = self.actors[actor_index].as_ref().map_or(0, |s| s.desc.fragments.len());
            for fragment in 0..fragments {
                self.spawn_part(actor_index, fragment, fixed, ctx);
            }
        }
        fractured
    }

    /// Damage at a point, as from a projectile.
    ///
    /// A hit on a chunk of a spawned part damages that part only. Any other
    /// hit becomes radius damage to the actor and, scaled down, to its
    /// neighbors.
    pub fn take_point_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        actor_index: usize,
        amount: f32,
        hit: Vec3,
        momentum: Vec3,
        target: HitTarget,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
            return;
        };
        let base = slot.desc.parameters.capped(amount);
        let radius = base * slot.scaled_damage_to_radius;
        let momentum = momentum.length();

        match target {
            HitTarget::Chunk(index) => {
                let Some(chunk) = self.chunks.get(index) else {
                    return;
                };
                if chunk.actor_index != actor_index {
                    return;
                }
                if chunk.state == ChunkState::DynamicRoot {
                    let mut affected = Vec::new();
                    self.damage_chunk(index, hit, base, radius, false, &mut affected, &*ctx.backend);
                    for a in affected {
                        let direction = (self.chunk_centroid(a, &*ctx.backend) - hit).normalize_or_zero();
                        self.fracture_chunk(a, hit, direction * momentum, true, ctx);
                    }
                } else {
                    let range = slot.fragment_chunks(chunk.fragment_index);
                    let mut event = DamageEvent::new(base, radius, hit).with_momentum(momentum);
                    event.inherit_root_velocity = true;
                    self.apply_damage(range, &event, ctx);
                }
                return;
            }
            HitTarget::Fragment(fragment) if !slot.fragment_visible.get(fragment).copied().unwrap_or(false) => {
                return;
            }
            HitTarget::Fragment(_) | HitTarget::Actor => {}
        }

        let neighbors = slot.neighbors.clone();
        let event = DamageEvent::new(base, radius, hit).with_momentum(momentum);
        self.take_radius_damage(actor_index, &event, ctx);

        for neighbor in neighbors {
            let Some(other) = self.actors.get(neighbor).and_then(Option::as_ref) else {
                continue;
            };
            let shared_radius = 0.5 * (radius + base * other.scaled_damage_to_radius);
            let event = DamageEvent::new(base, shared_radius, hit).with_momentum(momentum);
            self.take_radius_damage(neighbor, &event, ctx);
        }
    }

    /// Converts a contact into impact damage.
    ///
    /// Self contacts, contacts without points, and impacts at or below the
    /// damage threshold are ignored.
    pub fn handle_collision<B: DestructionBackend + ?Sized>(
        &mut self,
        actor_index: usize,
        event: &CollisionEvent,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
            return;
        };
        if event.other_actor == Some(slot.id()) || event.contact_positions.is_empty() {
            return;
        }

        let params = &slot.desc.parameters;
        let damage = params.capped(
            event.total_normal_force.length() * MAX_FORCE_NORMALIZATION_TIME * params.force_to_damage,
        );
        if damage <= params.damage_threshold {
            return;
        }
        let position = event
            .contact_positions
            .iter()
            .fold(Vec3::ZERO, |sum, &p| sum + p)
            * (1.0 / event.contact_positions.len() as f32);
        let radius = damage * slot.scaled_damage_to_radius;

        let part_hit = event
            .chunk
            .filter(|&c| self.chunks.get(c).is_some_and(|chunk| chunk.actor_index == actor_index))
            .filter(|&c| self.part(c).is_some());
        match part_hit {
            Some(index) if self.chunks[index].state == ChunkState::DynamicRoot => {
                let mut affected = Vec::new();
                self.damage_chunk(index, position, damage, radius, false, &mut affected, &*ctx.backend);
                for a in affected {
                    self.fracture_chunk(a, position, Vec3::ZERO, false, ctx);
                }
            }
            Some(index) => {
                let range = slot.fragment_chunks(self.chunks[index].fragment_index);
                self.apply_damage(range, &DamageEvent::new(damage, radius, position), ctx);
            }
            None => {
                self.take_point_damage(
                    actor_index,
                    (damage + 0.5).floor(),
                    position,
                    Vec3::ZERO,
                    HitTarget::Actor,
                    ctx,
                );
            }
        }
    }
}
