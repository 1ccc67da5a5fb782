//! # Structures
//!
//! A structure is one connected group of destructible actors. It owns every
//! chunk of those actors, the overlap graph between their support-depth
//! chunks, and the work queues of the fracture propagation, which resume
//! from tick to tick.
//!
//! ## Layout
//!
//! - `build`: chunk allocation, overlap graph, initial routes
//! - `propagate`: budgeted support-route maintenance
//! - `damage`: damage, fracture, crumble and hide transitions
//!
//! Chunks are never removed. A destroyed chunk is `Hidden` and a route
//! blocker for the rest of the structure's life, so indices stay stable.

mod build;
mod damage;
mod propagate;

pub use damage::{CollisionEvent, DamageEvent, HitTarget};

use shatter_shared::constants::MAX_DEBRIS_DISTANCE;
use shatter_shared::math::{Transform, Vec3};

use crate::actor::{ActorDesc, ActorId, ActorSlot, Part};
use crate::backend::{BodyKey, DestructionBackend, EffectBackend, MeshKey, PhysicsBackend};
use crate::chunk::{Chunk, ChunkState};
use crate::config::ManagerSettings;
use crate::effects::DebugLine;
use crate::error::{FractureError, FractureResult};
use crate::fifo::{ChunkRef, DynamicChunkFifo};
use crate::manager::StructureId;
use crate::overlap::Overlap;

// =============================================================================
// FRAME CONTEXT
// =============================================================================

/// Services a structure needs while it changes chunk state: the backend it
/// sends requests to, and the global FIFO it registers dynamic chunks with.
pub struct FrameContext<'a, B: ?Sized> {
    /// Geometry, physics, visual and effect requests.
    pub backend: &'a mut B,
    /// Global dynamic-chunk FIFO.
    pub fifo: &'a mut DynamicChunkFifo,
}

impl<'a, B: ?Sized> FrameContext<'a, B> {
    /// Bundles a backend and the FIFO.
    pub fn new(backend: &'a mut B, fifo: &'a mut DynamicChunkFifo) -> Self {
        Self { backend, fifo }
    }
}

// =============================================================================
// WORK QUEUE
// =============================================================================

/// FIFO of chunk indices consumed through a cursor.
///
/// Popping advances `start` instead of shifting the buffer; a drained
/// queue is reset so the buffer is reused.
#[derive(Clone, Debug, Default)]
pub struct WorkQueue {
    items: Vec<usize>,
    start: usize,
}

impl WorkQueue {
    /// Empty queue with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    /// Appends an entry.
    #[inline]
    pub fn push(&mut self, chunk: usize) {
        self.items.push(chunk);
    }

    /// Takes the oldest pending entry.
    #[inline]
    pub fn pop(&mut self) -> Option<usize> {
        let chunk = *self.items.get(self.start)?;
        self.start += 1;
        Some(chunk)
    }

    /// Entries not yet popped.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[usize] {
        &self.items[self.start..]
    }

    /// True if every entry was popped.
    #[inline]
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.start >= self.items.len()
    }

    /// Clears the buffer once everything was popped.
    pub fn reset_if_drained(&mut self) {
        if self.is_drained() {
            self.clear();
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.items.clear();
        self.start = 0;
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Counters describing the propagation work of a structure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// `propagate_fracture` calls that did any work.
    pub ticks: u64,
    /// Chunks in the reroute area of the latest call.
    pub last_area_len: usize,
    /// Largest reroute area seen.
    pub max_area_len: usize,
    /// Chunks rerouted over the structure's life.
    pub total_rerouted: u64,
    /// Chunks handed to passive fracture over the structure's life.
    pub passive_fractures: u64,
}

// =============================================================================
// STRUCTURE
// =============================================================================

/// Connected group of destructible actors and all their chunks.
#[derive(Debug)]
pub struct Structure {
    id: StructureId,
    actors: Vec<Option<ActorSlot>>,
    chunks: Vec<Chunk>,
    overlaps: Vec<Overlap>,
    support_depth: u32,
    per_frame_budget: usize,
    /// Dynamic roots simulated by the physics backend.
    active: Vec<usize>,
    /// Chunks fractured since the last propagation.
    fracture_origin_chunks: Vec<usize>,
    fracture_origin_fifo: WorkQueue,
    pseudo_supporter_fifo: WorkQueue,
    route_update_fifo: WorkQueue,
    route_update_area: Vec<usize>,
    passive_fracture_chunks: Vec<usize>,
    actor_kill_list: Vec<usize>,
    stats: PropagationStats,
}

impl Structure {
    /// Structure id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> StructureId {
        self.id
    }

    /// All chunks.
    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// One chunk.
    #[inline]
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// One chunk, or an error naming the valid range.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::ChunkOutOfRange`] past the end of the array.
    pub fn try_chunk(&self, index: usize) -> FractureResult<&Chunk> {
        self.chunks.get(index).ok_or(FractureError::ChunkOutOfRange {
            index,
            len: self.chunks.len(),
        })
    }

    /// Overlap graph records.
    #[inline]
    #[must_use]
    pub fn overlaps(&self) -> &[Overlap] {
        &self.overlaps
    }

    /// Tree depth at which support is evaluated.
    #[inline]
    #[must_use]
    pub const fn support_depth(&self) -> u32 {
        self.support_depth
    }

    /// Maximum chunks rerouted per tick.
    #[inline]
    #[must_use]
    pub const fn per_frame_budget(&self) -> usize {
        self.per_frame_budget
    }

    /// Dynamic roots currently simulated.
    #[inline]
    #[must_use]
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    /// Reroute area of the latest propagation.
    #[inline]
    #[must_use]
    pub fn route_update_area(&self) -> &[usize] {
        &self.route_update_area
    }

    /// Chunks handed to passive fracture by the latest propagation.
    #[inline]
    #[must_use]
    pub fn passive_fracture_chunks(&self) -> &[usize] {
        &self.passive_fracture_chunks
    }

    /// Propagation counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &PropagationStats {
        &self.stats
    }

    /// True while fractures are waiting to be propagated.
    #[must_use]
    pub fn is_propagation_pending(&self) -> bool {
        !self.fracture_origin_chunks.is_empty()
            || !self.fracture_origin_fifo.is_drained()
            || !self.pseudo_supporter_fifo.is_drained()
    }

    /// Ids of the actors still alive in this structure.
    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.iter().flatten().map(ActorSlot::id)
    }

    /// Descriptor of the actor in slot `index`, if still alive.
    #[must_use]
    pub fn actor(&self, index: usize) -> Option<&ActorDesc> {
        self.actors.get(index)?.as_ref().map(|slot| &slot.desc)
    }

    /// Live actors with their slot index.
    pub fn actors(&self) -> impl Iterator<Item = (usize, &ActorDesc)> + '_ {
        self.actors
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, &s.desc)))
    }

    /// Slot of an actor in this structure.
    #[must_use]
    pub fn actor_index(&self, id: ActorId) -> Option<usize> {
        self.actors
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.id() == id))
    }

    /// True once every actor slot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.iter().all(Option::is_none)
    }

    /// Actors waiting on the kill list.
    #[must_use]
    pub fn pending_actor_removals(&self) -> usize {
        self.actor_kill_list.len()
    }

    /// Queues an actor slot for destruction at the end of the next tick.
    ///
    /// Returns false if the slot is already empty.
    pub fn remove_actor(&mut self, actor_index: usize) -> bool {
        if self.actors.get(actor_index).map_or(true, Option::is_none) {
            return false;
        }
        if !self.actor_kill_list.contains(&actor_index) {
            self.actor_kill_list.push(actor_index);
        }
        true
    }

    /// Takes the actors out of the structure, with their neighbor lists,
    /// so they can be rebuilt into a merged structure.
    pub(crate) fn into_actor_entries(self) -> Vec<Option<(ActorDesc, Vec<usize>)>> {
        self.actors
            .into_iter()
            .map(|slot| slot.map(|s| (s.desc, s.neighbors)))
            .collect()
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advances the structure by one frame.
    ///
    /// Ages and expires active debris, flushes queued effects, draws the
    /// support graph if requested, propagates pending fractures and
    /// finally destroys actors on the kill list. Returns the ids of the
    /// destroyed actors.
    pub fn tick<B: DestructionBackend + ?Sized>(
        &mut self,
        dt: f32,
        settings: &ManagerSettings,
        ctx: &mut FrameContext<'_, B>,
    ) -> Vec<ActorId> {
        self.process_active(dt, settings.debris_lifetime, ctx);
        self.flush_effects(&mut *ctx.backend);
        if settings.visualize_support {
            self.draw_support(&mut *ctx.backend);
        }
        self.propagate_fracture(ctx);
        self.flush_actor_kill_list(ctx)
    }

    fn process_active<B: DestructionBackend + ?Sized>(
        &mut self,
        dt: f32,
        debris_lifetime: f32,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let max_distance_sq = MAX_DEBRIS_DISTANCE * MAX_DEBRIS_DISTANCE;
        let mut i = 0;
        while i < self.active.len() {
            let index = self.active[i];
            let actor_index = self.chunks[index].actor_index;
            let Some(slot) = self.actors.get(actor_index).and_then(Option::as_ref) else {
                self.active.swap_remove(i);
                continue;
            };
            let location = Self::actor_transform(slot, &*ctx.backend).position;
            let timeout = slot
                .desc
                .parameters
                .depth(self.chunks[index].depth as usize + 1)
                .do_not_timeout;

            self.mark_moved(index);
            self.chunks[index].age += dt;

            if self.chunks[index].state == ChunkState::Hidden {
                self.active.swap_remove(i);
                continue;
            }

            let centroid = self.chunk_centroid(index, &*ctx.backend);
            if centroid.distance_squared(location) > max_distance_sq {
                tracing::debug!(structure = ?self.id, chunk = index, "debris left the world, hiding");
                self.hide_chunk(index, true, ctx);
                self.release_fifo(index, ctx.fifo);
                self.active.swap_remove(i);
                continue;
            }

            if !timeout && self.chunks[index].age >= debris_lifetime {
                self.crumble_chunk(index, ctx);
                self.release_fifo(index, ctx.fifo);
                self.active.swap_remove(i);
                continue;
            }

            i += 1;
        }
    }

    fn flush_effects<B: EffectBackend + ?Sized>(&mut self, backend: &mut B) {
        for slot in self.actors.iter_mut().flatten() {
            let id = slot.desc.id;
            let effects = &mut slot.effects;
            if let Some(fill) = effects.volume_fill.take() {
                if !fill.is_empty() {
                    backend.spawn_volume_fill(id, fill);
                }
            }
            if effects.play_sound {
                backend.play_fracture_sound(id);
                effects.play_sound = false;
            }
            if !effects.bases.is_empty() {
                backend.spawn_fracture_effects(id, &effects.bases);
                effects.bases.clear();
            }
        }
    }

    fn draw_support<B: DestructionBackend + ?Sized>(&mut self, backend: &mut B) {
        let support: Vec<usize> = (0..self.chunks.len())
            .filter(|&i| self.chunks[i].num_overlaps > 0 || self.chunks[i].is_environment_supported)
            .filter(|&i| self.chunks[i].depth == self.support_depth && !self.chunks[i].is_route_blocker)
            .collect();

        let mut lines = Vec::new();
        for &a in &support {
            let centroid_a = self.chunk_centroid(a, &*backend);
            if self.chunks[a].is_environment_supported {
                lines.push(DebugLine {
                    start: centroid_a,
                    end: centroid_a + Vec3::Z * self.chunks[a].radius,
                    color: DebugLine::ANCHOR,
                });
            }
            for o in self.chunks[a].overlaps() {
                let b = self.overlaps[o].chunk_b;
                if b < a || self.chunks[b].is_route_blocker {
                    continue;
                }
                let centroid_b = self.chunk_centroid(b, &*backend);
                let color = if self.chunks[a].is_route_valid && self.chunks[b].is_route_valid {
                    DebugLine::SUPPORTED
                } else {
                    DebugLine::PENDING
                };
                lines.push(DebugLine {
                    start: centroid_a,
                    end: centroid_b,
                    color,
                });
            }
        }
        backend.draw_debug_lines(&lines);
    }

    fn flush_actor_kill_list<B: DestructionBackend + ?Sized>(&mut self, ctx: &mut FrameContext<'_, B>) -> Vec<ActorId> {
        let mut removed = Vec::with_capacity(self.actor_kill_list.len());
        for actor_index in std::mem::take(&mut self.actor_kill_list) {
            let Some(slot) = self.actors.get_mut(actor_index).and_then(Option::take) else {
                continue;
            };
            for fragment in 0..slot.desc.fragments.len() {
                for index in slot.fragment_chunks(fragment) {
                    self.release_fifo(index, ctx.fifo);
                }
            }
            self.active.retain(|&i| self.chunks[i].actor_index != actor_index);
            ctx.backend.destroy_actor(slot.id());
            tracing::info!(structure = ?self.id, actor = ?slot.id(), "destructible actor removed");
            removed.push(slot.id());
        }
        removed
    }

    // =========================================================================
    // GEOMETRY CACHE
    // =========================================================================

    fn actor_transform<P: PhysicsBackend + ?Sized>(slot: &ActorSlot, backend: &P) -> Transform {
        let transform = if slot.desc.simulated {
            backend.actor_transform(slot.id()).unwrap_or(slot.desc.transform)
        } else {
            slot.desc.transform
        };
        transform.without_scale()
    }

    /// World placement of a chunk's rigid frame, cached until it moves.
    pub fn chunk_transform<P: PhysicsBackend + ?Sized>(&mut self, index: usize, backend: &P) -> Transform {
        let Some(chunk) = self.chunks.get(index) else {
            return Transform::IDENTITY;
        };
        if chunk.world_transform_valid || chunk.state == ChunkState::Hidden {
            return chunk.world_transform;
        }
        let Some(slot) = self.actors.get(chunk.actor_index).and_then(Option::as_ref) else {
            return chunk.world_transform;
        };

        let actor_tm = Self::actor_transform(slot, backend);
        let has_part = slot.parts.get(chunk.fragment_index).is_some_and(Option::is_some);
        let (state, parent) = (chunk.state, chunk.parent);

        let transform = if !has_part {
            actor_tm
        } else if state.is_root() {
            backend.body_transform(self.body_key(index)).unwrap_or(actor_tm)
        } else {
            match parent {
                Some(parent) => self.chunk_transform(parent, backend),
                None => actor_tm,
            }
        };

        let chunk = &mut self.chunks[index];
        chunk.world_transform = transform;
        chunk.world_transform_valid = true;
        transform
    }

    /// World centroid of a chunk, cached until it moves.
    pub fn chunk_centroid<P: PhysicsBackend + ?Sized>(&mut self, index: usize, backend: &P) -> Vec3 {
        match self.chunks.get(index) {
            None => return Vec3::ZERO,
            Some(chunk) if chunk.world_centroid_valid => return chunk.world_centroid,
            Some(_) => {}
        }
        let transform = self.chunk_transform(index, backend);
        let chunk = &mut self.chunks[index];
        chunk.world_centroid = transform.transform_point(chunk.relative_centroid);
        chunk.world_centroid_valid = true;
        chunk.world_centroid
    }

    /// Invalidates cached geometry of a chunk and its subtree.
    fn mark_moved(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            let Some(chunk) = self.chunks.get_mut(i) else {
                continue;
            };
            chunk.world_transform_valid = false;
            chunk.world_centroid_valid = false;
            stack.extend(chunk.children());
        }
    }

    // =========================================================================
    // HANDLES
    // =========================================================================

    fn mesh_key(&self, index: usize) -> Option<MeshKey> {
        let chunk = self.chunks.get(index)?;
        let slot = self.actors.get(chunk.actor_index)?.as_ref()?;
        Some(MeshKey {
            actor: slot.id(),
            fragment: chunk.fragment_index,
            mesh: chunk.mesh_index,
        })
    }

    fn body_key(&self, index: usize) -> BodyKey {
        let chunk = &self.chunks[index];
        let mesh = self.mesh_key(index).unwrap_or(MeshKey {
            actor: ActorId(u64::MAX),
            fragment: chunk.fragment_index,
            mesh: chunk.mesh_index,
        });
        BodyKey {
            mesh,
            body: chunk.body_index,
        }
    }

    fn part(&self, index: usize) -> Option<&Part> {
        let chunk = self.chunks.get(index)?;
        self.actors
            .get(chunk.actor_index)?
            .as_ref()?
            .parts
            .get(chunk.fragment_index)?
            .as_ref()
    }

    /// Tracks a chunk in the global FIFO.
    pub(crate) fn track_in_fifo(&mut self, index: usize, fifo: &mut DynamicChunkFifo) {
        self.release_fifo(index, fifo);
        let handle = fifo.add(ChunkRef {
            structure: self.id,
            chunk: index,
        });
        self.chunks[index].fifo_handle = Some(handle);
    }

    /// Stops tracking a chunk in the global FIFO. Returns false if it was
    /// not tracked.
    pub(crate) fn release_fifo(&mut self, index: usize, fifo: &mut DynamicChunkFifo) -> bool {
        match self.chunks.get_mut(index).and_then(|c| c.fifo_handle.take()) {
            Some(handle) => fifo.remove(handle).is_some(),
            None => false,
        }
    }

    /// Forgets the FIFO handle of a chunk the FIFO already evicted.
    pub(crate) fn forget_evicted(&mut self, index: usize) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.fifo_handle = None;
        }
    }

    // =========================================================================
    // INVARIANTS
    // =========================================================================

    /// Checks the route bookkeeping of every support chunk against the
    /// overlap graph.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::RouteInvariant`] for the first chunk whose
    /// route flags contradict each other, or whose supporter count does not
    /// match its valid neighbors one hop closer to an anchor.
    pub fn verify_routes(&self) -> FractureResult<()> {
        let broken = |chunk: usize, reason: String| Err(FractureError::RouteInvariant { chunk, reason });

        let mut pending_pseudo = vec![false; self.chunks.len()];
        for &i in self.pseudo_supporter_fifo.pending() {
            pending_pseudo[i] = true;
        }
        let mut pending_origin = vec![false; self.chunks.len()];
        for &i in self.fracture_origin_fifo.pending() {
            pending_origin[i] = true;
        }
        let mut queued_removal = vec![false; self.chunks.len()];
        for &i in &self.fracture_origin_chunks {
            queued_removal[i] = true;
        }

        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.depth != self.support_depth || chunk.num_overlaps == 0 && !chunk.is_route_valid {
                continue;
            }
            if chunk.is_routing {
                return broken(index, "left in routing state".into());
            }
            if !chunk.is_route_valid {
                continue;
            }
            if chunk.state == ChunkState::Hidden && !chunk.is_route_blocker {
                if !queued_removal[index] {
                    return broken(index, "valid route on a hidden chunk".into());
                }
                continue;
            }
            // Blockers keep their route until their fracture origin entry is processed.
            if chunk.is_route_blocker {
                if !pending_origin[index] {
                    return broken(index, "valid route on a processed route blocker".into());
                }
                continue;
            }
            if chunk.shortest_route < 0 {
                return broken(index, format!("valid route of length {}", chunk.shortest_route));
            }
            if chunk.is_environment_supported != (chunk.shortest_route == 0) {
                return broken(index, "route 0 does not match environment support".into());
            }
            if chunk.shortest_route == 0 {
                continue;
            }

            let supporters = chunk
                .overlaps()
                .map(|o| &self.chunks[self.overlaps[o].chunk_b])
                .filter(|n| n.is_route_valid && n.shortest_route + 1 == chunk.shortest_route)
                .count();
            if chunk.num_supporters == 0 {
                if !pending_pseudo[index] {
                    return broken(index, "unsupported chunk not queued for invalidation".into());
                }
            } else if chunk.num_supporters as usize != supporters {
                return broken(
                    index,
                    format!("{} supporters recorded, {supporters} found", chunk.num_supporters),
                );
            }
        }
        Ok(())
    }
}
