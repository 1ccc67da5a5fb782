//! # Structure Manager
//!
//! Process-wide registry of structures. It owns the global dynamic-chunk
//! FIFO that bounds the simulation cost of debris, routes damage to the
//! right structure and ticks every structure once per frame.
//!
//! ```text
//! tick(dt):
//!   1. flush structure kill list   (purge FIFO + actor index)
//!   2. tick each structure         (debris, effects, propagation, actor kills)
//!      └─ crumble FIFO evictions after every structure
//!   3. refresh settings            (from the shared SettingsHandle)
//! ```
//!
//! Evictions never reach into a structure from inside the FIFO. They are
//! queued there and crumbled by the manager as soon as the call that
//! caused them returns.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use shatter_shared::constants::SUPPORT_PADDING;
use shatter_shared::math::Vec3;

use crate::actor::{ActorDesc, ActorId};
use crate::backend::{DestructionBackend, GeometryQuery};
use crate::config::{ManagerSettings, SettingsHandle};
use crate::error::{FractureError, FractureResult};
use crate::fifo::{ChunkRef, DynamicChunkFifo};
use crate::structure::{CollisionEvent, DamageEvent, FrameContext, HitTarget, Structure};

/// Manager-assigned structure identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructureId(pub u32);

type ActorEntry = Option<(ActorDesc, Vec<usize>)>;

/// Registry of every structure plus the global dynamic-chunk FIFO.
#[derive(Debug)]
pub struct Manager {
    structures: BTreeMap<StructureId, Structure>,
    /// Which structure each registered actor lives in.
    actor_index: HashMap<ActorId, StructureId>,
    fifo: DynamicChunkFifo,
    structure_kill_list: Vec<StructureId>,
    /// Settings in effect for the current tick.
    settings: ManagerSettings,
    handle: SettingsHandle,
    next_id: u32,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(ManagerSettings::default())
    }
}

impl Manager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(settings: ManagerSettings) -> Self {
        Self::with_handle(SettingsHandle::new(settings))
    }

    /// Creates an empty manager reading its settings from a shared handle.
    #[must_use]
    pub fn with_handle(handle: SettingsHandle) -> Self {
        let settings = handle.snapshot();
        Self {
            structures: BTreeMap::new(),
            actor_index: HashMap::new(),
            fifo: DynamicChunkFifo::new(settings.max_dynamic_chunks),
            structure_kill_list: Vec::new(),
            settings,
            handle,
            next_id: 0,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Settings in effect for the current tick.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Shared handle to write settings from anywhere.
    #[must_use]
    pub fn settings_handle(&self) -> SettingsHandle {
        self.handle.clone()
    }

    /// The global dynamic-chunk FIFO.
    #[inline]
    #[must_use]
    pub const fn fifo(&self) -> &DynamicChunkFifo {
        &self.fifo
    }

    /// One structure.
    #[must_use]
    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    /// All live structures, in id order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> + '_ {
        self.structures.values()
    }

    /// Number of live structures.
    #[must_use]
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    /// Structure an actor belongs to.
    #[must_use]
    pub fn structure_of(&self, actor: ActorId) -> Option<StructureId> {
        self.actor_index.get(&actor).copied()
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Registers an actor and returns the structure it ended up in.
    ///
    /// A fixed actor is merged with every structure holding a fixed actor
    /// it overlaps. A simulated actor always gets a structure of its own.
    ///
    /// # Errors
    ///
    /// - [`FractureError::ActorAlreadyRegistered`] if the id is taken.
    /// - [`FractureError::RegistrationLocked`] once debris exists or
    ///   structure removals are pending.
    /// - [`FractureError::InvalidAsset`] for a malformed fragment.
    pub fn register_actor<G: GeometryQuery + ?Sized>(
        &mut self,
        desc: ActorDesc,
        geometry: &G,
    ) -> FractureResult<StructureId> {
        if self.actor_index.contains_key(&desc.id) {
            return Err(FractureError::ActorAlreadyRegistered(desc.id));
        }
        if !self.fifo.is_empty() || !self.structure_kill_list.is_empty() {
            return Err(FractureError::RegistrationLocked {
                dynamic_chunks: self.fifo.len(),
                pending_removals: self.structure_kill_list.len(),
            });
        }
        desc.validate()?;

        if !desc.starts_fixed() {
            return self.create_structure(vec![Some((desc, Vec::new()))], geometry);
        }

        let padded = desc.world_bounds().expanded(SUPPORT_PADDING);
        let mut touched: Vec<(StructureId, Vec<usize>)> = Vec::new();
        for (&id, structure) in &self.structures {
            let slots: Vec<usize> = structure
                .actors()
                .filter(|(_, other)| other.starts_fixed())
                .filter(|(_, other)| other.world_bounds().intersects(&padded))
                .filter(|(_, other)| geometry.actors_overlap(&desc, other, SUPPORT_PADDING))
                .map(|(index, _)| index)
                .collect();
            if !slots.is_empty() {
                touched.push((id, slots));
            }
        }

        let actor = desc.id;
        let mut entries: Vec<ActorEntry> = vec![Some((desc, Vec::new()))];
        let mut new_neighbors = Vec::new();
        for (id, slots) in &touched {
            let Some(structure) = self.structures.remove(id) else {
                continue;
            };
            let offset = entries.len();
            for (index, entry) in structure.into_actor_entries().into_iter().enumerate() {
                entries.push(entry.map(|(other, neighbors)| {
                    let mut neighbors: Vec<usize> = neighbors.iter().map(|n| n + offset).collect();
                    if slots.contains(&index) {
                        neighbors.push(0);
                        new_neighbors.push(index + offset);
                    }
                    (other, neighbors)
                }));
            }
        }
        if let Some(Some((_, neighbors))) = entries.first_mut() {
            *neighbors = new_neighbors;
        }

        if !touched.is_empty() {
            tracing::info!(
                ?actor,
                merged = touched.len(),
                actors = entries.iter().flatten().count(),
                "merging structures for new actor"
            );
        }
        self.create_structure(entries, geometry)
    }

    fn create_structure<G: GeometryQuery + ?Sized>(
        &mut self,
        entries: Vec<ActorEntry>,
        geometry: &G,
    ) -> FractureResult<StructureId> {
        let id = StructureId(self.next_id);
        let structure = Structure::build(id, entries, geometry).ok_or(FractureError::EmptyStructure)?;
        self.next_id += 1;
        for actor in structure.actor_ids() {
            self.actor_index.insert(actor, id);
        }
        self.structures.insert(id, structure);
        Ok(id)
    }

    /// Queues a structure for removal at the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownStructure`] for an unknown id.
    pub fn remove_structure(&mut self, id: StructureId) -> FractureResult<()> {
        if !self.structures.contains_key(&id) {
            return Err(FractureError::UnknownStructure(id));
        }
        if !self.structure_kill_list.contains(&id) {
            self.structure_kill_list.push(id);
        }
        Ok(())
    }

    /// Queues an actor for removal at the next tick. A structure left
    /// without actors is removed on the tick after.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownActor`] if the actor is not registered.
    pub fn remove_actor(&mut self, actor: ActorId) -> FractureResult<()> {
        let (id, index) = self.locate(actor)?;
        if let Some(structure) = self.structures.get_mut(&id) {
            structure.remove_actor(index);
        }
        Ok(())
    }

    fn locate(&self, actor: ActorId) -> FractureResult<(StructureId, usize)> {
        let id = self.structure_of(actor).ok_or(FractureError::UnknownActor(actor))?;
        let index = self
            .structures
            .get(&id)
            .and_then(|s| s.actor_index(actor))
            .ok_or(FractureError::UnknownActor(actor))?;
        Ok((id, index))
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advances every structure by one frame.
    pub fn tick<B: DestructionBackend + ?Sized>(&mut self, dt: f32, backend: &mut B) {
        self.flush_structure_kill_list();

        let ids: Vec<StructureId> = self.structures.keys().copied().collect();
        for id in ids {
            let Some(structure) = self.structures.get_mut(&id) else {
                continue;
            };
            let mut ctx = FrameContext::new(&mut *backend, &mut self.fifo);
            let removed = structure.tick(dt, &self.settings, &mut ctx);
            let empty = structure.is_empty();

            for actor in removed {
                self.actor_index.remove(&actor);
            }
            if empty && !self.structure_kill_list.contains(&id) {
                self.structure_kill_list.push(id);
            }
            self.flush_evictions(backend);
        }

        self.refresh_settings(backend);
    }

    fn flush_structure_kill_list(&mut self) {
        for id in std::mem::take(&mut self.structure_kill_list) {
            let Some(structure) = self.structures.remove(&id) else {
                continue;
            };
            let purged = self.fifo.purge_structure(id);
            let leftover: Vec<ActorId> = structure.actor_ids().collect();
            if !leftover.is_empty() {
                tracing::warn!(structure = ?id, ?leftover, "structure removed with live actors");
            }
            self.actor_index.retain(|_, owner| *owner != id);
            tracing::info!(structure = ?id, purged, "structure removed");
        }
    }

    fn refresh_settings<B: DestructionBackend + ?Sized>(&mut self, backend: &mut B) {
        let settings = self.handle.snapshot();
        if settings.max_dynamic_chunks != self.fifo.max() {
            self.fifo.set_max(settings.max_dynamic_chunks);
            self.fifo.cap(settings.max_dynamic_chunks);
            self.flush_evictions(backend);
        }
        self.settings = settings;
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// Changes the dynamic-chunk cap (at least 1), crumbling the oldest
    /// chunks over it right away.
    pub fn set_max_dynamic_chunk_count<B: DestructionBackend + ?Sized>(&mut self, max: usize, backend: &mut B) {
        let max = max.max(1);
        self.settings.max_dynamic_chunks = max;
        self.fifo.set_max(max);
        self.cap_dynamic_chunk_count(max, backend);
        self.handle.update(|s| s.max_dynamic_chunks = max);
    }

    /// Changes how long debris lives (at least 0 seconds).
    pub fn set_debris_lifetime(&mut self, seconds: f32) {
        let seconds = seconds.max(0.0);
        self.settings.debris_lifetime = seconds;
        self.handle.update(|s| s.debris_lifetime = seconds);
    }

    /// Toggles drawing of the support graph.
    pub fn set_visualize_support(&mut self, on: bool) {
        self.settings.visualize_support = on;
        self.handle.update(|s| s.visualize_support = on);
    }

    // =========================================================================
    // FIFO
    // =========================================================================

    /// Starts tracking a chunk as dynamic, evicting the oldest chunk if the
    /// FIFO is full.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown structure or chunk.
    pub fn add_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        id: StructureId,
        chunk: usize,
        backend: &mut B,
    ) -> FractureResult<()> {
        let structure = self.structures.get_mut(&id).ok_or(FractureError::UnknownStructure(id))?;
        structure.try_chunk(chunk)?;
        structure.track_in_fifo(chunk, &mut self.fifo);
        self.flush_evictions(backend);
        Ok(())
    }

    /// Stops tracking a chunk. Returns false if it was not tracked.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownStructure`] for an unknown id.
    pub fn remove_chunk(&mut self, id: StructureId, chunk: usize) -> FractureResult<bool> {
        let structure = self.structures.get_mut(&id).ok_or(FractureError::UnknownStructure(id))?;
        Ok(structure.release_fifo(chunk, &mut self.fifo))
    }

    /// Stops tracking the oldest chunk without crumbling it.
    pub fn remove_first_chunk(&mut self) -> Option<ChunkRef> {
        let chunk = self.fifo.remove_first()?;
        if let Some(structure) = self.structures.get_mut(&chunk.structure) {
            structure.forget_evicted(chunk.chunk);
        }
        Some(chunk)
    }

    /// Crumbles the oldest dynamic chunks until at most `cap` remain.
    pub fn cap_dynamic_chunk_count<B: DestructionBackend + ?Sized>(&mut self, cap: usize, backend: &mut B) {
        self.fifo.cap(cap);
        self.flush_evictions(backend);
    }

    fn flush_evictions<B: DestructionBackend + ?Sized>(&mut self, backend: &mut B) {
        while let Some(evicted) = self.fifo.pop_eviction() {
            let Some(structure) = self.structures.get_mut(&evicted.structure) else {
                tracing::debug!(?evicted, "evicted chunk of a removed structure, skipped");
                continue;
            };
            structure.forget_evicted(evicted.chunk);
            let mut ctx = FrameContext::new(&mut *backend, &mut self.fifo);
            structure.crumble_chunk(evicted.chunk, &mut ctx);
        }
    }

    // =========================================================================
    // DAMAGE
    // =========================================================================

    fn with_structure<B, R>(
        &mut self,
        id: StructureId,
        backend: &mut B,
        f: impl FnOnce(&mut Structure, &mut FrameContext<'_, B>) -> R,
    ) -> FractureResult<R>
    where
        B: DestructionBackend + ?Sized,
    {
        let structure = self.structures.get_mut(&id).ok_or(FractureError::UnknownStructure(id))?;
        let mut ctx = FrameContext::new(&mut *backend, &mut self.fifo);
        let result = f(structure, &mut ctx);
        self.flush_evictions(backend);
        Ok(result)
    }

    /// Damages the root chunks in `chunks` of a structure. Returns the
    /// fractured chunks.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownStructure`] for an unknown id.
    pub fn apply_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        id: StructureId,
        chunks: Range<usize>,
        damage: &DamageEvent,
        backend: &mut B,
    ) -> FractureResult<Vec<usize>> {
        self.with_structure(id, backend, |s, ctx| s.apply_damage(chunks, damage, ctx))
    }

    /// Fractures one chunk.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown structure or chunk.
    pub fn fracture_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        id: StructureId,
        chunk: usize,
        point: Vec3,
        impulse: Vec3,
        backend: &mut B,
    ) -> FractureResult<()> {
        self.with_structure(id, backend, |s, ctx| {
            s.try_chunk(chunk)?;
            s.fracture_chunk(chunk, point, impulse, false, ctx);
            Ok(())
        })?
    }

    /// Crumbles one chunk, spawning its part if the fragment is still
    /// whole. Returns false if the chunk was already hidden or its part
    /// could not be spawned.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown structure or chunk.
    pub fn crumble_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        id: StructureId,
        chunk: usize,
        backend: &mut B,
    ) -> FractureResult<bool> {
        self.with_structure(id, backend, |s, ctx| {
            s.try_chunk(chunk)?;
            Ok(s.crumble_chunk(chunk, ctx))
        })?
    }

    /// Hides one chunk. Returns the number of chunks hidden.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown structure or chunk.
    pub fn hide_chunk<B: DestructionBackend + ?Sized>(
        &mut self,
        id: StructureId,
        chunk: usize,
        recurse: bool,
        backend: &mut B,
    ) -> FractureResult<usize> {
        self.with_structure(id, backend, |s, ctx| {
            s.try_chunk(chunk)?;
            Ok(s.hide_chunk(chunk, recurse, ctx))
        })?
    }

    /// Radius damage to an actor. Returns true if anything fractured.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownActor`] if the actor is not registered.
    pub fn take_radius_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        actor: ActorId,
        damage: &DamageEvent,
        backend: &mut B,
    ) -> FractureResult<bool> {
        let (id, index) = self.locate(actor)?;
        self.with_structure(id, backend, |s, ctx| s.take_radius_damage(index, damage, ctx))
    }

    /// Point damage to an actor, as from a projectile.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownActor`] if the actor is not registered.
    pub fn take_point_damage<B: DestructionBackend + ?Sized>(
        &mut self,
        actor: ActorId,
        amount: f32,
        hit: Vec3,
        momentum: Vec3,
        target: HitTarget,
        backend: &mut B,
    ) -> FractureResult<()> {
        let (id, index) = self.locate(actor)?;
        self.with_structure(id, backend, |s, ctx| {
            s.take_point_damage(index, amount, hit, momentum, target, ctx);
        })
    }

    /// Feeds a contact reported by the physics backend into impact damage.
    ///
    /// # Errors
    ///
    /// Returns [`FractureError::UnknownActor`] if the hit actor is not registered.
    pub fn handle_collision<B: DestructionBackend + ?Sized>(
        &mut self,
        event: &CollisionEvent,
        backend: &mut B,
    ) -> FractureResult<()> {
        let (id, index) = self.locate(event.actor)?;
        self.with_structure(id, backend, |s, ctx| s.handle_collision(index, event, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::FragmentAsset;
    use crate::backend::RecordingBackend;
    use shatter_shared::math::{Aabb, Transform};

    fn block(id: u64, x: f32) -> ActorDesc {
        ActorDesc::new(
            ActorId(id),
            vec![FragmentAsset::single_chunk(Aabb::new(
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(x + 10.0, 10.0, 10.0),
            ))],
        )
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let backend = RecordingBackend::new();
        let mut manager = Manager::default();
        manager.register_actor(block(1, 0.0), &backend).unwrap();
        assert_eq!(
            manager.register_actor(block(1, 50.0), &backend),
            Err(FractureError::ActorAlreadyRegistered(ActorId(1)))
        );
    }

    #[test]
    fn test_touching_actors_merge_and_far_ones_do_not() {
        let backend = RecordingBackend::new();
        let mut manager = Manager::default();
        let a = manager.register_actor(block(1, 0.0), &backend).unwrap();
        let b = manager.register_actor(block(2, 100.0), &backend).unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.structure_count(), 2);

        // Bridges both
        let mut bridge = block(3, 10.0);
        bridge.fragments[0].bounds = Aabb::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(100.0, 10.0, 10.0));
        bridge.fragments[0].chunks[0].bounds = bridge.fragments[0].bounds;
        let merged = manager.register_actor(bridge, &backend).unwrap();

        assert_eq!(manager.structure_count(), 1);
        for id in 1..=3 {
            assert_eq!(manager.structure_of(ActorId(id)), Some(merged));
        }
        let structure = manager.structure(merged).unwrap();
        assert_eq!(structure.chunks().len(), 3);
        assert_eq!(structure.actor_index(ActorId(3)), Some(0));
    }

    #[test]
    fn test_simulated_actor_gets_own_structure() {
        let backend = RecordingBackend::new();
        let mut manager = Manager::default();
        let fixed = manager.register_actor(block(1, 0.0), &backend).unwrap();
        let loose = manager
            .register_actor(
                block(2, 0.0).simulated().with_transform(Transform::from_position(Vec3::new(0.0, 0.0, 5.0))),
                &backend,
            )
            .unwrap();
        assert_ne!(fixed, loose);
        assert_eq!(manager.structure_count(), 2);
    }

    #[test]
    fn test_settings_write_through() {
        let mut backend = RecordingBackend::new();
        let mut manager = Manager::default();
        let handle = manager.settings_handle();

        manager.set_max_dynamic_chunk_count(0, &mut backend);
        manager.set_debris_lifetime(-3.0);
        assert_eq!(handle.snapshot().max_dynamic_chunks, 1);
        assert_eq!(handle.snapshot().debris_lifetime, 0.0);

        handle.update(|s| s.max_dynamic_chunks = 25);
        manager.tick(0.016, &mut backend);
        assert_eq!(manager.settings().max_dynamic_chunks, 25);
        assert_eq!(manager.fifo().max(), 25);
    }

    #[test]
    fn test_unknown_ids_are_errors() {
        let mut manager = Manager::default();
        assert_eq!(
            manager.remove_structure(StructureId(9)),
            Err(FractureError::UnknownStructure(StructureId(9)))
        );
        assert_eq!(manager.remove_actor(ActorId(4)), Err(FractureError::UnknownActor(ActorId(4))));
    }
}
