//! # Fracture Scenario Tests
//!
//! End-to-end checks of the manager, structures and propagation through
//! the recording backend:
//!
//! 1. **Support loss**: breaking a line strands everything past the break
//! 2. **FIFO bound**: the dynamic-chunk cap holds after every call
//! 3. **Damage**: accumulation, reset, crumbling, impacts and spreading
//! 4. **Routes**: stored routes match a brute-force BFS after fractures
//! 5. **Lifecycle**: hide idempotence, monotonic destruction, kill lists
//!    and support drawing
//!
//! Run with: cargo test --package shatter_core --test fracture_scenarios

use std::collections::{HashSet, VecDeque};

use shatter_core::backend::BackendCall;
use shatter_core::{
    ActorDesc, ActorId, ChunkState, CollisionEvent, DamageEvent, DestructibleParameters, FractureError, FragmentAsset,
    HitTarget, Manager, ManagerSettings, RecordingBackend, RigidBodyState, Structure, StructureId,
};
use shatter_shared::math::{Aabb, Vec3};

// ============================================================================
// FIXTURES
// ============================================================================

const DT: f32 = 1.0 / 60.0;

fn cube(x: f32, y: f32) -> Aabb {
    Aabb::new(Vec3::new(x, y, 0.0), Vec3::new(x + 10.0, y + 10.0, 10.0))
}

/// Ground touching the left face of the chunks at x = 0.
fn anchored_backend() -> RecordingBackend {
    RecordingBackend::new().with_anchor(Aabb::new(Vec3::new(-5.0, -5.0, 0.0), Vec3::new(-0.5, 200.0, 10.0)))
}

/// `count` unit chunks in a row along X, starting at `x0`.
fn row(id: u64, x0: f32, count: usize) -> ActorDesc {
    let fragments = (0..count)
        .map(|i| FragmentAsset::single_chunk(cube(x0 + i as f32 * 10.0, 0.0)))
        .collect();
    ActorDesc::new(ActorId(id), fragments)
}

/// `size` x `size` chunks, index `i * size + j` at column `i`, row `j`.
fn grid(id: u64, size: usize) -> ActorDesc {
    let mut fragments = Vec::with_capacity(size * size);
    for i in 0..size {
        for j in 0..size {
            fragments.push(FragmentAsset::single_chunk(cube(i as f32 * 10.0, j as f32 * 10.0)));
        }
    }
    ActorDesc::new(ActorId(id), fragments)
}

fn manager_with_cap(max_dynamic_chunks: usize) -> Manager {
    Manager::new(ManagerSettings {
        max_dynamic_chunks,
        ..ManagerSettings::default()
    })
}

fn states(structure: &Structure) -> Vec<ChunkState> {
    structure.chunks().iter().map(|c| c.state).collect()
}

fn tick_until_settled(manager: &mut Manager, id: StructureId, backend: &mut RecordingBackend) {
    for _ in 0..100 {
        manager.tick(DT, backend);
        if !manager.structure(id).unwrap().is_propagation_pending() {
            return;
        }
    }
    panic!("propagation did not settle");
}

/// Hop distances from anchored chunks, over edges between valid chunks.
fn brute_force_routes(structure: &Structure) -> Vec<Option<i32>> {
    let chunks = structure.chunks();
    let mut dist = vec![None; chunks.len()];
    let mut queue = VecDeque::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.is_route_valid && chunk.is_environment_supported {
            dist[i] = Some(0);
            queue.push_back(i);
        }
    }
    while let Some(i) = queue.pop_front() {
        let d = dist[i].unwrap();
        for o in chunks[i].overlaps() {
            let j = structure.overlaps()[o].chunk_b;
            if chunks[j].is_route_valid && dist[j].is_none() {
                dist[j] = Some(d + 1);
                queue.push_back(j);
            }
        }
    }
    dist
}

fn assert_routes_match_bfs(structure: &Structure) {
    structure.verify_routes().unwrap();
    let expected = brute_force_routes(structure);
    for (i, chunk) in structure.chunks().iter().enumerate() {
        if chunk.is_route_valid {
            assert_eq!(Some(chunk.shortest_route), expected[i], "chunk {i}");
        }
    }
}

// ============================================================================
// SUPPORT LOSS
// ============================================================================

#[test]
fn test_line_of_five_breaks_past_the_fracture() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();

    let routes: Vec<i32> = manager.structure(id).unwrap().chunks().iter().map(|c| c.shortest_route).collect();
    assert_eq!(routes, vec![0, 1, 2, 3, 4]);

    manager.fracture_chunk(id, 2, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.fifo().len(), 1);

    manager.tick(DT, &mut backend);

    let structure = manager.structure(id).unwrap();
    assert_eq!(
        states(structure),
        vec![
            ChunkState::StaticRoot,
            ChunkState::StaticRoot,
            ChunkState::DynamicRoot,
            ChunkState::DynamicRoot,
            ChunkState::DynamicRoot,
        ]
    );
    assert_eq!(structure.passive_fracture_chunks(), &[3, 4]);
    assert_eq!(structure.stats().last_area_len, 2);
    for i in 3..5 {
        let chunk = structure.chunk(i).unwrap();
        assert!(chunk.is_route_blocker && !chunk.is_route_valid);
        assert_eq!(chunk.shortest_route, -1);
    }
    assert!(structure.chunk(1).unwrap().is_route_valid);
    assert_eq!(manager.fifo().len(), 3);
    assert!(!structure.is_propagation_pending());
    assert_routes_match_bfs(structure);
}

#[test]
fn test_budget_bounds_each_tick() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 30).with_budget(3), &backend).unwrap();
    assert_eq!(manager.structure(id).unwrap().per_frame_budget(), 3);

    manager.fracture_chunk(id, 1, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();

    let mut ticks = 0;
    loop {
        manager.tick(DT, &mut backend);
        ticks += 1;
        let structure = manager.structure(id).unwrap();
        assert!(structure.route_update_area().len() <= 3);
        if !structure.is_propagation_pending() {
            break;
        }
        assert!(ticks < 50, "propagation did not settle");
    }
    // 28 stranded chunks cannot fall in one tick
    assert!(ticks > 3);

    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(0).unwrap().state, ChunkState::StaticRoot);
    assert!(structure.chunks()[2..].iter().all(|c| c.state == ChunkState::DynamicRoot));
    assert!(structure.stats().max_area_len <= 3);
    assert!(structure.stats().passive_fractures >= 28);
}

#[test]
fn test_routes_match_brute_force_after_fractures() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(grid(1, 5), &backend).unwrap();
    assert_routes_match_bfs(manager.structure(id).unwrap());

    // Cut column 2 except its top cell: the right side hangs on by one chunk
    for j in 0..4 {
        manager.fracture_chunk(id, 2 * 5 + j, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    }
    tick_until_settled(&mut manager, id, &mut backend);
    let structure = manager.structure(id).unwrap();
    assert_routes_match_bfs(structure);
    assert!((15..25).all(|i| structure.chunk(i).unwrap().state == ChunkState::StaticRoot));
    assert_eq!(structure.chunk(24).unwrap().shortest_route, 4);

    // Cut the last link
    manager.fracture_chunk(id, 2 * 5 + 4, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    tick_until_settled(&mut manager, id, &mut backend);
    let structure = manager.structure(id).unwrap();
    assert_routes_match_bfs(structure);
    assert!((15..25).all(|i| structure.chunk(i).unwrap().state == ChunkState::DynamicRoot));
    assert!((0..10).all(|i| structure.chunk(i).unwrap().state == ChunkState::StaticRoot));
}

#[test]
fn test_hidden_chunk_stops_supporting() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();

    // Hiding a whole fragment spawns its part first
    assert_eq!(manager.hide_chunk(id, 2, true, &mut backend).unwrap(), 1);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SpawnPart { .. })), 1);
    assert!(manager.structure(id).unwrap().is_propagation_pending());
    tick_until_settled(&mut manager, id, &mut backend);

    let structure = manager.structure(id).unwrap();
    let hidden = structure.chunk(2).unwrap();
    assert_eq!(hidden.state, ChunkState::Hidden);
    assert!(hidden.is_route_blocker && !hidden.is_route_valid);
    assert_eq!(
        states(structure),
        vec![
            ChunkState::StaticRoot,
            ChunkState::StaticRoot,
            ChunkState::Hidden,
            ChunkState::DynamicRoot,
            ChunkState::DynamicRoot,
        ]
    );
    assert_eq!(structure.chunk(1).unwrap().shortest_route, 1);
    assert_routes_match_bfs(structure);
}

#[test]
fn test_crumbled_chunk_stops_supporting() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();

    assert!(manager.crumble_chunk(id, 3, &mut backend).unwrap());
    assert!(!manager.crumble_chunk(id, 3, &mut backend).unwrap());
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SpawnPart { .. })), 1);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DestroyPart { .. })), 1);
    tick_until_settled(&mut manager, id, &mut backend);

    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(3).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(4).unwrap().state, ChunkState::DynamicRoot);
    assert!((0..3).all(|i| structure.chunk(i).unwrap().state == ChunkState::StaticRoot));
    assert_routes_match_bfs(structure);
}

// ============================================================================
// FIFO BOUND
// ============================================================================

#[test]
fn test_fifo_of_one_keeps_only_the_newest_chunk() {
    let mut backend = anchored_backend();
    let mut manager = manager_with_cap(1);
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();

    manager.fracture_chunk(id, 2, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.fifo().len(), 1);
    manager.tick(DT, &mut backend);
    assert!(manager.fifo().len() <= 1);

    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(2).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(3).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(4).unwrap().state, ChunkState::DynamicRoot);
    assert_eq!(manager.fifo().iter().next().map(|c| c.chunk), Some(4));
}

#[test]
fn test_lowering_the_cap_crumbles_oldest() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();
    for chunk in [4, 3, 2] {
        manager.fracture_chunk(id, chunk, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    }
    assert_eq!(manager.fifo().len(), 3);

    manager.set_max_dynamic_chunk_count(1, &mut backend);
    assert_eq!(manager.fifo().len(), 1);
    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(4).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(3).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(2).unwrap().state, ChunkState::DynamicRoot);
    assert_eq!(manager.settings_handle().snapshot().max_dynamic_chunks, 1);

    // Removing without crumbling leaves the chunk alive
    let first = manager.remove_first_chunk().unwrap();
    assert_eq!(first.chunk, 2);
    assert!(manager.fifo().is_empty());
    assert!(!manager.remove_chunk(id, 2).unwrap());
    assert_eq!(manager.structure(id).unwrap().chunk(2).unwrap().state, ChunkState::DynamicRoot);
}

#[test]
fn test_fifo_of_one_spans_structures() {
    let mut backend = anchored_backend();
    let mut manager = manager_with_cap(1);
    let a = manager.register_actor(row(1, 0.0, 3), &backend).unwrap();
    let b = manager.register_actor(row(2, 100.0, 3), &backend).unwrap();
    assert_eq!(manager.structure_count(), 2);

    manager.fracture_chunk(a, 2, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.structure(a).unwrap().chunk(2).unwrap().state, ChunkState::DynamicRoot);

    // The second structure's chunk evicts the first one's
    manager.fracture_chunk(b, 2, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.fifo().len(), 1);
    assert_eq!(manager.structure(a).unwrap().chunk(2).unwrap().state, ChunkState::Hidden);
    assert_eq!(manager.structure(b).unwrap().chunk(2).unwrap().state, ChunkState::DynamicRoot);
    let newest = manager.fifo().iter().next().unwrap();
    assert_eq!((newest.structure, newest.chunk), (b, 2));
}

// ============================================================================
// DAMAGE
// ============================================================================

fn damage_block(accumulate_damage: bool) -> ActorDesc {
    let params = DestructibleParameters {
        damage_threshold: 10.0,
        accumulate_damage,
        ..DestructibleParameters::default()
    };
    row(1, 0.0, 1).with_parameters(params)
}

#[test]
fn test_accumulated_damage_fractures_on_fourth_hit() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(damage_block(true), &backend).unwrap();
    let hit = DamageEvent::new(3.0, 20.0, Vec3::new(5.0, 5.0, 5.0)).full();

    for expected in [3.0, 6.0, 9.0] {
        let fractured = manager.apply_damage(id, 0..1, &hit, &mut backend).unwrap();
        assert!(fractured.is_empty());
        assert_eq!(manager.structure(id).unwrap().chunk(0).unwrap().damage, expected);
    }
    let fractured = manager.apply_damage(id, 0..1, &hit, &mut backend).unwrap();
    assert_eq!(fractured, vec![0]);

    let chunk = manager.structure(id).unwrap().chunk(0).unwrap();
    assert_eq!(chunk.damage, 10.0);
    assert_eq!(chunk.state, ChunkState::DynamicRoot);
    assert!(!chunk.crumble);
}

#[test]
fn test_reset_damage_never_fractures() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(damage_block(false), &backend).unwrap();
    let hit = DamageEvent::new(3.0, 20.0, Vec3::new(5.0, 5.0, 5.0)).full();

    for _ in 0..10 {
        assert!(manager.apply_damage(id, 0..1, &hit, &mut backend).unwrap().is_empty());
    }
    let chunk = manager.structure(id).unwrap().chunk(0).unwrap();
    assert_eq!(chunk.damage, 0.0);
    assert_eq!(chunk.state, ChunkState::StaticRoot);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SpawnPart { .. })), 0);
}

#[test]
fn test_overwhelming_point_damage_crumbles_leaf() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 3), &backend).unwrap();

    // Threshold 1: hitting a leaf with 5 leaves 4 after the break, enough to crumble
    manager
        .take_point_damage(ActorId(1), 5.0, Vec3::new(25.0, 5.0, 5.0), Vec3::ZERO, HitTarget::Chunk(2), &mut backend)
        .unwrap();
    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(2).unwrap().state, ChunkState::Hidden);
    assert!(manager.fifo().is_empty());
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DestroyPart { .. })), 1);
}

/// Contact on `chunk` of actor 1 at `point`, pressing down with `force`.
fn contact(chunk: usize, point: Vec3, force: f32) -> CollisionEvent {
    CollisionEvent {
        actor: ActorId(1),
        chunk: Some(chunk),
        other_actor: None,
        total_normal_force: Vec3::new(0.0, 0.0, force),
        contact_positions: vec![point],
    }
}

fn impact_row(count: usize) -> ActorDesc {
    let params = DestructibleParameters {
        force_to_damage: 1.0,
        ..DestructibleParameters::default()
    };
    row(1, 0.0, count).with_parameters(params)
}

#[test]
fn test_collision_above_threshold_breaks_static_chunk() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(impact_row(3), &backend).unwrap();
    let point = Vec3::new(25.0, 5.0, 10.0);

    // 100 * 1/250 = 0.4, below the threshold of 1
    manager.handle_collision(&contact(2, point, 100.0), &mut backend).unwrap();
    assert!(backend.calls().is_empty());

    // Self contacts never count
    let own = CollisionEvent {
        other_actor: Some(ActorId(1)),
        ..contact(2, point, 1000.0)
    };
    manager.handle_collision(&own, &mut backend).unwrap();
    assert!(backend.calls().is_empty());

    // Damage 4 on a whole fragment becomes point damage and crumbles the leaf
    manager.handle_collision(&contact(2, point, 1000.0), &mut backend).unwrap();
    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(2).unwrap().state, ChunkState::Hidden);
    assert_eq!(structure.chunk(0).unwrap().state, ChunkState::StaticRoot);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SpawnPart { .. })), 3);

    let stray = CollisionEvent {
        actor: ActorId(9),
        ..contact(0, point, 1000.0)
    };
    assert_eq!(
        manager.handle_collision(&stray, &mut backend),
        Err(FractureError::UnknownActor(ActorId(9)))
    );
}

#[test]
fn test_collision_crumbles_loose_debris() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(impact_row(5), &backend).unwrap();
    manager.fracture_chunk(id, 4, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.fifo().len(), 1);

    manager
        .handle_collision(&contact(4, Vec3::new(45.0, 5.0, 10.0), 1000.0), &mut backend)
        .unwrap();
    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(4).unwrap().state, ChunkState::Hidden);
    assert!(manager.fifo().is_empty());
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DestroyPart { .. })), 1);
}

#[test]
fn test_point_damage_spreads_to_neighbors() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    manager.register_actor(row(1, 0.0, 3), &backend).unwrap();
    let id = manager.register_actor(row(2, 30.0, 3), &backend).unwrap();
    assert_eq!(manager.structure_of(ActorId(1)), Some(id));

    // Actor 2 owns chunks 0..3, actor 1 chunks 3..6
    manager
        .take_point_damage(ActorId(2), 5.0, Vec3::new(35.0, 5.0, 5.0), Vec3::ZERO, HitTarget::Actor, &mut backend)
        .unwrap();
    let structure = manager.structure(id).unwrap();
    assert_ne!(structure.chunk(0).unwrap().state, ChunkState::StaticRoot);
    // Actor 1's chunk touching the hit broke, the next one along did not
    assert_ne!(structure.chunk(5).unwrap().state, ChunkState::StaticRoot);
    assert!(structure.chunk(5).unwrap().damage > 0.0);
    assert_eq!(structure.chunk(4).unwrap().state, ChunkState::StaticRoot);
    assert_eq!(structure.chunk(4).unwrap().damage, 0.0);
}

#[test]
fn test_radius_damage_swaps_in_every_part() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 3), &backend).unwrap();

    let far = DamageEvent::new(1.0, 5.0, Vec3::new(500.0, 500.0, 500.0));
    assert!(!manager.take_radius_damage(ActorId(1), &far, &mut backend).unwrap());
    assert!(backend.calls().is_empty());

    let near = DamageEvent::new(1.0, 5.0, Vec3::new(5.0, 5.0, 5.0));
    assert!(manager.take_radius_damage(ActorId(1), &near, &mut backend).unwrap());
    let structure = manager.structure(id).unwrap();
    assert_eq!(structure.chunk(0).unwrap().state, ChunkState::DynamicRoot);
    assert_eq!(structure.chunk(1).unwrap().state, ChunkState::StaticRoot);
    assert_eq!(structure.chunk(2).unwrap().state, ChunkState::StaticRoot);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::SpawnPart { .. })), 3);

    // The anchored chunk fell, so the rest follows
    tick_until_settled(&mut manager, id, &mut backend);
    let structure = manager.structure(id).unwrap();
    assert!(structure.chunks().iter().all(|c| c.state == ChunkState::DynamicRoot));
}

#[test]
fn test_simulated_parts_inherit_actor_velocity() {
    let mut backend = RecordingBackend::new();
    let mut manager = Manager::default();
    manager.register_actor(row(1, 0.0, 2).simulated(), &backend).unwrap();
    let falling = Vec3::new(0.0, 0.0, -5.0);
    backend.set_actor_state(
        ActorId(1),
        RigidBodyState {
            center_of_mass: Vec3::new(10.0, 5.0, 5.0),
            linear_velocity: falling,
            angular_velocity: Vec3::ZERO,
        },
    );

    let hit = DamageEvent::new(1.0, 20.0, Vec3::new(5.0, 5.0, 5.0));
    assert!(manager.take_radius_damage(ActorId(1), &hit, &mut backend).unwrap());

    let velocities: Vec<Vec3> = backend
        .calls()
        .iter()
        .filter_map(|c| match c {
            BackendCall::SetVelocity { linear, .. } => Some(*linear),
            _ => None,
        })
        .collect();
    assert_eq!(velocities, vec![falling, falling]);
    assert_eq!(manager.fifo().len(), 2);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_hide_twice_is_a_no_op() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();
    manager.fracture_chunk(id, 4, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();

    assert_eq!(manager.hide_chunk(id, 4, true, &mut backend).unwrap(), 1);
    let term_bodies = backend.count(|c| matches!(c, BackendCall::TermBody(_)));
    let hidden_bones = backend.count(|c| matches!(c, BackendCall::HideBone(..)));

    assert_eq!(manager.hide_chunk(id, 4, true, &mut backend).unwrap(), 0);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::TermBody(_))), term_bodies);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::HideBone(..))), hidden_bones);
    assert!(manager.fifo().is_empty());
    assert_eq!(
        manager.hide_chunk(id, 99, true, &mut backend),
        Err(FractureError::ChunkOutOfRange { index: 99, len: 5 })
    );
}

#[test]
fn test_hidden_chunks_stay_hidden() {
    let mut backend = anchored_backend();
    let mut manager = manager_with_cap(2);
    manager.set_debris_lifetime(0.1);
    let id = manager.register_actor(grid(1, 4), &backend).unwrap();

    let mut hidden: HashSet<usize> = HashSet::new();
    let cuts = [5, 9, 6, 1, 10, 13];
    for step in 0..40 {
        if let Some(&chunk) = cuts.get(step / 4) {
            if step % 4 == 0 {
                manager.fracture_chunk(id, chunk, Vec3::ZERO, Vec3::Z, &mut backend).unwrap();
            }
        }
        manager.tick(DT * 2.0, &mut backend);
        assert!(manager.fifo().len() <= 2);

        let structure = manager.structure(id).unwrap();
        for (i, chunk) in structure.chunks().iter().enumerate() {
            if hidden.contains(&i) {
                assert_eq!(chunk.state, ChunkState::Hidden, "chunk {i} came back at step {step}");
            } else if chunk.state == ChunkState::Hidden {
                hidden.insert(i);
            }
        }
    }
    assert!(!hidden.is_empty());
}

#[test]
fn test_debris_expires_after_lifetime() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    manager.set_debris_lifetime(1.0);
    let id = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();
    manager.fracture_chunk(id, 4, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();

    manager.tick(0.5, &mut backend);
    assert_eq!(manager.structure(id).unwrap().chunk(4).unwrap().state, ChunkState::DynamicRoot);
    manager.tick(0.5, &mut backend);
    assert_eq!(manager.structure(id).unwrap().chunk(4).unwrap().state, ChunkState::Hidden);
    assert!(manager.fifo().is_empty());
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DestroyPart { .. })), 1);
}

#[test]
fn test_registration_merges_touching_rows() {
    let backend = anchored_backend();
    let mut manager = Manager::default();
    let left = manager.register_actor(row(1, 0.0, 5), &backend).unwrap();
    let right = manager.register_actor(row(2, 50.0, 5), &backend).unwrap();
    assert_ne!(left, right);
    assert_eq!(manager.structure_count(), 1);
    assert_eq!(manager.structure_of(ActorId(1)), Some(right));

    // The new actor comes first, the absorbed one after it
    let structure = manager.structure(right).unwrap();
    let routes: Vec<i32> = structure.chunks().iter().map(|c| c.shortest_route).collect();
    assert_eq!(routes, vec![5, 6, 7, 8, 9, 0, 1, 2, 3, 4]);
    assert_routes_match_bfs(structure);
}

#[test]
fn test_registration_locked_while_debris_exists() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let id = manager.register_actor(row(1, 0.0, 2), &backend).unwrap();
    manager.fracture_chunk(id, 1, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();

    assert_eq!(
        manager.register_actor(row(2, 100.0, 2), &backend),
        Err(FractureError::RegistrationLocked {
            dynamic_chunks: 1,
            pending_removals: 0,
        })
    );
}

#[test]
fn test_kill_lists_flush_at_tick() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    let a = manager.register_actor(row(1, 0.0, 2), &backend).unwrap();
    let b = manager.register_actor(row(2, 100.0, 2), &backend).unwrap();
    assert_eq!(manager.structure_count(), 2);

    manager.fracture_chunk(b, 1, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert_eq!(manager.fifo().len(), 1);

    // Actor removal: destroyed at the next tick, the empty structure one tick later
    manager.remove_actor(ActorId(1)).unwrap();
    assert_eq!(manager.structure(a).unwrap().pending_actor_removals(), 1);
    manager.tick(DT, &mut backend);
    assert_eq!(backend.count(|c| *c == BackendCall::DestroyActor(ActorId(1))), 1);
    assert_eq!(manager.structure_of(ActorId(1)), None);
    assert!(manager.structure(a).is_some());
    manager.tick(DT, &mut backend);
    assert!(manager.structure(a).is_none());

    // Structure removal purges its FIFO entries
    manager.remove_structure(b).unwrap();
    manager.tick(DT, &mut backend);
    assert!(manager.structure(b).is_none());
    assert!(manager.fifo().is_empty());
    assert_eq!(manager.structure_of(ActorId(2)), None);
    assert_eq!(manager.structure_count(), 0);
}

#[test]
fn test_removed_actor_leaves_no_active_debris() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    manager.register_actor(row(1, 0.0, 3), &backend).unwrap();
    let id = manager.register_actor(row(2, 30.0, 3), &backend).unwrap();

    // Actor 2 owns chunks 0..3, its far end is chunk 2
    manager.fracture_chunk(id, 2, Vec3::ZERO, Vec3::ZERO, &mut backend).unwrap();
    assert!(manager.structure(id).unwrap().active().contains(&2));
    assert_eq!(manager.fifo().len(), 1);

    manager.remove_actor(ActorId(2)).unwrap();
    manager.tick(DT, &mut backend);
    let structure = manager.structure(id).unwrap();
    assert!(structure.active().iter().all(|&i| i >= 3));
    assert!(manager.fifo().is_empty());
    assert_eq!(manager.structure_of(ActorId(2)), None);
    assert!((3..6).all(|i| structure.chunk(i).unwrap().state == ChunkState::StaticRoot));

    // Later ticks run without the removed actor's chunks
    manager.tick(DT, &mut backend);
    assert!(manager.structure(id).unwrap().active().iter().all(|&i| i >= 3));
}

#[test]
fn test_support_graph_drawn_on_request() {
    let mut backend = anchored_backend();
    let mut manager = Manager::default();
    manager.register_actor(row(1, 0.0, 5), &backend).unwrap();

    manager.tick(DT, &mut backend);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DebugLines(_))), 0);

    // Four links plus the anchor under chunk 0
    manager.set_visualize_support(true);
    manager.tick(DT, &mut backend);
    assert_eq!(backend.count(|c| *c == BackendCall::DebugLines(5)), 1);

    manager.set_visualize_support(false);
    manager.tick(DT, &mut backend);
    assert_eq!(backend.count(|c| matches!(c, BackendCall::DebugLines(_))), 1);
}
