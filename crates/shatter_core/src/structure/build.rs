//! Structure construction: chunk allocation, the support overlap graph and
//! the initial routes.

use shatter_shared::constants::SUPPORT_PADDING;
use shatter_shared::math::Aabb;

use super::{PropagationStats, Structure, WorkQueue};
use crate::actor::{ActorDesc, ActorSlot};
use crate::backend::{ChunkShape, GeometryQuery};
use crate::chunk::{Chunk, ChunkState};
use crate::manager::StructureId;
use crate::overlap::{sweep_and_prune, OverlapGraph};

impl Structure {
    /// Builds a structure from actors and their neighbor lists.
    ///
    /// Empty slots keep their index so neighbor lists stay valid. Returns
    /// `None` when there is no actor at all.
    pub fn build<G: GeometryQuery + ?Sized>(
        id: StructureId,
        entries: Vec<Option<(ActorDesc, Vec<usize>)>>,
        geometry: &G,
    ) -> Option<Self> {
        if entries.iter().all(Option::is_none) {
            return None;
        }

        let mut actors: Vec<Option<ActorSlot>> = entries
            .into_iter()
            .map(|entry| entry.map(|(desc, neighbors)| ActorSlot::new(desc, neighbors)))
            .collect();

        let mut chunks = Vec::new();
        let mut budget = 0usize;
        let mut support_depth = 0u32;

        for (actor_index, slot) in actors.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            let fixed = slot.desc.starts_fixed();
            if !fixed {
                slot.desc.per_frame_budget = 0;
            }
            budget += slot.desc.per_frame_budget;
            support_depth = support_depth.max(slot.desc.support_depth);

            let actor_tm = slot.desc.transform;
            let rigid_tm = actor_tm.without_scale();

            slot.part_first_chunk.clear();
            for (fragment_index, fragment) in slot.desc.fragments.iter().enumerate() {
                let base = chunks.len();
                slot.part_first_chunk.push(base);

                for asset in &fragment.chunks {
                    let mut chunk = Chunk::from_asset(asset, base, actor_index, fragment_index);
                    let bounds = asset.bounds.transformed(&actor_tm);
                    chunk.world_centroid = bounds.center();
                    chunk.radius = bounds.half_extent().length();
                    chunk.relative_centroid = rigid_tm.inverse_transform_point(chunk.world_centroid);
                    chunk.world_transform = rigid_tm;

                    let is_root = chunk.parent.is_none();
                    if fixed {
                        chunk.world_transform_valid = true;
                        chunk.world_centroid_valid = true;
                        chunk.state = if is_root {
                            ChunkState::StaticRoot
                        } else {
                            ChunkState::StaticChild
                        };
                    } else {
                        chunk.state = if is_root {
                            ChunkState::DynamicRoot
                        } else {
                            ChunkState::DynamicChild
                        };
                        chunk.is_route_blocker = true;
                    }
                    chunks.push(chunk);
                }
            }
            slot.part_first_chunk.push(chunks.len());
        }

        let mut structure = Self {
            id,
            actors,
            chunks,
            overlaps: Vec::new(),
            support_depth,
            per_frame_budget: budget,
            active: Vec::new(),
            fracture_origin_chunks: Vec::new(),
            fracture_origin_fifo: WorkQueue::default(),
            pseudo_supporter_fifo: WorkQueue::default(),
            route_update_fifo: WorkQueue::default(),
            route_update_area: Vec::new(),
            passive_fracture_chunks: Vec::new(),
            actor_kill_list: Vec::new(),
            stats: PropagationStats::default(),
        };

        if structure.per_frame_budget > 0 {
            let support = structure.build_support_graph(geometry);
            structure.compute_initial_routes(&support);
            structure.per_frame_budget = structure.per_frame_budget.min(support.len());
            structure.fracture_origin_fifo = WorkQueue::with_capacity(support.len());
            structure.pseudo_supporter_fifo = WorkQueue::with_capacity(support.len());
            structure.route_update_fifo = WorkQueue::with_capacity(structure.per_frame_budget);

            tracing::info!(
                structure = ?id,
                chunks = structure.chunks.len(),
                support_chunks = support.len(),
                edges = structure.overlaps.len() / 2,
                budget = structure.per_frame_budget,
                "structure created"
            );
        } else {
            tracing::info!(structure = ?id, chunks = structure.chunks.len(), "structure created without support");
        }

        Some(structure)
    }

    /// Flags environment support and links support-depth chunks that touch.
    /// Returns the support chunk indices.
    fn build_support_graph<G: GeometryQuery + ?Sized>(&mut self, geometry: &G) -> Vec<usize> {
        let mut support = Vec::new();
        let mut padded: Vec<(usize, Aabb)> = Vec::new();
        let mut shapes = Vec::new();

        for index in 0..self.chunks.len() {
            let chunk = &self.chunks[index];
            if chunk.depth != self.support_depth {
                continue;
            }
            let Some(slot) = self.actors.get(chunk.actor_index).and_then(Option::as_ref) else {
                continue;
            };
            let Some(fragment) = slot.desc.fragments.get(chunk.fragment_index) else {
                continue;
            };
            let local = index - slot.part_first_chunk[chunk.fragment_index];
            let world_bounds = fragment.chunks[local].bounds.transformed(&slot.desc.transform);
            let box_padded = world_bounds.expanded(SUPPORT_PADDING);

            let touches_world = slot.desc.support_chunks_touch_world && geometry.touches_world_geometry(&box_padded);
            let in_support_fragment = slot.desc.support_chunks_in_support_fragment && fragment.is_support_fragment;
            let supported = if slot.desc.support_chunks_touch_world && slot.desc.support_chunks_in_support_fragment {
                touches_world && in_support_fragment
            } else {
                touches_world || in_support_fragment
            };

            shapes.push(ChunkShape {
                actor: slot.id(),
                fragment: chunk.fragment_index,
                mesh: chunk.mesh_index,
                body: chunk.body_index,
                transform: slot.desc.transform,
                world_bounds,
            });
            padded.push((support.len(), box_padded));
            support.push(index);
            self.chunks[index].is_environment_supported = supported;
        }

        let pairs: Vec<(usize, usize)> = sweep_and_prune(&padded)
            .into_iter()
            .filter(|&(a, b)| geometry.chunks_overlap(&shapes[a], &shapes[b], 2.0 * SUPPORT_PADDING))
            .map(|(a, b)| (support[a], support[b]))
            .collect();

        let graph = OverlapGraph::from_pairs(&pairs, self.chunks.len());
        for (chunk, &(first, count)) in self.chunks.iter_mut().zip(&graph.ranges) {
            chunk.first_overlap = first;
            chunk.num_overlaps = count;
        }
        self.overlaps = graph.overlaps;
        support
    }

    /// Layered BFS from every environment-supported chunk.
    ///
    /// A chunk reached at layer `d` counts one supporter for every
    /// neighbor at layer `d - 1`. Chunks the BFS never reaches are
    /// anchored, so nothing falls at load time.
    fn compute_initial_routes(&mut self, support: &[usize]) {
        let mut frontier: Vec<usize> = Vec::new();
        for &index in support {
            let chunk = &mut self.chunks[index];
            if chunk.is_environment_supported {
                chunk.shortest_route = 0;
                chunk.is_route_valid = true;
                frontier.push(index);
            }
        }

        let mut depth = 0;
        while !frontier.is_empty() {
            depth += 1;
            let mut next = Vec::new();
            for &index in &frontier {
                for o in self.chunks[index].overlaps() {
                    let other = self.overlaps[o].chunk_b;
                    let neighbor = &mut self.chunks[other];
                    if !neighbor.is_route_valid {
                        neighbor.shortest_route = depth;
                        neighbor.is_route_valid = true;
                        neighbor.num_supporters = 1;
                        next.push(other);
                    } else if neighbor.shortest_route == depth {
                        neighbor.num_supporters += 1;
                    }
                }
            }
            frontier = next;
        }

        let mut anchored = 0usize;
        for &index in support {
            let chunk = &mut self.chunks[index];
            if !chunk.is_route_valid {
                chunk.is_environment_supported = true;
                chunk.shortest_route = 0;
                chunk.is_route_valid = true;
                anchored += 1;
            }
        }
        if anchored > 0 {
            tracing::debug!(structure = ?self.id, anchored, "unreached support chunks anchored");
        }
    }
}
