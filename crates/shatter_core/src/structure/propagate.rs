//! Budgeted fracture propagation.
//!
//! Removing a support chunk can strand others. Every tick, at most
//! `per_frame_budget` chunks are pulled out of the valid-route set and
//! rerouted; whatever cannot reach an anchor any more is fractured
//! passively. Leftover work stays queued for the next tick.
//!
//! ```text
//! fracture_origin_chunks ─► fracture_origin_fifo ─┐
//!                                                 ├─► route_update_area ─► reroute ─► passive fracture
//!                           pseudo_supporter_fifo ┘
//! ```

use shatter_shared::math::Vec3;

use super::{FrameContext, Structure};
use crate::backend::DestructionBackend;
use crate::chunk::ChunkState;

impl Structure {
    /// Runs one budgeted round of support maintenance.
    pub fn propagate_fracture<B: DestructionBackend + ?Sized>(&mut self, ctx: &mut FrameContext<'_, B>) {
        if self.per_frame_budget == 0 {
            self.fracture_origin_chunks.clear();
            return;
        }

        for index in std::mem::take(&mut self.fracture_origin_chunks) {
            self.append_fracture_origin(index, ctx);
        }

        let limit = self.per_frame_budget;
        let mut area = std::mem::take(&mut self.route_update_area);
        area.clear();
        self.extend_area_from_pseudo_supporters(&mut area, limit);
        self.extend_area_from_fracture_origins(&mut area, limit);
        self.reroute_area(&area);
        self.route_update_area = area;

        self.fracture_passive_chunks(ctx);

        if !self.route_update_area.is_empty() {
            let area_len = self.route_update_area.len();
            let passive = self.passive_fracture_chunks.len();
            let stats = &mut self.stats;
            stats.ticks += 1;
            stats.last_area_len = area_len;
            stats.max_area_len = stats.max_area_len.max(area_len);
            stats.total_rerouted += area_len as u64;
            stats.passive_fractures += passive as u64;
            tracing::debug!(
                structure = ?self.id,
                area = area_len,
                passive,
                pending = self.is_propagation_pending(),
                "fracture propagated"
            );
        }

        debug_assert!(self.verify_routes().is_ok(), "{:?}", self.verify_routes());
    }

    /// Maps a removed chunk to its support-depth representative and queues
    /// it as a fracture origin.
    fn append_fracture_origin<B: DestructionBackend + ?Sized>(&mut self, index: usize, ctx: &mut FrameContext<'_, B>) {
        let Some(chunk) = self.chunks.get(index) else {
            return;
        };

        if chunk.depth < self.support_depth {
            let mut stack: Vec<usize> = chunk.children().collect();
            while let Some(i) = stack.pop() {
                let child = &mut self.chunks[i];
                if child.depth < self.support_depth {
                    stack.extend(child.children());
                } else if !child.is_route_blocker {
                    child.is_route_blocker = true;
                    self.fracture_origin_fifo.push(i);
                }
            }
            return;
        }

        let mut representative = index;
        for _ in self.support_depth..chunk.depth {
            match self.chunks[representative].parent {
                Some(parent) => representative = parent,
                None => return,
            }
        }
        let deeper = chunk.depth > self.support_depth;

        let rep = &mut self.chunks[representative];
        if rep.is_route_blocker {
            return;
        }
        rep.is_route_blocker = true;
        self.fracture_origin_fifo.push(representative);
        if deeper {
            self.support_depth_passive_fracture(representative, ctx);
        }
    }

    /// Fractures the static roots at or below a support chunk whose
    /// subtree was hit.
    fn support_depth_passive_fracture<B: DestructionBackend + ?Sized>(
        &mut self,
        index: usize,
        ctx: &mut FrameContext<'_, B>,
    ) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            match self.chunks[i].state {
                ChunkState::Hidden => stack.extend(self.chunks[i].children()),
                ChunkState::StaticRoot => self.fracture_chunk(i, Vec3::ZERO, Vec3::ZERO, false, ctx),
                _ => {}
            }
        }
    }

    /// Removes `index`'s support from every neighbor that counted it.
    fn withdraw_support(&mut self, index: usize) {
        let route = self.chunks[index].shortest_route;
        for o in self.chunks[index].overlaps() {
            let other = self.overlaps[o].chunk_b;
            let neighbor = &mut self.chunks[other];
            if neighbor.is_route_valid && neighbor.shortest_route == route + 1 && neighbor.num_supporters > 0 {
                neighbor.num_supporters -= 1;
                if neighbor.num_supporters == 0 {
                    self.pseudo_supporter_fifo.push(other);
                }
            }
        }
    }

    /// Invalidates queued pseudo supporters until the area is full.
    fn extend_area_from_pseudo_supporters(&mut self, area: &mut Vec<usize>, limit: usize) {
        loop {
            if self.pseudo_supporter_fifo.is_drained() {
                self.pseudo_supporter_fifo.reset_if_drained();
                break;
            }
            if area.len() >= limit {
                break;
            }
            let Some(index) = self.pseudo_supporter_fifo.pop() else {
                break;
            };
            // Already invalidated as a fracture origin.
            if !self.chunks[index].is_route_valid {
                continue;
            }
            self.withdraw_support(index);
            let chunk = &mut self.chunks[index];
            chunk.is_route_valid = false;
            chunk.num_supporters = 0;
            area.push(index);
        }
    }

    /// Invalidates queued fracture origins, following each with the
    /// pseudo-supporter wave it causes.
    fn extend_area_from_fracture_origins(&mut self, area: &mut Vec<usize>, limit: usize) {
        while area.len() < limit {
            let Some(index) = self.fracture_origin_fifo.pop() else {
                break;
            };
            if self.chunks[index].is_route_valid {
                self.withdraw_support(index);
                let chunk = &mut self.chunks[index];
                chunk.is_route_valid = false;
                chunk.num_supporters = 0;
            }
            self.extend_area_from_pseudo_supporters(area, limit);
        }
        self.fracture_origin_fifo.reset_if_drained();
    }

    /// Finds new routes for the invalidated chunks of `area`.
    ///
    /// Multi-source BFS in nondecreasing route order: seeds take the best
    /// route offered by a still-valid neighbor below the lowest pending
    /// pseudo supporter, discovered chunks extend from finalized ones. A
    /// chunk's route is final, and its supporters counted, when it is
    /// popped. Chunks left without a route become blockers.
    fn reroute_area(&mut self, area: &[usize]) {
        self.passive_fracture_chunks.clear();
        if area.is_empty() {
            return;
        }

        let anti_self_support = self
            .pseudo_supporter_fifo
            .pending()
            .iter()
            .filter(|&&i| self.chunks[i].is_route_valid)
            .map(|&i| self.chunks[i].shortest_route)
            .min()
            .unwrap_or(i32::MAX);

        let mut seeds: Vec<(i32, usize)> = Vec::new();
        for &index in area {
            let chunk = &self.chunks[index];
            if chunk.is_route_blocker {
                continue;
            }
            let best = chunk
                .overlaps()
                .map(|o| &self.chunks[self.overlaps[o].chunk_b])
                .filter(|n| n.is_route_valid && n.shortest_route < anti_self_support)
                .map(|n| n.shortest_route + 1)
                .min();
            if let Some(route) = best {
                let chunk = &mut self.chunks[index];
                chunk.is_routing = true;
                chunk.shortest_route = route;
                seeds.push((route, index));
            }
        }
        // Stable: ties keep area order.
        seeds.sort_by_key(|&(route, _)| route);

        self.route_update_fifo.clear();
        let mut next_seed = 0;
        loop {
            let seed = seeds.get(next_seed).copied();
            let discovered = self.route_update_fifo.pending().first().copied();
            let index = match (seed, discovered) {
                (Some((route, s)), Some(d)) if route <= self.chunks[d].shortest_route => {
                    next_seed += 1;
                    // A lowered seed was re-queued as discovered.
                    if self.chunks[s].shortest_route != route {
                        continue;
                    }
                    s
                }
                (_, Some(_)) => match self.route_update_fifo.pop() {
                    Some(d) => d,
                    None => break,
                },
                (Some((route, s)), None) => {
                    next_seed += 1;
                    if self.chunks[s].shortest_route != route {
                        continue;
                    }
                    s
                }
                (None, None) => break,
            };
            if self.chunks[index].is_route_valid {
                continue;
            }
            self.finalize_route(index);
        }
        self.route_update_fifo.clear();

        for &index in area {
            let chunk = &mut self.chunks[index];
            if chunk.is_route_valid || chunk.is_route_blocker {
                continue;
            }
            chunk.is_route_blocker = true;
            chunk.is_routing = false;
            chunk.shortest_route = -1;
            self.passive_fracture_chunks.push(index);

            // Coalesce into ancestors whose children are all detached.
            let mut parent = chunk.parent;
            while let Some(p) = parent {
                let ancestor = &mut self.chunks[p];
                ancestor.num_children_dup = ancestor.num_children_dup.saturating_sub(1);
                if ancestor.num_children_dup > 0 {
                    break;
                }
                ancestor.is_route_blocker = true;
                self.passive_fracture_chunks.push(p);
                parent = ancestor.parent;
            }
        }
    }

    /// Marks a chunk's route valid, counts its supporters and relaxes its
    /// neighbors.
    fn finalize_route(&mut self, index: usize) {
        let route = self.chunks[index].shortest_route;
        {
            let chunk = &mut self.chunks[index];
            chunk.is_route_valid = true;
            chunk.is_routing = false;
            chunk.num_supporters = 0;
        }

        let mut supporters = 0;
        for o in self.chunks[index].overlaps() {
            let other = self.overlaps[o].chunk_b;
            let neighbor = &mut self.chunks[other];
            if neighbor.is_route_valid {
                if neighbor.shortest_route + 1 == route {
                    supporters += 1;
                } else if neighbor.shortest_route == route + 1 && neighbor.num_supporters > 0 {
                    // Zero means a queued pseudo supporter, which must not be revived.
                    neighbor.num_supporters += 1;
                }
            } else if !neighbor.is_route_blocker {
                if !neighbor.is_routing {
                    neighbor.is_routing = true;
                    neighbor.shortest_route = route + 1;
                    self.route_update_fifo.push(other);
                } else if neighbor.shortest_route > route + 1 {
                    neighbor.shortest_route = route + 1;
                    self.route_update_fifo.push(other);
                }
            }
        }
        self.chunks[index].num_supporters = supporters;
    }

    /// Fractures the largest detached piece of every stranded chunk.
    fn fracture_passive_chunks<B: DestructionBackend + ?Sized>(&mut self, ctx: &mut FrameContext<'_, B>) {
        let passive = std::mem::take(&mut self.passive_fracture_chunks);
        for &index in &passive {
            if let Some(parent) = self.chunks[index].parent {
                if self.chunks[parent].num_children_dup == 0 {
                    continue;
                }
                self.chunks[parent].num_children_dup += 1;
            }
            self.fracture_chunk(index, Vec3::ZERO, Vec3::ZERO, false, ctx);
        }
        self.passive_fracture_chunks = passive;
    }
}
