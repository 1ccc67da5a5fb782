//! # Overlap Graph
//!
//! Symmetric adjacency between support-depth chunks. Built once when a
//! structure is created and never edited afterwards: a destroyed chunk is
//! marked as a route blocker, its edges stay.
//!
//! Every undirected contact is stored twice, `(a, b)` and `(b, a)`, sorted
//! by `(a, b)` so each chunk owns one contiguous slice. `adjacent` links
//! each record to its mirror.

use std::collections::HashMap;

use shatter_shared::math::Aabb;

/// Directed half of a contact between two support chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overlap {
    /// Chunk owning this record.
    pub chunk_a: usize,
    /// Neighbor.
    pub chunk_b: usize,
    /// Index of the mirrored `(chunk_b, chunk_a)` record.
    pub adjacent: usize,
}

/// Overlap records plus the slice each chunk owns.
#[derive(Clone, Debug, Default)]
pub struct OverlapGraph {
    /// Sorted, symmetric records.
    pub overlaps: Vec<Overlap>,
    /// `(first, count)` per chunk index.
    pub ranges: Vec<(usize, usize)>,
}

impl OverlapGraph {
    /// Builds the graph from undirected contact pairs over `chunk_count` chunks.
    ///
    /// Self pairs and duplicates are dropped.
    #[must_use]
    pub fn from_pairs(pairs: &[(usize, usize)], chunk_count: usize) -> Self {
        let mut directed: Vec<(usize, usize)> = Vec::with_capacity(pairs.len() * 2);
        for &(a, b) in pairs {
            if a != b && a < chunk_count && b < chunk_count {
                directed.push((a, b));
                directed.push((b, a));
            }
        }
        directed.sort_unstable();
        directed.dedup();

        let index: HashMap<(usize, usize), usize> =
            directed.iter().enumerate().map(|(i, &pair)| (pair, i)).collect();

        let mut ranges = vec![(0, 0); chunk_count];
        let overlaps = directed
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| {
                let range = &mut ranges[a];
                if range.1 == 0 {
                    range.0 = i;
                }
                range.1 += 1;
                Overlap {
                    chunk_a: a,
                    chunk_b: b,
                    // The mirror always exists, both halves were pushed.
                    adjacent: index.get(&(b, a)).copied().unwrap_or(i),
                }
            })
            .collect();

        Self { overlaps, ranges }
    }

    /// Number of undirected contacts.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.overlaps.len() / 2
    }
}

/// Broad phase: every pair of boxes that intersect, as `(items[i].0, items[j].0)`.
///
/// Sweep and prune along X.
#[must_use]
pub fn sweep_and_prune(items: &[(usize, Aabb)]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[a].1.min.x.total_cmp(&items[b].1.min.x));

    let mut pairs = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        let (id_i, box_i) = &items[i];
        for &j in &order[pos + 1..] {
            let (id_j, box_j) = &items[j];
            if box_j.min.x > box_i.max.x {
                break;
            }
            if box_i.intersects(box_j) {
                pairs.push(((*id_i).min(*id_j), (*id_i).max(*id_j)));
            }
        }
    }
    pairs
}
