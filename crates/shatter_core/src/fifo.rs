//! # Dynamic Chunk FIFO
//!
//! Process-wide, oldest-first list of every dynamic root chunk across all
//! structures. Its size is the simulation cost the manager bounds.
//!
//! Entries live in a slot pool with a free list, linked into a doubly
//! linked list, so push, pop and unlink are all **O(1)**. Handles carry a
//! generation counter: once a slot is freed, any handle still pointing at
//! it is detected as stale and ignored.
//!
//! Chunks evicted to make room are not crumbled here; the FIFO cannot
//! reach into structures. They are queued and drained by the manager
//! right after the call that caused them.

use std::collections::VecDeque;

use crate::manager::StructureId;

/// Non-owning reference to a chunk of some structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    /// Owning structure.
    pub structure: StructureId,
    /// Index in the structure's chunk array.
    pub chunk: usize,
}

/// Generational handle to a FIFO entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FifoHandle {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    chunk: ChunkRef,
    prev: Option<u32>,
    next: Option<u32>,
}

/// Bounded FIFO of dynamic chunks.
#[derive(Debug)]
pub struct DynamicChunkFifo {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    max: usize,
    evicted: VecDeque<ChunkRef>,
}

impl DynamicChunkFifo {
    /// Creates an empty FIFO with the given cap (at least 1).
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            max: max.max(1),
            evicted: VecDeque::new(),
        }
    }

    /// Number of tracked chunks.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if no chunk is tracked.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current cap.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Changes the cap (at least 1). Does not evict; see [`Self::cap`].
    pub fn set_max(&mut self, max: usize) {
        self.max = max.max(1);
    }

    /// Appends a chunk as the newest entry, first evicting the oldest
    /// entries so that the FIFO never exceeds its cap.
    pub fn add(&mut self, chunk: ChunkRef) -> FifoHandle {
        self.cap(self.max - 1);

        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(Entry {
            chunk,
            prev: self.tail,
            next: None,
        });
        let handle = FifoHandle {
            index,
            generation: slot.generation,
        };

        match self.tail {
            Some(tail) => self.set_next(tail, Some(index)),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        debug_assert!(self.len <= self.max, "dynamic chunk FIFO over capacity");
        handle
    }

    /// Unlinks an entry. Stale handles return `None`.
    pub fn remove(&mut self, handle: FifoHandle) -> Option<ChunkRef> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation || slot.entry.is_none() {
            return None;
        }
        self.unlink(handle.index)
    }

    /// Unlinks the oldest entry.
    pub fn remove_first(&mut self) -> Option<ChunkRef> {
        let head = self.head?;
        self.unlink(head)
    }

    /// Evicts oldest entries until at most `cap` remain. Evicted chunks
    /// are queued for [`Self::pop_eviction`].
    pub fn cap(&mut self, cap: usize) {
        while self.len > cap {
            match self.remove_first() {
                Some(chunk) => {
                    tracing::debug!(?chunk, cap, "evicting oldest dynamic chunk");
                    self.evicted.push_back(chunk);
                }
                None => break,
            }
        }
    }

    /// Next chunk evicted by [`Self::cap`] that still has to be crumbled.
    pub fn pop_eviction(&mut self) -> Option<ChunkRef> {
        self.evicted.pop_front()
    }

    /// Drops every entry (tracked or awaiting eviction) of a structure.
    ///
    /// Returns the number of tracked entries removed.
    pub fn purge_structure(&mut self, structure: StructureId) -> usize {
        self.evicted.retain(|c| c.structure != structure);

        let mut removed = 0;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let Some(entry) = self.slots[index as usize].entry else {
                break;
            };
            cursor = entry.next;
            if entry.chunk.structure == structure {
                self.unlink(index);
                removed += 1;
            }
        }
        removed
    }

    /// Tracked chunks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = ChunkRef> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let entry = self.slots.get(cursor? as usize)?.entry?;
            cursor = entry.next;
            Some(entry.chunk)
        })
    }

    fn set_next(&mut self, index: u32, next: Option<u32>) {
        if let Some(entry) = self.slots[index as usize].entry.as_mut() {
            entry.next = next;
        }
    }

    fn set_prev(&mut self, index: u32, prev: Option<u32>) {
        if let Some(entry) = self.slots[index as usize].entry.as_mut() {
            entry.prev = prev;
        }
    }

    fn unlink(&mut self, index: u32) -> Option<ChunkRef> {
        let slot = &mut self.slots[index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        match entry.prev {
            Some(prev) => self.set_next(prev, entry.next),
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.set_prev(next, entry.prev),
            None => self.tail = entry.prev,
        }

        self.free_list.push(index);
        self.len -= 1;
        Some(entry.chunk)
    }
}

impl Default for DynamicChunkFifo {
    fn default() -> Self {
        Self::new(shatter_shared::constants::DEFAULT_MAX_DYNAMIC_CHUNKS)
    }
}
