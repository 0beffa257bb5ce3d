//! Intrusive-style LRU list over cached page slots.
//!
//! Mirrors the chained-hash-table-plus-sentinel-list design of the source
//! pager: a `HashMap` stands in for the hand-rolled chained hash table
//! (Rust's map already gives the same chaining behavior), and this list
//! gives O(1) touch/remove/victim over the subset of slots with
//! `ref_count == 0`.

use crate::types::PageId;
use std::collections::HashMap;

struct Node {
    page_id: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Default)]
pub struct Lru {
    positions: HashMap<PageId, usize>,
    nodes: Vec<Node>,
    free_slots: Vec<usize>,
    head: Option<usize>, // most recently used
    tail: Option<usize>, // least recently used: next eviction victim
}

impl Lru {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Insert `id` as most-recently-used. `id` must not already be present.
    pub fn touch_new(&mut self, id: PageId) {
        let idx = if let Some(idx) = self.free_slots.pop() {
            self.nodes[idx] = Node {
                page_id: id,
                prev: None,
                next: self.head,
            };
            idx
        } else {
            self.nodes.push(Node {
                page_id: id,
                prev: None,
                next: self.head,
            });
            self.nodes.len() - 1
        };
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.positions.insert(id, idx);
    }

    /// Remove `id` from the list (used when a page becomes referenced again).
    pub fn remove(&mut self, id: PageId) {
        let Some(idx) = self.positions.remove(&id) else {
            return;
        };
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.free_slots.push(idx);
    }

    /// The next eviction victim: the least-recently-used unreferenced page.
    pub fn victim(&self) -> Option<PageId> {
        self.tail.map(|idx| self.nodes[idx].page_id)
    }

    pub fn pop_victim(&mut self) -> Option<PageId> {
        let id = self.victim()?;
        self.remove(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_is_least_recently_touched() {
        let mut lru = Lru::new();
        lru.touch_new(PageId::new(1));
        lru.touch_new(PageId::new(2));
        lru.touch_new(PageId::new(3));
        assert_eq!(lru.victim(), Some(PageId::new(1)));
        lru.remove(PageId::new(1));
        assert_eq!(lru.victim(), Some(PageId::new(2)));
    }

    #[test]
    fn removed_ids_do_not_reappear() {
        let mut lru = Lru::new();
        lru.touch_new(PageId::new(1));
        lru.remove(PageId::new(1));
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.pop_victim(), None);
    }
}
