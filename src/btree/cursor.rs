//! A cursor owns the sole mutation path into a tree: every insert, update,
//! and remove goes through one, since rebalancing needs to know exactly
//! which path is "live" so it can keep that path's stack entries pointing
//! at the right page/slot after a split or merge moves cells around.

use super::rebalance;
use crate::error::{PagerError, Result};
use crate::node::{Cell, Node};
use crate::pager::Pager;
use crate::types::{KeyType, PageId, MAX_TREE_HEIGHT};
use std::sync::Arc;

/// A position in a tree: a bounded stack of (page, slot index) pairs from
/// the root down to the current leaf.
pub struct Cursor {
    pager: Pager,
    key_type: Arc<dyn KeyType + Send + Sync>,
    root: PageId,
    stack: Vec<(PageId, usize)>,
    /// Set after `remove()` slides a later cell into the slot the cursor
    /// just vacated, so the next `goto_next` doesn't skip over it.
    skip_next: bool,
}

impl Cursor {
    pub fn new(pager: Pager, key_type: Arc<dyn KeyType + Send + Sync>, root: PageId) -> Self {
        Self {
            pager,
            key_type,
            root,
            stack: Vec::with_capacity(8),
            skip_next: false,
        }
    }

    fn load(&self, id: PageId) -> Result<Node> {
        let page = self.pager.get_page(id)?;
        Ok(page.read(|b| Node::load(id, b)))
    }

    pub fn is_valid(&self) -> bool {
        match self.stack.last() {
            None => false,
            Some(&(id, idx)) => self.load(id).map(|n| idx < n.cell_count()).unwrap_or(false),
        }
    }

    /// Position at the smallest key in the tree. Returns whether the tree
    /// is non-empty.
    pub fn goto_first(&mut self) -> Result<bool> {
        self.stack.clear();
        self.skip_next = false;
        self.descend_leftmost(self.root)
    }

    /// Position at `key` if present, else at the first key greater than
    /// it. Returns whether an exact match was found.
    pub fn goto_key(&mut self, key: &[u8]) -> Result<bool> {
        self.stack.clear();
        self.skip_next = false;
        let mut current = self.root;
        loop {
            let node = self.load(current)?;
            if node.is_leaf() {
                return match node.search(&*self.key_type, key) {
                    Ok(i) => {
                        self.stack.push((current, i));
                        Ok(true)
                    }
                    Err(i) => {
                        self.stack.push((current, i));
                        Ok(false)
                    }
                };
            }
            if self.stack.len() >= MAX_TREE_HEIGHT {
                return Err(PagerError::TreeTooDeep { max: MAX_TREE_HEIGHT }.into());
            }
            let (idx, child) = node.find_child(&*self.key_type, key);
            self.stack.push((current, idx));
            current = child;
        }
    }

    fn descend_leftmost(&mut self, start: PageId) -> Result<bool> {
        let mut current = start;
        loop {
            let node = self.load(current)?;
            if node.is_leaf() {
                self.stack.push((current, 0));
                return Ok(node.cell_count() > 0);
            }
            self.stack.push((current, 0));
            current = node.rightmost_child();
        }
    }

    /// Advance to the next key in order.
    pub fn goto_next(&mut self) -> Result<bool> {
        if self.stack.is_empty() {
            return Ok(false);
        }
        if self.skip_next {
            self.skip_next = false;
            return Ok(self.is_valid());
        }
        let (leaf_id, leaf_idx) = *self.stack.last().unwrap();
        let leaf = self.load(leaf_id)?;
        let next_idx = leaf_idx + 1;
        if next_idx < leaf.cell_count() {
            self.stack.last_mut().unwrap().1 = next_idx;
            return Ok(true);
        }
        self.stack.pop();

        while let Some(&(id, idx)) = self.stack.last() {
            let node = self.load(id)?;
            let next_idx = idx + 1;
            if next_idx <= node.cell_count() {
                self.stack.last_mut().unwrap().1 = next_idx;
                let child = child_by_index(&node, next_idx);
                return self.descend_leftmost(child);
            }
            self.stack.pop();
        }
        Ok(false)
    }

    /// The key/value pair at the current position, if any.
    pub fn current(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(&(id, idx)) = self.stack.last() else {
            return Ok(None);
        };
        let node = self.load(id)?;
        if idx >= node.cell_count() {
            return Ok(None);
        }
        match node.get_cell(&*self.key_type, idx) {
            Cell::Leaf { key, value } => Ok(Some((key, value))),
            Cell::Inner { .. } => unreachable!("cursor leaf position on an inner node"),
        }
    }

    /// Insert `key` -> `value`, overwriting the value if `key` already
    /// exists. Leaves the cursor positioned on the written cell.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let existed = self.goto_key(key)?;
        let cell = Cell::Leaf {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let encoded = cell.encode();

        if existed {
            let (leaf_id, idx) = *self.stack.last().unwrap();
            let old_len = {
                let node = self.load(leaf_id)?;
                node.encoded_len(&*self.key_type, idx)
            };
            if old_len == encoded.len() {
                let mut node = self.load(leaf_id)?;
                node.overwrite_cell(idx, &encoded);
                self.store(&mut node)?;
                return Ok(());
            }
            let mut node = self.load(leaf_id)?;
            node.delete_cell(&*self.key_type, idx);
            self.store(&mut node)?;
        }

        rebalance::ensure_cell_space(&self.pager, &*self.key_type, &mut self.stack, encoded.len())?;
        let (leaf_id, idx) = *self.stack.last().unwrap();
        let mut node = self.load(leaf_id)?;
        node.add_cell(&*self.key_type, idx, &encoded);
        self.store(&mut node)?;
        Ok(())
    }

    /// Remove the entry at the cursor's current position, if any.
    pub fn remove(&mut self) -> Result<bool> {
        let Some(&(leaf_id, idx)) = self.stack.last() else {
            return Ok(false);
        };
        let mut node = self.load(leaf_id)?;
        if idx >= node.cell_count() {
            return Ok(false);
        }
        node.delete_cell(&*self.key_type, idx);
        self.store(&mut node)?;
        rebalance::rebalance_after_delete(&self.pager, &*self.key_type, &mut self.stack)?;
        // Whatever cell slid into this slot is the next logical element;
        // goto_next must not skip past it.
        self.skip_next = true;
        Ok(true)
    }

    /// Remove the entry for `key`, if present.
    pub fn remove_key(&mut self, key: &[u8]) -> Result<bool> {
        if !self.goto_key(key)? {
            return Ok(false);
        }
        self.remove()
    }

    fn store(&self, node: &mut Node) -> Result<()> {
        let mut page = self.pager.get_page_mutable(node.page_id)?;
        let bytes = node.finish().to_vec();
        page.write(|b| b.copy_from_slice(&bytes));
        Ok(())
    }
}

fn child_by_index(node: &Node, i: usize) -> PageId {
    if i == 0 {
        node.rightmost_child()
    } else {
        node.child_at(i - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use crate::types::IntKey;

    fn new_tree() -> (Pager, PageId, Arc<dyn KeyType + Send + Sync>) {
        let pager = Pager::open_mem(64).unwrap();
        let page = pager.alloc_page().unwrap();
        let root = page.id();
        let mut node = Node::new_leaf(root, pager.page_size());
        let bytes = node.finish().to_vec();
        let mut p = page;
        p.write(|b| b.copy_from_slice(&bytes));
        (pager, root, Arc::new(IntKey))
    }

    fn row(s: &str) -> Vec<u8> {
        let mut v = (s.len() as u32).to_le_bytes().to_vec();
        v.extend_from_slice(s.as_bytes());
        v
    }

    #[test]
    fn insert_and_read_back_in_order() {
        let (pager, root, kt) = new_tree();
        let mut cursor = Cursor::new(pager, kt, root);
        for k in [5i64, 1, 3, 2, 4] {
            cursor.insert(&k.to_le_bytes(), &row(&format!("v{k}"))).unwrap();
        }
        assert!(cursor.goto_first().unwrap());
        let mut seen = Vec::new();
        loop {
            let (k, _) = cursor.current().unwrap().unwrap();
            seen.push(i64::from_le_bytes(k.try_into().unwrap()));
            if !cursor.goto_next().unwrap() {
                break;
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn remove_key_then_lookup_misses() {
        let (pager, root, kt) = new_tree();
        let mut cursor = Cursor::new(pager, kt, root);
        cursor.insert(&1i64.to_le_bytes(), &row("a")).unwrap();
        cursor.insert(&2i64.to_le_bytes(), &row("b")).unwrap();
        assert!(cursor.remove_key(&1i64.to_le_bytes()).unwrap());
        assert!(!cursor.goto_key(&1i64.to_le_bytes()).unwrap());
        assert!(cursor.goto_key(&2i64.to_le_bytes()).unwrap());
    }

    #[test]
    fn insert_many_forces_a_split() {
        let (pager, root, kt) = new_tree();
        let mut cursor = Cursor::new(pager, kt, root);
        for k in 0..400i64 {
            cursor
                .insert(&k.to_le_bytes(), &row(&"x".repeat(20)))
                .unwrap();
        }
        let mut count = 0;
        assert!(cursor.goto_first().unwrap());
        loop {
            count += 1;
            if !cursor.goto_next().unwrap() {
                break;
            }
        }
        assert_eq!(count, 400);
    }
}
