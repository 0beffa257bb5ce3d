//! The page cache and free-list manager.
//!
//! Every other layer in the engine goes through a `Pager` to touch disk.
//! It hands out ref-counted, mutability-tracked references to fixed-size
//! pages, evicts unreferenced pages under an LRU policy when the cache is
//! full, and threads free pages into a singly-linked list using their own
//! trailing bytes so that no separate free-list structure needs to survive
//! a reopen.

mod cache;
mod file_header;
mod fs;

pub use file_header::FileHeader;
pub use fs::{Fs, MemFs, RealFs};

use crate::error::{PagerError, Result};
use crate::types::{PageId, FILE_HEADER_SIZE, PAGE_SIZE};
use cache::Lru;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

struct Slot {
    data: Vec<u8>,
    ref_count: u32,
    mutable: bool,
    dirty: bool,
}

struct Inner {
    fs: Box<dyn Fs>,
    header: FileHeader,
    page_size: usize,
    page_count: u32,
    capacity: usize,
    slots: HashMap<PageId, Slot>,
    lru: Lru,
}

impl Inner {
    fn flush_header(&mut self) -> Result<()> {
        let mut buf = vec![0u8; FILE_HEADER_SIZE];
        self.header.write(&mut buf);
        self.fs.write_at(0, &buf).map_err(PagerError::Io)?;
        Ok(())
    }

    fn read_page_from_disk(&mut self, id: PageId) -> Result<Vec<u8>> {
        if id.value() == 0 || id.value() >= self.page_count {
            return Err(PagerError::PageNotFound(id).into());
        }
        let mut buf = vec![0u8; self.page_size];
        self.fs
            .read_at(id.file_offset(self.page_size), &mut buf)
            .map_err(PagerError::Io)?;
        Ok(buf)
    }

    fn write_page_to_disk(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        self.fs
            .write_at(id.file_offset(self.page_size), data)
            .map_err(PagerError::Io)?;
        Ok(())
    }

    /// Evict the LRU victim to make room, returning an error if every
    /// cached page is currently pinned.
    fn make_room(&mut self) -> Result<()> {
        if self.slots.len() < self.capacity {
            return Ok(());
        }
        let victim = self.lru.pop_victim().ok_or(PagerError::CacheExhausted)?;
        let slot = self.slots.remove(&victim).expect("lru/slots out of sync");
        debug_assert_eq!(slot.ref_count, 0, "evicted a referenced page");
        if slot.dirty {
            self.write_page_to_disk(victim, &slot.data)?;
        }
        trace!(page = victim.value(), "evicted page from cache");
        Ok(())
    }

    /// Fetch-or-load a slot for `id`, bumping its ref count by one and
    /// removing it from the LRU list if it was previously unreferenced.
    fn touch(&mut self, id: PageId) -> Result<()> {
        if let Some(slot) = self.slots.get_mut(&id) {
            if slot.ref_count == 0 {
                self.lru.remove(id);
            }
            slot.ref_count += 1;
            return Ok(());
        }
        self.make_room()?;
        let data = self.read_page_from_disk(id)?;
        self.slots.insert(
            id,
            Slot {
                data,
                ref_count: 1,
                mutable: false,
                dirty: false,
            },
        );
        Ok(())
    }

    fn unref(&mut self, id: PageId) -> Result<()> {
        let slot = self.slots.get_mut(&id).expect("unref of untracked page");
        debug_assert!(slot.ref_count > 0);
        slot.ref_count -= 1;
        if slot.mutable {
            slot.mutable = false;
            self.write_page_to_disk(id, &slot.data)?;
            slot.dirty = false;
        }
        if slot.ref_count == 0 {
            self.lru.touch_new(id);
        }
        Ok(())
    }
}

/// A cheaply-cloneable handle to the page cache.
#[derive(Clone)]
pub struct Pager {
    inner: Arc<RwLock<Inner>>,
    page_size: usize,
}

impl Pager {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let mut fs: Box<dyn Fs> = Box::new(RealFs::open(path.as_ref()).map_err(PagerError::Io)?);
        Self::from_fs(&mut fs, capacity).map(|inner| Self {
            page_size: inner.page_size,
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    #[cfg(test)]
    pub fn open_mem(capacity: usize) -> Result<Self> {
        let mut fs: Box<dyn Fs> = Box::<MemFs>::default();
        let inner = Self::from_fs(&mut fs, capacity)?;
        Ok(Self {
            page_size: inner.page_size,
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    fn from_fs(fs: &mut Box<dyn Fs>, capacity: usize) -> Result<Inner> {
        let len = fs.len().map_err(PagerError::Io)?;
        let (header, page_count) = if len == 0 {
            let header = FileHeader::new();
            let page_size = header.page_size as usize;
            fs.set_len(page_size as u64).map_err(PagerError::Io)?;
            let mut buf = vec![0u8; page_size];
            header.write(&mut buf);
            fs.write_at(0, &buf).map_err(PagerError::Io)?;
            debug!(page_size, "initialized new database file");
            (header, 1u32)
        } else {
            let mut buf = vec![0u8; FILE_HEADER_SIZE];
            fs.read_at(0, &mut buf).map_err(PagerError::Io)?;
            let header = FileHeader::read(&buf)?;
            let page_size = header.page_size as usize;
            if len % page_size as u64 != 0 {
                return Err(PagerError::Corruption(format!(
                    "file size {len} is not a multiple of page size {page_size}"
                ))
                .into());
            }
            ((header), (len / page_size as u64) as u32)
        };
        let fs_owned = std::mem::replace(fs, Box::new(MemFs::default()));
        Ok(Inner {
            page_size: header.page_size as usize,
            fs: fs_owned,
            header,
            page_count,
            capacity,
            slots: HashMap::new(),
            lru: Lru::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.inner.read().page_count
    }

    /// Allocate a fresh page, reusing the free list when possible. Returns
    /// it already made mutable, matching the source pager's `pager_alloc_page`.
    pub fn alloc_page(&self) -> Result<PageRefMut> {
        let mut inner = self.inner.write();
        let id = if inner.header.free_list_head != 0 {
            let id = PageId::new(inner.header.free_list_head);
            let data = inner.read_page_from_disk(id)?;
            let tail = &data[inner.page_size - 4..];
            let next = u32::from_le_bytes(tail.try_into().unwrap());
            inner.header.free_list_head = next;
            inner.flush_header()?;
            // The freed page may still be resident (with ref_count 0) from
            // the delete that put it on the free list; drop that stale
            // cache/LRU entry before reinstalling it as a live slot.
            inner.lru.remove(id);
            inner.slots.remove(&id);
            inner.make_room()?;
            inner.slots.insert(
                id,
                Slot {
                    data: vec![0u8; inner.page_size],
                    ref_count: 1,
                    mutable: true,
                    dirty: true,
                },
            );
            id
        } else {
            let id = PageId::new(inner.page_count);
            inner.page_count += 1;
            let page_size = inner.page_size as u64;
            let new_len = inner.page_count as u64 * page_size;
            inner.fs.set_len(new_len).map_err(PagerError::Io)?;
            inner.make_room()?;
            inner.slots.insert(
                id,
                Slot {
                    data: vec![0u8; inner.page_size],
                    ref_count: 1,
                    mutable: true,
                    dirty: true,
                },
            );
            id
        };
        trace!(page = id.value(), "allocated page");
        Ok(PageRefMut {
            pager: self.clone(),
            id,
        })
    }

    /// Fails if the page currently has an outstanding mutable reference.
    pub fn get_page(&self, id: PageId) -> Result<PageRef> {
        {
            let inner = self.inner.read();
            if let Some(slot) = inner.slots.get(&id) {
                if slot.mutable {
                    return Err(PagerError::PageBusy(id).into());
                }
            }
        }
        self.inner.write().touch(id)?;
        Ok(PageRef {
            pager: self.clone(),
            id,
        })
    }

    /// Succeeds only when the resulting reference is exclusive (ref_count == 1
    /// after the fetch): either the page was uncached, or the caller already
    /// held the sole outstanding reference.
    pub fn get_page_mutable(&self, id: PageId) -> Result<PageRefMut> {
        {
            let inner = self.inner.read();
            if let Some(slot) = inner.slots.get(&id) {
                if slot.ref_count > 0 {
                    return Err(PagerError::NotExclusive(id).into());
                }
            }
        }
        let mut inner = self.inner.write();
        inner.touch(id)?;
        let slot = inner.slots.get_mut(&id).unwrap();
        slot.mutable = true;
        slot.dirty = true;
        Ok(PageRefMut {
            pager: self.clone(),
            id,
        })
    }

    /// Promote an already-held immutable reference to mutable. Consumes the
    /// `PageRef`; fails (returning it back) unless it is the sole reference.
    pub fn make_page_mutable(&self, page_ref: PageRef) -> std::result::Result<PageRefMut, (PageRef, PagerError)> {
        let id = page_ref.id;
        {
            let mut inner = self.inner.write();
            let slot = inner.slots.get_mut(&id).expect("page_ref for untracked page");
            if slot.ref_count != 1 {
                return Err((page_ref, PagerError::NotExclusive(id)));
            }
            slot.mutable = true;
            slot.dirty = true;
        }
        std::mem::forget(page_ref);
        Ok(PageRefMut {
            pager: self.clone(),
            id,
        })
    }

    pub fn ref_count(&self, id: PageId) -> u32 {
        self.inner
            .read()
            .slots
            .get(&id)
            .map(|s| s.ref_count)
            .unwrap_or(0)
    }

    pub fn is_page_mutable(&self, id: PageId) -> bool {
        // Source bug note: `pager_is_page_mutable` used `|` instead of `&`
        // against the mutable-flag bit. We implement the evidently-intended
        // bitwise-AND test; see DESIGN.md.
        self.inner
            .read()
            .slots
            .get(&id)
            .map(|s| s.mutable)
            .unwrap_or(false)
    }

    fn unref(&self, id: PageId) {
        let _ = self.inner.write().unref(id);
    }

    /// Thread `page_ref`'s page onto the free list and release it. Requires
    /// the caller to hold the sole reference to the page.
    pub fn delete_page(&self, page_ref: PageRefMut) -> Result<()> {
        let id = page_ref.id;
        {
            let mut inner = self.inner.write();
            let slot = inner.slots.get_mut(&id).expect("page_ref for untracked page");
            if slot.ref_count != 1 {
                return Err(PagerError::NotExclusive(id).into());
            }
            let page_size = inner.page_size;
            let next = inner.header.free_list_head;
            slot.data[page_size - 4..].copy_from_slice(&next.to_le_bytes());
            slot.dirty = true;
            inner.header.free_list_head = id.value();
            inner.flush_header()?;
        }
        drop(page_ref);
        Ok(())
    }

    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let ids: Vec<PageId> = inner.slots.keys().copied().collect();
        for id in ids {
            let (dirty, data) = {
                let slot = inner.slots.get(&id).unwrap();
                (slot.dirty || slot.mutable, slot.data.clone())
            };
            if dirty {
                inner.write_page_to_disk(id, &data)?;
                let slot = inner.slots.get_mut(&id).unwrap();
                slot.dirty = false;
            }
        }
        inner.fs.sync().map_err(PagerError::Io)?;
        Ok(())
    }
}

/// An immutable, shared reference to a cached page.
pub struct PageRef {
    pager: Pager,
    id: PageId,
}

impl PageRef {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.pager.inner.read();
        let slot = inner.slots.get(&self.id).expect("page_ref for untracked page");
        f(&slot.data)
    }
}

impl Clone for PageRef {
    fn clone(&self) -> Self {
        self.pager.inner.write().touch(self.id).expect("re-ref of live page");
        Self {
            pager: self.pager.clone(),
            id: self.id,
        }
    }
}

impl Drop for PageRef {
    fn drop(&mut self) {
        self.pager.unref(self.id);
    }
}

/// An exclusive, mutable reference to a cached page. Dropping it writes the
/// page back to disk.
pub struct PageRefMut {
    pager: Pager,
    id: PageId,
}

impl PageRefMut {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.pager.inner.read();
        let slot = inner.slots.get(&self.id).expect("page_ref for untracked page");
        f(&slot.data)
    }

    pub fn write<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut inner = self.pager.inner.write();
        let slot = inner.slots.get_mut(&self.id).expect("page_ref for untracked page");
        slot.dirty = true;
        f(&mut slot.data)
    }

}

impl Drop for PageRefMut {
    fn drop(&mut self) {
        self.pager.unref(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_read_back() {
        let pager = Pager::open_mem(16).unwrap();
        let mut p = pager.alloc_page().unwrap();
        p.write(|buf| buf[0] = 42);
        let id = p.id();
        drop(p);
        let r = pager.get_page(id).unwrap();
        assert_eq!(r.read(|buf| buf[0]), 42);
    }

    #[test]
    fn mutable_ref_blocks_immutable_fetch() {
        let pager = Pager::open_mem(16).unwrap();
        let p = pager.alloc_page().unwrap();
        let id = p.id();
        assert!(pager.get_page(id).is_err());
        drop(p);
        assert!(pager.get_page(id).is_ok());
    }

    #[test]
    fn delete_then_alloc_reuses_freed_page() {
        let pager = Pager::open_mem(16).unwrap();
        let p1 = pager.alloc_page().unwrap();
        let id1 = p1.id();
        pager.delete_page(p1).unwrap();
        let p2 = pager.alloc_page().unwrap();
        assert_eq!(p2.id(), id1);
    }

    #[test]
    fn free_list_survives_reload_from_header() {
        let mut fs: Box<dyn Fs> = Box::<MemFs>::default();
        let inner = Pager::from_fs(&mut fs, 16).unwrap();
        let pager = Pager {
            page_size: inner.page_size,
            inner: Arc::new(RwLock::new(inner)),
        };
        let p1 = pager.alloc_page().unwrap();
        let id1 = p1.id();
        pager.delete_page(p1).unwrap();
        assert_eq!(pager.inner.read().header.free_list_head, id1.value());
    }
}
