//! Fixed-capacity arena with stable handles
//!
//! Every table in the controller (nodes, links, edges, route sources) is a
//! `Pool`: a slot vector, a free list and an ordering list. Handles stay
//! valid until the entry is removed; a removed slot is recycled by the next
//! insertion, so handles must not be held across mutations that free entries.
//!
//! Ordering is explicit. Tables that want most-recently-used lookups call
//! [`Pool::promote`] and evict from [`Pool::back`]. Lookups are linear scans
//! over at most `N` entries.

use heapless::Vec;

/// Stable slot handle into a [`Pool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u16);

impl Handle {
    /// Slot index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bounded arena with an explicit front-to-back order
pub struct Pool<T, const N: usize> {
    slots: Vec<Option<T>, N>,
    free: Vec<u16, N>,
    order: Vec<Handle, N>,
}

impl<T, const N: usize> Pool<T, N> {
    /// Create an empty pool
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Maximum number of entries
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if no entries are live
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// True if the next insertion would fail
    pub fn is_full(&self) -> bool {
        self.order.len() >= N
    }

    fn alloc(&mut self, value: T) -> Option<Handle> {
        if let Some(slot) = self.free.pop() {
            self.slots[slot as usize] = Some(value);
            return Some(Handle(slot));
        }
        let slot = self.slots.len();
        self.slots.push(Some(value)).ok()?;
        Some(Handle(slot as u16))
    }

    /// Insert at the front. Returns `None` when the pool is full.
    pub fn insert_front(&mut self, value: T) -> Option<Handle> {
        if self.is_full() {
            return None;
        }
        let handle = self.alloc(value)?;
        self.order.insert(0, handle).ok()?;
        Some(handle)
    }

    /// Insert at the back. Returns `None` when the pool is full.
    pub fn insert_back(&mut self, value: T) -> Option<Handle> {
        if self.is_full() {
            return None;
        }
        let handle = self.alloc(value)?;
        self.order.push(handle).ok()?;
        Some(handle)
    }

    fn position(&self, handle: Handle) -> Option<usize> {
        self.order.iter().position(|&h| h == handle)
    }

    /// Remove an entry and recycle its slot
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let pos = self.position(handle)?;
        self.order.remove(pos);
        let value = self.slots.get_mut(handle.index())?.take();
        // Free list has room for every slot
        let _ = self.free.push(handle.0);
        value
    }

    /// Shared access
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle.index())?.as_ref()
    }

    /// Mutable access
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    /// First entry, front to back, matching `pred`
    pub fn find<F>(&self, mut pred: F) -> Option<Handle>
    where
        F: FnMut(&T) -> bool,
    {
        self.order.iter().copied().find(|h| {
            self.slots[h.index()]
                .as_ref()
                .map_or(false, |value| pred(value))
        })
    }

    /// Move an entry to the front
    pub fn promote(&mut self, handle: Handle) {
        if let Some(pos) = self.position(handle) {
            if pos > 0 {
                self.order.remove(pos);
                // Just removed one, so there is room
                let _ = self.order.insert(0, handle);
            }
        }
    }

    /// Front entry
    pub fn front(&self) -> Option<Handle> {
        self.order.first().copied()
    }

    /// Back entry (least recently used for MRU tables)
    pub fn back(&self) -> Option<Handle> {
        self.order.last().copied()
    }

    /// Iterate front to back
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |&h| self.slots[h.index()].as_ref().map(|value| (h, value)))
    }

    /// Iterate values front to back
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Snapshot of the current order, for mutation while walking
    pub fn handles(&self) -> Vec<Handle, N> {
        self.order.clone()
    }

    /// Keep entries matching `keep`. Returns the number removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        for handle in self.handles() {
            let drop_it = self.get(handle).map_or(false, |value| !keep(value));
            if drop_it {
                self.remove(handle);
                removed += 1;
            }
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
