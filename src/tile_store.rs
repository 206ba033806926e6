//! The tile grid and its salt bookkeeping.
//!
//! The store owns one slot per grid cell. Each slot carries a salt that is
//! bumped on every swap; packed references embed the salt, so references into
//! a replaced tile stop resolving instead of aliasing the replacement.
//!
//! The store itself is not thread-safe. All access goes through the gate in
//! [`crate::gate`], which serializes queries against generator swaps.

use std::sync::Arc;

use glam::Vec3;
use tracing::{info, warn};

use crate::geometry::Aabb;
use crate::nav_ref::SALT_WRAP;
use crate::tile::{NavPoly, PortalEdge, TileData};
use crate::PolyRef;

/// One cell of the tile grid.
#[derive(Debug, Clone)]
pub(crate) struct TileSlot {
    /// Grid coordinate along X.
    pub x: i32,
    /// Grid coordinate along Z.
    pub y: i32,
    /// Bumped on every swap; embedded in refs handed out for this slot.
    pub salt: u32,
    /// Current tile blob, `None` while the slot is empty.
    pub data: Option<Arc<TileData>>,
    /// World bounds of the slot's cell, valid whether or not data is present.
    pub bounds: Aabb,
    /// Rebuild priority, smaller is sooner.
    pub priority: f32,
}

/// Grid of tile slots plus memory accounting.
pub struct TileStore {
    width: i32,
    height: i32,
    slots: Vec<TileSlot>,
    total_data_size: usize,
}

impl TileStore {
    pub(crate) fn new() -> TileStore {
        TileStore {
            width: 0,
            height: 0,
            slots: Vec::new(),
            total_data_size: 0,
        }
    }

    /// Sizes the grid to `width * height` slots.
    ///
    /// Reserving the same dimensions again is a no-op that keeps every loaded
    /// tile. Different dimensions drop all tiles and start over.
    pub(crate) fn reserve(&mut self, width: i32, height: i32, slot_bounds: impl Fn(i32, i32) -> Aabb) {
        assert!(width > 0 && height > 0, "tile grid must be non-empty");
        if self.width == width && self.height == height {
            return;
        }
        if !self.slots.is_empty() {
            info!(
                old_width = self.width,
                old_height = self.height,
                width,
                height,
                "tile grid dimensions changed, dropping all tiles"
            );
        }
        self.width = width;
        self.height = height;
        self.total_data_size = 0;
        self.slots.clear();
        self.slots.reserve((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                self.slots.push(TileSlot {
                    x,
                    y,
                    salt: 0,
                    data: None,
                    bounds: slot_bounds(x, y),
                    priority: 0.0,
                });
            }
        }
    }

    pub(crate) fn width(&self) -> i32 {
        self.width
    }

    pub(crate) fn height(&self) -> i32 {
        self.height
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Flat slot index for grid coordinates. Panics when out of range.
    pub(crate) fn index_at(&self, x: i32, y: i32) -> usize {
        assert!(
            x >= 0 && x < self.width && y >= 0 && y < self.height,
            "tile coordinate ({x}, {y}) outside {}x{} grid",
            self.width,
            self.height
        );
        (y * self.width + x) as usize
    }

    /// Replaces the tile in `index` and bumps the slot salt.
    ///
    /// `old` is the caller's idea of what the slot currently holds. `new` is
    /// installed either way; on a mismatch another writer got there first,
    /// which is logged and reported as `false` so the caller knows its
    /// snapshot was stale. Accounting deducts only the blob actually
    /// resident.
    pub(crate) fn swap_tile(
        &mut self,
        index: usize,
        old: Option<&Arc<TileData>>,
        new: Option<Arc<TileData>>,
    ) -> bool {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        let slot = &mut self.slots[index];

        let matched = match (&slot.data, old) {
            (None, None) => true,
            (Some(cur), Some(expected)) => Arc::ptr_eq(cur, expected),
            _ => false,
        };
        if !matched {
            warn!(
                index,
                x = slot.x,
                y = slot.y,
                "slot contents changed since the caller's snapshot, installing anyway"
            );
        }

        if let Some(cur) = slot.data.take() {
            // Deduct only what was actually resident.
            self.total_data_size -= cur.byte_size();
        }
        if let Some(new_data) = new {
            self.total_data_size += new_data.byte_size();
            slot.bounds = new_data.header.bounds;
            slot.data = Some(new_data);
        }
        slot.salt = slot.salt.wrapping_add(1) & SALT_WRAP;
        matched
    }

    /// Drops the tile in `index`, if any. The salt is bumped either way.
    pub(crate) fn remove_tile(&mut self, index: usize) -> Option<Arc<TileData>> {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        let old = self.slots[index].data.clone();
        self.swap_tile(index, old.as_ref(), None);
        old
    }

    /// Reinstates a slot from persisted data, salt included.
    ///
    /// Only deserialization uses this; live swaps go through
    /// [`TileStore::swap_tile`] so the salt always advances.
    pub(crate) fn restore_slot(&mut self, index: usize, salt: u32, data: Option<Arc<TileData>>) {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        let slot = &mut self.slots[index];
        if let Some(cur) = slot.data.take() {
            self.total_data_size -= cur.byte_size();
        }
        slot.salt = salt & SALT_WRAP;
        if let Some(data) = data {
            self.total_data_size += data.byte_size();
            slot.bounds = data.header.bounds;
            slot.data = Some(data);
        }
    }

    /// Bytes of tile data currently resident.
    pub(crate) fn total_data_size(&self) -> usize {
        self.total_data_size
    }

    /// Union of the bounds of all loaded tiles.
    pub(crate) fn bounds(&self) -> Aabb {
        let mut out = Aabb::EMPTY;
        for slot in &self.slots {
            if slot.data.is_some() {
                out = out.union(&slot.bounds);
            }
        }
        out
    }

    /// World bounds of one slot. Panics when out of range.
    pub(crate) fn tile_bounds(&self, index: usize) -> Aabb {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        self.slots[index].bounds
    }

    /// Grid coordinates of one slot. Panics when out of range.
    pub(crate) fn tile_xy(&self, index: usize) -> (i32, i32) {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        (self.slots[index].x, self.slots[index].y)
    }

    /// Current salt of one slot.
    pub(crate) fn tile_salt(&self, index: usize) -> u32 {
        assert!(index < self.slots.len(), "tile index {index} out of range");
        self.slots[index].salt
    }

    /// Tile blob in `index`, `None` when empty or out of range.
    pub(crate) fn tile(&self, index: usize) -> Option<&Arc<TileData>> {
        self.slots.get(index).and_then(|s| s.data.as_ref())
    }

    pub(crate) fn slots(&self) -> &[TileSlot] {
        &self.slots
    }

    /// Iterates loaded tiles as `(slot_index, data)`.
    pub(crate) fn loaded_tiles(&self) -> impl Iterator<Item = (usize, &Arc<TileData>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.data.as_ref().map(|d| (i, d)))
    }

    /// Resolves a reference to its tile and polygon.
    ///
    /// `None` when the ref is null, the slot is empty, the salt no longer
    /// matches, or the polygon index is out of range for the current blob.
    pub(crate) fn get_tile_and_poly(&self, r: PolyRef) -> Option<(&Arc<TileData>, &NavPoly)> {
        let slot_index = r.slot()?;
        let slot = self.slots.get(slot_index)?;
        if slot.salt != r.salt() {
            return None;
        }
        let data = slot.data.as_ref()?;
        let poly = data.polys.get(r.index() as usize)?;
        Some((data, poly))
    }

    /// Checks that a reference still resolves.
    pub(crate) fn is_valid_ref(&self, r: PolyRef) -> bool {
        self.get_tile_and_poly(r).is_some()
    }

    /// Reference for a polygon in a slot, stamped with the slot's live salt.
    pub(crate) fn make_poly_ref(&self, slot_index: usize, poly: u16) -> PolyRef {
        PolyRef::encode(self.slots[slot_index].salt, slot_index, poly as u32)
    }

    /// Follows one polygon edge to the neighboring polygon's live reference.
    pub(crate) fn resolve_edge(&self, current_slot: usize, edge: PortalEdge) -> Option<PolyRef> {
        match edge {
            PortalEdge::Border => None,
            PortalEdge::Internal(poly) => Some(self.make_poly_ref(current_slot, poly)),
            PortalEdge::External { slot, poly } => {
                let slot = slot as usize;
                let target = self.slots.get(slot)?;
                let data = target.data.as_ref()?;
                if data.polys.len() <= poly as usize {
                    return None;
                }
                Some(self.make_poly_ref(slot, poly))
            }
        }
    }

    /// Recomputes rebuild priorities as XZ distance from `origin` to each
    /// slot's cell center.
    pub(crate) fn update_tile_priorities(&mut self, origin: Vec3) {
        for slot in &mut self.slots {
            let center = slot.bounds.center();
            let dx = center.x - origin.x;
            let dz = center.z - origin.z;
            slot.priority = dx * dx + dz * dz;
        }
    }

    /// Slot indices ordered by ascending priority.
    pub(crate) fn tiles_by_priority(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by(|&a, &b| {
            self.slots[a]
                .priority
                .total_cmp(&self.slots[b].priority)
        });
        order
    }
}
