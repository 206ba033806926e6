//! Packed handles for polygons and clusters.
//!
//! A reference combines the owning tile slot, the slot's salt at the time the
//! reference was handed out, and a local index. The salt is bumped on every
//! tile swap, so a reference taken before a regeneration decodes to a slot
//! whose salt no longer matches and reads as "not found" instead of aliasing
//! the new tile's polygons.

/// Number of bits for the local polygon/cluster index.
const INDEX_BITS: u32 = 20;
/// Number of bits for the tile slot (stored 1-based so the null ref is 0).
const SLOT_BITS: u32 = 28;
/// Number of bits for the tile salt.
const SALT_BITS: u32 = 16;

const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const SLOT_MASK: u64 = (1 << SLOT_BITS) - 1;
const SALT_MASK: u64 = (1 << SALT_BITS) - 1;

pub(crate) const SALT_WRAP: u32 = SALT_MASK as u32;

#[inline]
fn encode(salt: u32, slot: usize, index: u32) -> u64 {
    ((salt as u64 & SALT_MASK) << (INDEX_BITS + SLOT_BITS))
        | ((slot as u64 + 1) & SLOT_MASK) << INDEX_BITS
        | (index as u64 & INDEX_MASK)
}

#[inline]
fn decode_salt(id: u64) -> u32 {
    ((id >> (INDEX_BITS + SLOT_BITS)) & SALT_MASK) as u32
}

#[inline]
fn decode_slot(id: u64) -> Option<usize> {
    let raw = (id >> INDEX_BITS) & SLOT_MASK;
    if raw == 0 {
        None
    } else {
        Some((raw - 1) as usize)
    }
}

#[inline]
fn decode_index(id: u64) -> u32 {
    (id & INDEX_MASK) as u32
}

/// Stable handle identifying one navigable polygon inside a specific tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyRef(u64);

impl PolyRef {
    /// The null reference; never resolves to a polygon.
    pub const NULL: PolyRef = PolyRef(0);

    pub(crate) fn encode(salt: u32, slot: usize, poly: u32) -> PolyRef {
        PolyRef(encode(salt, slot, poly))
    }

    pub const fn id(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn salt(self) -> u32 {
        decode_salt(self.0)
    }

    /// Tile slot the reference points into, or `None` for the null ref.
    pub(crate) fn slot(self) -> Option<usize> {
        decode_slot(self.0)
    }

    /// Local polygon index within the tile.
    pub(crate) fn index(self) -> u32 {
        decode_index(self.0)
    }
}

/// Stable handle identifying one cluster inside a specific tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterRef(u64);

impl ClusterRef {
    pub const NULL: ClusterRef = ClusterRef(0);

    pub(crate) fn encode(salt: u32, slot: usize, cluster: u32) -> ClusterRef {
        ClusterRef(encode(salt, slot, cluster))
    }

    pub const fn id(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn salt(self) -> u32 {
        decode_salt(self.0)
    }

    pub(crate) fn slot(self) -> Option<usize> {
        decode_slot(self.0)
    }

    pub(crate) fn index(self) -> u32 {
        decode_index(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_salt_slot_and_index() {
        let r = PolyRef::encode(41, 1027, 77);
        assert_eq!(r.salt(), 41);
        assert_eq!(r.slot(), Some(1027));
        assert_eq!(r.index(), 77);
        assert!(!r.is_null());
    }

    #[test]
    fn null_ref_has_no_slot() {
        assert!(PolyRef::NULL.is_null());
        assert_eq!(PolyRef::NULL.slot(), None);
    }

    #[test]
    fn slot_zero_is_distinct_from_null() {
        let r = PolyRef::encode(0, 0, 0);
        assert!(!r.is_null());
        assert_eq!(r.slot(), Some(0));
    }
}
