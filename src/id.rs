//! Packing of (lane, tile, cycle) coordinates into a single 64-bit identity
//!
//! The lane occupies the lowest 6 bits, the tile the next 32 bits, and the cycle
//! (or read number for read-keyed kinds) everything above.

/// Packed identity of a metric record
pub type Id = u64;

/// Number of bits reserved for the lane
pub const LANE_BIT_COUNT: u32 = 6;

/// Number of bits reserved for the tile
pub const TILE_BIT_COUNT: u32 = 32;

/// Offset of the tile within an identity
pub const LANE_BIT_SHIFT: u32 = LANE_BIT_COUNT;

/// Offset of the cycle (or read) within an identity
pub const TILE_BIT_SHIFT: u32 = LANE_BIT_COUNT + TILE_BIT_COUNT;

const LANE_MASK: u64 = (1 << LANE_BIT_COUNT) - 1;
const TILE_MASK: u64 = (1 << TILE_BIT_COUNT) - 1;
const TILE_HASH_MASK: u64 = (1 << TILE_BIT_SHIFT) - 1;

/// Identity of a tile-keyed record
#[must_use]
pub fn tile_id(lane: u32, tile: u32) -> Id {
    u64::from(lane) | (u64::from(tile) << LANE_BIT_SHIFT)
}

/// Identity of a cycle-keyed (or read-keyed) record
#[must_use]
pub fn cycle_id(lane: u32, tile: u32, cycle: u32) -> Id {
    tile_id(lane, tile) | (u64::from(cycle) << TILE_BIT_SHIFT)
}

#[must_use]
pub fn lane_from_id(id: Id) -> u32 {
    (id & LANE_MASK) as u32
}

#[must_use]
pub fn tile_from_id(id: Id) -> u32 {
    ((id >> LANE_BIT_SHIFT) & TILE_MASK) as u32
}

#[must_use]
pub fn cycle_from_id(id: Id) -> u32 {
    (id >> TILE_BIT_SHIFT) as u32
}

/// Lane and tile portion of an identity, shared by every cycle of a tile
#[must_use]
pub fn tile_hash_from_id(id: Id) -> Id {
    id & TILE_HASH_MASK
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_cycle_id_components() {
        let id = cycle_id(7, 2_214, 151);
        assert_eq!(lane_from_id(id), 7);
        assert_eq!(tile_from_id(id), 2_214);
        assert_eq!(cycle_from_id(id), 151);
        assert_eq!(tile_hash_from_id(id), tile_id(7, 2_214));
    }

    #[test]
    fn test_tile_id_has_no_cycle() {
        let id = tile_id(1, u32::MAX);
        assert_eq!(cycle_from_id(id), 0);
        assert_eq!(tile_from_id(id), u32::MAX);
        assert_eq!(tile_hash_from_id(id), id);
    }

    #[test]
    fn test_distinct_cycles_share_tile_hash() {
        let a = cycle_id(1, 1101, 1);
        let b = cycle_id(1, 1101, 2);
        assert_ne!(a, b);
        assert_eq!(tile_hash_from_id(a), tile_hash_from_id(b));
    }
}
