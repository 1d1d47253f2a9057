//! Metric record types
//!
//! Every metric kind is a plain struct implementing [`Metric`], together with the
//! codecs for each on-disk version of that kind.

mod corrected_intensity;
mod error;
mod extraction;
mod image;
mod index;
mod q;
mod q_by_lane;
mod q_collapsed;
mod tile;

use std::fmt::Debug;

pub use corrected_intensity::{CorrectedIntensityMetric, CorrectedIntensityV2, CorrectedIntensityV3};
pub use error::{ErrorMetric, ErrorV3, MAX_MISMATCH};
pub use extraction::{ExtractionMetric, ExtractionV2};
pub use image::{ImageMetric, ImageV1, ImageV2, MAX_CHANNELS};
pub use index::{IndexInfo, IndexMetric, IndexV1};
pub use q::{QMetric, QV4, QV5, QV6};
pub use q_by_lane::QByLaneMetric;
pub use q_collapsed::{QCollapsedMetric, QCollapsedV2, QCollapsedV6};
pub use tile::{ReadMetric, TileMetric, TileV2};

use crate::constants::MetricKind;
use crate::format::FormatRegistry;
use crate::header::QHeader;
use crate::id::{cycle_id, tile_hash_from_id, tile_id, Id};

/// Number of channels or bases for per-base arrays (A, C, G, T)
pub const NUM_OF_BASES: usize = 4;

/// Number of bases plus the no-call slot
pub const NUM_OF_BASES_AND_NC: usize = 5;

/// Which coordinates make up the identity of a kind, and thus its on-disk id size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLayout {
    /// `lane: u16`, `tile: u16`
    Tile,
    /// `lane: u16`, `tile: u16`, `cycle: u16`
    Cycle,
    /// `lane: u16`, `tile: u16`, `read: u16`
    Read,
}
impl IdLayout {
    /// Bytes occupied by the identity on disk
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Tile => 4,
            Self::Cycle | Self::Read => 6,
        }
    }
}

/// Coordinates shared by every record
///
/// `cycle` holds the read number for read-keyed kinds and is unused for tile-keyed kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MetricBase {
    pub lane: u32,
    pub tile: u32,
    pub cycle: u32,
}
impl MetricBase {
    #[must_use]
    pub fn new(lane: u32, tile: u32, cycle: u32) -> Self {
        Self { lane, tile, cycle }
    }
}

/// A record of one metric kind
pub trait Metric: Clone + Default + Debug + Send + Sync + 'static {
    /// Per-set metadata stored in the file header
    type Header: Clone + Default + Debug + Send + Sync + 'static;

    const KIND: MetricKind;

    /// Version used when a set is created without one
    const LATEST_VERSION: u8;

    const ID_LAYOUT: IdLayout;

    /// Whether records with tile 0 are discarded while decoding
    const CHECK_TILE_ID: bool = true;

    fn base(&self) -> &MetricBase;

    fn base_mut(&mut self) -> &mut MetricBase;

    /// Process-wide codec table for this kind
    fn registry() -> &'static FormatRegistry<Self>;

    fn lane(&self) -> u32 {
        self.base().lane
    }

    fn tile(&self) -> u32 {
        self.base().tile
    }

    /// Cycle of the record, or 0 for kinds not keyed by cycle
    fn cycle(&self) -> u32 {
        match Self::ID_LAYOUT {
            IdLayout::Cycle => self.base().cycle,
            IdLayout::Tile | IdLayout::Read => 0,
        }
    }

    /// Read number of the record, or 0 for kinds not keyed by read
    fn read(&self) -> u32 {
        match Self::ID_LAYOUT {
            IdLayout::Read => self.base().cycle,
            IdLayout::Tile | IdLayout::Cycle => 0,
        }
    }

    fn id(&self) -> Id {
        let base = self.base();
        match Self::ID_LAYOUT {
            IdLayout::Tile => tile_id(base.lane, base.tile),
            IdLayout::Cycle | IdLayout::Read => cycle_id(base.lane, base.tile, base.cycle),
        }
    }

    fn tile_hash(&self) -> Id {
        tile_hash_from_id(self.id())
    }
}

/// Records that carry a running total across the cycles of a tile
pub trait Accumulate: Metric {
    /// Resets the running total to this record's own values
    fn accumulate_self(&mut self);

    /// Sets the running total to this record's own values plus `previous`'s running total
    fn accumulate_from(&mut self, previous: &Self);
}

/// Records holding a q-score histogram
pub trait QRecord: Metric<Header = QHeader> + AsRef<QMetric> + AsMut<QMetric> {}
