//! Identity-indexed container of metric records
//!
//! A [`MetricSet`] keeps records in insertion order, which is the order they are
//! encoded in, and an index from packed identity to position for O(1) lookup.

use std::collections::HashMap;
use std::ops::Index;

use crate::error::{MetricError, Result};
use crate::id::{cycle_id, tile_id, Id};
use crate::record::{IdLayout, Metric};

/// Ordered collection of records of one metric kind, plus the file header
#[derive(Debug, Clone)]
pub struct MetricSet<M: Metric> {
    /// Header read from (or written to) the file
    header: M::Header,

    /// On-disk version the set was read from, and is written with by default
    version: u8,

    /// Records in insertion order
    metrics: Vec<M>,

    /// Identity to position in `metrics`
    index: HashMap<Id, usize>,

    /// Highest cycle of any inserted record
    max_cycle: u32,
}
impl<M: Metric> Default for MetricSet<M> {
    fn default() -> Self {
        Self::new(M::LATEST_VERSION)
    }
}
impl<M: Metric> MetricSet<M> {
    /// Creates an empty set with a default header
    #[must_use]
    pub fn new(version: u8) -> Self {
        Self::with_header(M::Header::default(), version)
    }

    /// Creates an empty set with the given header
    #[must_use]
    pub fn with_header(header: M::Header, version: u8) -> Self {
        Self {
            header,
            version,
            metrics: Vec::new(),
            index: HashMap::new(),
            max_cycle: 0,
        }
    }

    /// Creates a set from records, later duplicates replacing earlier ones
    #[must_use]
    pub fn from_metrics(metrics: impl IntoIterator<Item = M>, header: M::Header, version: u8) -> Self {
        let mut set = Self::with_header(header, version);
        for metric in metrics {
            set.insert(metric);
        }
        set
    }

    /// Moves every record of `other` into this set
    ///
    /// Records whose identity is already present replace the stored record in
    /// place. The header and version of `other` replace those of this set.
    pub fn merge(&mut self, other: MetricSet<M>) {
        let MetricSet {
            header,
            version,
            metrics,
            ..
        } = other;
        self.header = header;
        self.version = version;
        for metric in metrics {
            self.insert(metric);
        }
    }

    /// Inserts a record under its own identity
    ///
    /// If a record with the same identity exists it is overwritten in place and
    /// keeps its position; otherwise the record is appended.
    ///
    /// # Returns
    ///
    /// The position of the record
    pub fn insert(&mut self, metric: M) -> usize {
        let id = metric.id();
        self.insert_with_id(id, metric)
    }

    /// Inserts a record under an explicit identity
    pub fn insert_with_id(&mut self, id: Id, metric: M) -> usize {
        self.max_cycle = self.max_cycle.max(metric.cycle());
        if let Some(&position) = self.index.get(&id) {
            self.metrics[position] = metric;
            return position;
        }
        let position = self.metrics.len();
        self.metrics.push(metric);
        self.index.insert(id, position);
        position
    }

    /// Position of the record with identity `id`
    #[must_use]
    pub fn find(&self, id: Id) -> Option<usize> {
        self.index.get(&id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.index.contains_key(&id)
    }

    /// Whether a record exists for the given coordinates
    ///
    /// Tile-keyed kinds ignore `cycle`; read-keyed kinds interpret it as the read.
    #[must_use]
    pub fn has_metric(&self, lane: u32, tile: u32, cycle: u32) -> bool {
        self.contains(Self::key(lane, tile, cycle))
    }

    /// Record for the given coordinates
    pub fn get_metric(&self, lane: u32, tile: u32, cycle: u32) -> Result<&M> {
        self.find(Self::key(lane, tile, cycle))
            .map(|position| &self.metrics[position])
            .ok_or_else(|| MetricError::IndexOutOfBounds { lane, tile, cycle }.into())
    }

    /// Record at `position` in insertion order
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&M> {
        self.metrics.get(position)
    }

    /// Mutable record at `position`
    ///
    /// The identity of the record must not be changed through this reference.
    pub fn at_mut(&mut self, position: usize) -> Option<&mut M> {
        self.metrics.get_mut(position)
    }

    #[must_use]
    pub fn metrics(&self) -> &[M] {
        &self.metrics
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.metrics.iter()
    }

    /// Mutable iteration; identities must not be changed
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, M> {
        self.metrics.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Removes all records, keeping header and version
    pub fn clear(&mut self) {
        self.metrics.clear();
        self.index.clear();
        self.max_cycle = 0;
    }

    /// Drops the identity index without touching the records
    ///
    /// Lookups find nothing until [`MetricSet::rebuild_index`] is called.
    pub fn clear_index(&mut self) {
        self.index.clear();
    }

    /// Rebuilds the identity index from the current record order
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, metric) in self.metrics.iter().enumerate() {
            self.index.insert(metric.id(), position);
        }
    }

    /// Stable sort of the records by cycle, then re-index
    pub fn sort_by_cycle(&mut self) {
        self.metrics.sort_by_key(M::cycle);
        self.clear_index();
        self.rebuild_index();
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn set_version(&mut self, version: u8) {
        self.version = version;
    }

    #[must_use]
    pub fn header(&self) -> &M::Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut M::Header {
        &mut self.header
    }

    pub fn set_header(&mut self, header: M::Header) {
        self.header = header;
    }

    /// Highest cycle of any record, 0 for kinds not keyed by cycle
    #[must_use]
    pub fn max_cycle(&self) -> u32 {
        self.max_cycle
    }

    /// File name stem of the kind, e.g. `Q2030`
    #[must_use]
    pub fn name(&self) -> String {
        M::KIND.to_string()
    }

    /// Identities of every record in insertion order
    #[must_use]
    pub fn keys(&self) -> Vec<Id> {
        self.metrics.iter().map(M::id).collect()
    }

    /// Sorted distinct lanes
    #[must_use]
    pub fn lanes(&self) -> Vec<u32> {
        let mut lanes: Vec<u32> = self.metrics.iter().map(M::lane).collect();
        lanes.sort_unstable();
        lanes.dedup();
        lanes
    }

    /// Sorted distinct tiles of `lane`
    #[must_use]
    pub fn tile_numbers_for_lane(&self, lane: u32) -> Vec<u32> {
        let mut tiles: Vec<u32> = self
            .metrics
            .iter()
            .filter(|metric| metric.lane() == lane)
            .map(M::tile)
            .collect();
        tiles.sort_unstable();
        tiles.dedup();
        tiles
    }

    /// Records of `lane` in insertion order
    pub fn metrics_for_lane(&self, lane: u32) -> impl Iterator<Item = &M> + '_ {
        self.metrics.iter().filter(move |metric| metric.lane() == lane)
    }

    /// Records of `cycle` in insertion order
    pub fn metrics_for_cycle(&self, cycle: u32) -> impl Iterator<Item = &M> + '_ {
        self.metrics.iter().filter(move |metric| metric.cycle() == cycle)
    }

    /// Header and record at `position`, borrowed together for in-place decoding
    pub(crate) fn split_at_position(&mut self, position: usize) -> (&M::Header, &mut M) {
        (&self.header, &mut self.metrics[position])
    }

    /// Records as a mutable slice; identities must not be changed
    pub(crate) fn metrics_mut(&mut self) -> &mut [M] {
        &mut self.metrics
    }

    fn key(lane: u32, tile: u32, cycle: u32) -> Id {
        match M::ID_LAYOUT {
            IdLayout::Tile => tile_id(lane, tile),
            IdLayout::Cycle | IdLayout::Read => cycle_id(lane, tile, cycle),
        }
    }
}
impl<M: Metric> Index<usize> for MetricSet<M> {
    type Output = M;

    fn index(&self, position: usize) -> &M {
        &self.metrics[position]
    }
}
impl<'a, M: Metric> IntoIterator for &'a MetricSet<M> {
    type Item = &'a M;
    type IntoIter = std::slice::Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.iter()
    }
}
