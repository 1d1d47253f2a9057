use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase};
use crate::constants::MetricKind;
use crate::error::Result;
use crate::format::{
    read_payload, read_string, string_size, write_id, write_string, Codec, FormatRegistry,
};
use crate::header::IndexHeader;

/// Demultiplexing count of one sample index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexInfo {
    index_seq: String,
    sample_id: String,
    sample_proj: String,
    count: u64,
}
impl IndexInfo {
    #[must_use]
    pub fn new(
        index_seq: impl Into<String>,
        sample_id: impl Into<String>,
        sample_proj: impl Into<String>,
        count: u64,
    ) -> Self {
        Self {
            index_seq: index_seq.into(),
            sample_id: sample_id.into(),
            sample_proj: sample_proj.into(),
            count,
        }
    }

    #[must_use]
    pub fn index_seq(&self) -> &str {
        &self.index_seq
    }

    #[must_use]
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    #[must_use]
    pub fn sample_proj(&self) -> &str {
        &self.sample_proj
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Key identifying the sample across tiles: `index-sample-project`
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}-{}-{}", self.index_seq, self.sample_id, self.sample_proj)
    }
}

/// Index counts of a tile for a given read
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetric {
    base: MetricBase,
    indices: Vec<IndexInfo>,
    cluster_count: f32,
    cluster_count_pf: f32,
}
impl Default for IndexMetric {
    fn default() -> Self {
        Self {
            base: MetricBase::default(),
            indices: Vec::new(),
            cluster_count: f32::NAN,
            cluster_count_pf: f32::NAN,
        }
    }
}
impl IndexMetric {
    #[must_use]
    pub fn new(lane: u32, tile: u32, read: u32, indices: Vec<IndexInfo>) -> Self {
        Self {
            base: MetricBase::new(lane, tile, read),
            indices,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn indices(&self) -> &[IndexInfo] {
        &self.indices
    }

    /// Cluster count of the tile, NaN until populated from tile metrics
    #[must_use]
    pub fn cluster_count(&self) -> f32 {
        self.cluster_count
    }

    #[must_use]
    pub fn cluster_count_pf(&self) -> f32 {
        self.cluster_count_pf
    }

    pub fn set_cluster_counts(&mut self, cluster_count: f32, cluster_count_pf: f32) {
        self.cluster_count = cluster_count;
        self.cluster_count_pf = cluster_count_pf;
    }

    /// Adds `info` to the record, summing counts of an index already present
    pub fn merge(&mut self, info: IndexInfo) {
        match self
            .indices
            .iter_mut()
            .find(|existing| existing.index_seq == info.index_seq)
        {
            Some(existing) => existing.count += info.count,
            None => self.indices.push(info),
        }
    }
}
impl Metric for IndexMetric {
    type Header = IndexHeader;
    const KIND: MetricKind = MetricKind::Index;
    const LATEST_VERSION: u8 = 1;
    const ID_LAYOUT: IdLayout = IdLayout::Read;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<IndexMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(IndexV1))
    }
}

/// Index metrics version 1
///
/// There is no record-size byte: each on-disk record is variable length,
/// `index_seq: str`, `count: u32`, `sample_id: str`, `sample_proj: str`, with
/// strings prefixed by a `u16` length. Records of the same identity are merged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexV1;
impl IndexV1 {
    /// Nominal record size; the payload length check only sees this one byte
    const RECORD_SIZE: usize = 6 + 1;
}
impl Codec<IndexMetric> for IndexV1 {
    fn version(&self) -> u8 {
        1
    }

    fn read_header(&self, _reader: &mut dyn Read, _header: &mut IndexHeader) -> Result<usize> {
        Ok(Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut IndexMetric,
        _header: &IndexHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let (index_seq, _) = read_string(reader)?;
        let mut count = [0u8; 4];
        read_payload(reader, &mut count)?;
        let count = u64::from(LittleEndian::read_u32(&count));
        let (sample_id, _) = read_string(reader)?;
        let (sample_proj, _) = read_string(reader)?;
        metric.merge(IndexInfo {
            index_seq,
            sample_id,
            sample_proj,
            count,
        });
        Ok(Self::RECORD_SIZE - 6)
    }

    fn write_header(&self, _writer: &mut dyn Write, _header: &IndexHeader) -> Result<()> {
        Ok(())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &IndexMetric, _header: &IndexHeader) -> Result<()> {
        for info in &metric.indices {
            write_id(writer, metric)?;
            write_string(writer, &info.index_seq)?;
            writer.write_u32::<LittleEndian>(u32::try_from(info.count).unwrap_or(u32::MAX))?;
            write_string(writer, &info.sample_id)?;
            write_string(writer, &info.sample_proj)?;
        }
        Ok(())
    }

    fn record_size(&self, _header: &IndexHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &IndexHeader) -> usize {
        1
    }

    fn encoded_size(&self, metric: &IndexMetric, _header: &IndexHeader) -> usize {
        metric
            .indices
            .iter()
            .map(|info| {
                6 + string_size(&info.index_seq)
                    + 4
                    + string_size(&info.sample_id)
                    + string_size(&info.sample_proj)
            })
            .sum()
    }
}
