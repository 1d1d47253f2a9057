use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase};
use crate::constants::MetricKind;
use crate::error::{FormatError, Result};
use crate::format::{
    read_payload, read_record_size, write_id, write_record_size, Codec, FormatRegistry,
};
use crate::header::EmptyHeader;

const CLUSTER_DENSITY: u16 = 100;
const CLUSTER_DENSITY_PF: u16 = 101;
const CLUSTER_COUNT: u16 = 102;
const CLUSTER_COUNT_PF: u16 = 103;
const PHASING: u16 = 200;
const PERCENT_ALIGNED: u16 = 300;
const CONTROL_LANE: u16 = 400;

/// Per-read statistics of a tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadMetric {
    pub read: u32,
    pub percent_aligned: f32,
    pub percent_phasing: f32,
    pub percent_prephasing: f32,
}
impl ReadMetric {
    #[must_use]
    pub fn new(read: u32, percent_aligned: f32, percent_phasing: f32, percent_prephasing: f32) -> Self {
        Self {
            read,
            percent_aligned,
            percent_phasing,
            percent_prephasing,
        }
    }

    fn empty(read: u32) -> Self {
        Self::new(read, f32::NAN, f32::NAN, f32::NAN)
    }
}

/// Cluster density and count statistics of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetric {
    base: MetricBase,
    cluster_density: f32,
    cluster_density_pf: f32,
    cluster_count: f32,
    cluster_count_pf: f32,
    read_metrics: Vec<ReadMetric>,
}
impl Default for TileMetric {
    fn default() -> Self {
        Self {
            base: MetricBase::default(),
            cluster_density: f32::NAN,
            cluster_density_pf: f32::NAN,
            cluster_count: f32::NAN,
            cluster_count_pf: f32::NAN,
            read_metrics: Vec::new(),
        }
    }
}
impl TileMetric {
    #[must_use]
    pub fn new(
        lane: u32,
        tile: u32,
        cluster_density: f32,
        cluster_density_pf: f32,
        cluster_count: f32,
        cluster_count_pf: f32,
    ) -> Self {
        Self {
            base: MetricBase::new(lane, tile, 0),
            cluster_density,
            cluster_density_pf,
            cluster_count,
            cluster_count_pf,
            read_metrics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_read_metrics(mut self, read_metrics: Vec<ReadMetric>) -> Self {
        self.read_metrics = read_metrics;
        self
    }

    #[must_use]
    pub fn cluster_density(&self) -> f32 {
        self.cluster_density
    }

    #[must_use]
    pub fn cluster_density_pf(&self) -> f32 {
        self.cluster_density_pf
    }

    #[must_use]
    pub fn cluster_count(&self) -> f32 {
        self.cluster_count
    }

    #[must_use]
    pub fn cluster_count_pf(&self) -> f32 {
        self.cluster_count_pf
    }

    #[must_use]
    pub fn read_metrics(&self) -> &[ReadMetric] {
        &self.read_metrics
    }

    /// Statistics of read `read` (1-based), if recorded
    #[must_use]
    pub fn read_metric(&self, read: u32) -> Option<&ReadMetric> {
        self.read_metrics.iter().find(|metric| metric.read == read)
    }

    fn read_metric_mut(&mut self, read: u32) -> &mut ReadMetric {
        let position = match self.read_metrics.iter().position(|metric| metric.read == read) {
            Some(position) => position,
            None => {
                self.read_metrics.push(ReadMetric::empty(read));
                self.read_metrics.len() - 1
            }
        };
        &mut self.read_metrics[position]
    }
}
impl Metric for TileMetric {
    type Header = EmptyHeader;
    const KIND: MetricKind = MetricKind::Tile;
    const LATEST_VERSION: u8 = 2;
    const ID_LAYOUT: IdLayout = IdLayout::Tile;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<TileMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(TileV2))
    }
}

/// Tile metrics version 2
///
/// Every on-disk record holds one coded value: `code: u16`, `value: f32`.
/// Records of the same tile update the same metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileV2;
impl TileV2 {
    const PAYLOAD_SIZE: usize = 2 + 4;
    const RECORD_SIZE: usize = 4 + Self::PAYLOAD_SIZE;

    fn write_code(writer: &mut dyn Write, metric: &TileMetric, code: u16, value: f32) -> Result<()> {
        write_id(writer, metric)?;
        writer.write_u16::<LittleEndian>(code)?;
        writer.write_f32::<LittleEndian>(value)?;
        Ok(())
    }

    fn tile_values(metric: &TileMetric) -> [(u16, f32); 4] {
        [
            (CLUSTER_DENSITY, metric.cluster_density),
            (CLUSTER_DENSITY_PF, metric.cluster_density_pf),
            (CLUSTER_COUNT, metric.cluster_count),
            (CLUSTER_COUNT_PF, metric.cluster_count_pf),
        ]
    }
}
impl Codec<TileMetric> for TileV2 {
    fn version(&self) -> u8 {
        2
    }

    fn read_header(&self, reader: &mut dyn Read, _header: &mut EmptyHeader) -> Result<usize> {
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut TileMetric,
        _header: &EmptyHeader,
        is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        let code = LittleEndian::read_u16(&buffer[0..2]);
        let mut value = LittleEndian::read_f32(&buffer[2..6]);
        if value.is_nan() {
            value = 0.0;
        }
        match code {
            CLUSTER_DENSITY => metric.cluster_density = value,
            CLUSTER_DENSITY_PF => metric.cluster_density_pf = value,
            CLUSTER_COUNT => metric.cluster_count = value,
            CLUSTER_COUNT_PF => metric.cluster_count_pf = value,
            CONTROL_LANE => {
                if is_new {
                    *metric.base_mut() = MetricBase::default();
                }
            }
            // Per-read codes repeat every 200 (phasing) or 300 (aligned) codes.
            code if code % PHASING < 100 => {
                let offset = code % PHASING;
                let read = metric.read_metric_mut(u32::from(offset / 2) + 1);
                if offset % 2 == 0 {
                    read.percent_phasing = value * 100.0;
                } else {
                    read.percent_prephasing = value * 100.0;
                }
            }
            code if code % PERCENT_ALIGNED < 100 => {
                let read = metric.read_metric_mut(u32::from(code % PERCENT_ALIGNED) + 1);
                read.percent_aligned = value;
            }
            _ => return Err(FormatError::UnexpectedTileCode(code).into()),
        }
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &EmptyHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &TileMetric, _header: &EmptyHeader) -> Result<()> {
        for (code, value) in Self::tile_values(metric) {
            if !value.is_nan() {
                Self::write_code(writer, metric, code, value)?;
            }
        }
        for read in &metric.read_metrics {
            let offset = (read.read.saturating_sub(1)) as u16;
            Self::write_code(writer, metric, PHASING + 2 * offset + 1, read.percent_prephasing / 100.0)?;
            Self::write_code(writer, metric, PHASING + 2 * offset, read.percent_phasing / 100.0)?;
            Self::write_code(writer, metric, PERCENT_ALIGNED + offset, read.percent_aligned)?;
        }
        Ok(())
    }

    fn record_size(&self, _header: &EmptyHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &EmptyHeader) -> usize {
        2
    }

    fn encoded_size(&self, metric: &TileMetric, _header: &EmptyHeader) -> usize {
        let values = Self::tile_values(metric)
            .iter()
            .filter(|(_, value)| !value.is_nan())
            .count();
        (values + 3 * metric.read_metrics.len()) * Self::RECORD_SIZE
    }
}
