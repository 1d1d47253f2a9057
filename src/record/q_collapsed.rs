use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{Accumulate, IdLayout, Metric, MetricBase};
use crate::constants::MetricKind;
use crate::error::{FormatError, Result};
use crate::format::{
    read_header_byte, read_payload, write_id, write_record_size, Codec, FormatRegistry,
};
use crate::header::{bins_size, read_bins, write_bins, QCollapsedHeader};
use crate::utils::percent;

/// Record size without the median field
const SIZE_WITHOUT_MEDIAN: usize = 6 + 3 * 4;

/// Record size with the median field
const SIZE_WITH_MEDIAN: usize = SIZE_WITHOUT_MEDIAN + 4;

/// Q20/Q30 summary of a tile at a given cycle
#[derive(Debug, Clone, PartialEq)]
pub struct QCollapsedMetric {
    base: MetricBase,
    q20: u32,
    q30: u32,
    total: u32,
    median_qscore: f32,
    cumulative_q20: u64,
    cumulative_q30: u64,
    cumulative_total: u64,
}
impl Default for QCollapsedMetric {
    fn default() -> Self {
        Self {
            base: MetricBase::default(),
            q20: 0,
            q30: 0,
            total: 0,
            median_qscore: f32::NAN,
            cumulative_q20: 0,
            cumulative_q30: 0,
            cumulative_total: 0,
        }
    }
}
impl QCollapsedMetric {
    #[must_use]
    pub fn new(lane: u32, tile: u32, cycle: u32, q20: u32, q30: u32, total: u32, median_qscore: f32) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            q20,
            q30,
            total,
            median_qscore,
            ..Self::default()
        }
    }

    /// Number of bases with Q-score 20 or above
    #[must_use]
    pub fn q20(&self) -> u32 {
        self.q20
    }

    /// Number of bases with Q-score 30 or above
    #[must_use]
    pub fn q30(&self) -> u32 {
        self.q30
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Median Q-score, NaN when unknown
    #[must_use]
    pub fn median_qscore(&self) -> f32 {
        self.median_qscore
    }

    #[must_use]
    pub fn cumulative_q20(&self) -> u64 {
        self.cumulative_q20
    }

    #[must_use]
    pub fn cumulative_q30(&self) -> u64 {
        self.cumulative_q30
    }

    #[must_use]
    pub fn cumulative_total(&self) -> u64 {
        self.cumulative_total
    }

    /// Percentage of bases at Q20 or above, NaN when nothing was counted
    #[must_use]
    pub fn percent_over_q20(&self) -> f32 {
        percent(u64::from(self.q20), u64::from(self.total))
    }

    #[must_use]
    pub fn percent_over_q30(&self) -> f32 {
        percent(u64::from(self.q30), u64::from(self.total))
    }

    #[must_use]
    pub fn cumulative_percent_over_q30(&self) -> f32 {
        percent(self.cumulative_q30, self.cumulative_total)
    }
}
impl Metric for QCollapsedMetric {
    type Header = QCollapsedHeader;
    const KIND: MetricKind = MetricKind::QCollapsed;
    const LATEST_VERSION: u8 = 6;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<QCollapsedMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            FormatRegistry::new()
                .with(QCollapsedV2::new(2))
                .with(QCollapsedV2::new(3))
                .with(QCollapsedV2::new(4))
                .with(QCollapsedV6::new(5))
                .with(QCollapsedV6::new(6))
        })
    }
}
impl Accumulate for QCollapsedMetric {
    fn accumulate_self(&mut self) {
        self.cumulative_q20 = u64::from(self.q20);
        self.cumulative_q30 = u64::from(self.q30);
        self.cumulative_total = u64::from(self.total);
    }

    fn accumulate_from(&mut self, previous: &Self) {
        self.cumulative_q20 = u64::from(self.q20) + previous.cumulative_q20;
        self.cumulative_q30 = u64::from(self.q30) + previous.cumulative_q30;
        self.cumulative_total = u64::from(self.total) + previous.cumulative_total;
    }
}

fn read_collapsed_size(reader: &mut dyn Read, header: &mut QCollapsedHeader) -> Result<usize> {
    let declared = read_header_byte(reader)?;
    match usize::from(declared) {
        SIZE_WITHOUT_MEDIAN | SIZE_WITH_MEDIAN => {
            header.record_size = declared;
            Ok(usize::from(declared))
        }
        other => Err(FormatError::LayoutSizeMismatch {
            declared: other,
            layout: SIZE_WITH_MEDIAN,
        }
        .into()),
    }
}

fn read_collapsed_record(reader: &mut dyn Read, metric: &mut QCollapsedMetric, header: &QCollapsedHeader) -> Result<usize> {
    let payload = usize::from(header.record_size).max(SIZE_WITHOUT_MEDIAN) - 6;
    let mut buffer = [0u8; SIZE_WITH_MEDIAN - 6];
    read_payload(reader, &mut buffer[..payload])?;
    metric.q20 = LittleEndian::read_u32(&buffer[0..4]);
    metric.q30 = LittleEndian::read_u32(&buffer[4..8]);
    metric.total = LittleEndian::read_u32(&buffer[8..12]);
    metric.median_qscore = if payload == SIZE_WITH_MEDIAN - 6 {
        LittleEndian::read_f32(&buffer[12..16])
    } else {
        f32::NAN
    };
    Ok(payload)
}

fn write_collapsed_record(writer: &mut dyn Write, metric: &QCollapsedMetric) -> Result<()> {
    write_id(writer, metric)?;
    writer.write_u32::<LittleEndian>(metric.q20)?;
    writer.write_u32::<LittleEndian>(metric.q30)?;
    writer.write_u32::<LittleEndian>(metric.total)?;
    writer.write_f32::<LittleEndian>(metric.median_qscore)?;
    Ok(())
}

/// Collapsed Q-score metrics versions 2, 3 and 4
///
/// Header: record size (18 without median, 22 with). Payload: `q20: u32`,
/// `q30: u32`, `total: u32`, optional `median: f32`. Always written with the median.
#[derive(Debug, Clone, Copy)]
pub struct QCollapsedV2 {
    version: u8,
}
impl QCollapsedV2 {
    /// Binds the layout to the version byte it is registered under
    #[must_use]
    pub const fn new(version: u8) -> Self {
        Self { version }
    }
}
impl Default for QCollapsedV2 {
    fn default() -> Self {
        Self::new(2)
    }
}
impl Codec<QCollapsedMetric> for QCollapsedV2 {
    fn version(&self) -> u8 {
        self.version
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut QCollapsedHeader) -> Result<usize> {
        header.bins.clear();
        read_collapsed_size(reader, header)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut QCollapsedMetric,
        header: &QCollapsedHeader,
        _is_new: bool,
    ) -> Result<usize> {
        read_collapsed_record(reader, metric, header)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &QCollapsedHeader) -> Result<()> {
        write_record_size(writer, SIZE_WITH_MEDIAN)?;
        Ok(())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &QCollapsedMetric, _header: &QCollapsedHeader) -> Result<()> {
        write_collapsed_record(writer, metric)
    }

    fn record_size(&self, _header: &QCollapsedHeader) -> usize {
        SIZE_WITH_MEDIAN
    }

    fn header_size(&self, _header: &QCollapsedHeader) -> usize {
        2
    }
}

/// Collapsed Q-score metrics versions 5 and 6
///
/// Same records as version 2; the header adds the optional q-score bin table.
#[derive(Debug, Clone, Copy)]
pub struct QCollapsedV6 {
    version: u8,
}
impl QCollapsedV6 {
    #[must_use]
    pub const fn new(version: u8) -> Self {
        Self { version }
    }
}
impl Default for QCollapsedV6 {
    fn default() -> Self {
        Self::new(6)
    }
}
impl Codec<QCollapsedMetric> for QCollapsedV6 {
    fn version(&self) -> u8 {
        self.version
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut QCollapsedHeader) -> Result<usize> {
        let record_size = read_collapsed_size(reader, header)?;
        read_bins(reader, &mut header.bins)?;
        Ok(record_size)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut QCollapsedMetric,
        header: &QCollapsedHeader,
        _is_new: bool,
    ) -> Result<usize> {
        read_collapsed_record(reader, metric, header)
    }

    fn write_header(&self, writer: &mut dyn Write, header: &QCollapsedHeader) -> Result<()> {
        write_record_size(writer, SIZE_WITH_MEDIAN)?;
        write_bins(writer, &header.bins)
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &QCollapsedMetric, _header: &QCollapsedHeader) -> Result<()> {
        write_collapsed_record(writer, metric)
    }

    fn record_size(&self, _header: &QCollapsedHeader) -> usize {
        SIZE_WITH_MEDIAN
    }

    fn header_size(&self, header: &QCollapsedHeader) -> usize {
        2 + bins_size(&header.bins)
    }
}
