use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{Accumulate, IdLayout, Metric, MetricBase, QRecord};
use crate::constants::MetricKind;
use crate::error::{FormatError, Result, WriteError};
use crate::format::{
    read_header_byte, read_payload, read_record_size, write_id, write_record_size, Codec,
    FormatRegistry,
};
use crate::header::{bins_size, check_bins, read_bins, write_bins, QHeader, QScoreBin, MAX_Q_BINS};
use crate::utils::percent;

/// Q-score histogram of a tile at a given cycle
///
/// Slot `i` of an unbinned histogram counts bases with Q-score `i + 1`; a binned
/// histogram has one slot per bin of the set header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QMetric {
    base: MetricBase,
    histogram: Vec<u32>,
    cumulative: Vec<u64>,
}
impl QMetric {
    #[must_use]
    pub fn new(lane: u32, tile: u32, cycle: u32, histogram: Vec<u32>) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            histogram,
            cumulative: Vec::new(),
        }
    }

    #[must_use]
    pub fn histogram(&self) -> &[u32] {
        &self.histogram
    }

    /// Histogram summed over this and every earlier cycle of the tile
    ///
    /// Empty until the cumulative distribution of the set was populated.
    #[must_use]
    pub fn cumulative(&self) -> &[u64] {
        &self.cumulative
    }

    /// Number of histogram slots
    #[must_use]
    pub fn size(&self) -> usize {
        self.histogram.len()
    }

    /// Total number of bases counted
    #[must_use]
    pub fn sum_qscore(&self) -> u64 {
        self.histogram.iter().map(|&c| u64::from(c)).sum()
    }

    #[must_use]
    pub fn sum_qscore_cumulative(&self) -> u64 {
        self.cumulative.iter().sum()
    }

    /// Number of bases in histogram slot `index` and above
    #[must_use]
    pub fn total_over_qscore(&self, index: usize) -> u64 {
        self.histogram
            .iter()
            .skip(index)
            .map(|&c| u64::from(c))
            .sum()
    }

    #[must_use]
    pub fn total_over_qscore_cumulative(&self, index: usize) -> u64 {
        self.cumulative.iter().skip(index).sum()
    }

    /// Percentage of bases in slot `index` and above, NaN when nothing was counted
    #[must_use]
    pub fn percent_over_qscore(&self, index: usize) -> f32 {
        percent(self.total_over_qscore(index), self.sum_qscore())
    }

    #[must_use]
    pub fn percent_over_qscore_cumulative(&self, index: usize) -> f32 {
        percent(
            self.total_over_qscore_cumulative(index),
            self.sum_qscore_cumulative(),
        )
    }

    /// Median Q-score, `None` for an empty histogram
    ///
    /// For binned histograms the representative value of the median bin is returned.
    #[must_use]
    pub fn median(&self, bins: &[QScoreBin]) -> Option<u32> {
        let total = self.sum_qscore();
        if total == 0 {
            return None;
        }
        let position = if total % 2 == 0 {
            total / 2 + 1
        } else {
            total.div_ceil(2)
        };
        let mut running = 0u64;
        for (i, &count) in self.histogram.iter().enumerate() {
            running += u64::from(count);
            if running >= position {
                return Some(match bins.get(i) {
                    Some(bin) => u32::from(bin.value),
                    None => i as u32 + 1,
                });
            }
        }
        None
    }

    /// Rebuckets a full 50-slot histogram into `bins`
    ///
    /// Every bin receives the counts of the Q-scores in `lower..=upper`.
    pub fn compress(&mut self, bins: &[QScoreBin]) {
        if bins.is_empty() {
            return;
        }
        self.histogram = rebucket(&self.histogram, bins);
        if !self.cumulative.is_empty() {
            self.cumulative = rebucket(&self.cumulative, bins);
        }
    }

    /// Adds `other`'s histogram slot by slot
    pub fn accumulate_by_lane(&mut self, other: &QMetric) {
        if self.histogram.len() < other.histogram.len() {
            self.histogram.resize(other.histogram.len(), 0);
        }
        for (total, &count) in self.histogram.iter_mut().zip(&other.histogram) {
            *total = total.saturating_add(count);
        }
    }
}
impl Metric for QMetric {
    type Header = QHeader;
    const KIND: MetricKind = MetricKind::Q;
    const LATEST_VERSION: u8 = 6;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<QMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            FormatRegistry::new()
                .with(QV4::<QMetric>::new())
                .with(QV5::<QMetric>::new())
                .with(QV6::<QMetric>::new())
        })
    }
}
impl AsRef<QMetric> for QMetric {
    fn as_ref(&self) -> &QMetric {
        self
    }
}
impl AsMut<QMetric> for QMetric {
    fn as_mut(&mut self) -> &mut QMetric {
        self
    }
}
impl QRecord for QMetric {}
impl Accumulate for QMetric {
    fn accumulate_self(&mut self) {
        self.cumulative = self.histogram.iter().map(|&c| u64::from(c)).collect();
    }

    fn accumulate_from(&mut self, previous: &Self) {
        self.accumulate_self();
        if self.cumulative.len() < previous.cumulative.len() {
            self.cumulative.resize(previous.cumulative.len(), 0);
        }
        for (total, &prev) in self.cumulative.iter_mut().zip(&previous.cumulative) {
            *total += prev;
        }
    }
}

fn rebucket<T>(histogram: &[T], bins: &[QScoreBin]) -> Vec<T>
where
    T: Copy + Default + std::ops::AddAssign,
{
    bins.iter()
        .map(|bin| {
            let lower = usize::from(bin.lower.max(1));
            let upper = usize::from(bin.upper).min(histogram.len());
            let mut total = T::default();
            for q in lower..=upper {
                total += histogram[q - 1];
            }
            total
        })
        .collect()
}

fn read_histogram(reader: &mut dyn Read, slots: usize) -> Result<Vec<u32>> {
    let mut buffer = vec![0u8; 4 * slots];
    read_payload(reader, &mut buffer)?;
    let mut histogram = vec![0u32; slots];
    LittleEndian::read_u32_into(&buffer, &mut histogram);
    Ok(histogram)
}

fn write_histogram(writer: &mut dyn Write, histogram: &[u32], slots: usize) -> Result<()> {
    if histogram.len() > slots {
        return Err(WriteError::HistogramLength {
            expected: slots,
            got: histogram.len(),
        }
        .into());
    }
    for &count in histogram {
        writer.write_u32::<LittleEndian>(count)?;
    }
    for _ in histogram.len()..slots {
        writer.write_u32::<LittleEndian>(0)?;
    }
    Ok(())
}

/// Scatters a binned histogram back into the 50 slots of its representative values
fn expand_histogram(histogram: &[u32], bins: &[QScoreBin]) -> Result<Vec<u32>> {
    if bins.is_empty() || histogram.len() != bins.len() {
        return Ok(histogram.to_vec());
    }
    let mut full = vec![0u32; MAX_Q_BINS];
    for (bin, &count) in bins.iter().zip(histogram) {
        let slot = usize::from(bin.value)
            .checked_sub(1)
            .and_then(|slot| full.get_mut(slot))
            .ok_or(FormatError::InvalidBinValue(bin.value))?;
        *slot = count;
    }
    Ok(full)
}

/// Q-score metrics version 4
///
/// Payload: `histogram: [u32; 50]`; no bin table.
#[derive(Debug)]
pub struct QV4<M>(PhantomData<fn() -> M>);
impl<M> QV4<M> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}
impl<M> Default for QV4<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M: QRecord> Codec<M> for QV4<M> {
    fn version(&self) -> u8 {
        4
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut QHeader) -> Result<usize> {
        header.bins_mut().clear();
        read_record_size(reader, 6 + 4 * MAX_Q_BINS)
    }

    fn read_record(&self, reader: &mut dyn Read, metric: &mut M, _header: &QHeader, _is_new: bool) -> Result<usize> {
        metric.as_mut().histogram = read_histogram(reader, MAX_Q_BINS)?;
        Ok(4 * MAX_Q_BINS)
    }

    fn write_header(&self, writer: &mut dyn Write, header: &QHeader) -> Result<()> {
        check_bins(header.bins())?;
        write_record_size(writer, self.record_size(header))
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &M, header: &QHeader) -> Result<()> {
        write_id(writer, metric)?;
        let histogram = expand_histogram(metric.as_ref().histogram(), header.bins())?;
        write_histogram(writer, &histogram, MAX_Q_BINS)
    }

    fn record_size(&self, _header: &QHeader) -> usize {
        6 + 4 * MAX_Q_BINS
    }

    fn header_size(&self, _header: &QHeader) -> usize {
        2
    }
}

/// Q-score metrics version 5
///
/// Header adds the optional bin table; payload stays `histogram: [u32; 50]` and
/// binned histograms are read from the slots of the bins' representative values.
#[derive(Debug)]
pub struct QV5<M>(PhantomData<fn() -> M>);
impl<M> QV5<M> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}
impl<M> Default for QV5<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M: QRecord> Codec<M> for QV5<M> {
    fn version(&self) -> u8 {
        5
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut QHeader) -> Result<usize> {
        let record_size = read_record_size(reader, 6 + 4 * MAX_Q_BINS)?;
        read_bins(reader, header.bins_mut())?;
        Ok(record_size)
    }

    fn read_record(&self, reader: &mut dyn Read, metric: &mut M, header: &QHeader, _is_new: bool) -> Result<usize> {
        let full = read_histogram(reader, MAX_Q_BINS)?;
        metric.as_mut().histogram = if header.is_binned() {
            header
                .bins()
                .iter()
                .map(|bin| full[usize::from(bin.value) - 1])
                .collect()
        } else {
            full
        };
        Ok(4 * MAX_Q_BINS)
    }

    fn write_header(&self, writer: &mut dyn Write, header: &QHeader) -> Result<()> {
        write_record_size(writer, self.record_size(header))?;
        write_bins(writer, header.bins())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &M, header: &QHeader) -> Result<()> {
        write_id(writer, metric)?;
        let histogram = expand_histogram(metric.as_ref().histogram(), header.bins())?;
        write_histogram(writer, &histogram, MAX_Q_BINS)
    }

    fn record_size(&self, _header: &QHeader) -> usize {
        6 + 4 * MAX_Q_BINS
    }

    fn header_size(&self, header: &QHeader) -> usize {
        2 + bins_size(header.bins())
    }
}

/// Q-score metrics version 6
///
/// Same header as version 5; payload has one `u32` per bin (50 when unbinned).
#[derive(Debug)]
pub struct QV6<M>(PhantomData<fn() -> M>);
impl<M> QV6<M> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}
impl<M> Default for QV6<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M: QRecord> Codec<M> for QV6<M> {
    fn version(&self) -> u8 {
        6
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut QHeader) -> Result<usize> {
        let declared = usize::from(read_header_byte(reader)?);
        read_bins(reader, header.bins_mut())?;
        let layout = self.record_size(header);
        if declared != layout {
            return Err(FormatError::LayoutSizeMismatch { declared, layout }.into());
        }
        Ok(layout)
    }

    fn read_record(&self, reader: &mut dyn Read, metric: &mut M, header: &QHeader, _is_new: bool) -> Result<usize> {
        let slots = header.histogram_len();
        metric.as_mut().histogram = read_histogram(reader, slots)?;
        Ok(4 * slots)
    }

    fn write_header(&self, writer: &mut dyn Write, header: &QHeader) -> Result<()> {
        write_record_size(writer, self.record_size(header))?;
        write_bins(writer, header.bins())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &M, header: &QHeader) -> Result<()> {
        write_id(writer, metric)?;
        write_histogram(writer, metric.as_ref().histogram(), header.histogram_len())
    }

    fn record_size(&self, header: &QHeader) -> usize {
        6 + 4 * header.histogram_len()
    }

    fn header_size(&self, header: &QHeader) -> usize {
        2 + bins_size(header.bins())
    }
}
