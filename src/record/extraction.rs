use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase, NUM_OF_BASES};
use crate::constants::MetricKind;
use crate::error::Result;
use crate::format::{
    read_payload, read_record_size, write_id, write_record_size, Codec, FormatRegistry,
};
use crate::header::EmptyHeader;
use crate::utils::sentinel_to_nan;

/// Ticks (100ns) per second of a .NET `DateTime`
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Ticks between 0001-01-01 and the Unix epoch
const TICKS_TO_1970: u64 = 621_355_968_000_000_000;

/// Bits holding the `DateTime` kind flag above the tick count
const TICKS_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

/// Focus and peak intensity per channel of a tile at a given cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionMetric {
    base: MetricBase,
    focus_scores: [f32; NUM_OF_BASES],
    max_intensities: [u16; NUM_OF_BASES],
    date_time: u64,
}
impl ExtractionMetric {
    #[must_use]
    pub fn new(
        lane: u32,
        tile: u32,
        cycle: u32,
        focus_scores: [f32; NUM_OF_BASES],
        max_intensities: [u16; NUM_OF_BASES],
    ) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            focus_scores,
            max_intensities,
            date_time: 0,
        }
    }

    /// Sets the raw .NET `DateTime` value
    #[must_use]
    pub fn with_date_time(mut self, date_time: u64) -> Self {
        self.date_time = date_time;
        self
    }

    #[must_use]
    pub fn focus_scores(&self) -> &[f32; NUM_OF_BASES] {
        &self.focus_scores
    }

    #[must_use]
    pub fn max_intensities(&self) -> &[u16; NUM_OF_BASES] {
        &self.max_intensities
    }

    /// Max intensity of `channel` as a float, NaN when the channel was not imaged
    #[must_use]
    pub fn max_intensity(&self, channel: usize) -> f32 {
        self.max_intensities
            .get(channel)
            .map_or(f32::NAN, |&value| sentinel_to_nan(value, u16::MAX))
    }

    /// Raw .NET `DateTime` value as stored on disk
    #[must_use]
    pub fn date_time_raw(&self) -> u64 {
        self.date_time
    }

    /// Extraction time in seconds since the Unix epoch, 0 when unset or earlier
    #[must_use]
    pub fn date_time(&self) -> u64 {
        (self.date_time & TICKS_MASK).saturating_sub(TICKS_TO_1970) / TICKS_PER_SECOND
    }
}
impl Metric for ExtractionMetric {
    type Header = EmptyHeader;
    const KIND: MetricKind = MetricKind::Extraction;
    const LATEST_VERSION: u8 = 2;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<ExtractionMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(ExtractionV2))
    }
}

/// Extraction metrics version 2
///
/// Payload: `focus: [f32; 4]`, `max_intensity: [u16; 4]`, `date_time: u64`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionV2;
impl ExtractionV2 {
    const PAYLOAD_SIZE: usize = 4 * NUM_OF_BASES + 2 * NUM_OF_BASES + 8;
    const RECORD_SIZE: usize = 6 + Self::PAYLOAD_SIZE;
}
impl Codec<ExtractionMetric> for ExtractionV2 {
    fn version(&self) -> u8 {
        2
    }

    fn read_header(&self, reader: &mut dyn Read, _header: &mut EmptyHeader) -> Result<usize> {
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut ExtractionMetric,
        _header: &EmptyHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        LittleEndian::read_f32_into(&buffer[0..16], &mut metric.focus_scores);
        LittleEndian::read_u16_into(&buffer[16..24], &mut metric.max_intensities);
        metric.date_time = LittleEndian::read_u64(&buffer[24..32]);
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &EmptyHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(
        &self,
        writer: &mut dyn Write,
        metric: &ExtractionMetric,
        _header: &EmptyHeader,
    ) -> Result<()> {
        write_id(writer, metric)?;
        for focus in metric.focus_scores {
            writer.write_f32::<LittleEndian>(focus)?;
        }
        for intensity in metric.max_intensities {
            writer.write_u16::<LittleEndian>(intensity)?;
        }
        writer.write_u64::<LittleEndian>(metric.date_time)?;
        Ok(())
    }

    fn record_size(&self, _header: &EmptyHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &EmptyHeader) -> usize {
        2
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{read_metrics, write_metrics, MetricSet};
    use anyhow::Result;

    #[test]
    fn test_extraction_v2_roundtrip() -> Result<()> {
        let mut metrics = MetricSet::<ExtractionMetric>::new(2);
        metrics.insert(
            ExtractionMetric::new(1, 1101, 1, [2.5, 2.6, 2.4, 2.7], [4120, 3985, 4411, 3620])
                .with_date_time(TICKS_TO_1970 + 42 * TICKS_PER_SECOND),
        );

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        assert_eq!(buffer[1], 38);

        let mut decoded = MetricSet::<ExtractionMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        let metric = decoded.at(0).unwrap();
        assert_eq!(metric, metrics.at(0).unwrap());
        assert_eq!(metric.date_time(), 42);
        Ok(())
    }

    #[test]
    fn test_max_intensity_sentinel() {
        let metric = ExtractionMetric::new(1, 1, 1, [0.0; 4], [100, u16::MAX, 0, 7]);
        assert!((metric.max_intensity(0) - 100.0).abs() < f32::EPSILON);
        assert!(metric.max_intensity(1).is_nan());
        assert!(metric.max_intensity(9).is_nan());
    }
}
