use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase, NUM_OF_BASES, NUM_OF_BASES_AND_NC};
use crate::constants::MetricKind;
use crate::error::Result;
use crate::format::{
    read_payload, read_record_size, write_id, write_record_size, Codec, FormatRegistry,
};
use crate::header::EmptyHeader;

/// Phasing-corrected intensities and base-call counts of a tile at a given cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedIntensityMetric {
    base: MetricBase,
    average_cycle_intensity: u16,
    corrected_int_all: [u16; NUM_OF_BASES],
    corrected_int_called: [u16; NUM_OF_BASES],
    called_counts: [u32; NUM_OF_BASES_AND_NC],
    signal_to_noise: f32,
}
impl Default for CorrectedIntensityMetric {
    fn default() -> Self {
        Self {
            base: MetricBase::default(),
            average_cycle_intensity: 0,
            corrected_int_all: [0; NUM_OF_BASES],
            corrected_int_called: [0; NUM_OF_BASES],
            called_counts: [0; NUM_OF_BASES_AND_NC],
            signal_to_noise: f32::NAN,
        }
    }
}
impl CorrectedIntensityMetric {
    /// Creates a record with the fields shared by every version
    ///
    /// `called_counts` holds the no-call count first, followed by A, C, G and T.
    #[must_use]
    pub fn new(
        lane: u32,
        tile: u32,
        cycle: u32,
        corrected_int_called: [u16; NUM_OF_BASES],
        called_counts: [u32; NUM_OF_BASES_AND_NC],
    ) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            corrected_int_called,
            called_counts,
            ..Self::default()
        }
    }

    /// Adds the fields only stored by version 2
    #[must_use]
    pub fn with_legacy_fields(
        mut self,
        average_cycle_intensity: u16,
        corrected_int_all: [u16; NUM_OF_BASES],
        signal_to_noise: f32,
    ) -> Self {
        self.average_cycle_intensity = average_cycle_intensity;
        self.corrected_int_all = corrected_int_all;
        self.signal_to_noise = signal_to_noise;
        self
    }

    #[must_use]
    pub fn average_cycle_intensity(&self) -> u16 {
        self.average_cycle_intensity
    }

    #[must_use]
    pub fn corrected_int_all(&self) -> &[u16; NUM_OF_BASES] {
        &self.corrected_int_all
    }

    #[must_use]
    pub fn corrected_int_called(&self) -> &[u16; NUM_OF_BASES] {
        &self.corrected_int_called
    }

    #[must_use]
    pub fn called_counts(&self) -> &[u32; NUM_OF_BASES_AND_NC] {
        &self.called_counts
    }

    #[must_use]
    pub fn signal_to_noise(&self) -> f32 {
        self.signal_to_noise
    }

    /// Number of clusters called (A, C, G or T, excluding no-calls)
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.called_counts[1..].iter().map(|&c| u64::from(c)).sum()
    }

    /// Percentage of clusters with a no-call, NaN when nothing was counted
    #[must_use]
    pub fn percent_nocall(&self) -> f32 {
        let total = self.total_calls() + u64::from(self.called_counts[0]);
        if total == 0 {
            return f32::NAN;
        }
        (self.called_counts[0] as f32) / (total as f32) * 100.0
    }
}
impl Metric for CorrectedIntensityMetric {
    type Header = EmptyHeader;
    const KIND: MetricKind = MetricKind::CorrectedIntensity;
    const LATEST_VERSION: u8 = 3;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<CorrectedIntensityMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            FormatRegistry::new()
                .with(CorrectedIntensityV2)
                .with(CorrectedIntensityV3)
        })
    }
}

fn write_called_counts(writer: &mut dyn Write, counts: &[u32; NUM_OF_BASES_AND_NC]) -> Result<()> {
    for count in counts {
        writer.write_u32::<LittleEndian>(*count)?;
    }
    Ok(())
}

fn write_u16s(writer: &mut dyn Write, values: &[u16; NUM_OF_BASES]) -> Result<()> {
    for value in values {
        writer.write_u16::<LittleEndian>(*value)?;
    }
    Ok(())
}

/// Corrected intensity metrics version 2
///
/// Payload: `average: u16`, `corrected_all: [u16; 4]`, `corrected_called: [u16; 4]`,
/// `called_counts: [u32; 5]`, `signal_to_noise: f32`
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectedIntensityV2;
impl CorrectedIntensityV2 {
    const PAYLOAD_SIZE: usize = 2 + 2 * NUM_OF_BASES * 2 + 4 * NUM_OF_BASES_AND_NC + 4;
    const RECORD_SIZE: usize = 6 + Self::PAYLOAD_SIZE;
}
impl Codec<CorrectedIntensityMetric> for CorrectedIntensityV2 {
    fn version(&self) -> u8 {
        2
    }

    fn read_header(&self, reader: &mut dyn Read, _header: &mut EmptyHeader) -> Result<usize> {
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut CorrectedIntensityMetric,
        _header: &EmptyHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        metric.average_cycle_intensity = LittleEndian::read_u16(&buffer[0..2]);
        LittleEndian::read_u16_into(&buffer[2..10], &mut metric.corrected_int_all);
        LittleEndian::read_u16_into(&buffer[10..18], &mut metric.corrected_int_called);
        LittleEndian::read_u32_into(&buffer[18..38], &mut metric.called_counts);
        metric.signal_to_noise = LittleEndian::read_f32(&buffer[38..42]);
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &EmptyHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(
        &self,
        writer: &mut dyn Write,
        metric: &CorrectedIntensityMetric,
        _header: &EmptyHeader,
    ) -> Result<()> {
        write_id(writer, metric)?;
        writer.write_u16::<LittleEndian>(metric.average_cycle_intensity)?;
        write_u16s(writer, &metric.corrected_int_all)?;
        write_u16s(writer, &metric.corrected_int_called)?;
        write_called_counts(writer, &metric.called_counts)?;
        writer.write_f32::<LittleEndian>(metric.signal_to_noise)?;
        Ok(())
    }

    fn record_size(&self, _header: &EmptyHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &EmptyHeader) -> usize {
        2
    }
}

/// Corrected intensity metrics version 3
///
/// Payload: `corrected_called: [u16; 4]`, `called_counts: [u32; 5]`
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectedIntensityV3;
impl CorrectedIntensityV3 {
    const PAYLOAD_SIZE: usize = 2 * NUM_OF_BASES + 4 * NUM_OF_BASES_AND_NC;
    const RECORD_SIZE: usize = 6 + Self::PAYLOAD_SIZE;
}
impl Codec<CorrectedIntensityMetric> for CorrectedIntensityV3 {
    fn version(&self) -> u8 {
        3
    }

    fn read_header(&self, reader: &mut dyn Read, _header: &mut EmptyHeader) -> Result<usize> {
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut CorrectedIntensityMetric,
        _header: &EmptyHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        LittleEndian::read_u16_into(&buffer[0..8], &mut metric.corrected_int_called);
        LittleEndian::read_u32_into(&buffer[8..28], &mut metric.called_counts);
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &EmptyHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(
        &self,
        writer: &mut dyn Write,
        metric: &CorrectedIntensityMetric,
        _header: &EmptyHeader,
    ) -> Result<()> {
        write_id(writer, metric)?;
        write_u16s(writer, &metric.corrected_int_called)?;
        write_called_counts(writer, &metric.called_counts)?;
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

    fn sample() -> CorrectedIntensityMetric {
        CorrectedIntensityMetric::new(2, 1204, 5, [310, 290, 402, 377], [12, 4010, 3920, 4101, 3877])
            .with_legacy_fields(1420, [1010, 998, 1302, 1211], 14.5)
    }

    #[test]
    fn test_corrected_intensity_v2_roundtrip() -> Result<()> {
        let mut metrics = MetricSet::<CorrectedIntensityMetric>::new(2);
        metrics.insert(sample());

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        assert_eq!(buffer.len(), 2 + 48);

        let mut decoded = MetricSet::<CorrectedIntensityMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        assert_eq!(decoded.at(0), metrics.at(0));
        Ok(())
    }

    #[test]
    fn test_corrected_intensity_v3_drops_legacy_fields() -> Result<()> {
        let mut metrics = MetricSet::<CorrectedIntensityMetric>::new(3);
        metrics.insert(sample());

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        assert_eq!(buffer.len(), 2 + 34);

        let mut decoded = MetricSet::<CorrectedIntensityMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        let metric = decoded.at(0).unwrap();
        assert_eq!(metric.corrected_int_called(), &[310, 290, 402, 377]);
        assert_eq!(metric.called_counts(), &[12, 4010, 3920, 4101, 3877]);
        assert_eq!(metric.average_cycle_intensity(), 0);
        assert!(metric.signal_to_noise().is_nan());
        Ok(())
    }

    #[test]
    fn test_percent_nocall() {
        let metric = CorrectedIntensityMetric::new(1, 1, 1, [0; 4], [10, 30, 30, 20, 10]);
        assert_eq!(metric.total_calls(), 90);
        assert!((metric.percent_nocall() - 10.0).abs() < 1e-5);
        let empty = CorrectedIntensityMetric::default();
        assert!(empty.percent_nocall().is_nan());
    }
}
