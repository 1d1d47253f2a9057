use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase};
use crate::constants::MetricKind;
use crate::error::Result;
use crate::format::{
    read_payload, read_record_size, write_id, write_record_size, Codec, FormatRegistry,
};
use crate::header::EmptyHeader;

/// Number of mismatch buckets (0 through 4 mismatches)
pub const MAX_MISMATCH: usize = 5;

/// Alignment error rate of a tile at a given cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorMetric {
    base: MetricBase,
    error_rate: f32,
    mismatch_counts: [u32; MAX_MISMATCH],
}
impl ErrorMetric {
    #[must_use]
    pub fn new(lane: u32, tile: u32, cycle: u32, error_rate: f32) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            error_rate,
            mismatch_counts: [0; MAX_MISMATCH],
        }
    }

    #[must_use]
    pub fn with_mismatch_counts(mut self, mismatch_counts: [u32; MAX_MISMATCH]) -> Self {
        self.mismatch_counts = mismatch_counts;
        self
    }

    /// Percentage of aligned bases called in error
    #[must_use]
    pub fn error_rate(&self) -> f32 {
        self.error_rate
    }

    /// Number of clusters with 0 to 4 mismatches
    #[must_use]
    pub fn mismatch_counts(&self) -> &[u32; MAX_MISMATCH] {
        &self.mismatch_counts
    }
}
impl Metric for ErrorMetric {
    type Header = EmptyHeader;
    const KIND: MetricKind = MetricKind::Error;
    const LATEST_VERSION: u8 = 3;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<ErrorMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(ErrorV3))
    }
}

/// Error metrics version 3
///
/// Payload: `error_rate: f32`, `mismatch_counts: [u32; 5]`
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorV3;
impl ErrorV3 {
    const PAYLOAD_SIZE: usize = 4 + 4 * MAX_MISMATCH;
    const RECORD_SIZE: usize = 6 + Self::PAYLOAD_SIZE;
}
impl Codec<ErrorMetric> for ErrorV3 {
    fn version(&self) -> u8 {
        3
    }

    fn read_header(&self, reader: &mut dyn Read, _header: &mut EmptyHeader) -> Result<usize> {
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut ErrorMetric,
        _header: &EmptyHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        metric.error_rate = LittleEndian::read_f32(&buffer[0..4]);
        LittleEndian::read_u32_into(&buffer[4..], &mut metric.mismatch_counts);
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &EmptyHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(
        &self,
        writer: &mut dyn Write,
        metric: &ErrorMetric,
        _header: &EmptyHeader,
    ) -> Result<()> {
        write_id(writer, metric)?;
        writer.write_f32::<LittleEndian>(metric.error_rate)?;
        for count in metric.mismatch_counts {
            writer.write_u32::<LittleEndian>(count)?;
        }
        Ok(())
    }

    fn record_size(&self, _header: &EmptyHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &EmptyHeader) -> usize {
        2
    }
}
