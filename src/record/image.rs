use std::io::{Read, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use super::{IdLayout, Metric, MetricBase};
use crate::constants::MetricKind;
use crate::error::{FormatError, Result};
use crate::format::{
    read_header_byte, read_payload, read_record_size, write_id, write_record_size, Codec,
    FormatRegistry,
};
use crate::header::ImageHeader;
use crate::utils::sentinel_to_nan;

/// Number of channels stored by the per-channel layout
pub const MAX_CHANNELS: usize = 4;

/// Image contrast range per channel of a tile at a given cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetric {
    base: MetricBase,
    min_contrast: Vec<u16>,
    max_contrast: Vec<u16>,
}
impl ImageMetric {
    /// Creates a record; `min_contrast` and `max_contrast` are indexed by channel
    #[must_use]
    pub fn new(lane: u32, tile: u32, cycle: u32, min_contrast: Vec<u16>, max_contrast: Vec<u16>) -> Self {
        Self {
            base: MetricBase::new(lane, tile, cycle),
            min_contrast,
            max_contrast,
        }
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.min_contrast.len().max(self.max_contrast.len())
    }

    #[must_use]
    pub fn min_contrast(&self) -> &[u16] {
        &self.min_contrast
    }

    #[must_use]
    pub fn max_contrast(&self) -> &[u16] {
        &self.max_contrast
    }

    /// Contrast range of `channel`, NaN when the channel is missing or was not imaged
    #[must_use]
    pub fn contrast_range(&self, channel: usize) -> f32 {
        match (self.min_contrast.get(channel), self.max_contrast.get(channel)) {
            (Some(&min), Some(&max)) if max >= min => {
                sentinel_to_nan(max - min, u16::MAX)
            }
            _ => f32::NAN,
        }
    }

    fn resize(&mut self, channel_count: usize) {
        self.min_contrast.resize(channel_count, 0);
        self.max_contrast.resize(channel_count, 0);
    }
}
impl Metric for ImageMetric {
    type Header = ImageHeader;
    const KIND: MetricKind = MetricKind::Image;
    const LATEST_VERSION: u8 = 2;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;

    fn base(&self) -> &MetricBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        &mut self.base
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<ImageMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(ImageV1).with(ImageV2))
    }
}

/// Image metrics version 1
///
/// One on-disk record per channel: `channel: u16`, `min: u16`, `max: u16`.
/// Records of the same identity update the same metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageV1;
impl ImageV1 {
    const PAYLOAD_SIZE: usize = 6;
    const RECORD_SIZE: usize = 6 + Self::PAYLOAD_SIZE;
}
impl Codec<ImageMetric> for ImageV1 {
    fn version(&self) -> u8 {
        1
    }

    fn is_deprecated(&self) -> bool {
        true
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut ImageHeader) -> Result<usize> {
        header.channel_count = MAX_CHANNELS as u8;
        read_record_size(reader, Self::RECORD_SIZE)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut ImageMetric,
        _header: &ImageHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let mut buffer = [0u8; Self::PAYLOAD_SIZE];
        read_payload(reader, &mut buffer)?;
        let channel = LittleEndian::read_u16(&buffer[0..2]);
        let index = usize::from(channel);
        if index >= MAX_CHANNELS {
            return Err(FormatError::InvalidChannel {
                channel,
                max: MAX_CHANNELS,
            }
            .into());
        }
        if metric.channel_count() < MAX_CHANNELS {
            metric.resize(MAX_CHANNELS);
        }
        metric.min_contrast[index] = LittleEndian::read_u16(&buffer[2..4]);
        metric.max_contrast[index] = LittleEndian::read_u16(&buffer[4..6]);
        Ok(Self::PAYLOAD_SIZE)
    }

    fn write_header(&self, writer: &mut dyn Write, _header: &ImageHeader) -> Result<()> {
        write_record_size(writer, Self::RECORD_SIZE)?;
        Ok(())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &ImageMetric, _header: &ImageHeader) -> Result<()> {
        for channel in 0..MAX_CHANNELS {
            write_id(writer, metric)?;
            writer.write_u16::<LittleEndian>(channel as u16)?;
            writer.write_u16::<LittleEndian>(metric.min_contrast.get(channel).copied().unwrap_or(0))?;
            writer.write_u16::<LittleEndian>(metric.max_contrast.get(channel).copied().unwrap_or(0))?;
        }
        Ok(())
    }

    fn record_size(&self, _header: &ImageHeader) -> usize {
        Self::RECORD_SIZE
    }

    fn header_size(&self, _header: &ImageHeader) -> usize {
        2
    }

    fn encoded_size(&self, _metric: &ImageMetric, _header: &ImageHeader) -> usize {
        MAX_CHANNELS * Self::RECORD_SIZE
    }
}

/// Image metrics version 2
///
/// Header adds `channel_count: u8`; payload: `min: [u16; c]`, `max: [u16; c]`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageV2;
impl ImageV2 {
    fn payload_size(channel_count: u8) -> usize {
        4 * usize::from(channel_count)
    }
}
impl Codec<ImageMetric> for ImageV2 {
    fn version(&self) -> u8 {
        2
    }

    fn read_header(&self, reader: &mut dyn Read, header: &mut ImageHeader) -> Result<usize> {
        let declared = usize::from(read_header_byte(reader)?);
        header.channel_count = read_header_byte(reader)?;
        let layout = self.record_size(header);
        if declared != layout {
            return Err(FormatError::LayoutSizeMismatch { declared, layout }.into());
        }
        Ok(layout)
    }

    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut ImageMetric,
        header: &ImageHeader,
        _is_new: bool,
    ) -> Result<usize> {
        let channels = usize::from(header.channel_count);
        let mut buffer = vec![0u8; Self::payload_size(header.channel_count)];
        read_payload(reader, &mut buffer)?;
        metric.resize(channels);
        LittleEndian::read_u16_into(&buffer[..2 * channels], &mut metric.min_contrast);
        LittleEndian::read_u16_into(&buffer[2 * channels..], &mut metric.max_contrast);
        Ok(buffer.len())
    }

    fn write_header(&self, writer: &mut dyn Write, header: &ImageHeader) -> Result<()> {
        write_record_size(writer, self.record_size(header))?;
        writer.write_u8(header.channel_count)?;
        Ok(())
    }

    fn write_record(&self, writer: &mut dyn Write, metric: &ImageMetric, header: &ImageHeader) -> Result<()> {
        write_id(writer, metric)?;
        let channels = usize::from(header.channel_count);
        for channel in 0..channels {
            writer.write_u16::<LittleEndian>(metric.min_contrast.get(channel).copied().unwrap_or(0))?;
        }
        for channel in 0..channels {
            writer.write_u16::<LittleEndian>(metric.max_contrast.get(channel).copied().unwrap_or(0))?;
        }
        Ok(())
    }

    fn record_size(&self, header: &ImageHeader) -> usize {
        6 + Self::payload_size(header.channel_count)
    }

    fn header_size(&self, _header: &ImageHeader) -> usize {
        3
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{read_metrics, write_metrics, MetricSet};
    use anyhow::Result;

    #[test]
    fn test_image_v2_roundtrip() -> Result<()> {
        let mut metrics = MetricSet::<ImageMetric>::with_header(ImageHeader::new(2), 2);
        metrics.insert(ImageMetric::new(1, 1101, 1, vec![120, 98], vec![2110, 1984]));
        metrics.insert(ImageMetric::new(1, 1101, 2, vec![131, 101], vec![2072, 1950]));

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        assert_eq!(&buffer[..3], &[2, 14, 2]);

        let mut decoded = MetricSet::<ImageMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        assert_eq!(decoded.header().channel_count, 2);
        assert_eq!(decoded.metrics(), metrics.metrics());
        Ok(())
    }

    #[test]
    fn test_image_v1_merges_channel_records() -> Result<()> {
        let mut metrics = MetricSet::<ImageMetric>::new(1);
        metrics.insert(ImageMetric::new(3, 2101, 7, vec![10, 11, 12, 13], vec![900, 901, 902, 903]));

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        assert_eq!(buffer.len(), 2 + 4 * 12);

        let mut decoded = MetricSet::<ImageMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.at(0), metrics.at(0));
        assert!(ImageMetric::registry().is_deprecated(1));
        Ok(())
    }

    #[test]
    fn test_image_v1_invalid_channel() {
        let buffer = [1u8, 12, 1, 0, 1, 0, 1, 0, 4, 0, 0, 0, 0, 0];
        let mut metrics = MetricSet::<ImageMetric>::default();
        let err = read_metrics(buffer.as_slice(), &mut metrics).unwrap_err();
        assert!(err.is_bad_format());
    }

    #[test]
    fn test_contrast_range() {
        let metric = ImageMetric::new(1, 1, 1, vec![100, 5], vec![300, 2]);
        assert!((metric.contrast_range(0) - 200.0).abs() < f32::EPSILON);
        assert!(metric.contrast_range(1).is_nan());
        assert!(metric.contrast_range(2).is_nan());
    }
}
