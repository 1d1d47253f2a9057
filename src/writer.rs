use std::io::Write;

use byteorder::WriteBytesExt;

use crate::error::{Result, WriteError};
use crate::format::Codec;
use crate::metric_set::MetricSet;
use crate::record::Metric;

/// Encoder for a single metric stream
///
/// Construction writes the version byte and the header; records follow through
/// [`MetricWriter::write_record`].
pub struct MetricWriter<W: Write, M: Metric> {
    /// Inner writer
    inner: W,

    /// Header written at construction, consulted for every record
    header: M::Header,

    /// Codec for the target version
    codec: &'static dyn Codec<M>,

    /// Number of metrics written
    records_written: usize,
}
impl<W: Write, M: Metric> MetricWriter<W, M> {
    /// Writes the version byte and the header
    ///
    /// The header is encoded in full before anything reaches `inner`, so an
    /// unsupported version or a header the layout cannot hold leaves `inner`
    /// untouched.
    pub fn new(mut inner: W, header: M::Header, version: u8) -> Result<Self> {
        let codec = M::registry().lookup(version)?;
        let mut encoded = Vec::with_capacity(codec.header_size(&header));
        encoded.write_u8(version)?;
        codec.write_header(&mut encoded, &header)?;
        inner.write_all(&encoded)?;
        Ok(Self {
            inner,
            header,
            codec,
            records_written: 0,
        })
    }

    pub fn write_record(&mut self, metric: &M) -> Result<()> {
        self.codec.write_record(&mut self.inner, metric, &self.header)?;
        self.records_written += 1;
        Ok(())
    }

    pub fn write_all<'a, I>(&mut self, metrics: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a M>,
    {
        metrics
            .into_iter()
            .try_for_each(|metric| self.write_record(metric))
    }

    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn by_ref(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

fn resolve_version<M: Metric>(metrics: &MetricSet<M>, version: Option<u8>) -> u8 {
    version.unwrap_or_else(|| metrics.version())
}

/// Encodes a whole set, returning the writer
///
/// `version` overrides the version stored in the set. Metrics are written in
/// insertion order.
pub fn write_metrics<W: Write, M: Metric>(
    writer: W,
    metrics: &MetricSet<M>,
    version: Option<u8>,
) -> Result<W> {
    let version = resolve_version(metrics, version);
    let mut writer = MetricWriter::new(writer, metrics.header().clone(), version)?;
    writer.write_all(metrics)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

/// Writes only the version byte and header
pub fn write_header_only<W: Write, M: Metric>(writer: W, header: &M::Header, version: u8) -> Result<W> {
    let mut writer = MetricWriter::<W, M>::new(writer, header.clone(), version)?;
    writer.flush()?;
    Ok(writer.into_inner())
}

/// Size of one on-disk record of `version`, identity included
pub fn record_size<M: Metric>(header: &M::Header, version: u8) -> Result<usize> {
    Ok(M::registry().lookup(version)?.record_size(header))
}

/// Size of the header of `version`, version byte included
pub fn header_size<M: Metric>(header: &M::Header, version: u8) -> Result<usize> {
    Ok(M::registry().lookup(version)?.header_size(header))
}

/// Exact number of bytes [`write_metrics`] produces for `metrics`
pub fn buffer_size<M: Metric>(metrics: &MetricSet<M>, version: Option<u8>) -> Result<usize> {
    let version = resolve_version(metrics, version);
    let codec = M::registry().lookup(version)?;
    let header = metrics.header();
    Ok(codec.header_size(header)
        + metrics
            .iter()
            .map(|metric| codec.encoded_size(metric, header))
            .sum::<usize>())
}

/// Encodes a whole set into `buffer`, returning the number of bytes written
///
/// Fails with [`WriteError::BufferTooSmall`] before writing anything if the
/// encoded set does not fit.
pub fn write_to_slice<M: Metric>(
    buffer: &mut [u8],
    metrics: &MetricSet<M>,
    version: Option<u8>,
) -> Result<usize> {
    let expected = buffer_size(metrics, version)?;
    if buffer.len() < expected {
        return Err(WriteError::BufferTooSmall {
            expected,
            got: buffer.len(),
        }
        .into());
    }
    let remaining = write_metrics(&mut buffer[..], metrics, version)?.len();
    Ok(buffer.len() - remaining)
}
