//! Streaming decode of metric files
//!
//! A metric stream starts with a version byte, followed by a header whose layout
//! depends on the version, followed by fixed-size (or, for index metrics,
//! self-delimiting) records. A file that is still being written may end at any
//! byte, so a short read is reported as [`ReadError::IncompleteFile`] and never as
//! a format error, while everything that cannot be explained by truncation is
//! [`crate::FormatError`].

use std::io::Read;

use tracing::warn;

use crate::error::{FormatError, ReadError, Result};
use crate::format::{read_fill, read_id, Codec};
use crate::metric_set::MetricSet;
use crate::record::Metric;

/// Decoder for a single metric stream
///
/// Construction reads the version byte and the header; [`MetricReader::read_into`]
/// then consumes the records.
pub struct MetricReader<R: Read, M: Metric> {
    /// Inner reader
    inner: R,

    /// Version byte found at the start of the stream
    version: u8,

    /// Header decoded after the version byte
    header: M::Header,

    /// Codec registered for the version
    codec: &'static dyn Codec<M>,

    /// Record size declared by the header
    record_size: usize,

    /// Number of on-disk records consumed so far
    n_processed: usize,
}
impl<R: Read, M: Metric> MetricReader<R, M> {
    /// Reads the version byte and the header
    ///
    /// # Errors
    ///
    /// * [`ReadError::EmptyFile`] if not even the version byte is available
    /// * [`crate::FormatError::UnknownVersion`] if no codec handles the version
    /// * [`ReadError::IncompleteFile`] if the header is cut short
    pub fn new(mut inner: R) -> Result<Self> {
        let mut version = [0u8; 1];
        if read_fill(&mut inner, &mut version)? == 0 {
            return Err(ReadError::EmptyFile.into());
        }
        let version = version[0];
        let codec = M::registry().lookup(version)?;
        if codec.is_deprecated() {
            warn!(kind = %M::KIND, version, "reading deprecated metric format version");
        }
        let mut header = M::Header::default();
        let record_size = codec.read_header(&mut inner, &mut header)?;
        Ok(Self {
            inner,
            version,
            header,
            codec,
            record_size,
            n_processed: 0,
        })
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub fn header(&self) -> &M::Header {
        &self.header
    }

    /// Size every record must consume, identity included
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    #[must_use]
    pub fn n_processed(&self) -> usize {
        self.n_processed
    }

    /// Consumes the reader, returning the version and header
    pub fn into_parts(self) -> (u8, M::Header) {
        (self.version, self.header)
    }

    /// Decodes every record into `metrics`
    ///
    /// The set's version and header are replaced by those of the stream. A record
    /// whose identity is already present updates the stored record in place;
    /// new records with lane 0 (or tile 0, for kinds that check tiles) are dropped.
    ///
    /// On [`ReadError::IncompleteFile`] the records decoded before the truncation
    /// remain in `metrics`.
    pub fn read_into(self, metrics: &mut MetricSet<M>) -> Result<()> {
        let Self {
            mut inner,
            version,
            header,
            codec,
            record_size,
            mut n_processed,
        } = self;
        metrics.set_version(version);
        metrics.set_header(header);

        let id_size = M::ID_LAYOUT.size();
        loop {
            let mut metric = M::default();
            let got = read_id(&mut inner, &mut metric)?;
            if got < id_size {
                if got == 0 && n_processed > 0 {
                    break;
                }
                return Err(ReadError::IncompleteFile {
                    got,
                    expected: record_size,
                }
                .into());
            }

            match metrics.find(metric.id()) {
                Some(position) => {
                    let (header, existing) = metrics.split_at_position(position);
                    let consumed = codec.read_record(&mut inner, existing, header, false)?;
                    check_record_size(id_size + consumed, record_size)?;
                }
                None => {
                    let consumed = codec.read_record(&mut inner, &mut metric, metrics.header(), true)?;
                    check_record_size(id_size + consumed, record_size)?;
                    if is_valid(&metric) {
                        metrics.insert(metric);
                    }
                }
            }
            n_processed += 1;
        }
        Ok(())
    }
}

fn check_record_size(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(FormatError::RecordSizeMismatch { expected, got }.into());
    }
    Ok(())
}

fn is_valid<M: Metric>(metric: &M) -> bool {
    metric.lane() > 0 && (!M::CHECK_TILE_ID || metric.tile() > 0)
}

/// Decodes a whole stream into `metrics`
///
/// Records already present in `metrics` are kept (and updated in place when
/// the stream carries the same identity).
pub fn read_metrics<R: Read, M: Metric>(reader: R, metrics: &mut MetricSet<M>) -> Result<()> {
    MetricReader::new(reader)?.read_into(metrics)
}

/// Decodes a whole stream into a new set
pub fn decode<R: Read, M: Metric>(reader: R) -> Result<MetricSet<M>> {
    let mut metrics = MetricSet::<M>::default();
    read_metrics(reader, &mut metrics)?;
    Ok(metrics)
}

/// Reads only the version byte and header of a stream
pub fn read_header_only<R: Read, M: Metric>(reader: R) -> Result<(u8, M::Header)> {
    Ok(MetricReader::<R, M>::new(reader)?.into_parts())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::header::QHeader;
    use crate::record::{ErrorMetric, QByLaneMetric, QMetric};
    use crate::write_metrics;
    use anyhow::Result;

    const RATES: [f32; 3] = [0.450_100_9, 0.900_201_8, 0.465_621_6];

    fn scenario_a() -> MetricSet<ErrorMetric> {
        let mut metrics = MetricSet::<ErrorMetric>::new(3);
        for (cycle, rate) in (1..).zip(RATES) {
            metrics.insert(ErrorMetric::new(7, 1114, cycle, rate));
        }
        metrics
    }

    /// Error metrics v3 of lane 7, tile 1114, cycles 1 to 3, laid out byte by byte
    fn error_v3_stream() -> Vec<u8> {
        let mut stream = vec![3u8, 30];
        for (cycle, rate) in (1u8..).zip(RATES) {
            stream.extend_from_slice(&[7, 0, 0x5A, 0x04, cycle, 0]);
            stream.extend_from_slice(&rate.to_le_bytes());
            stream.extend_from_slice(&[0u8; 20]);
        }
        stream
    }

    #[test]
    fn test_decode_error_v3_stream() -> Result<()> {
        let stream = error_v3_stream();
        let decoded: MetricSet<ErrorMetric> = decode(stream.as_slice())?;
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.version(), 3);
        assert_eq!(decoded.max_cycle(), 3);
        for ((metric, cycle), rate) in decoded.iter().zip(1..).zip(RATES) {
            assert_eq!((metric.lane(), metric.tile(), metric.cycle()), (7, 1114, cycle));
            assert!((metric.error_rate() - rate).abs() < 1e-4);
            assert_eq!(metric.mismatch_counts(), &[0; 5]);
        }

        assert_eq!(write_metrics(Vec::new(), &decoded, None)?, stream);
        assert_eq!(write_metrics(Vec::new(), &scenario_a(), None)?, stream);
        Ok(())
    }

    #[test]
    fn test_encode_decode_error_metrics() -> Result<()> {
        let metrics = scenario_a();
        let buffer = write_metrics(Vec::new(), &metrics, None)?;

        let decoded: MetricSet<ErrorMetric> = decode(buffer.as_slice())?;
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.max_cycle(), 3);
        let rates: Vec<f32> = decoded.iter().map(ErrorMetric::error_rate).collect();
        assert_eq!(rates, RATES.to_vec());
        Ok(())
    }

    #[test]
    fn test_empty_stream() {
        let err = decode::<_, ErrorMetric>(&[][..]).unwrap_err();
        assert!(matches!(err, crate::Error::ReadError(ReadError::EmptyFile)));
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_version_byte_only() {
        let err = decode::<_, ErrorMetric>(&[3u8][..]).unwrap_err();
        assert!(err.is_incomplete());
        assert!(!err.is_bad_format());
    }

    #[test]
    fn test_header_without_records() {
        let err = decode::<_, ErrorMetric>(&[3u8, 30][..]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_unknown_version() {
        let err = decode::<_, ErrorMetric>(&[34u8, 30, 1, 0, 1, 0, 1, 0][..]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::FormatError(FormatError::UnknownVersion { version: 34, .. })
        ));
    }

    #[test]
    fn test_truncation_at_every_prefix() -> Result<()> {
        let buffer = write_metrics(Vec::new(), &scenario_a(), None)?;
        let header_size = 2;
        let record_size = 30;

        for length in 0..=buffer.len() {
            let mut metrics = MetricSet::<ErrorMetric>::default();
            let result = read_metrics(&buffer[..length], &mut metrics);
            let body = length.saturating_sub(header_size);
            if length > header_size && body % record_size == 0 {
                result?;
                assert_eq!(metrics.len(), body / record_size);
            } else {
                let err = result.unwrap_err();
                assert!(err.is_incomplete(), "prefix {length}: {err}");
                assert_eq!(metrics.len(), body / record_size);
            }
        }
        Ok(())
    }

    #[test]
    fn test_altered_version_byte() -> Result<()> {
        let mut buffer = write_metrics(Vec::new(), &scenario_a(), None)?;
        buffer[0] = 200;
        let err = decode::<_, ErrorMetric>(buffer.as_slice()).unwrap_err();
        assert!(err.is_bad_format());
        Ok(())
    }

    #[test]
    fn test_duplicate_identity_in_stream() -> Result<()> {
        let mut metrics = MetricSet::<ErrorMetric>::new(3);
        metrics.insert(ErrorMetric::new(1, 1101, 1, 0.5));
        let mut buffer = write_metrics(Vec::new(), &metrics, None)?;
        let record = buffer[2..].to_vec();
        buffer.extend_from_slice(&record);
        buffer[2 + 30 + 6..2 + 30 + 10].copy_from_slice(&0.75f32.to_le_bytes());

        let decoded: MetricSet<ErrorMetric> = decode(buffer.as_slice())?;
        assert_eq!(decoded.len(), 1);
        assert!((decoded[0].error_rate() - 0.75).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn test_lane_and_tile_zero_are_dropped() -> Result<()> {
        let mut metrics = MetricSet::<ErrorMetric>::new(3);
        metrics.insert(ErrorMetric::new(0, 1101, 1, 0.1));
        metrics.insert(ErrorMetric::new(1, 0, 1, 0.2));
        metrics.insert(ErrorMetric::new(1, 1101, 1, 0.3));
        let buffer = write_metrics(Vec::new(), &metrics, None)?;

        let decoded: MetricSet<ErrorMetric> = decode(buffer.as_slice())?;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].tile(), 1101);
        Ok(())
    }

    #[test]
    fn test_tile_zero_kept_without_tile_check() -> Result<()> {
        let mut metrics = MetricSet::<QByLaneMetric>::new(6);
        metrics.insert(QByLaneMetric::new(3, 1, vec![1; 50]));
        let buffer = write_metrics(Vec::new(), &metrics, None)?;

        let decoded: MetricSet<QByLaneMetric> = decode(buffer.as_slice())?;
        assert_eq!(decoded.len(), 1);
        Ok(())
    }

    #[test]
    fn test_decode_merges_into_existing_set() -> Result<()> {
        let mut first = MetricSet::<ErrorMetric>::new(3);
        first.insert(ErrorMetric::new(1, 1101, 1, 0.1));
        let mut second = MetricSet::<ErrorMetric>::new(3);
        second.insert(ErrorMetric::new(1, 1101, 2, 0.2));

        let mut merged = MetricSet::<ErrorMetric>::default();
        read_metrics(write_metrics(Vec::new(), &first, None)?.as_slice(), &mut merged)?;
        read_metrics(write_metrics(Vec::new(), &second, None)?.as_slice(), &mut merged)?;
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.max_cycle(), 2);
        Ok(())
    }

    #[test]
    fn test_read_header_only() -> Result<()> {
        let metrics = MetricSet::<QMetric>::with_header(QHeader::default(), 6);
        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        let (version, header) = read_header_only::<_, QMetric>(buffer.as_slice())?;
        assert_eq!(version, 6);
        assert!(!header.is_binned());
        Ok(())
    }
}
