//! Reader and writer for the binary InterOp metric files of sequencing runs
//!
//! Each metric kind is decoded into a [`MetricSet`] of typed records. Decoding
//! tolerates files that are still being written: a truncated stream is reported
//! with [`Error::is_incomplete`] while the records read so far are kept, and
//! only bytes that no known layout explains are [`Error::is_bad_format`].
//!
//! ```no_run
//! use interop::prelude::*;
//! use interop::{io, ErrorMetric, MetricSet};
//!
//! let metrics: MetricSet<ErrorMetric> = io::read_interop("run_folder")?;
//! for metric in &metrics {
//!     println!("{} {} {} {}", metric.lane(), metric.tile(), metric.cycle(), metric.error_rate());
//! }
//! # Ok::<(), interop::Error>(())
//! ```

mod constants;
mod error;
mod header;
mod metric_set;
mod reader;
mod record;
mod run;
mod writer;

pub mod format;
pub mod id;
pub mod io;
pub mod logic;
pub mod paths;
pub mod prelude;
pub mod utils;

pub use constants::{InstrumentType, MetricKind};
pub use error::{Error, FormatError, MetricError, ReadError, Result, WriteError};
pub use format::{Codec, FormatRegistry};
pub use header::{
    EmptyHeader, ImageHeader, IndexHeader, QCollapsedHeader, QHeader, QScoreBin, MAX_Q_BINS,
};
pub use metric_set::MetricSet;
pub use reader::{decode, read_header_only, read_metrics, MetricReader};
pub use record::{
    Accumulate, CorrectedIntensityMetric, CorrectedIntensityV2, CorrectedIntensityV3, ErrorMetric,
    ErrorV3, ExtractionMetric, ExtractionV2, IdLayout, ImageMetric, ImageV1, ImageV2, IndexInfo,
    IndexMetric, IndexV1, Metric, MetricBase, QByLaneMetric, QCollapsedMetric, QCollapsedV2,
    QCollapsedV6, QMetric, QRecord, QV4, QV5, QV6, ReadMetric, TileMetric, TileV2, MAX_CHANNELS,
    MAX_MISMATCH, NUM_OF_BASES, NUM_OF_BASES_AND_NC,
};
pub use run::{ReadOptions, ReadOptionsBuilder, RunMetrics};
pub use writer::{
    buffer_size, header_size, record_size, write_header_only, write_metrics, write_to_slice,
    MetricWriter,
};

#[cfg(test)]
mod testing {

    use super::*;
    use anyhow::Result;
    use std::io::Cursor;

    #[test]
    fn test_error_metrics_scenario() -> Result<()> {
        let mut metrics = MetricSet::<ErrorMetric>::new(3);
        metrics.insert(ErrorMetric::new(7, 1114, 1, 0.450_100_9));
        metrics.insert(ErrorMetric::new(7, 1114, 2, 0.900_201_8));
        metrics.insert(ErrorMetric::new(7, 1114, 3, 0.465_621_6));

        let cursor = write_metrics(Cursor::new(Vec::new()), &metrics, None)?.into_inner();
        let decoded: MetricSet<ErrorMetric> = decode(cursor.as_slice())?;
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.max_cycle(), 3);
        for (lhs, rhs) in decoded.iter().zip(&metrics) {
            assert_eq!(lhs.id(), rhs.id());
            assert!((lhs.error_rate() - rhs.error_rate()).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_truncated_and_unknown_streams() {
        let err = decode::<_, ErrorMetric>(&[3u8][..]).unwrap_err();
        assert!(err.is_incomplete());

        let err = decode::<_, QMetric>(&[34u8, 206][..]).unwrap_err();
        assert!(err.is_bad_format());
        assert!(err.to_string().contains("34"));
    }

    #[test]
    fn test_identity_dedup_across_streams() -> Result<()> {
        let mut first = MetricSet::<QMetric>::new(6);
        first.insert(QMetric::new(1, 1101, 1, vec![1; MAX_Q_BINS]));
        let mut second = MetricSet::<QMetric>::new(6);
        second.insert(QMetric::new(1, 1101, 1, vec![2; MAX_Q_BINS]));

        let mut merged = MetricSet::<QMetric>::default();
        read_metrics(write_metrics(Vec::new(), &first, None)?.as_slice(), &mut merged)?;
        read_metrics(write_metrics(Vec::new(), &second, None)?.as_slice(), &mut merged)?;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].histogram(), second[0].histogram());
        Ok(())
    }

    #[test]
    fn test_index_order_survives_reencoding() -> Result<()> {
        let mut metrics = MetricSet::<IndexMetric>::new(1);
        for (tile, sequences) in [(1101, ["AAA", "CCC"]), (1102, ["CCC", "GGG"]), (1103, ["GGG", "AAA"])] {
            let indices = sequences
                .iter()
                .map(|seq| IndexInfo::new(*seq, "S", "P", 5))
                .collect();
            metrics.insert(IndexMetric::new(1, tile, 1, indices));
        }

        let mut decoded: MetricSet<IndexMetric> = decode(write_metrics(Vec::new(), &metrics, None)?.as_slice())?;
        logic::populate_indices(&MetricSet::default(), &mut decoded);
        assert_eq!(decoded.header().index_order(), &["AAA-S-P", "CCC-S-P", "GGG-S-P"]);
        Ok(())
    }

    #[test]
    fn test_supported_versions() {
        assert_eq!(format::supported_versions(MetricKind::Q), vec![4, 5, 6]);
        assert_eq!(format::supported_versions(MetricKind::Error), vec![3]);
        assert!(format::is_deprecated(MetricKind::Image, 1));
        assert!(!format::is_deprecated(MetricKind::Image, 2));
    }
}
