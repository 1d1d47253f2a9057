//! Every metric set of a sequencing run

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::{InstrumentType, MetricKind};
use crate::error::{Error, ReadError, Result};
use crate::io::{read_by_cycle_into, read_path_into, write_interop};
use crate::logic;
use crate::metric_set::MetricSet;
use crate::paths::find_interop;
use crate::record::{
    CorrectedIntensityMetric, ErrorMetric, ExtractionMetric, ImageMetric, IndexMetric, Metric,
    QByLaneMetric, QCollapsedMetric, QMetric, TileMetric,
};

#[derive(Debug, Clone)]
pub struct ReadOptionsBuilder {
    kinds: Option<Vec<MetricKind>>,
    last_cycle: Option<u32>,
    instrument: Option<InstrumentType>,
}
impl Default for ReadOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl ReadOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: None,
            last_cycle: None,
            instrument: None,
        }
    }

    /// Restricts reading to `kinds`
    #[must_use]
    pub fn kinds(mut self, kinds: &[MetricKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    /// Falls back to per-cycle files up to `last_cycle` for kinds without a merged file
    #[must_use]
    pub fn last_cycle(mut self, last_cycle: u32) -> Self {
        self.last_cycle = Some(last_cycle);
        self
    }

    /// Finalizes the run after reading, using the bins of `instrument` for legacy q-metrics
    #[must_use]
    pub fn instrument(mut self, instrument: InstrumentType) -> Self {
        self.instrument = Some(instrument);
        self
    }

    #[must_use]
    pub fn build(self) -> ReadOptions {
        ReadOptions {
            kinds: self.kinds.unwrap_or_else(|| MetricKind::ALL.to_vec()),
            last_cycle: self.last_cycle,
            instrument: self.instrument,
        }
    }
}

/// Selection of what [`RunMetrics::read_into`] reads
#[derive(Debug, Clone)]
pub struct ReadOptions {
    kinds: Vec<MetricKind>,
    last_cycle: Option<u32>,
    instrument: Option<InstrumentType>,
}
impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptionsBuilder::default().build()
    }
}
impl ReadOptions {
    #[must_use]
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::new()
    }

    #[must_use]
    pub fn includes(&self, kind: MetricKind) -> bool {
        self.kinds.contains(&kind)
    }

    #[must_use]
    pub fn last_cycle(&self) -> Option<u32> {
        self.last_cycle
    }

    #[must_use]
    pub fn instrument(&self) -> Option<InstrumentType> {
        self.instrument
    }
}

/// One metric set per kind
#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub corrected_intensity: MetricSet<CorrectedIntensityMetric>,
    pub error: MetricSet<ErrorMetric>,
    pub extraction: MetricSet<ExtractionMetric>,
    pub image: MetricSet<ImageMetric>,
    pub index: MetricSet<IndexMetric>,
    pub q: MetricSet<QMetric>,
    pub q_by_lane: MetricSet<QByLaneMetric>,
    pub q_collapsed: MetricSet<QCollapsedMetric>,
    pub tile: MetricSet<TileMetric>,
}
impl RunMetrics {
    /// Reads the metric files of `run_dir` selected by `options`
    ///
    /// Every selected set is cleared first. Missing files are skipped. Truncated
    /// files are skipped too, but every set is still read before their paths
    /// are returned as a single [`ReadError::IncompleteFiles`]; the sets that
    /// could be read remain populated. Format errors abort the read.
    pub fn read_into<P: AsRef<Path>>(&mut self, run_dir: P, options: &ReadOptions) -> Result<()> {
        let run_dir = run_dir.as_ref();
        let mut incomplete = Vec::new();
        read_kind(&mut self.corrected_intensity, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.error, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.extraction, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.image, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.index, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.q, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.q_by_lane, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.q_collapsed, run_dir, options, &mut incomplete)?;
        read_kind(&mut self.tile, run_dir, options, &mut incomplete)?;

        if let Some(instrument) = options.instrument() {
            self.finalize(instrument)?;
        }
        if incomplete.is_empty() {
            Ok(())
        } else {
            warn!(files = incomplete.len(), "incomplete metric files were skipped");
            Err(ReadError::IncompleteFiles(incomplete).into())
        }
    }

    /// Computes the derived q-metric sets and fields after reading
    ///
    /// Infers legacy bins and compresses the q-score sets, builds the by-lane
    /// and Q20/Q30 sets from the per-tile q-metrics when they were not read,
    /// fills cumulative distributions, and populates the index order.
    pub fn finalize(&mut self, instrument: InstrumentType) -> Result<()> {
        let count = logic::count_legacy_q_score_bins(&self.q);
        logic::populate_legacy_q_score_bins(self.q.header_mut().bins_mut(), instrument, count);
        logic::compress_q_metrics(&mut self.q);
        logic::compress_q_metrics(&mut self.q_by_lane);

        if self.q_by_lane.is_empty() && !self.q.is_empty() {
            self.q_by_lane = logic::create_q_metrics_by_lane(&self.q, instrument);
        }
        if self.q_collapsed.is_empty() && !self.q.is_empty() {
            self.q_collapsed = logic::create_collapse_q_metrics(&self.q);
        }

        logic::populate_cumulative_distribution(&mut self.q)?;
        logic::populate_cumulative_distribution(&mut self.q_by_lane)?;
        logic::populate_cumulative_distribution(&mut self.q_collapsed)?;
        logic::populate_indices(&self.tile, &mut self.index);
        Ok(())
    }

    /// Writes every non-empty set to `<run>/InterOp`, each with its own version
    pub fn write<P: AsRef<Path>>(&self, run_dir: P, use_out: bool) -> Result<()> {
        let run_dir = run_dir.as_ref();
        write_kind(&self.corrected_intensity, run_dir, use_out)?;
        write_kind(&self.error, run_dir, use_out)?;
        write_kind(&self.extraction, run_dir, use_out)?;
        write_kind(&self.image, run_dir, use_out)?;
        write_kind(&self.index, run_dir, use_out)?;
        write_kind(&self.q, run_dir, use_out)?;
        write_kind(&self.q_by_lane, run_dir, use_out)?;
        write_kind(&self.q_collapsed, run_dir, use_out)?;
        write_kind(&self.tile, run_dir, use_out)
    }

    /// Kinds with at least one record
    #[must_use]
    pub fn populated_kinds(&self) -> Vec<MetricKind> {
        let populated = [
            !self.corrected_intensity.is_empty(),
            !self.error.is_empty(),
            !self.extraction.is_empty(),
            !self.image.is_empty(),
            !self.index.is_empty(),
            !self.q.is_empty(),
            !self.q_by_lane.is_empty(),
            !self.q_collapsed.is_empty(),
            !self.tile.is_empty(),
        ];
        MetricKind::ALL
            .into_iter()
            .zip(populated)
            .filter_map(|(kind, populated)| populated.then_some(kind))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.populated_kinds().is_empty()
    }

    pub fn clear(&mut self) {
        self.corrected_intensity.clear();
        self.error.clear();
        self.extraction.clear();
        self.image.clear();
        self.index.clear();
        self.q.clear();
        self.q_by_lane.clear();
        self.q_collapsed.clear();
        self.tile.clear();
    }
}

fn read_kind<M: Metric>(
    metrics: &mut MetricSet<M>,
    run_dir: &Path,
    options: &ReadOptions,
    incomplete: &mut Vec<PathBuf>,
) -> Result<()> {
    if !options.includes(M::KIND) {
        return Ok(());
    }
    metrics.clear();

    let Some(path) = find_interop(run_dir, M::KIND) else {
        let Some(last_cycle) = options.last_cycle() else {
            debug!(kind = %M::KIND, "no metric file");
            return Ok(());
        };
        return match read_by_cycle_into(run_dir, metrics, last_cycle) {
            Err(Error::ReadError(ReadError::IncompleteFiles(paths))) => {
                incomplete.extend(paths);
                Ok(())
            }
            result => result,
        };
    };

    match read_path_into(&path, metrics) {
        Ok(()) => Ok(()),
        Err(err) if err.is_incomplete() => {
            debug!(path = %path.display(), error = %err, "skipping incomplete metric file");
            incomplete.push(path);
            Ok(())
        }
        Err(err) if err.is_file_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}

fn write_kind<M: Metric>(metrics: &MetricSet<M>, run_dir: &Path, use_out: bool) -> Result<()> {
    if metrics.is_empty() {
        return Ok(());
    }
    write_interop(run_dir, metrics, use_out, None)
}
