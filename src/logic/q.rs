//! Q-score analytics
//!
//! Cumulative distributions, inference of the bin tables of legacy instruments,
//! and the derived by-lane and Q20/Q30 summaries.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::constants::InstrumentType;
use crate::error::{MetricError, Result};
use crate::header::{QCollapsedHeader, QScoreBin, MAX_Q_BINS};
use crate::id::{cycle_id, Id};
use crate::metric_set::MetricSet;
use crate::record::{Accumulate, Metric, QByLaneMetric, QCollapsedMetric, QMetric, QRecord};

/// Largest number of distinct q-scores a legacy binned histogram can hold
const MAX_LEGACY_BINS: usize = 7;

static NEXTSEQ_BINS: [QScoreBin; 6] = [
    QScoreBin::new(0, 9, 8),
    QScoreBin::new(10, 19, 13),
    QScoreBin::new(20, 24, 22),
    QScoreBin::new(25, 29, 27),
    QScoreBin::new(30, 34, 32),
    QScoreBin::new(35, 39, 37),
];

static LEGACY_BINS_7: [QScoreBin; 7] = [
    QScoreBin::new(0, 9, 6),
    QScoreBin::new(10, 19, 15),
    QScoreBin::new(20, 24, 22),
    QScoreBin::new(25, 29, 27),
    QScoreBin::new(30, 34, 33),
    QScoreBin::new(35, 39, 37),
    QScoreBin::new(40, 49, 40),
];

static LEGACY_BINS_6: [QScoreBin; 6] = [
    QScoreBin::new(0, 9, 7),
    QScoreBin::new(10, 19, 16),
    QScoreBin::new(20, 26, 24),
    QScoreBin::new(27, 29, 29),
    QScoreBin::new(30, 34, 33),
    QScoreBin::new(35, 49, 38),
];

static LEGACY_BINS_5: [QScoreBin; 5] = [
    QScoreBin::new(0, 9, 7),
    QScoreBin::new(10, 19, 16),
    QScoreBin::new(20, 29, 25),
    QScoreBin::new(30, 34, 33),
    QScoreBin::new(35, 49, 38),
];

static LEGACY_BINS_4: [QScoreBin; 4] = [
    QScoreBin::new(0, 9, 7),
    QScoreBin::new(10, 29, 20),
    QScoreBin::new(30, 34, 33),
    QScoreBin::new(35, 49, 38),
];

static LEGACY_BINS_3: [QScoreBin; 3] = [
    QScoreBin::new(0, 9, 7),
    QScoreBin::new(10, 29, 20),
    QScoreBin::new(30, 49, 36),
];

static LEGACY_BINS_2: [QScoreBin; 2] = [QScoreBin::new(0, 27, 13), QScoreBin::new(28, 49, 35)];

static LEGACY_BINS_1: [QScoreBin; 1] = [QScoreBin::new(0, 50, 20)];

/// Runs one accumulation pass in container order
///
/// Fails on the first record whose cycle does not exceed the previous record of
/// the same tile; records before it are left partially accumulated.
fn accumulate_pass<M: Accumulate>(metrics: &mut [M]) -> std::result::Result<(), MetricError> {
    let mut latest: HashMap<Id, usize> = HashMap::new();
    for position in 0..metrics.len() {
        let hash = metrics[position].tile_hash();
        match latest.get(&hash) {
            None => metrics[position].accumulate_self(),
            Some(&previous) => {
                let (head, tail) = metrics.split_at_mut(position);
                let (previous, current) = (&head[previous], &mut tail[0]);
                if current.cycle() <= previous.cycle() {
                    return Err(MetricError::NonIncreasingCycle {
                        lane: current.lane(),
                        tile: current.tile(),
                        cycle: current.cycle(),
                    });
                }
                current.accumulate_from(previous);
            }
        }
        latest.insert(hash, position);
    }
    Ok(())
}

/// Fills the running totals of every record across the cycles of its tile
///
/// Records are visited in container order. If some tile's cycles are not
/// strictly increasing in that order, the set is stably sorted by cycle and the
/// pass is retried once; a second failure means two records of a tile share a
/// cycle and is reported as [`MetricError::NonIncreasingCycle`].
pub fn populate_cumulative_distribution<M: Accumulate>(metrics: &mut MetricSet<M>) -> Result<()> {
    if metrics.is_empty() {
        return Ok(());
    }
    if let Err(err) = accumulate_pass(metrics.metrics_mut()) {
        debug!(kind = %M::KIND, error = %err, "records out of cycle order, sorting before accumulating");
        metrics.sort_by_cycle();
        accumulate_pass(metrics.metrics_mut())?;
    }
    Ok(())
}

/// Number of histogram slots of the first record, 0 for an empty set
pub fn count_q_metric_bins<M: QRecord>(metrics: &MetricSet<M>) -> usize {
    metrics
        .metrics()
        .first()
        .map_or(0, |metric| metric.as_ref().size())
}

/// Whether the histograms are already rebucketed into the bins of the header
pub fn is_compressed<M: QRecord>(metrics: &MetricSet<M>) -> bool {
    let slots = count_q_metric_bins(metrics);
    slots > 0 && slots != MAX_Q_BINS
}

/// Highest q-score a histogram slot can stand for
pub fn max_qval<M: QRecord>(metrics: &MetricSet<M>) -> usize {
    match metrics.header().bins().last() {
        Some(bin) if is_compressed(metrics) => usize::from(bin.upper),
        _ => count_q_metric_bins(metrics),
    }
}

/// Histogram slot holding q-score `qval`
pub fn index_for_q_value<M: QRecord>(metrics: &MetricSet<M>, qval: u16) -> usize {
    if is_compressed(metrics) {
        metrics.header().index_for_q_value(qval)
    } else {
        usize::from(qval.saturating_sub(1))
    }
}

/// Number of distinct q-scores used by a set that may need legacy bins
///
/// Returns 0 when no inference is needed: version 5 onwards, or a header that
/// already carries bins. Counting stops once more than 7 distinct slots were
/// seen, since such a histogram is unbinned.
pub fn count_legacy_q_score_bins<M: QRecord>(metrics: &MetricSet<M>) -> usize {
    if metrics.version() > 4 || metrics.header().is_binned() {
        return 0;
    }
    let mut found = BTreeSet::new();
    for metric in metrics {
        found.extend(
            metric
                .as_ref()
                .histogram()
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count > 0)
                .map(|(slot, _)| slot),
        );
        if found.len() > MAX_LEGACY_BINS {
            break;
        }
    }
    found.len()
}

#[must_use]
pub fn requires_legacy_bins(count: usize) -> bool {
    (1..=MAX_LEGACY_BINS).contains(&count)
}

/// Bin table historically used for `count` distinct q-scores
///
/// NextSeq-family instruments share a single layout regardless of count.
/// `None` when no legacy layout matches.
#[must_use]
pub fn legacy_q_score_bins(instrument: InstrumentType, count: usize) -> Option<&'static [QScoreBin]> {
    if !requires_legacy_bins(count) {
        return None;
    }
    if instrument == InstrumentType::NextSeq {
        return Some(&NEXTSEQ_BINS[..]);
    }
    match count {
        7 => Some(&LEGACY_BINS_7[..]),
        6 => Some(&LEGACY_BINS_6[..]),
        5 => Some(&LEGACY_BINS_5[..]),
        4 => Some(&LEGACY_BINS_4[..]),
        3 => Some(&LEGACY_BINS_3[..]),
        2 => Some(&LEGACY_BINS_2[..]),
        1 => Some(&LEGACY_BINS_1[..]),
        _ => None,
    }
}

/// Fills an empty bin table with the legacy layout for `count`
///
/// A table that already has bins, or a count without a known layout, is left as is.
pub fn populate_legacy_q_score_bins(bins: &mut Vec<QScoreBin>, instrument: InstrumentType, count: usize) {
    if !bins.is_empty() {
        return;
    }
    if let Some(legacy) = legacy_q_score_bins(instrument, count) {
        bins.extend_from_slice(legacy);
    }
}

/// Rebuckets every 50-slot histogram into the bins of the header
///
/// Skipped for an empty set, an already compressed set, or a header without bins.
pub fn compress_q_metrics<M: QRecord>(metrics: &mut MetricSet<M>) {
    if metrics.is_empty() || is_compressed(metrics) || !metrics.header().is_binned() {
        return;
    }
    let bins = metrics.header().bins().to_vec();
    for metric in metrics.metrics_mut() {
        metric.as_mut().compress(&bins);
    }
}

/// Sums the histograms of every tile of a lane into one record per cycle
///
/// The result carries the header of `metrics`, with legacy bins inferred from
/// `metrics` when needed, and is compressed to those bins.
pub fn create_q_metrics_by_lane(metrics: &MetricSet<QMetric>, instrument: InstrumentType) -> MetricSet<QByLaneMetric> {
    let mut by_lane = MetricSet::<QByLaneMetric>::with_header(
        metrics.header().clone(),
        QByLaneMetric::LATEST_VERSION,
    );
    for metric in metrics {
        let id = cycle_id(metric.lane(), 0, metric.cycle());
        match by_lane.find(id) {
            Some(position) => by_lane.metrics_mut()[position].accumulate_by_lane(metric),
            None => {
                by_lane.insert(QByLaneMetric::new(
                    metric.lane(),
                    metric.cycle(),
                    metric.histogram().to_vec(),
                ));
            }
        }
    }
    let count = count_legacy_q_score_bins(metrics);
    populate_legacy_q_score_bins(by_lane.header_mut().bins_mut(), instrument, count);
    compress_q_metrics(&mut by_lane);
    by_lane
}

/// Q20, Q30, total and median of every record
pub fn create_collapse_q_metrics(metrics: &MetricSet<QMetric>) -> MetricSet<QCollapsedMetric> {
    let q20 = index_for_q_value(metrics, 20);
    let q30 = index_for_q_value(metrics, 30);
    let bins: &[QScoreBin] = if is_compressed(metrics) {
        metrics.header().bins()
    } else {
        &[]
    };
    let header = QCollapsedHeader {
        bins: metrics.header().bins().to_vec(),
        ..QCollapsedHeader::default()
    };

    let mut collapsed =
        MetricSet::<QCollapsedMetric>::with_header(header, QCollapsedMetric::LATEST_VERSION);
    for metric in metrics {
        collapsed.insert(QCollapsedMetric::new(
            metric.lane(),
            metric.tile(),
            metric.cycle(),
            saturate(metric.total_over_qscore(q20)),
            saturate(metric.total_over_qscore(q30)),
            saturate(metric.sum_qscore()),
            metric.median(bins).map_or(f32::NAN, |median| median as f32),
        ));
    }
    collapsed
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::header::QHeader;
    use crate::record::QCollapsedMetric;
    use anyhow::Result;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_histogram(rng: &mut SmallRng, slots: usize) -> Vec<u32> {
        (0..slots).map(|_| rng.random_range(0..1_000)).collect()
    }

    fn binned_set(order: &[u32], histograms: &[Vec<u32>]) -> MetricSet<QMetric> {
        let mut metrics = MetricSet::<QMetric>::with_header(QHeader::new(LEGACY_BINS_7.to_vec()), 6);
        for &cycle in order {
            let histogram = histograms[cycle as usize - 1].clone();
            metrics.insert(QMetric::new(1, 1101, cycle, histogram));
        }
        metrics
    }

    fn cumulative_at(metrics: &MetricSet<QMetric>, cycle: u32) -> Vec<u64> {
        metrics
            .iter()
            .find(|metric| metric.cycle() == cycle)
            .map(|metric| metric.cumulative().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_cumulative_order_independence() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(42);
        let histograms: Vec<Vec<u32>> = (0..3).map(|_| random_histogram(&mut rng, 7)).collect();
        let expected: Vec<u64> = (0..7)
            .map(|slot| histograms.iter().map(|h| u64::from(h[slot])).sum())
            .collect();

        let mut sorted = binned_set(&[1, 2, 3], &histograms);
        populate_cumulative_distribution(&mut sorted)?;
        assert_eq!(cumulative_at(&sorted, 3), expected);

        let mut shuffled = binned_set(&[3, 1, 2], &histograms);
        populate_cumulative_distribution(&mut shuffled)?;
        assert_eq!(cumulative_at(&shuffled, 3), expected);
        assert_eq!(cumulative_at(&shuffled, 1), cumulative_at(&sorted, 1));

        let cycles: Vec<u32> = shuffled.iter().map(Metric::cycle).collect();
        assert_eq!(cycles, vec![1, 2, 3]);
        assert!(shuffled.find(cycle_id(1, 1101, 3)).is_some());
        Ok(())
    }

    #[test]
    fn test_cumulative_tiles_are_independent() -> Result<()> {
        let mut metrics = MetricSet::<QMetric>::new(6);
        metrics.insert(QMetric::new(1, 1101, 1, vec![1, 2]));
        metrics.insert(QMetric::new(1, 1102, 1, vec![10, 20]));
        metrics.insert(QMetric::new(1, 1101, 2, vec![3, 4]));
        metrics.insert(QMetric::new(2, 1101, 2, vec![5, 5]));
        populate_cumulative_distribution(&mut metrics)?;

        assert_eq!(metrics[1].cumulative(), &[10, 20]);
        assert_eq!(metrics[2].cumulative(), &[4, 6]);
        assert_eq!(metrics[3].cumulative(), &[5, 5]);
        Ok(())
    }

    #[test]
    fn test_cumulative_duplicate_cycle_fails() {
        let mut metrics = MetricSet::<QMetric>::new(6);
        metrics.insert(QMetric::new(1, 1101, 1, vec![1; 7]));
        metrics.insert_with_id(u64::MAX, QMetric::new(1, 1101, 1, vec![2; 7]));

        let err = populate_cumulative_distribution(&mut metrics).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::MetricError(MetricError::NonIncreasingCycle { cycle: 1, .. })
        ));
    }

    #[test]
    fn test_cumulative_collapsed() -> Result<()> {
        let mut metrics = MetricSet::<QCollapsedMetric>::new(6);
        metrics.insert(QCollapsedMetric::new(1, 1101, 2, 5, 4, 10, 30.0));
        metrics.insert(QCollapsedMetric::new(1, 1101, 1, 7, 6, 10, 30.0));
        populate_cumulative_distribution(&mut metrics)?;

        let last = metrics.iter().find(|metric| metric.cycle() == 2).unwrap();
        assert_eq!(last.cumulative_q20(), 12);
        assert_eq!(last.cumulative_q30(), 10);
        assert_eq!(last.cumulative_total(), 20);
        Ok(())
    }

    #[test]
    fn test_cumulative_empty_set() -> Result<()> {
        let mut metrics = MetricSet::<QByLaneMetric>::default();
        populate_cumulative_distribution(&mut metrics)?;
        Ok(())
    }

    #[test]
    fn test_legacy_bin_tables() {
        assert!(legacy_q_score_bins(InstrumentType::HiSeq, 0).is_none());
        assert_eq!(
            legacy_q_score_bins(InstrumentType::HiSeq, 1).unwrap(),
            &[QScoreBin::new(0, 50, 20)]
        );
        assert!(legacy_q_score_bins(InstrumentType::HiSeq, 0).is_none());
        assert!(legacy_q_score_bins(InstrumentType::HiSeq, 8).is_none());
        assert!(legacy_q_score_bins(InstrumentType::NextSeq, 8).is_none());
        for count in 2..=7 {
            let bins = legacy_q_score_bins(InstrumentType::MiSeq, count).unwrap();
            assert_eq!(bins.len(), count);
        }
        let nextseq = legacy_q_score_bins(InstrumentType::NextSeq, 3).unwrap();
        assert_eq!(nextseq.len(), 6);
        assert_eq!(nextseq[0], QScoreBin::new(0, 9, 8));
        assert_eq!(
            legacy_q_score_bins(InstrumentType::HiSeq, 2).unwrap(),
            &[QScoreBin::new(0, 27, 13), QScoreBin::new(28, 49, 35)]
        );
    }

    #[test]
    fn test_populate_legacy_keeps_existing_bins() {
        let mut bins = vec![QScoreBin::new(1, 50, 30)];
        populate_legacy_q_score_bins(&mut bins, InstrumentType::HiSeq, 3);
        assert_eq!(bins.len(), 1);

        let mut bins = Vec::new();
        populate_legacy_q_score_bins(&mut bins, InstrumentType::HiSeq, 9);
        assert!(bins.is_empty());
        populate_legacy_q_score_bins(&mut bins, InstrumentType::HiSeq, 3);
        assert_eq!(bins, LEGACY_BINS_3.to_vec());
    }

    #[test]
    fn test_single_qscore_gets_one_bin() {
        assert!(requires_legacy_bins(1));
        let mut bins = Vec::new();
        populate_legacy_q_score_bins(&mut bins, InstrumentType::MiSeq, 1);
        assert_eq!(bins, vec![QScoreBin::new(0, 50, 20)]);
    }

    fn legacy_set(slots: &[usize]) -> MetricSet<QMetric> {
        let mut histogram = vec![0u32; MAX_Q_BINS];
        for &slot in slots {
            histogram[slot] = 10;
        }
        let mut metrics = MetricSet::<QMetric>::new(4);
        metrics.insert(QMetric::new(1, 1101, 1, histogram.clone()));
        metrics.insert(QMetric::new(1, 1102, 1, histogram));
        metrics
    }

    #[test]
    fn test_count_legacy_bins() {
        assert_eq!(count_legacy_q_score_bins(&legacy_set(&[5, 14, 21, 26, 32, 36, 39])), 7);
        assert_eq!(count_legacy_q_score_bins(&legacy_set(&[12, 34])), 2);
        assert_eq!(count_legacy_q_score_bins(&legacy_set(&(0..20).collect::<Vec<_>>())), 20);

        let mut newer = legacy_set(&[12, 34]);
        newer.set_version(5);
        assert_eq!(count_legacy_q_score_bins(&newer), 0);

        let mut binned = legacy_set(&[12, 34]);
        binned.header_mut().bins_mut().push(QScoreBin::new(0, 49, 20));
        assert_eq!(count_legacy_q_score_bins(&binned), 0);
    }

    #[test]
    fn test_compress_legacy_set() {
        let mut metrics = legacy_set(&[6, 19, 33]);
        let count = count_legacy_q_score_bins(&metrics);
        assert_eq!(count, 3);
        populate_legacy_q_score_bins(metrics.header_mut().bins_mut(), InstrumentType::HiSeq, count);
        assert!(!is_compressed(&metrics));
        assert_eq!(max_qval(&metrics), MAX_Q_BINS);

        compress_q_metrics(&mut metrics);
        assert!(is_compressed(&metrics));
        assert_eq!(count_q_metric_bins(&metrics), 3);
        assert_eq!(metrics[0].histogram(), &[10, 10, 10]);
        assert_eq!(max_qval(&metrics), 49);
        assert_eq!(index_for_q_value(&metrics, 30), 2);

        let before = metrics.metrics().to_vec();
        compress_q_metrics(&mut metrics);
        assert_eq!(metrics.metrics(), before.as_slice());
    }

    #[test]
    fn test_compress_requires_bins() {
        let mut metrics = legacy_set(&[6, 19, 33]);
        compress_q_metrics(&mut metrics);
        assert_eq!(count_q_metric_bins(&metrics), MAX_Q_BINS);
        assert_eq!(index_for_q_value(&metrics, 30), 29);
    }

    #[test]
    fn test_create_q_metrics_by_lane() {
        let mut metrics = MetricSet::<QMetric>::new(6);
        metrics.insert(QMetric::new(1, 1101, 1, vec![1; MAX_Q_BINS]));
        metrics.insert(QMetric::new(1, 1102, 1, vec![2; MAX_Q_BINS]));
        metrics.insert(QMetric::new(1, 1101, 2, vec![3; MAX_Q_BINS]));
        metrics.insert(QMetric::new(2, 1101, 1, vec![4; MAX_Q_BINS]));

        let by_lane = create_q_metrics_by_lane(&metrics, InstrumentType::HiSeq);
        assert_eq!(by_lane.version(), 6);
        assert_eq!(by_lane.len(), 3);
        let lane_one = &by_lane[0];
        assert_eq!((lane_one.lane(), lane_one.tile(), lane_one.cycle()), (1, 0, 1));
        assert!(lane_one.histogram().iter().all(|&count| count == 3));
        assert_eq!(by_lane.lanes(), vec![1, 2]);
    }

    #[test]
    fn test_create_q_metrics_by_lane_legacy() {
        let metrics = legacy_set(&[6, 19, 33]);
        let by_lane = create_q_metrics_by_lane(&metrics, InstrumentType::HiSeq);
        assert_eq!(by_lane.header().bins(), &LEGACY_BINS_3);
        assert_eq!(by_lane.len(), 1);
        assert_eq!(by_lane[0].histogram(), &[20, 20, 20]);
    }

    #[test]
    fn test_create_collapse_q_metrics() {
        let mut histogram = vec![0u32; MAX_Q_BINS];
        histogram[9] = 10;
        histogram[24] = 20;
        histogram[34] = 70;
        let mut metrics = MetricSet::<QMetric>::new(6);
        metrics.insert(QMetric::new(3, 2104, 5, histogram));
        metrics.insert(QMetric::new(3, 2105, 5, vec![0; MAX_Q_BINS]));

        let collapsed = create_collapse_q_metrics(&metrics);
        assert_eq!(collapsed.version(), 6);
        let summary = &collapsed[0];
        assert_eq!((summary.q20(), summary.q30(), summary.total()), (90, 70, 100));
        assert!((summary.median_qscore() - 35.0).abs() < f32::EPSILON);
        assert!(collapsed[1].median_qscore().is_nan());
    }
}
