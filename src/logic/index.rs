use std::collections::HashSet;

use crate::metric_set::MetricSet;
use crate::record::{IndexMetric, Metric, TileMetric};

/// Records the first-seen order of every sample index and fills cluster counts
///
/// The order of `IndexInfo::unique_id` values, as met while iterating the set,
/// is stored in the header of `indices`. Every index record whose tile has a
/// tile metric then receives that tile's cluster counts.
///
/// Does nothing for an empty set or one whose order was already populated.
pub fn populate_indices(tiles: &MetricSet<TileMetric>, indices: &mut MetricSet<IndexMetric>) {
    if indices.is_empty() || !indices.header().index_order().is_empty() {
        return;
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for metric in indices.iter() {
        for info in metric.indices() {
            let unique_id = info.unique_id();
            if seen.insert(unique_id.clone()) {
                order.push(unique_id);
            }
        }
    }
    *indices.header_mut().index_order_mut() = order;

    for metric in indices.iter_mut() {
        if let Some(tile) = tiles.find(metric.tile_hash()).map(|position| &tiles[position]) {
            metric.set_cluster_counts(tile.cluster_count(), tile.cluster_count_pf());
        }
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::record::IndexInfo;
    use crate::{read_metrics, write_metrics};
    use anyhow::Result;

    fn info(index_seq: &str, sample_id: &str) -> IndexInfo {
        IndexInfo::new(index_seq, sample_id, "ProjA", 100)
    }

    fn index_set() -> MetricSet<IndexMetric> {
        let mut metrics = MetricSet::<IndexMetric>::new(1);
        metrics.insert(IndexMetric::new(1, 1101, 3, vec![info("AAAA", "S1"), info("CCCC", "S2")]));
        metrics.insert(IndexMetric::new(1, 1102, 3, vec![info("GGGG", "S3"), info("AAAA", "S1")]));
        metrics.insert(IndexMetric::new(2, 1101, 3, vec![info("CCCC", "S2"), info("TTTT", "S4")]));
        metrics
    }

    #[test]
    fn test_first_seen_order() -> Result<()> {
        let expected = vec![
            "AAAA-S1-ProjA".to_string(),
            "CCCC-S2-ProjA".to_string(),
            "GGGG-S3-ProjA".to_string(),
            "TTTT-S4-ProjA".to_string(),
        ];

        let mut metrics = index_set();
        populate_indices(&MetricSet::default(), &mut metrics);
        assert_eq!(metrics.header().index_order(), expected.as_slice());

        let buffer = write_metrics(Vec::new(), &index_set(), None)?;
        let mut decoded = MetricSet::<IndexMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        populate_indices(&MetricSet::default(), &mut decoded);
        assert_eq!(decoded.header().index_order(), expected.as_slice());
        Ok(())
    }

    #[test]
    fn test_cluster_counts_backfilled() {
        let mut tiles = MetricSet::<TileMetric>::new(2);
        tiles.insert(TileMetric::new(1, 1101, 250.0, 230.0, 1_000.0, 900.0));
        tiles.insert(TileMetric::new(2, 1101, 260.0, 240.0, 2_000.0, 1_800.0));

        let mut metrics = index_set();
        populate_indices(&tiles, &mut metrics);
        assert!((metrics[0].cluster_count() - 1_000.0).abs() < f32::EPSILON);
        assert!((metrics[0].cluster_count_pf() - 900.0).abs() < f32::EPSILON);
        assert!(metrics[1].cluster_count().is_nan());
        assert!((metrics[2].cluster_count() - 2_000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_already_populated_is_untouched() {
        let mut metrics = index_set();
        metrics
            .header_mut()
            .index_order_mut()
            .push("preset".to_string());

        let mut tiles = MetricSet::<TileMetric>::new(2);
        tiles.insert(TileMetric::new(1, 1101, 250.0, 230.0, 1_000.0, 900.0));
        populate_indices(&tiles, &mut metrics);
        assert_eq!(metrics.header().index_order(), &["preset".to_string()]);
        assert!(metrics[0].cluster_count().is_nan());

        let mut empty = MetricSet::<IndexMetric>::default();
        populate_indices(&tiles, &mut empty);
        assert!(empty.header().index_order().is_empty());
    }
}
