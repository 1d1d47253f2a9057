use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;

use super::{Accumulate, IdLayout, Metric, MetricBase, QMetric, QRecord, QV6};
use crate::constants::MetricKind;
use crate::format::FormatRegistry;
use crate::header::QHeader;

/// Q-score histogram of a whole lane at a given cycle
///
/// The tile of every record is 0, so tile ids are not checked while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QByLaneMetric(QMetric);
impl QByLaneMetric {
    #[must_use]
    pub fn new(lane: u32, cycle: u32, histogram: Vec<u32>) -> Self {
        Self(QMetric::new(lane, 0, cycle, histogram))
    }
}
impl From<QMetric> for QByLaneMetric {
    fn from(metric: QMetric) -> Self {
        Self(metric)
    }
}
impl Deref for QByLaneMetric {
    type Target = QMetric;

    fn deref(&self) -> &QMetric {
        &self.0
    }
}
impl DerefMut for QByLaneMetric {
    fn deref_mut(&mut self) -> &mut QMetric {
        &mut self.0
    }
}
impl AsRef<QMetric> for QByLaneMetric {
    fn as_ref(&self) -> &QMetric {
        &self.0
    }
}
impl AsMut<QMetric> for QByLaneMetric {
    fn as_mut(&mut self) -> &mut QMetric {
        &mut self.0
    }
}
impl Metric for QByLaneMetric {
    type Header = QHeader;
    const KIND: MetricKind = MetricKind::QByLane;
    const LATEST_VERSION: u8 = 6;
    const ID_LAYOUT: IdLayout = IdLayout::Cycle;
    const CHECK_TILE_ID: bool = false;

    fn base(&self) -> &MetricBase {
        self.0.base()
    }

    fn base_mut(&mut self) -> &mut MetricBase {
        self.0.base_mut()
    }

    fn registry() -> &'static FormatRegistry<Self> {
        static REGISTRY: OnceLock<FormatRegistry<QByLaneMetric>> = OnceLock::new();
        REGISTRY.get_or_init(|| FormatRegistry::new().with(QV6::<QByLaneMetric>::new()))
    }
}
impl QRecord for QByLaneMetric {}
impl Accumulate for QByLaneMetric {
    fn accumulate_self(&mut self) {
        self.0.accumulate_self();
    }

    fn accumulate_from(&mut self, previous: &Self) {
        self.0.accumulate_from(&previous.0);
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{read_metrics, write_metrics, MetricSet};
    use anyhow::Result;

    #[test]
    fn test_q_by_lane_keeps_tile_zero() -> Result<()> {
        let mut metrics = MetricSet::<QByLaneMetric>::new(6);
        metrics.insert(QByLaneMetric::new(1, 1, vec![5; 50]));
        metrics.insert(QByLaneMetric::new(2, 1, vec![7; 50]));

        let buffer = write_metrics(Vec::new(), &metrics, None)?;
        let mut decoded = MetricSet::<QByLaneMetric>::default();
        read_metrics(buffer.as_slice(), &mut decoded)?;
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.at(1).unwrap().tile(), 0);
        assert_eq!(decoded.at(1).unwrap().histogram(), &[7; 50]);
        Ok(())
    }

    #[test]
    fn test_q_by_lane_rejects_version_5() {
        assert!(QByLaneMetric::registry().lookup(5).is_err());
    }
}
