use std::collections::BTreeMap;

use crate::constants::MetricKind;
use crate::error::{FormatError, Result};
use crate::format::Codec;
use crate::record::{
    CorrectedIntensityMetric, ErrorMetric, ExtractionMetric, ImageMetric, IndexMetric, Metric,
    QByLaneMetric, QCollapsedMetric, QMetric, TileMetric,
};

/// Table of codecs for one metric kind, keyed by version
///
/// The process-wide registries are built once on first use through
/// [`Metric::registry`] and are read-only afterwards.
pub struct FormatRegistry<M: Metric> {
    codecs: BTreeMap<u8, Box<dyn Codec<M>>>,
}
impl<M: Metric> Default for FormatRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
impl<M: Metric> FormatRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Adds a codec to the table
    ///
    /// # Panics
    ///
    /// Registering two codecs for the same version of a kind is a programming
    /// error and panics.
    pub fn register<C: Codec<M> + 'static>(&mut self, codec: C) {
        let version = codec.version();
        assert!(
            !self.codecs.contains_key(&version),
            "duplicate codec registered for {} metrics version {version}",
            M::KIND
        );
        self.codecs.insert(version, Box::new(codec));
    }

    /// Builder form of [`FormatRegistry::register`]
    #[must_use]
    pub fn with<C: Codec<M> + 'static>(mut self, codec: C) -> Self {
        self.register(codec);
        self
    }

    /// Returns the codec for `version`
    pub fn lookup(&self, version: u8) -> Result<&dyn Codec<M>> {
        match self.codecs.get(&version) {
            Some(codec) => Ok(&**codec),
            None => Err(FormatError::UnknownVersion {
                kind: M::KIND,
                version,
            }
            .into()),
        }
    }

    #[must_use]
    pub fn contains(&self, version: u8) -> bool {
        self.codecs.contains_key(&version)
    }

    /// Whether `version` is registered and flagged as deprecated
    #[must_use]
    pub fn is_deprecated(&self, version: u8) -> bool {
        self.codecs
            .get(&version)
            .is_some_and(|codec| codec.is_deprecated())
    }

    /// Registered versions in ascending order
    pub fn versions(&self) -> impl Iterator<Item = u8> + '_ {
        self.codecs.keys().copied()
    }
}

/// Builds every process-wide registry
///
/// Registries are otherwise built lazily on first use, so calling this is
/// optional; it moves the one-time cost to a point of the caller's choosing.
pub fn init() {
    let _ = CorrectedIntensityMetric::registry();
    let _ = ErrorMetric::registry();
    let _ = ExtractionMetric::registry();
    let _ = ImageMetric::registry();
    let _ = IndexMetric::registry();
    let _ = QMetric::registry();
    let _ = QByLaneMetric::registry();
    let _ = QCollapsedMetric::registry();
    let _ = TileMetric::registry();
}

/// Whether `version` of `kind` is deprecated
#[must_use]
pub fn is_deprecated(kind: MetricKind, version: u8) -> bool {
    match kind {
        MetricKind::CorrectedIntensity => CorrectedIntensityMetric::registry().is_deprecated(version),
        MetricKind::Error => ErrorMetric::registry().is_deprecated(version),
        MetricKind::Extraction => ExtractionMetric::registry().is_deprecated(version),
        MetricKind::Image => ImageMetric::registry().is_deprecated(version),
        MetricKind::Index => IndexMetric::registry().is_deprecated(version),
        MetricKind::Q => QMetric::registry().is_deprecated(version),
        MetricKind::QByLane => QByLaneMetric::registry().is_deprecated(version),
        MetricKind::QCollapsed => QCollapsedMetric::registry().is_deprecated(version),
        MetricKind::Tile => TileMetric::registry().is_deprecated(version),
    }
}

/// Versions of `kind` that can be read and written
#[must_use]
pub fn supported_versions(kind: MetricKind) -> Vec<u8> {
    match kind {
        MetricKind::CorrectedIntensity => CorrectedIntensityMetric::registry().versions().collect(),
        MetricKind::Error => ErrorMetric::registry().versions().collect(),
        MetricKind::Extraction => ExtractionMetric::registry().versions().collect(),
        MetricKind::Image => ImageMetric::registry().versions().collect(),
        MetricKind::Index => IndexMetric::registry().versions().collect(),
        MetricKind::Q => QMetric::registry().versions().collect(),
        MetricKind::QByLane => QByLaneMetric::registry().versions().collect(),
        MetricKind::QCollapsed => QCollapsedMetric::registry().versions().collect(),
        MetricKind::Tile => TileMetric::registry().versions().collect(),
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::record::ErrorV3;
    use std::sync::Arc;

    #[test]
    fn test_lookup_unknown_version() {
        let err = ErrorMetric::registry().lookup(34).err().unwrap();
        assert!(err.is_bad_format());
    }

    #[test]
    fn test_lookup_known_version() -> anyhow::Result<()> {
        let codec = ErrorMetric::registry().lookup(3)?;
        assert_eq!(codec.version(), 3);
        assert!(!codec.is_deprecated());
        Ok(())
    }

    #[test]
    #[should_panic(expected = "duplicate codec")]
    fn test_duplicate_registration_panics() {
        let _ = FormatRegistry::<ErrorMetric>::new()
            .with(ErrorV3)
            .with(Arc::new(ErrorV3));
    }

    #[test]
    fn test_shared_codec_registration() {
        let registry = FormatRegistry::<ErrorMetric>::new().with(Arc::new(ErrorV3));
        assert!(registry.contains(3));
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_supported_versions() {
        init();
        assert_eq!(supported_versions(MetricKind::Q), vec![4, 5, 6]);
        assert_eq!(supported_versions(MetricKind::Image), vec![1, 2]);
        assert_eq!(supported_versions(MetricKind::QCollapsed), vec![2, 3, 4, 5, 6]);
        assert!(is_deprecated(MetricKind::Image, 1));
        assert!(!is_deprecated(MetricKind::Image, 2));
        assert!(!is_deprecated(MetricKind::Tile, 99));
    }
}
