//! Metric kinds and instrument families

use std::fmt;

/// The logical category of a metric file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    CorrectedIntensity,
    Error,
    Extraction,
    Image,
    Index,
    Q,
    QByLane,
    QCollapsed,
    Tile,
}
impl MetricKind {
    /// Every kind supported by the library
    pub const ALL: [MetricKind; 9] = [
        Self::CorrectedIntensity,
        Self::Error,
        Self::Extraction,
        Self::Image,
        Self::Index,
        Self::Q,
        Self::QByLane,
        Self::QCollapsed,
        Self::Tile,
    ];

    /// Name used in front of `Metrics` in the file name
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::CorrectedIntensity => "CorrectedInt",
            Self::Error => "Error",
            Self::Extraction => "Extraction",
            Self::Image => "Image",
            Self::Index => "Index",
            Self::Q | Self::QByLane | Self::QCollapsed => "Q",
            Self::Tile => "Tile",
        }
    }

    /// Name used after `Metrics` in the file name
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::QByLane => "ByLane",
            Self::QCollapsed => "2030",
            _ => "",
        }
    }
}
impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.suffix())
    }
}

/// Instrument family that produced a run
///
/// Only used to select the legacy q-score binning scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstrumentType {
    HiSeq,
    HiScan,
    MiSeq,
    NextSeq,
    MiniSeq,
    NovaSeq,
    #[default]
    Unknown,
}
