//! Derived analytics over decoded metric sets

pub mod index;
pub mod q;

pub use index::populate_indices;
pub use q::{
    compress_q_metrics, count_legacy_q_score_bins, count_q_metric_bins, create_collapse_q_metrics,
    create_q_metrics_by_lane, index_for_q_value, is_compressed, legacy_q_score_bins, max_qval,
    populate_cumulative_distribution, populate_legacy_q_score_bins, requires_legacy_bins,
};
