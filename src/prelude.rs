pub use crate::format::Codec;
pub use crate::record::{Accumulate, Metric, QRecord};
