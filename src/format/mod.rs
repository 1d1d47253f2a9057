//! Versioned binary layouts
//!
//! Every metric kind has one [`Codec`] per supported on-disk version. Codecs are
//! collected in a per-kind [`FormatRegistry`] which the reader and writer consult
//! with the version byte found at the start of a stream.

mod registry;
mod utils;

use std::io::{Read, Write};

use auto_impl::auto_impl;

pub use registry::{init, is_deprecated, supported_versions, FormatRegistry};
pub(crate) use utils::{
    read_fill, read_header_byte, read_id, read_payload, read_record_size, read_string,
    string_size, write_id, write_record_size, write_string,
};

use crate::error::Result;
use crate::record::Metric;

/// Reader and writer for one version of one metric kind
///
/// The version byte itself is handled by the stream engine; a codec is only
/// concerned with what follows it.
#[auto_impl(&, Box, Arc)]
pub trait Codec<M: Metric>: Send + Sync {
    /// Version byte this codec handles
    fn version(&self) -> u8;

    /// Whether the version is deprecated (still readable, warned about)
    fn is_deprecated(&self) -> bool {
        false
    }

    /// Reads the header following the version byte
    ///
    /// Returns the record size declared by the stream, which every subsequent
    /// record must consume exactly.
    fn read_header(&self, reader: &mut dyn Read, header: &mut M::Header) -> Result<usize>;

    /// Reads the payload of one record after its identity has been read
    ///
    /// `is_new` is false when `metric` already holds data from an earlier record
    /// with the same identity. Returns the number of payload bytes consumed.
    fn read_record(
        &self,
        reader: &mut dyn Read,
        metric: &mut M,
        header: &M::Header,
        is_new: bool,
    ) -> Result<usize>;

    /// Writes everything of the header after the version byte
    fn write_header(&self, writer: &mut dyn Write, header: &M::Header) -> Result<()>;

    /// Writes one metric, identity included
    fn write_record(&self, writer: &mut dyn Write, metric: &M, header: &M::Header) -> Result<()>;

    /// Size of a single on-disk record, identity included
    fn record_size(&self, header: &M::Header) -> usize;

    /// Size of the header, version byte included
    fn header_size(&self, header: &M::Header) -> usize;

    /// Bytes written by [`Codec::write_record`] for `metric`
    fn encoded_size(&self, _metric: &M, header: &M::Header) -> usize {
        self.record_size(header)
    }
}
