//! Header module for the interop library
//!
//! Every metric file starts with a version byte followed by a kind-specific header.
//! The header types in this module hold the metadata that survives decoding and
//! is needed again to re-encode a set: q-score bin tables, image channel counts,
//! the declared collapsed record size, and the derived index order.

use std::io::{Read, Write};

use byteorder::WriteBytesExt;

use crate::error::{FormatError, Result};
use crate::format::{read_header_byte, read_payload};

/// Number of slots in an uncompressed q-score histogram (Q1 through Q50)
pub const MAX_Q_BINS: usize = 50;

/// Header for metric kinds without version-specific metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyHeader;

/// A single q-score bin
///
/// All q-scores in `lower..=upper` are reported as `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct QScoreBin {
    pub lower: u16,
    pub upper: u16,
    pub value: u16,
}
impl QScoreBin {
    #[must_use]
    pub const fn new(lower: u16, upper: u16, value: u16) -> Self {
        Self {
            lower,
            upper,
            value,
        }
    }
}

/// Header shared by the q-score histogram kinds
///
/// An empty bin table means the histogram is either unbinned or produced by a
/// legacy instrument whose bins must be inferred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QHeader {
    bins: Vec<QScoreBin>,
}
impl QHeader {
    #[must_use]
    pub fn new(bins: Vec<QScoreBin>) -> Self {
        Self { bins }
    }

    #[must_use]
    pub fn bins(&self) -> &[QScoreBin] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut Vec<QScoreBin> {
        &mut self.bins
    }

    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    #[must_use]
    pub fn is_binned(&self) -> bool {
        !self.bins.is_empty()
    }

    /// Number of histogram slots a record of this header carries
    #[must_use]
    pub fn histogram_len(&self) -> usize {
        if self.bins.is_empty() {
            MAX_Q_BINS
        } else {
            self.bins.len()
        }
    }

    /// Position of the first bin whose representative value is at least `qval`
    ///
    /// Histograms without bins are indexed directly by `qval - 1`.
    #[must_use]
    pub fn index_for_q_value(&self, qval: u16) -> usize {
        if self.bins.is_empty() {
            return usize::from(qval.saturating_sub(1));
        }
        self.bins
            .iter()
            .position(|bin| bin.value >= qval)
            .unwrap_or(self.bins.len())
    }
}

/// Header of the image metric kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageHeader {
    /// Number of channels carried by every record (version 2 and later)
    pub channel_count: u8,
}
impl ImageHeader {
    #[must_use]
    pub fn new(channel_count: u8) -> Self {
        Self { channel_count }
    }
}

/// Header of the collapsed q-score kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QCollapsedHeader {
    /// Record size declared by the file; 0 when the set was built in memory
    pub record_size: u8,
    pub bins: Vec<QScoreBin>,
}

/// Header of the index metric kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexHeader {
    index_order: Vec<String>,
}
impl IndexHeader {
    /// Unique index identifiers in the order they were first seen
    #[must_use]
    pub fn index_order(&self) -> &[String] {
        &self.index_order
    }

    pub fn index_order_mut(&mut self) -> &mut Vec<String> {
        &mut self.index_order
    }
}

/// Reads the optional bin table used by q-score formats v5 and later
///
/// Layout: `has_bins: u8`, then if set `count: u8`, `lower[count]`, `upper[count]`,
/// `value[count]`, all `u8`.
pub(crate) fn read_bins<R: Read + ?Sized>(reader: &mut R, bins: &mut Vec<QScoreBin>) -> Result<()> {
    bins.clear();
    let has_bins = read_header_byte(reader)?;
    if has_bins == 0 {
        return Ok(());
    }
    let count = usize::from(read_header_byte(reader)?);
    let mut buffer = vec![0u8; count * 3];
    read_payload(reader, &mut buffer)?;
    for i in 0..count {
        let value = u16::from(buffer[2 * count + i]);
        if value == 0 || usize::from(value) > MAX_Q_BINS {
            return Err(FormatError::InvalidBinValue(value).into());
        }
        bins.push(QScoreBin::new(
            u16::from(buffer[i]),
            u16::from(buffer[count + i]),
            value,
        ));
    }
    Ok(())
}

/// Checks that every bin maps into the histogram and fits the one-byte fields
pub(crate) fn check_bins(bins: &[QScoreBin]) -> Result<()> {
    if bins.len() > usize::from(u8::MAX) {
        return Err(FormatError::InvalidBinCount(bins.len()).into());
    }
    for bin in bins {
        if bin.value == 0 || usize::from(bin.value) > MAX_Q_BINS {
            return Err(FormatError::InvalidBinValue(bin.value).into());
        }
        if let Some(&bound) = [bin.lower, bin.upper].iter().find(|&&b| u8::try_from(b).is_err()) {
            return Err(FormatError::InvalidBinValue(bound).into());
        }
    }
    Ok(())
}

pub(crate) fn write_bins<W: Write + ?Sized>(writer: &mut W, bins: &[QScoreBin]) -> Result<()> {
    check_bins(bins)?;
    if bins.is_empty() {
        writer.write_u8(0)?;
        return Ok(());
    }
    let mut table = Vec::with_capacity(bins_size(bins));
    table.push(1);
    table.push(bins.len() as u8);
    table.extend(bins.iter().map(|bin| bin.lower as u8));
    table.extend(bins.iter().map(|bin| bin.upper as u8));
    table.extend(bins.iter().map(|bin| bin.value as u8));
    writer.write_all(&table)?;
    Ok(())
}

/// Bytes occupied by the bin table written by [`write_bins`]
pub(crate) fn bins_size(bins: &[QScoreBin]) -> usize {
    if bins.is_empty() {
        1
    } else {
        2 + 3 * bins.len()
    }
}
