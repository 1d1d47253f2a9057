use std::io::{ErrorKind, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{FormatError, ReadError, Result, WriteError};
use crate::record::{IdLayout, Metric};

/// Reads until `buffer` is full or the stream ends, returning the number of bytes read
///
/// Unlike `read_exact`, a short read is not an error: the caller decides
/// whether a partial unit means a clean end or a truncated file.
pub fn read_fill<R: Read + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Fills `buffer` completely or fails with [`ReadError::IncompleteFile`]
pub fn read_payload<R: Read + ?Sized>(reader: &mut R, buffer: &mut [u8]) -> Result<()> {
    let got = read_fill(reader, buffer)?;
    if got < buffer.len() {
        return Err(ReadError::IncompleteFile {
            got,
            expected: buffer.len(),
        }
        .into());
    }
    Ok(())
}

/// Reads a single header byte
pub fn read_header_byte<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_payload(reader, &mut byte)?;
    Ok(byte[0])
}

/// Reads the record-size byte and checks it against the size of the layout
pub fn read_record_size<R: Read + ?Sized>(reader: &mut R, layout: usize) -> Result<usize> {
    let declared = usize::from(read_header_byte(reader)?);
    if declared != layout {
        return Err(FormatError::LayoutSizeMismatch { declared, layout }.into());
    }
    Ok(declared)
}

/// Reads the identity fields of a record into `metric`
///
/// Returns the number of bytes read, which is less than the identity size only
/// when the stream ended.
pub fn read_id<R: Read + ?Sized, M: Metric>(reader: &mut R, metric: &mut M) -> Result<usize> {
    let mut buffer = [0u8; 6];
    let size = M::ID_LAYOUT.size();
    let got = read_fill(reader, &mut buffer[..size])?;
    if got < size {
        return Ok(got);
    }
    let base = metric.base_mut();
    base.lane = u32::from(LittleEndian::read_u16(&buffer[0..2]));
    base.tile = u32::from(LittleEndian::read_u16(&buffer[2..4]));
    if M::ID_LAYOUT != IdLayout::Tile {
        base.cycle = u32::from(LittleEndian::read_u16(&buffer[4..6]));
    }
    Ok(got)
}

/// Writes the record-size byte of a header
pub fn write_record_size<W: Write + ?Sized>(writer: &mut W, size: usize) -> Result<()> {
    let size = u8::try_from(size).map_err(|_| FormatError::RecordSizeOverflow(size))?;
    writer.write_u8(size)?;
    Ok(())
}

/// Writes the identity fields of `metric`
///
/// Nothing is written when a coordinate does not fit its 16-bit field.
pub fn write_id<W: Write + ?Sized, M: Metric>(writer: &mut W, metric: &M) -> Result<()> {
    let base = *metric.base();
    let cycle = if M::ID_LAYOUT == IdLayout::Tile { 0 } else { base.cycle };
    let out_of_range = || WriteError::IdentityOutOfRange {
        lane: base.lane,
        tile: base.tile,
        cycle,
    };

    let fields = [base.lane, base.tile, cycle]
        .map(|value| u16::try_from(value).map_err(|_| out_of_range()));

    let mut buffer = [0u8; 6];
    for (chunk, field) in buffer.chunks_exact_mut(2).zip(fields) {
        LittleEndian::write_u16(chunk, field?);
    }
    writer.write_all(&buffer[..M::ID_LAYOUT.size()])?;
    Ok(())
}

/// Reads a string prefixed by its `u16` length
///
/// Returns the string and the number of bytes consumed. An empty string is
/// reported as `"NA"`.
pub fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<(String, usize)> {
    let mut len = [0u8; 2];
    read_payload(reader, &mut len)?;
    let len = usize::from(LittleEndian::read_u16(&len));
    if len == 0 {
        return Ok((String::from("NA"), 2));
    }
    let mut buffer = vec![0u8; len];
    read_payload(reader, &mut buffer)?;
    let value = String::from_utf8_lossy(&buffer).into_owned();
    Ok((value, 2 + len))
}

/// Writes a string prefixed by its `u16` length
pub fn write_string<W: Write + ?Sized>(writer: &mut W, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| WriteError::StringTooLong(value.len()))?;
    writer.write_u16::<LittleEndian>(len)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// Bytes occupied by a string written with [`write_string`]
pub fn string_size(value: &str) -> usize {
    2 + value.len()
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::record::{ErrorMetric, TileMetric};
    use anyhow::Result;
    use std::io::Cursor;

    #[test]
    fn test_read_fill_short() -> Result<()> {
        let mut buffer = [0u8; 8];
        let got = read_fill(&mut Cursor::new([1u8, 2, 3]), &mut buffer)?;
        assert_eq!(got, 3);
        assert_eq!(&buffer[..3], &[1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_read_payload_incomplete() {
        let mut buffer = [0u8; 4];
        let err = read_payload(&mut Cursor::new([1u8, 2]), &mut buffer).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_record_size_mismatch() {
        let err = read_record_size(&mut Cursor::new([29u8]), 30).unwrap_err();
        assert!(err.is_bad_format());
    }

    #[test]
    fn test_record_size_must_fit_a_byte() -> Result<()> {
        let mut buffer = Vec::new();
        write_record_size(&mut buffer, 255)?;
        assert_eq!(buffer, [255]);

        let err = write_record_size(&mut buffer, 256).unwrap_err();
        assert!(err.is_bad_format());
        assert_eq!(buffer.len(), 1);
        Ok(())
    }

    #[test]
    fn test_write_id_rejects_wide_coordinates() -> Result<()> {
        let mut buffer = Vec::new();
        write_id(&mut buffer, &ErrorMetric::new(1, 1101, 65_535, 0.0))?;
        assert_eq!(buffer, [1, 0, 0x4D, 0x04, 0xFF, 0xFF]);

        let mut buffer = Vec::new();
        for metric in [
            ErrorMetric::new(1, 70_000, 1, 0.0),
            ErrorMetric::new(70_000, 1101, 1, 0.0),
            ErrorMetric::new(1, 1101, 65_536, 0.0),
        ] {
            let err = write_id(&mut buffer, &metric).unwrap_err();
            assert!(matches!(
                err,
                crate::Error::WriteError(WriteError::IdentityOutOfRange { .. })
            ));
        }
        assert!(buffer.is_empty());

        write_id(&mut buffer, &TileMetric::new(2, 2201, 0.0, 0.0, 0.0, 0.0))?;
        assert_eq!(buffer, [2, 0, 0x99, 0x08]);
        Ok(())
    }

    #[test]
    fn test_string_roundtrip() -> Result<()> {
        let mut buffer = Vec::new();
        write_string(&mut buffer, "ACGTACGT-TTGGCCAA")?;
        assert_eq!(buffer.len(), string_size("ACGTACGT-TTGGCCAA"));

        let (value, consumed) = read_string(&mut Cursor::new(buffer))?;
        assert_eq!(value, "ACGTACGT-TTGGCCAA");
        assert_eq!(consumed, 19);
        Ok(())
    }

    #[test]
    fn test_empty_string_reads_as_na() -> Result<()> {
        let (value, consumed) = read_string(&mut Cursor::new([0u8, 0]))?;
        assert_eq!(value, "NA");
        assert_eq!(consumed, 2);
        Ok(())
    }

    #[test]
    fn test_string_too_long() {
        let value = "A".repeat(usize::from(u16::MAX) + 1);
        let err = write_string(&mut Vec::new(), &value).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::WriteError(WriteError::StringTooLong(_))
        ));
    }
}
