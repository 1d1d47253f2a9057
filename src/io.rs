//! Reading and writing metric sets from files, buffers, and run folders

use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::{ReadError, Result};
use crate::metric_set::MetricSet;
use crate::paths::{find_interop, find_interop_cycle, interop_directory, interop_filename};
use crate::reader::{self, read_metrics};
use crate::record::Metric;
use crate::writer::{self, buffer_size, write_metrics};

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ReadError::FileNotFound(path.to_path_buf()).into(),
        _ => err.into(),
    })
}

/// Maps the file at `path` into memory
///
/// Zero-length files are reported as empty without mapping them.
fn map(path: &Path) -> Result<Mmap> {
    let file = open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(ReadError::EmptyFile.into());
    }

    // Safety: the file is open and won't be modified while mapped
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Decodes the file at `path` into `metrics`
pub fn read_path_into<M: Metric, P: AsRef<Path>>(path: P, metrics: &mut MetricSet<M>) -> Result<()> {
    let mmap = map(path.as_ref())?;
    read_metrics(&mmap[..], metrics)
}

/// Decodes the file at `path`
pub fn read_path<M: Metric, P: AsRef<Path>>(path: P) -> Result<MetricSet<M>> {
    let mut metrics = MetricSet::<M>::default();
    read_path_into(path, &mut metrics)?;
    Ok(metrics)
}

/// Decodes an in-memory metric stream into `metrics`
pub fn read_buffer_into<M: Metric>(buffer: &[u8], metrics: &mut MetricSet<M>) -> Result<()> {
    read_metrics(buffer, metrics)
}

/// Decodes an in-memory metric stream
pub fn read_buffer<M: Metric>(buffer: &[u8]) -> Result<MetricSet<M>> {
    reader::decode(buffer)
}

/// Reads only the version byte and header of the file at `path`
pub fn read_header_only<M: Metric, P: AsRef<Path>>(path: P) -> Result<(u8, M::Header)> {
    let mmap = map(path.as_ref())?;
    reader::read_header_only::<_, M>(&mmap[..])
}

/// Decodes the metric file of `M`'s kind found in `run_dir` into `metrics`
///
/// Both the `Out` and plain file names are tried, in that order.
pub fn read_interop_into<M: Metric, P: AsRef<Path>>(run_dir: P, metrics: &mut MetricSet<M>) -> Result<()> {
    match find_interop(run_dir.as_ref(), M::KIND) {
        Some(path) => read_path_into(path, metrics),
        None => Err(ReadError::FileNotFound(interop_filename(run_dir, M::KIND, true)).into()),
    }
}

/// Decodes the metric file of `M`'s kind found in `run_dir`
pub fn read_interop<M: Metric, P: AsRef<Path>>(run_dir: P) -> Result<MetricSet<M>> {
    let mut metrics = MetricSet::<M>::default();
    read_interop_into(run_dir, &mut metrics)?;
    Ok(metrics)
}

/// Decodes the per-cycle files `C1.1` through `C<last_cycle>.1` into `metrics`
///
/// Each file is decoded on its own and merged into `metrics` only once it was
/// read completely. Missing cycles are skipped. Truncated files contribute no
/// records; their paths are collected and reported together as
/// [`ReadError::IncompleteFiles`] once every cycle has been read. Format errors
/// abort immediately.
pub fn read_by_cycle_into<M: Metric, P: AsRef<Path>>(
    run_dir: P,
    metrics: &mut MetricSet<M>,
    last_cycle: u32,
) -> Result<()> {
    let run_dir = run_dir.as_ref();
    let mut incomplete: Vec<PathBuf> = Vec::new();
    for cycle in 1..=last_cycle {
        let Some(path) = find_interop_cycle(run_dir, M::KIND, cycle) else {
            debug!(kind = %M::KIND, cycle, "no per-cycle metric file");
            continue;
        };
        let mut cycle_metrics = MetricSet::<M>::default();
        match read_path_into(&path, &mut cycle_metrics) {
            Ok(()) => metrics.merge(cycle_metrics),
            Err(err) if err.is_incomplete() => {
                debug!(path = %path.display(), error = %err, "skipping incomplete per-cycle metric file");
                incomplete.push(path);
            }
            Err(err) if err.is_file_not_found() => {
                debug!(path = %path.display(), "per-cycle metric file vanished");
            }
            Err(err) => return Err(err),
        }
    }
    if incomplete.is_empty() {
        Ok(())
    } else {
        warn!(kind = %M::KIND, files = incomplete.len(), "incomplete per-cycle metric files were skipped");
        Err(ReadError::IncompleteFiles(incomplete).into())
    }
}

/// Encodes `metrics` into a new buffer
pub fn write_buffer<M: Metric>(metrics: &MetricSet<M>, version: Option<u8>) -> Result<Vec<u8>> {
    let buffer = Vec::with_capacity(buffer_size(metrics, version)?);
    write_metrics(buffer, metrics, version)
}

/// Encodes `metrics` to the file at `path`
///
/// The version and header are encoded before the file is created, so an
/// unsupported version or an unencodable header leaves the file system untouched.
pub fn write_path<M: Metric, P: AsRef<Path>>(path: P, metrics: &MetricSet<M>, version: Option<u8>) -> Result<()> {
    let version = version.unwrap_or_else(|| metrics.version());
    writer::write_header_only::<_, M>(std::io::sink(), metrics.header(), version)?;
    let file = File::create(path).map(BufWriter::new)?;
    write_metrics(file, metrics, Some(version))?;
    Ok(())
}

/// Encodes `metrics` to `<run>/InterOp/<basename>`, creating the directory if needed
pub fn write_interop<M: Metric, P: AsRef<Path>>(
    run_dir: P,
    metrics: &MetricSet<M>,
    use_out: bool,
    version: Option<u8>,
) -> Result<()> {
    let version = version.unwrap_or_else(|| metrics.version());
    M::registry().lookup(version)?;
    std::fs::create_dir_all(interop_directory(run_dir.as_ref()))?;
    write_path(interop_filename(run_dir, M::KIND, use_out), metrics, Some(version))
}

/// Writes only the version byte and header to the file at `path`
pub fn write_header_only<M: Metric, P: AsRef<Path>>(path: P, header: &M::Header, version: u8) -> Result<()> {
    writer::write_header_only::<_, M>(std::io::sink(), header, version)?;
    let file = File::create(path).map(BufWriter::new)?;
    writer::write_header_only::<_, M>(file, header, version)?;
    Ok(())
}

/// Writes only the version byte and header to `<run>/InterOp/<basename>`
pub fn write_interop_header<M: Metric, P: AsRef<Path>>(
    run_dir: P,
    header: &M::Header,
    use_out: bool,
    version: u8,
) -> Result<()> {
    M::registry().lookup(version)?;
    std::fs::create_dir_all(interop_directory(run_dir.as_ref()))?;
    write_header_only::<M, _>(interop_filename(run_dir, M::KIND, use_out), header, version)
}
