//! Locations of metric files inside a run folder
//!
//! Metric files live in `<run>/InterOp/` and are named
//! `<Prefix>Metrics<Suffix>[Out].bin`. Older instruments also wrote one file per
//! cycle into `<run>/InterOp/C<cycle>.1/`.

use std::path::{Path, PathBuf};

use crate::constants::MetricKind;

/// Name of the metric directory inside a run folder
pub const INTEROP_DIR: &str = "InterOp";

/// `<run>/InterOp`
pub fn interop_directory<P: AsRef<Path>>(run_dir: P) -> PathBuf {
    run_dir.as_ref().join(INTEROP_DIR)
}

/// File name of a metric kind, e.g. `ErrorMetricsOut.bin`
#[must_use]
pub fn interop_basename(kind: MetricKind, use_out: bool) -> String {
    let out = if use_out { "Out" } else { "" };
    format!("{}Metrics{}{out}.bin", kind.prefix(), kind.suffix())
}

/// `<run>/InterOp/<basename>`
pub fn interop_filename<P: AsRef<Path>>(run_dir: P, kind: MetricKind, use_out: bool) -> PathBuf {
    interop_directory(run_dir).join(interop_basename(kind, use_out))
}

/// `<run>/InterOp/C<cycle>.1`
pub fn cycle_directory<P: AsRef<Path>>(run_dir: P, cycle: u32) -> PathBuf {
    let mut buffer = itoa::Buffer::new();
    let mut name = String::with_capacity(8);
    name.push('C');
    name.push_str(buffer.format(cycle));
    name.push_str(".1");
    interop_directory(run_dir).join(name)
}

/// `<run>/InterOp/C<cycle>.1/<basename>`
pub fn interop_cycle_filename<P: AsRef<Path>>(
    run_dir: P,
    kind: MetricKind,
    cycle: u32,
    use_out: bool,
) -> PathBuf {
    cycle_directory(run_dir, cycle).join(interop_basename(kind, use_out))
}

/// Whether a metric file of `kind` exists under either spelling
pub fn exists<P: AsRef<Path>>(run_dir: P, kind: MetricKind) -> bool {
    find_interop(run_dir, kind).is_some()
}

/// Path of the metric file of `kind`, probing the `Out` spelling first
pub fn find_interop<P: AsRef<Path>>(run_dir: P, kind: MetricKind) -> Option<PathBuf> {
    [true, false]
        .into_iter()
        .map(|use_out| interop_filename(run_dir.as_ref(), kind, use_out))
        .find(|path| path.is_file())
}

/// Path of a per-cycle metric file of `kind`, probing the `Out` spelling first
pub fn find_interop_cycle<P: AsRef<Path>>(run_dir: P, kind: MetricKind, cycle: u32) -> Option<PathBuf> {
    [true, false]
        .into_iter()
        .map(|use_out| interop_cycle_filename(run_dir.as_ref(), kind, cycle, use_out))
        .find(|path| path.is_file())
}
