/// Converts `value` to a float, mapping the "not available" sentinel to NaN
///
/// On-disk integer fields use a reserved value (usually the type's maximum) to
/// mark a measurement that was never taken.
pub fn sentinel_to_nan<T>(value: T, sentinel: T) -> f32
where
    T: Copy + PartialEq + Into<f64>,
{
    if value == sentinel {
        f32::NAN
    } else {
        value.into() as f32
    }
}

/// `part / total` as a percentage, NaN when `total` is zero
pub fn percent(part: u64, total: u64) -> f32 {
    if total == 0 {
        return f32::NAN;
    }
    (part as f64 / total as f64 * 100.0) as f32
}
