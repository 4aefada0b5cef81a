//! Pixel statistics used by header synthesis.

use std::cmp::Ordering;

use crate::image::buffer::PixelData;

/// Value at percentile `p` (0 to 100) of `values`, nearest-rank.
///
/// Reorders `values` in place. NaNs sort last.
fn select_percentile(values: &mut [f64], p: f64) -> f64 {
    let last = values.len() - 1;
    let rank = ((p / 100.0) * last as f64).round() as usize;
    let rank = rank.min(last);
    let (_, value, _) = values.select_nth_unstable_by(rank, |a, b| {
        a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
    });
    *value
}

/// Intensity range between two percentiles, `None` for empty data.
pub fn percentile_range(data: &PixelData, low: f64, high: f64) -> Option<(f64, f64)> {
    if data.is_empty() {
        return None;
    }
    let mut values = data.to_f64_vec();
    let lo = select_percentile(&mut values, low);
    let hi = select_percentile(&mut values, high);
    match lo.partial_cmp(&hi) {
        Some(Ordering::Greater) => Some((hi, lo)),
        _ => Some((lo, hi)),
    }
}

/// Window centre and width for the range `(min, max)` after applying
/// `value * slope + intercept`.
///
/// The centre is truncated to an integer.
pub fn window_from_range(range: (f64, f64), slope: f64, intercept: f64) -> (f64, f64) {
    let a = range.0 * slope + intercept;
    let b = range.1 * slope + intercept;
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    (((min + max) / 2.0).trunc(), max - min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_range_ignores_outliers() {
        let mut values: Vec<i16> = (0..100).collect();
        values[0] = -30000;
        values[99] = 30000;
        let data = PixelData::I16(values);

        let (lo, hi) = percentile_range(&data, 1.0, 99.0).unwrap();
        assert_eq!(lo, 1.0);
        assert_eq!(hi, 98.0);

        let (lo, hi) = percentile_range(&data, 0.0, 100.0).unwrap();
        assert_eq!((lo, hi), (-30000.0, 30000.0));
    }

    #[test]
    fn test_percentile_range_single_value() {
        let data = PixelData::U8(vec![7]);
        assert_eq!(percentile_range(&data, 1.0, 99.0), Some((7.0, 7.0)));
        assert_eq!(percentile_range(&PixelData::U8(vec![]), 1.0, 99.0), None);
    }

    #[test]
    fn test_window_applies_rescale() {
        let (center, width) = window_from_range((0.0, 1000.0), 2.0, -1000.0);
        assert_eq!(center, 0.0);
        assert_eq!(width, 2000.0);

        // Negative slope flips the range
        let (center, width) = window_from_range((0.0, 10.0), -1.0, 0.0);
        assert_eq!(center, -5.0);
        assert_eq!(width, 10.0);

        let (center, _) = window_from_range((0.0, 3.0), 1.0, 0.0);
        assert_eq!(center, 1.0);
    }
}
