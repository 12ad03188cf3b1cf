/// Nearest-rank percentile of `values`.
///
/// Returns the smallest sample such that at least `p` percent of the samples
/// are less than or equal to it, so the result is always an observed pixel
/// value (a real year, never an interpolated one). `values` is sorted in place.
/// Non-finite samples must be filtered out beforehand.
pub fn percentile_nearest_rank(values: &mut [f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    Some(values[index])
}

/// Format a statistic for a tabular cell; absent values become an empty cell.
/// Whole numbers (years) are written without a fractional part.
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile_nearest_rank(&mut [], 5.0), None);
    }

    #[test]
    fn test_percentile_single() {
        assert_eq!(percentile_nearest_rank(&mut [1978.0], 5.0), Some(1978.0));
    }

    #[test]
    fn test_percentile_low_rank() {
        let mut values: Vec<f64> = (0..20).map(|i| 2000.0 - i as f64).collect();
        // 5% of 20 samples is rank 1: the minimum
        assert_eq!(percentile_nearest_rank(&mut values, 5.0), Some(1981.0));

        let mut values: Vec<f64> = (0..40).map(|i| 1960.0 + i as f64).collect();
        // 5% of 40 samples is rank 2
        assert_eq!(percentile_nearest_rank(&mut values, 5.0), Some(1961.0));
    }

    #[test]
    fn test_percentile_bounds() {
        let mut values = vec![3.0, 1.0, 2.0];
        assert_eq!(percentile_nearest_rank(&mut values, 0.0), Some(1.0));
        assert_eq!(percentile_nearest_rank(&mut values, 100.0), Some(3.0));
        assert_eq!(percentile_nearest_rank(&mut values, 50.0), Some(2.0));
    }

    #[test]
    fn test_format_cell() {
        assert_eq!(format_cell(None), "");
        assert_eq!(format_cell(Some(1978.0)), "1978");
        assert_eq!(format_cell(Some(1978.5)), "1978.5");
    }
}
