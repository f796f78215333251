//! Rounding, percentages and label canonicalization shared by the families.

/// Rounds half-up to the nearest integer; NaN reads as zero.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Rounds to two decimals, half-up.
pub fn round2(value: f64) -> f64 {
    round_half_up(value * 100.0) as f64 / 100.0
}

/// Weighted average duration in whole milliseconds, rounded once.
pub fn average_millis(duration_sum: f64, count: i64) -> i64 {
    if count <= 0 {
        return 0;
    }
    round_half_up(duration_sum / count as f64)
}

/// Two-decimal percentages of `values` that sum to exactly 100 when any value
/// is positive.
///
/// Hundredths of a percent are apportioned by largest remainder; ties go to
/// the earlier entry.
pub fn percentages(values: &[i64]) -> Vec<f64> {
    let total: i128 = values.iter().map(|value| i128::from((*value).max(0))).sum();
    if total == 0 {
        return vec![0.0; values.len()];
    }

    let scaled: Vec<(i128, i128)> = values
        .iter()
        .map(|value| {
            let numerator = i128::from((*value).max(0)) * 10_000;
            (numerator / total, numerator % total)
        })
        .collect();
    let mut units: Vec<i128> = scaled.iter().map(|(floor, _)| *floor).collect();
    let deficit = 10_000 - units.iter().sum::<i128>();

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|left, right| scaled[*right].1.cmp(&scaled[*left].1));
    for index in order.into_iter().take(usize::try_from(deficit).unwrap_or(0)) {
        units[index] += 1;
    }

    units.into_iter().map(|unit| unit as f64 / 100.0).collect()
}

/// Maps raw enum strings to display labels: `TECH_DEBT` becomes `Tech debt`.
pub fn canonical_label(raw: &str) -> String {
    let spaced = raw.trim().replace(['_', '-'], " ").to_lowercase();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

/// `+12.50% vs previous period` style subtitle; `None` without a baseline.
pub fn trend_subtitle(current: f64, previous: f64) -> Option<String> {
    if previous == 0.0 {
        return None;
    }
    let change = round2((current - previous) / previous * 100.0);
    Some(format!("{change:+.2}% vs previous period"))
}
