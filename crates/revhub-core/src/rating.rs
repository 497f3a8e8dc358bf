pub const CANONICAL_MAX: f64 = 5.0;

pub const TEN_POINT_MAX: f64 = 10.0;

/// Rescales `raw` from `0..=source_max` to `0..=5`, rounded to the nearest 0.5.
pub fn rescale_to_five(raw: Option<f64>, source_max: f64) -> Option<f64> {
    let raw = raw?;
    let scaled = raw / source_max * CANONICAL_MAX;
    Some(((scaled * 2.0).round() / 2.0).clamp(0.0, CANONICAL_MAX))
}

pub fn to_five_scale(raw: Option<f64>) -> Option<f64> {
    rescale_to_five(raw, TEN_POINT_MAX)
}

pub fn in_range(value: f64, max: f64) -> bool {
    value.is_finite() && (0.0..=max).contains(&value)
}
