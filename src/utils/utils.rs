use anyhow::Result;

pub fn u8_to_f32_vec(v: &[u8]) -> Vec<f32> {
    v.chunks_exact(4)
        .map(TryInto::try_into)
        .map(Result::unwrap)
        .map(f32::from_le_bytes)
        .collect()
}

pub fn u8_to_i32_vec(v: &[u8]) -> Vec<i32> {
    v.chunks_exact(4)
        .map(TryInto::try_into)
        .map(Result::unwrap)
        .map(i32::from_le_bytes)
        .collect()
}

/// interp linearly maps `x` from the `from` interval onto the `to` interval,
/// saturating at the interval bounds instead of extrapolating.
///
/// # Arguments
/// * `x` - input value
/// * `from` - input interval `(x0, x1)`, `x0 < x1`
/// * `to` - output interval `(y0, y1)`; may be decreasing
///
/// # Returns
/// * `f32`
pub fn interp(x: f32, from: (f32, f32), to: (f32, f32)) -> f32 {
    let (x0, x1) = from;
    let (y0, y1) = to;
    if x <= x0 {
        return y0;
    }
    if x >= x1 {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// round2 rounds to two decimal digits.
pub fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}
