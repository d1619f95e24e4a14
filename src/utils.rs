//! Small helpers: seed mixing, random arg-max, combination counts, input checks.

use ndarray::ArrayView1;
use rand::Rng;

use crate::{QueryError, Result, TIEBREAK_EPS};

/// Derive a per-call seed from a base seed and a salt (e.g. the number of stream
/// instances seen so far).
///
/// SplitMix64 finalizer over `seed ^ mix(salt)`: cheap, stable across platforms,
/// and distinct salts give well-spread seeds.
#[must_use]
pub fn mix_seed(seed: u64, salt: u64) -> u64 {
    splitmix64(seed ^ splitmix64(salt))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Index of the maximum value, breaking ties uniformly at random.
///
/// NaN entries are ignored. Values within [`TIEBREAK_EPS`] of the maximum count as
/// tied. Returns `None` when no entry is comparable.
pub fn rand_argmax<R: Rng + ?Sized>(values: &[f64], rng: &mut R) -> Option<usize> {
    let max = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    let ties: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, &v)| !v.is_nan() && (v == max || (max - v).abs() <= TIEBREAK_EPS))
        .map(|(i, _)| i)
        .collect();
    match ties.len() {
        0 => None,
        1 => Some(ties[0]),
        n => Some(ties[rng.gen_range(0..n)]),
    }
}

/// Number of `k`-combinations of `n` items, saturating at `u64::MAX`.
pub fn n_combinations(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u64;
    let n = n as u64;
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * u128::from(n - i) / u128::from(i + 1);
        if acc > u128::from(u64::MAX) {
            return u64::MAX;
        }
    }
    acc as u64
}

/// `rows` samples must come with `labels` labels.
pub(crate) fn check_paired(param: &'static str, rows: usize, labels: usize) -> Result<()> {
    if rows != labels {
        return Err(QueryError::invalid_value(
            param,
            format!("{labels} labels for {rows} samples"),
        ));
    }
    Ok(())
}

/// Sample weights, when given, must match `n` and be finite and non-negative.
pub(crate) fn check_sample_weight(
    param: &'static str,
    w: Option<ArrayView1<'_, f64>>,
    n: usize,
) -> Result<()> {
    let Some(w) = w else {
        return Ok(());
    };
    if w.len() != n {
        return Err(QueryError::invalid_value(
            param,
            format!("{} weights for {n} samples", w.len()),
        ));
    }
    if let Some(bad) = w.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(QueryError::invalid_value(
            param,
            format!("weights must be finite and non-negative, got {bad}"),
        ));
    }
    Ok(())
}
