//! Performance scorers used by [`Optimal`](crate::Optimal).

use ndarray::ArrayView1;

use crate::{Label, QueryError, Result};

/// Scores predictions against ground truth.
///
/// Whether higher is better is decided by `OptimalConfig::maximize_score`, not by
/// the scorer.
pub trait Scorer: Send + Sync {
    fn score(
        &self,
        y_true: &[Label],
        y_pred: &[Label],
        sample_weight: Option<ArrayView1<'_, f64>>,
    ) -> Result<f64>;
}

fn check_lengths(y_true: &[Label], y_pred: &[Label], w: Option<ArrayView1<'_, f64>>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(QueryError::invalid_value(
            "y_pred",
            format!("{} predictions for {} labels", y_pred.len(), y_true.len()),
        ));
    }
    if let Some(w) = w {
        if w.len() != y_true.len() {
            return Err(QueryError::invalid_value(
                "sample_weight_eval",
                format!("{} weights for {} labels", w.len(), y_true.len()),
            ));
        }
    }
    Ok(())
}

/// Weighted fraction of correct predictions. Empty input scores 0.
fn weighted_accuracy(y_true: &[Label], y_pred: &[Label], w: Option<ArrayView1<'_, f64>>) -> f64 {
    let mut hit = 0.0;
    let mut total = 0.0;
    for (i, (t, p)) in y_true.iter().zip(y_pred).enumerate() {
        let wi = w.map_or(1.0, |w| w[i]);
        total += wi;
        if t == p {
            hit += wi;
        }
    }
    if total > 0.0 {
        hit / total
    } else {
        0.0
    }
}

/// Fraction of correct predictions (maximize).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accuracy;

impl Scorer for Accuracy {
    fn score(&self, y_true: &[Label], y_pred: &[Label], w: Option<ArrayView1<'_, f64>>) -> Result<f64> {
        check_lengths(y_true, y_pred, w)?;
        Ok(weighted_accuracy(y_true, y_pred, w))
    }
}

/// Fraction of wrong predictions (minimize).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZeroOneLoss;

impl Scorer for ZeroOneLoss {
    fn score(&self, y_true: &[Label], y_pred: &[Label], w: Option<ArrayView1<'_, f64>>) -> Result<f64> {
        check_lengths(y_true, y_pred, w)?;
        if y_true.is_empty() {
            return Ok(0.0);
        }
        Ok(1.0 - weighted_accuracy(y_true, y_pred, w))
    }
}

/// Adapter for a plain `(y_true, y_pred) -> score` function. Sample weights are
/// ignored.
#[derive(Debug, Clone, Copy)]
pub struct FnScorer(pub fn(&[Label], &[Label]) -> f64);

impl Scorer for FnScorer {
    fn score(&self, y_true: &[Label], y_pred: &[Label], _w: Option<ArrayView1<'_, f64>>) -> Result<f64> {
        check_lengths(y_true, y_pred, None)?;
        let s = (self.0)(y_true, y_pred);
        if s.is_nan() {
            return Err(QueryError::Classifier("scorer returned NaN".into()));
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_and_loss_are_complementary() {
        let t = [0, 1, 1, 0];
        let p = [0, 1, 0, 0];
        assert!((Accuracy.score(&t, &p, None).unwrap() - 0.75).abs() < 1e-12);
        assert!((ZeroOneLoss.score(&t, &p, None).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn weights_change_accuracy() {
        let t = [0, 1];
        let p = [0, 0];
        let w = array![3.0, 1.0];
        assert!((Accuracy.score(&t, &p, Some(w.view())).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_is_a_value_error() {
        let err = Accuracy.score(&[0, 1], &[0], None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Value);
    }

    #[test]
    fn fn_scorer_wraps_plain_functions() {
        fn hits(t: &[Label], p: &[Label]) -> f64 {
            t.iter().zip(p).filter(|(a, b)| a == b).count() as f64
        }
        assert_eq!(FnScorer(hits).score(&[1, 2, 3], &[1, 0, 3], None).unwrap(), 2.0);
    }
}
