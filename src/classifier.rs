//! Classifier collaborator interface and a Parzen-window reference classifier.
//!
//! Strategies only need `fit`, `predict_proba` / `predict`, and the class alphabet.
//! Kernel-based classifiers can additionally advertise their similarity kernel so
//! that [`Optimal`](crate::Optimal) precomputes one evaluation-vs-training kernel
//! matrix per round and slices it, instead of recomputing similarities per fit.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::{is_unlabeled, pairwise_kernels, ClassAlphabet, Kernel, Label, QueryError, Result};

/// A trainable classifier.
///
/// `fit` mutates in place; strategies clone before fitting so the caller's
/// instance is never touched.
pub trait Classifier: Clone + Send + Sync {
    /// Fit on `x`/`y`. Rows labeled [`MISSING_LABEL`](crate::MISSING_LABEL) are
    /// ignored. `sample_weight` defaults to all ones.
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[Label],
        sample_weight: Option<ArrayView1<'_, f64>>,
    ) -> Result<()>;

    /// Class-membership probabilities, one row per sample, columns ordered as
    /// [`Classifier::classes`].
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Known classes in column order.
    fn classes(&self) -> &[Label];

    /// Most probable class per sample (lowest class wins ties).
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let proba = self.predict_proba(x)?;
        argmax_labels(proba.view(), self.classes())
    }

    /// Similarity kernel, if predictions depend on the training data only through
    /// it. Enables [`Classifier::predict_precomputed`].
    fn similarity_kernel(&self) -> Option<Kernel> {
        None
    }

    /// Predict from a precomputed `(n_samples, n_fit_rows)` similarity matrix whose
    /// columns line up with the rows passed to the last `fit`.
    fn predict_precomputed(&self, _similarity: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        Err(QueryError::Classifier(
            "classifier does not support precomputed similarities".into(),
        ))
    }
}

fn argmax_labels(proba: ArrayView2<'_, f64>, classes: &[Label]) -> Result<Vec<Label>> {
    if proba.ncols() != classes.len() {
        return Err(QueryError::Classifier(format!(
            "probability matrix has {} columns for {} classes",
            proba.ncols(),
            classes.len()
        )));
    }
    proba
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0usize;
            for (j, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = j;
                }
            }
            classes
                .get(best)
                .copied()
                .ok_or_else(|| QueryError::Classifier("no classes known".into()))
        })
        .collect()
}

/// Configuration for [`ParzenWindowClassifier`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PwcConfig {
    pub kernel: Kernel,
    /// Fixed class alphabet. `None` infers classes from the labels seen in `fit`.
    pub classes: Option<Vec<Label>>,
    /// Pseudo-count added to every class frequency before normalizing.
    pub class_prior: f64,
}

impl Default for PwcConfig {
    fn default() -> Self {
        Self {
            kernel: Kernel::default(),
            classes: None,
            class_prior: 0.0,
        }
    }
}

/// Parzen-window classifier: class scores are kernel-weighted label frequencies.
#[derive(Debug, Clone)]
pub struct ParzenWindowClassifier {
    cfg: PwcConfig,
    alphabet: ClassAlphabet,
    x_train: Array2<f64>,
    // Class column per kept training row.
    y_col: Vec<usize>,
    weights: Vec<f64>,
    // Positions (within the last `fit` input) of the rows kept for training.
    kept: Vec<usize>,
    fit_rows: usize,
}

impl ParzenWindowClassifier {
    pub fn new(cfg: PwcConfig) -> Self {
        let alphabet = cfg
            .classes
            .as_ref()
            .map(|c| ClassAlphabet::new(c.iter().copied()))
            .unwrap_or_default();
        Self {
            cfg,
            alphabet,
            x_train: Array2::zeros((0, 0)),
            y_col: Vec::new(),
            weights: Vec::new(),
            kept: Vec::new(),
            fit_rows: 0,
        }
    }

    /// Classifier with a fixed class alphabet and default kernel.
    pub fn with_classes(classes: impl IntoIterator<Item = Label>) -> Self {
        Self::new(PwcConfig {
            classes: Some(classes.into_iter().collect()),
            ..PwcConfig::default()
        })
    }

    pub fn config(&self) -> &PwcConfig {
        &self.cfg
    }

    /// Turn one row of similarities to the kept training rows into probabilities.
    fn row_proba<I>(&self, sims: I, out: &mut [f64])
    where
        I: Iterator<Item = f64>,
    {
        out.iter_mut().for_each(|v| *v = self.cfg.class_prior.max(0.0));
        for ((s, &c), &w) in sims.zip(&self.y_col).zip(&self.weights) {
            out[c] += s * w;
        }
        let total: f64 = out.iter().sum();
        if total > 0.0 && total.is_finite() {
            out.iter_mut().for_each(|v| *v /= total);
        } else {
            let k = out.len().max(1) as f64;
            out.iter_mut().for_each(|v| *v = 1.0 / k);
        }
    }

    fn ensure_classes(&self) -> Result<()> {
        if self.alphabet.is_empty() {
            return Err(QueryError::Classifier(
                "no classes known: fit on labeled data or configure `classes`".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ParzenWindowClassifier {
    fn default() -> Self {
        Self::new(PwcConfig::default())
    }
}

impl Classifier for ParzenWindowClassifier {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[Label],
        sample_weight: Option<ArrayView1<'_, f64>>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(QueryError::invalid_value(
                "y",
                format!("{} labels for {} samples", y.len(), x.nrows()),
            ));
        }
        if let Some(w) = sample_weight {
            if w.len() != y.len() {
                return Err(QueryError::invalid_value(
                    "sample_weight",
                    format!("{} weights for {} samples", w.len(), y.len()),
                ));
            }
        }
        if self.cfg.classes.is_none() {
            self.alphabet = ClassAlphabet::from_labels(y);
        }

        let mut kept = Vec::with_capacity(y.len());
        let mut y_col = Vec::with_capacity(y.len());
        let mut weights = Vec::with_capacity(y.len());
        for (i, &label) in y.iter().enumerate() {
            if is_unlabeled(label) {
                continue;
            }
            let col = self.alphabet.index_of(label).ok_or_else(|| {
                QueryError::invalid_value("y", format!("label {label} is not a known class"))
            })?;
            kept.push(i);
            y_col.push(col);
            weights.push(sample_weight.map_or(1.0, |w| w[i]));
        }

        self.x_train = x.select(Axis(0), &kept);
        self.y_col = y_col;
        self.weights = weights;
        self.kept = kept;
        self.fit_rows = y.len();
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.ensure_classes()?;
        let k = self.alphabet.len();
        let mut out = Array2::zeros((x.nrows(), k));
        if self.y_col.is_empty() {
            out.fill(1.0 / k as f64);
            return Ok(out);
        }
        if x.ncols() != self.x_train.ncols() {
            return Err(QueryError::invalid_value(
                "x",
                format!(
                    "{} features, classifier was fit on {}",
                    x.ncols(),
                    self.x_train.ncols()
                ),
            ));
        }
        let sims = pairwise_kernels(x, self.x_train.view(), self.cfg.kernel);
        let mut buf = vec![0.0; k];
        for (i, row) in sims.axis_iter(Axis(0)).enumerate() {
            self.row_proba(row.iter().copied(), &mut buf);
            for (j, &p) in buf.iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }

    fn classes(&self) -> &[Label] {
        self.alphabet.classes()
    }

    fn similarity_kernel(&self) -> Option<Kernel> {
        Some(self.cfg.kernel)
    }

    fn predict_precomputed(&self, similarity: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        self.ensure_classes()?;
        if similarity.ncols() != self.fit_rows {
            return Err(QueryError::invalid_value(
                "similarity",
                format!(
                    "{} columns, classifier was fit on {} rows",
                    similarity.ncols(),
                    self.fit_rows
                ),
            ));
        }
        let k = self.alphabet.len();
        let mut proba = Array2::zeros((similarity.nrows(), k));
        let mut buf = vec![0.0; k];
        for (i, row) in similarity.axis_iter(Axis(0)).enumerate() {
            self.row_proba(self.kept.iter().map(|&c| row[c]), &mut buf);
            for (j, &p) in buf.iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        argmax_labels(proba.view(), self.classes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MISSING_LABEL;
    use ndarray::array;

    #[test]
    fn predicts_nearest_class_region() {
        let x = array![[0.0], [0.2], [5.0], [5.3]];
        let y = [0, 0, 1, 1];
        let mut clf = ParzenWindowClassifier::default();
        clf.fit(x.view(), &y, None).unwrap();
        let pred = clf.predict(array![[0.1], [4.9]].view()).unwrap();
        assert_eq!(pred, vec![0, 1]);
        let p = clf.predict_proba(array![[0.1]].view()).unwrap();
        assert!((p.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_labels_are_ignored_and_unfit_is_uniform() {
        let x = array![[0.0], [1.0]];
        let y = [MISSING_LABEL, MISSING_LABEL];
        let mut clf = ParzenWindowClassifier::with_classes([0, 1]);
        clf.fit(x.view(), &y, None).unwrap();
        let p = clf.predict_proba(x.view()).unwrap();
        assert!(p.iter().all(|&v| (v - 0.5).abs() < 1e-12));
        assert_eq!(clf.predict(x.view()).unwrap(), vec![0, 0]);
    }

    #[test]
    fn unknown_label_is_rejected_with_fixed_classes() {
        let mut clf = ParzenWindowClassifier::with_classes([0, 1]);
        let err = clf.fit(array![[0.0]].view(), &[7], None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Value);
    }

    #[test]
    fn no_classes_is_a_classifier_error() {
        let clf = ParzenWindowClassifier::default();
        let err = clf.predict_proba(array![[0.0]].view()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Classifier);
    }

    #[test]
    fn precomputed_path_matches_feature_path() {
        let x = array![[0.0, 1.0], [1.0, 0.5], [3.0, 3.0], [2.5, 4.0], [9.0, 9.0]];
        let y = [0, MISSING_LABEL, 1, 1, 0];
        let w = array![1.0, 1.0, 2.0, 0.5, 1.0];
        let x_eval = array![[0.5, 0.5], [2.0, 3.0], [7.0, 8.0]];
        let mut clf = ParzenWindowClassifier::default();
        clf.fit(x.view(), &y, Some(w.view())).unwrap();

        let k = pairwise_kernels(x_eval.view(), x.view(), clf.config().kernel);
        let fast = clf.predict_precomputed(k.view()).unwrap();
        let slow = clf.predict(x_eval.view()).unwrap();
        assert_eq!(fast, slow);
    }

    #[test]
    fn sample_weight_shifts_decision() {
        let x = array![[0.0], [2.0]];
        let y = [0, 1];
        let mut clf = ParzenWindowClassifier::default();
        clf.fit(x.view(), &y, Some(array![1.0, 10.0].view())).unwrap();
        // Midpoint: equal similarity, heavier class wins.
        assert_eq!(clf.predict(array![[1.0]].view()).unwrap(), vec![1]);
    }
}
