//! Non-myopic "optimal" batch selection.
//!
//! An oracle-style strategy: it is given the true labels of the candidates and a
//! held-out evaluation set, and picks the candidates whose labels would improve the
//! evaluation score the most. Useful as an upper baseline for other strategies.
//!
//! Each batch round:
//! - fits the classifier on the labeled set plus the candidates chosen so far and
//!   scores it on the evaluation set (baseline),
//! - for every look-ahead depth `m`, refits on every `m`-combination of the
//!   remaining candidates and credits each member with `(score - baseline) / m`,
//! - keeps the best credit per candidate across depths and picks the maximum,
//!   breaking ties on the depth-1 credit with a seeded coin.
//!
//! The number of fits per round is `sum_m C(n_remaining, m)`, so keep
//! `nonmyopic_look_ahead` small.

use itertools::Itertools;
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{trace, warn};

use crate::utils::{check_paired, check_sample_weight};
use crate::{
    n_combinations, pairwise_kernels, rand_argmax, Accuracy, Classifier, Label,
    QueryError, Result, Scorer, TIEBREAK_EPS,
};

/// Configuration for [`Optimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimalConfig {
    /// Largest label combination evaluated per round (must be >= 1).
    pub nonmyopic_look_ahead: usize,
    /// Whether higher scores are better.
    pub maximize_score: bool,
    /// Truncate `batch_size` to the pool size (with a warning) instead of failing.
    pub allow_batch_truncation: bool,
    /// Seed for tie-breaking. Every `query` restarts from it.
    pub seed: u64,
}

impl Default for OptimalConfig {
    fn default() -> Self {
        Self {
            nonmyopic_look_ahead: 2,
            maximize_score: true,
            allow_batch_truncation: false,
            seed: 0,
        }
    }
}

/// Inputs of one [`Optimal::query`] call.
#[derive(Debug, Clone, Copy)]
pub struct OptimalQuery<'a> {
    pub x_cand: ArrayView2<'a, f64>,
    /// True labels of the candidates.
    pub y_cand: &'a [Label],
    pub x: ArrayView2<'a, f64>,
    pub y: &'a [Label],
    pub x_eval: ArrayView2<'a, f64>,
    pub y_eval: &'a [Label],
    pub batch_size: usize,
    pub sample_weight_cand: Option<ArrayView1<'a, f64>>,
    pub sample_weight: Option<ArrayView1<'a, f64>>,
    pub sample_weight_eval: Option<ArrayView1<'a, f64>>,
}

impl<'a> OptimalQuery<'a> {
    /// Single-selection query with unit weights.
    pub fn new(
        x_cand: ArrayView2<'a, f64>,
        y_cand: &'a [Label],
        x: ArrayView2<'a, f64>,
        y: &'a [Label],
        x_eval: ArrayView2<'a, f64>,
        y_eval: &'a [Label],
    ) -> Self {
        Self {
            x_cand,
            y_cand,
            x,
            y,
            x_eval,
            y_eval,
            batch_size: 1,
            sample_weight_cand: None,
            sample_weight: None,
            sample_weight_eval: None,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn sample_weight_cand(mut self, w: ArrayView1<'a, f64>) -> Self {
        self.sample_weight_cand = Some(w);
        self
    }

    pub fn sample_weight(mut self, w: ArrayView1<'a, f64>) -> Self {
        self.sample_weight = Some(w);
        self
    }

    pub fn sample_weight_eval(mut self, w: ArrayView1<'a, f64>) -> Self {
        self.sample_weight_eval = Some(w);
        self
    }
}

/// Result of a batch query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchSelection {
    /// Selected candidate indices, in selection order.
    pub indices: Vec<usize>,
    /// `(batch_size, n_candidates)`; row `i` holds round-`i` utilities, NaN for
    /// candidates selected in earlier rounds.
    pub utilities: Array2<f64>,
}

/// Non-myopic optimal batch selector.
#[derive(Debug, Clone)]
pub struct Optimal<C, S = Accuracy> {
    clf: C,
    scorer: S,
    cfg: OptimalConfig,
}

/// Per-query working set. Candidates occupy rows `0..n_cand` of `x_all`, the
/// labeled set the rows after.
struct Workspace<'a> {
    x_all: Array2<f64>,
    y_all: Vec<Label>,
    w_all: Array1<f64>,
    x_eval: ArrayView2<'a, f64>,
    y_eval: &'a [Label],
    w_eval: Option<ArrayView1<'a, f64>>,
    // Evaluation-vs-`x_all` similarities, when the classifier accepts them.
    similarity: Option<Array2<f64>>,
}

impl<C: Classifier> Optimal<C, Accuracy> {
    /// Optimal selector scoring with accuracy.
    pub fn new(clf: C, cfg: OptimalConfig) -> Self {
        Self::with_scorer(clf, Accuracy, cfg)
    }
}

impl<C: Classifier, S: Scorer> Optimal<C, S> {
    pub fn with_scorer(clf: C, scorer: S, cfg: OptimalConfig) -> Self {
        Self { clf, scorer, cfg }
    }

    pub fn config(&self) -> &OptimalConfig {
        &self.cfg
    }

    pub fn classifier(&self) -> &C {
        &self.clf
    }

    /// Select `q.batch_size` candidates.
    pub fn query(&self, q: &OptimalQuery<'_>) -> Result<BatchSelection> {
        let batch_size = self.validate(q)?;
        let n = q.x_cand.nrows();
        let ws = self.workspace(q)?;
        let labeled: Vec<usize> = (n..ws.y_all.len()).collect();

        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let mut utilities = Array2::from_elem((batch_size, n), f64::NAN);
        let mut selected: Vec<usize> = Vec::with_capacity(batch_size);

        for round in 0..batch_size {
            let pool: Vec<usize> = (0..n).filter(|i| !selected.contains(i)).collect();
            let base: Vec<usize> = selected.iter().chain(&labeled).copied().collect();
            let baseline = self.evaluate(&base, &ws)?;

            let depth = self.cfg.nonmyopic_look_ahead;
            let mut per_depth = Array2::from_elem((n, depth), f64::NAN);
            for m in 1..=depth {
                for (combo, score) in self.scan_depth(&pool, m, &base, &ws)? {
                    let mut delta = (score - baseline) / m as f64;
                    if !self.cfg.maximize_score {
                        delta = -delta;
                    }
                    for &c in &combo {
                        let cell = &mut per_depth[[c, m - 1]];
                        if cell.is_nan() || delta > *cell {
                            *cell = delta;
                        }
                    }
                }
            }

            let round_utils: Vec<f64> = per_depth
                .axis_iter(Axis(0))
                .map(|row| nanmax(row.iter().copied()))
                .collect();
            let best = nanmax(round_utils.iter().copied());
            let tied: Vec<usize> = pool
                .iter()
                .copied()
                .filter(|&c| {
                    let u = round_utils[c];
                    u == best || (u - best).abs() <= TIEBREAK_EPS
                })
                .collect();
            let depth1: Vec<f64> = tied.iter().map(|&c| per_depth[[c, 0]]).collect();
            let pick = rand_argmax(&depth1, &mut rng)
                .map(|i| tied[i])
                .ok_or_else(|| {
                    QueryError::Classifier(format!("no finite utility in round {round}"))
                })?;

            for (c, &u) in round_utils.iter().enumerate() {
                utilities[[round, c]] = u;
            }
            trace!(
                round,
                pick,
                utility = best,
                baseline,
                remaining = pool.len(),
                "optimal round"
            );
            selected.push(pick);
        }

        Ok(BatchSelection {
            indices: selected,
            utilities,
        })
    }

    /// Checks inputs and returns the effective batch size.
    fn validate(&self, q: &OptimalQuery<'_>) -> Result<usize> {
        if self.cfg.nonmyopic_look_ahead == 0 {
            return Err(QueryError::invalid_value(
                "nonmyopic_look_ahead",
                "must be at least 1",
            ));
        }
        let n = q.x_cand.nrows();
        if n == 0 {
            return Err(QueryError::invalid_value("x_cand", "candidate pool is empty"));
        }
        if q.x_eval.nrows() == 0 {
            return Err(QueryError::invalid_value("x_eval", "evaluation set is empty"));
        }
        check_paired("y_cand", n, q.y_cand.len())?;
        check_paired("y", q.x.nrows(), q.y.len())?;
        check_paired("y_eval", q.x_eval.nrows(), q.y_eval.len())?;

        let d = q.x_cand.ncols();
        if q.x.nrows() > 0 && q.x.ncols() != d {
            return Err(QueryError::invalid_value(
                "x",
                format!("{} features, candidates have {d}", q.x.ncols()),
            ));
        }
        if q.x_eval.ncols() != d {
            return Err(QueryError::invalid_value(
                "x_eval",
                format!("{} features, candidates have {d}", q.x_eval.ncols()),
            ));
        }
        check_sample_weight("sample_weight_cand", q.sample_weight_cand, n)?;
        check_sample_weight("sample_weight", q.sample_weight, q.y.len())?;
        check_sample_weight("sample_weight_eval", q.sample_weight_eval, q.y_eval.len())?;

        if q.batch_size == 0 {
            return Err(QueryError::invalid_value("batch_size", "must be at least 1"));
        }
        if q.batch_size > n {
            if !self.cfg.allow_batch_truncation {
                return Err(QueryError::CapacityExceeded {
                    requested: q.batch_size,
                    available: n,
                });
            }
            warn!(
                requested = q.batch_size,
                available = n,
                "batch_size exceeds the candidate pool; truncating"
            );
            return Ok(n);
        }
        Ok(q.batch_size)
    }

    fn workspace<'a>(&self, q: &OptimalQuery<'a>) -> Result<Workspace<'a>> {
        let x_all = if q.x.nrows() == 0 {
            q.x_cand.to_owned()
        } else {
            concatenate(Axis(0), &[q.x_cand, q.x])
                .map_err(|e| QueryError::invalid_value("x", e.to_string()))?
        };
        let y_all: Vec<Label> = q.y_cand.iter().chain(q.y).copied().collect();
        let ones = |k: usize| Array1::from_elem(k, 1.0);
        let w_all = concatenate(
            Axis(0),
            &[
                q.sample_weight_cand
                    .map_or_else(|| ones(q.y_cand.len()), |w| w.to_owned())
                    .view(),
                q.sample_weight
                    .map_or_else(|| ones(q.y.len()), |w| w.to_owned())
                    .view(),
            ],
        )
        .map_err(|e| QueryError::invalid_value("sample_weight", e.to_string()))?;

        // X_all is fixed for the whole query, so one kernel matrix serves all rounds.
        let similarity = self
            .clf
            .similarity_kernel()
            .map(|k| pairwise_kernels(q.x_eval, x_all.view(), k));

        Ok(Workspace {
            x_all,
            y_all,
            w_all,
            x_eval: q.x_eval,
            y_eval: q.y_eval,
            w_eval: q.sample_weight_eval,
            similarity,
        })
    }

    /// Fit a clone on `rows` of the workspace and score it on the evaluation set.
    fn evaluate(&self, rows: &[usize], ws: &Workspace<'_>) -> Result<f64> {
        let mut clf = self.clf.clone();
        let x_fit = ws.x_all.select(Axis(0), rows);
        let y_fit: Vec<Label> = rows.iter().map(|&r| ws.y_all[r]).collect();
        let w_fit = ws.w_all.select(Axis(0), rows);
        clf.fit(x_fit.view(), &y_fit, Some(w_fit.view()))?;
        let pred = match &ws.similarity {
            Some(k) => clf.predict_precomputed(k.select(Axis(1), rows).view())?,
            None => clf.predict(ws.x_eval)?,
        };
        self.scorer.score(ws.y_eval, &pred, ws.w_eval)
    }

    /// Score every `m`-combination of `pool` added to `base`, in lexicographic order.
    fn scan_depth(
        &self,
        pool: &[usize],
        m: usize,
        base: &[usize],
        ws: &Workspace<'_>,
    ) -> Result<Vec<(Vec<usize>, f64)>> {
        trace!(m, fits = n_combinations(pool.len(), m), "scanning depth");
        let eval = |combo: Vec<usize>| -> Result<(Vec<usize>, f64)> {
            let rows: Vec<usize> = combo.iter().chain(base).copied().collect();
            let score = self.evaluate(&rows, ws)?;
            Ok((combo, score))
        };

        #[cfg(feature = "parallel")]
        let scored = {
            use rayon::prelude::*;
            pool.iter()
                .copied()
                .combinations(m)
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(eval)
                .collect::<Result<Vec<_>>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let scored = pool
            .iter()
            .copied()
            .combinations(m)
            .map(eval)
            .collect::<Result<Vec<_>>>()?;

        Ok(scored)
    }
}

fn nanmax(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NAN, |acc, v| {
        if v.is_nan() || (!acc.is_nan() && acc >= v) {
            acc
        } else {
            v
        }
    })
}
