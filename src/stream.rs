//! Budgeted stream selection with a cognition window.
//!
//! One engine, [`StreamQuery`], processes candidates in arrival order. Per
//! candidate it:
//!
//! 1. admits the candidate into the cognition window and computes its local
//!    density factor (how many remembered instances it became the nearest
//!    neighbour of),
//! 2. scores it with the [`UtilityPolicy`],
//! 3. queries it unconditionally when `force_full_budget` is set and the
//!    candidates left in the call are no more than the labels still owed,
//! 4. otherwise skips it when the density factor is below `density_threshold` or
//!    the budget is spent, and lets the policy decide the rest.
//!
//! `query` works on copies of the state and can be repeated; only `update`
//! commits candidates and decisions to the window, the ledger and the policy.

use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewD, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::utils::{check_paired, check_sample_weight};
use crate::{
    mix_seed, BudgetLedger, BudgetManager, Classifier, CognitionWindow, DecisionNote, Distance,
    DistanceFunc, FixedUncertainty, Label, MarginUncertainty, PolicyContext, QueryError,
    RandomUtility, RandomVariableUncertainty, Result, UtilityPolicy, VariableUncertainty,
};

/// Stream strategy configuration.
///
/// Stored as given; [`StreamConfig::validate`] runs at the start of every
/// `query`/`update`, so invalid values construct fine and fail on use.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamConfig {
    /// Target fraction of stream instances to query, in `(0, 1]`.
    pub budget: f64,
    /// Minimum local density factor for a candidate to be considered (>= 0).
    pub density_threshold: i64,
    /// Capacity of the cognition window (>= 1).
    pub cognition_window_size: i64,
    pub dist_func: DistanceFunc,
    /// Query unconditionally once the rest of a call is needed to reach the budget.
    pub force_full_budget: bool,
    /// Window `w` of the default [`BudgetLedger`] spend estimate (>= 1).
    pub budget_window: i64,
    pub seed: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            budget: 0.1,
            density_threshold: 1,
            cognition_window_size: 10,
            dist_func: DistanceFunc::default(),
            force_full_budget: false,
            budget_window: 100,
            seed: 0,
        }
    }
}

struct Checked {
    distance: Distance,
    window_size: usize,
}

impl StreamConfig {
    /// Defaults for [`DbStream`]: a window of 100.
    ///
    /// DBStream names this window `window_size`; here it is `cognition_window_size`.
    pub fn db_stream() -> Self {
        Self {
            cognition_window_size: 100,
            ..Self::default()
        }
    }

    /// Check every field.
    pub fn validate(&self) -> Result<()> {
        self.checked().map(|_| ())
    }

    fn checked(&self) -> Result<Checked> {
        if !(self.budget.is_finite() && self.budget > 0.0 && self.budget <= 1.0) {
            return Err(QueryError::invalid_value(
                "budget",
                format!("must be in (0, 1], got {}", self.budget),
            ));
        }
        if self.density_threshold < 0 {
            return Err(QueryError::invalid_value(
                "density_threshold",
                format!("must be non-negative, got {}", self.density_threshold),
            ));
        }
        let window_size = usize::try_from(self.cognition_window_size)
            .ok()
            .filter(|&w| w >= 1)
            .ok_or_else(|| {
                QueryError::invalid_value(
                    "cognition_window_size",
                    format!("must be positive, got {}", self.cognition_window_size),
                )
            })?;
        if self.budget_window < 1 {
            return Err(QueryError::invalid_value(
                "budget_window",
                format!("must be positive, got {}", self.budget_window),
            ));
        }
        let distance = self.dist_func.resolve()?;
        Ok(Checked {
            distance,
            window_size,
        })
    }
}

/// Inputs of one [`StreamQuery::query`] call.
///
/// Candidates (`'c`) and the labeled set (`'d`) are borrowed independently, so a
/// labeling loop can grow `x`/`y` while it still holds the current chunk.
#[derive(Debug, Clone)]
pub struct StreamBatch<'c, 'd> {
    /// Candidates in arrival order; must be 2-D `(n, n_features)`.
    pub candidates: ArrayViewD<'c, f64>,
    /// Labeled data, used when `fit_clf` is set.
    pub x: ArrayView2<'d, f64>,
    pub y: &'d [Label],
    pub sample_weight: Option<ArrayView1<'d, f64>>,
    /// Refit a copy of the classifier on `x`/`y` before scoring.
    pub fit_clf: bool,
}

impl<'c, 'd> StreamBatch<'c, 'd> {
    pub fn new(candidates: ArrayViewD<'c, f64>, x: ArrayView2<'d, f64>, y: &'d [Label]) -> Self {
        Self {
            candidates,
            x,
            y,
            sample_weight: None,
            fit_clf: false,
        }
    }

    pub fn fit_clf(mut self, fit_clf: bool) -> Self {
        self.fit_clf = fit_clf;
        self
    }

    pub fn sample_weight(mut self, w: ArrayView1<'d, f64>) -> Self {
        self.sample_weight = Some(w);
        self
    }
}

/// Result of [`StreamQuery::query`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamSelection {
    /// Positions of queried candidates, ascending.
    pub queried_indices: Vec<usize>,
    /// Utility of every candidate, shape `(n,)`; all finite.
    pub utilities: Array1<f64>,
    /// One note per candidate.
    pub notes: Vec<DecisionNote>,
}

/// Stream selection engine, generic over the utility policy and the budget
/// manager.
#[derive(Debug, Clone)]
pub struct StreamQuery<P, B = BudgetLedger> {
    cfg: StreamConfig,
    policy: P,
    window: CognitionWindow,
    ledger: B,
}

/// Random utility with the cognition window.
pub type CogDqsRan = StreamQuery<RandomUtility>;
/// Fixed uncertainty with the cognition window.
pub type CogDqsFixUn = StreamQuery<FixedUncertainty>;
/// Variable uncertainty with the cognition window.
pub type CogDqsVarUn = StreamQuery<VariableUncertainty>;
/// Randomized variable uncertainty with the cognition window.
pub type CogDqsRanVarUn = StreamQuery<RandomVariableUncertainty>;
/// Margin uncertainty with a large density window.
pub type DbStream = StreamQuery<MarginUncertainty>;

enum Gate {
    Forced { outstanding: u64, remaining: usize },
    Sparse { density_factor: usize },
    NoBudget { spend: f64 },
    Open,
}

fn gate<B: BudgetManager>(
    cfg: &StreamConfig,
    density_factor: usize,
    ledger: &B,
    horizon: u64,
    remaining: usize,
) -> Gate {
    if cfg.force_full_budget {
        let outstanding = ledger.outstanding(cfg.budget, horizon);
        if outstanding > 0 && remaining as u64 <= outstanding {
            return Gate::Forced {
                outstanding,
                remaining,
            };
        }
    }
    if (density_factor as i64) < cfg.density_threshold {
        return Gate::Sparse { density_factor };
    }
    if !ledger.budget_available(cfg.budget) {
        return Gate::NoBudget {
            spend: ledger.spend(),
        };
    }
    Gate::Open
}

fn as_matrix<'a>(candidates: &ArrayViewD<'a, f64>) -> Result<ArrayView2<'a, f64>> {
    let ndim = candidates.ndim();
    candidates.clone().into_dimensionality::<Ix2>().map_err(|_| {
        QueryError::invalid_value(
            "candidates",
            format!("expected a 2-D array of shape (n_samples, n_features), got {ndim}-D"),
        )
    })
}

impl<P: UtilityPolicy> StreamQuery<P> {
    /// Store `cfg` and `policy` unchecked, with a [`BudgetLedger`] over
    /// `cfg.budget_window`.
    pub fn new(cfg: StreamConfig, policy: P) -> Self {
        let ledger = BudgetLedger::new(u64::try_from(cfg.budget_window).unwrap_or(1));
        Self::with_budget_manager(cfg, policy, ledger)
    }
}

impl<P: UtilityPolicy, B: BudgetManager> StreamQuery<P, B> {
    /// Store `cfg` and `policy` unchecked, accounting the budget with `ledger`.
    pub fn with_budget_manager(cfg: StreamConfig, policy: P, ledger: B) -> Self {
        let window = CognitionWindow::new(usize::try_from(cfg.cognition_window_size).unwrap_or(1));
        Self {
            cfg,
            policy,
            window,
            ledger,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The budget manager.
    pub fn ledger(&self) -> &B {
        &self.ledger
    }

    pub fn window(&self) -> &CognitionWindow {
        &self.window
    }

    /// Current adaptive threshold of the policy, if any.
    pub fn threshold(&self) -> Option<f64> {
        self.policy.threshold()
    }

    fn check_candidates(&self, candidates: &ArrayViewD<'_, f64>) -> Result<Checked> {
        let checked = self.cfg.checked()?;
        self.policy.validate()?;
        let cands = as_matrix(candidates)?;
        if let Some(first) = self.window.iter().next() {
            if cands.nrows() > 0 && first.features.len() != cands.ncols() {
                return Err(QueryError::invalid_value(
                    "candidates",
                    format!(
                        "{} features, the stream so far has {}",
                        cands.ncols(),
                        first.features.len()
                    ),
                ));
            }
        }
        Ok(checked)
    }

    /// Decide which candidates to query. Does not change `self`.
    pub fn query<C: Classifier>(&self, batch: &StreamBatch<'_, '_>, clf: &C) -> Result<StreamSelection> {
        let checked = self.check_candidates(&batch.candidates)?;
        let cands = as_matrix(&batch.candidates)?;
        check_paired("y", batch.x.nrows(), batch.y.len())?;
        check_sample_weight("sample_weight", batch.sample_weight, batch.y.len())?;
        let n = cands.nrows();

        let fitted;
        let clf = if batch.fit_clf {
            let mut c = clf.clone();
            c.fit(batch.x, batch.y, batch.sample_weight)?;
            fitted = c;
            &fitted
        } else {
            clf
        };

        let n_classes = clf.classes().len();
        let proba = if self.policy.uses_proba() && n > 0 {
            let p = clf.predict_proba(cands)?;
            if p.dim() != (n, n_classes) || n_classes == 0 {
                return Err(QueryError::Classifier(format!(
                    "predict_proba returned shape {:?} for {n} candidates and {n_classes} classes",
                    p.dim()
                )));
            }
            Some(p)
        } else {
            None
        };
        let empty = Array1::<f64>::zeros(0);

        let mut window = self.window.clone();
        window.set_cap(checked.window_size);
        let mut ledger = self.ledger.clone();
        let mut policy = self.policy.clone();
        let mut rng = StdRng::seed_from_u64(mix_seed(self.cfg.seed, ledger.seen_count()));
        let horizon = ledger.seen_count() + n as u64;
        let ctx = PolicyContext {
            budget: self.cfg.budget,
            n_classes,
        };

        let mut queried_indices = Vec::new();
        let mut utilities = Array1::zeros(n);
        let mut notes = Vec::with_capacity(n);
        for (i, x) in cands.outer_iter().enumerate() {
            let density_factor = window.admit(x, ledger.seen_count(), &checked.distance)?;
            let p = proba.as_ref().map_or(empty.view(), |p| p.row(i));
            let utility = policy.utility(p, &mut rng);

            let note = match gate(&self.cfg, density_factor, &ledger, horizon, n - i) {
                Gate::Forced {
                    outstanding,
                    remaining,
                } => DecisionNote::Forced {
                    outstanding,
                    remaining,
                },
                Gate::Sparse { density_factor } => DecisionNote::SparseRegion {
                    density_factor,
                    density_threshold: self.cfg.density_threshold,
                },
                Gate::NoBudget { spend } => DecisionNote::BudgetExhausted {
                    spend,
                    budget: self.cfg.budget,
                },
                Gate::Open => {
                    let v = policy.decide(utility, ctx, &mut rng)?;
                    policy.observe(v.queried);
                    DecisionNote::Policy {
                        queried: v.queried,
                        threshold: v.threshold,
                    }
                }
            };

            let queried = note.queried();
            window.set_last_queried(queried);
            ledger.record(queried);
            utilities[i] = utility;
            if queried {
                queried_indices.push(i);
            }
            notes.push(note);
        }

        debug!(
            candidates = n,
            queried = queried_indices.len(),
            seen = self.ledger.seen_count(),
            spend = self.ledger.spend(),
            "stream query"
        );
        Ok(StreamSelection {
            queried_indices,
            utilities,
            notes,
        })
    }

    /// Commit `candidates` and which of them were queried.
    ///
    /// Replays the window and the ledger in arrival order and adapts the policy
    /// threshold for every candidate that reached the policy stage. Nothing
    /// changes on error.
    pub fn update(&mut self, candidates: ArrayViewD<'_, f64>, queried_indices: &[usize]) -> Result<()> {
        let checked = self.check_candidates(&candidates)?;
        let cands = as_matrix(&candidates)?;
        let n = cands.nrows();

        let mut flags = vec![false; n];
        for &i in queried_indices {
            match flags.get_mut(i) {
                Some(f) if !*f => *f = true,
                Some(_) => {
                    return Err(QueryError::invalid_type(
                        "queried_indices",
                        format!("index {i} appears more than once"),
                    ))
                }
                None => {
                    return Err(QueryError::invalid_type(
                        "queried_indices",
                        format!("index {i} does not refer to one of the {n} candidates"),
                    ))
                }
            }
        }

        let mut window = self.window.clone();
        window.set_cap(checked.window_size);
        let mut ledger = self.ledger.clone();
        let mut policy = self.policy.clone();
        let horizon = ledger.seen_count() + n as u64;

        for (i, x) in cands.outer_iter().enumerate() {
            let density_factor = window.admit(x, ledger.seen_count(), &checked.distance)?;
            if let Gate::Open = gate(&self.cfg, density_factor, &ledger, horizon, n - i) {
                policy.observe(flags[i]);
            }
            window.set_last_queried(flags[i]);
            ledger.record(flags[i]);
        }

        self.window = window;
        self.ledger = ledger;
        self.policy = policy;
        debug!(
            candidates = n,
            queried = queried_indices.len(),
            seen = self.ledger.seen_count(),
            spend = self.ledger.spend(),
            threshold = ?self.policy.threshold(),
            "stream update"
        );
        Ok(())
    }
}

impl<P: UtilityPolicy + Default> StreamQuery<P> {
    /// Default configuration (with the policy's window size) and default policy.
    pub fn with_defaults() -> Self {
        Self::with_config(StreamConfig {
            cognition_window_size: P::default_window_size(),
            ..StreamConfig::default()
        })
    }

    /// `cfg` with the default policy.
    pub fn with_config(cfg: StreamConfig) -> Self {
        Self::new(cfg, P::default())
    }
}

impl<P: UtilityPolicy + Default> Default for StreamQuery<P> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
