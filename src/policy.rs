//! Utility policies: the part that differs between stream strategies.
//!
//! [`StreamQuery`](crate::StreamQuery) owns the shared machinery (cognition
//! window, budget ledger, forced budget); a [`UtilityPolicy`] only says how a
//! candidate is scored and whether a candidate that passed the density and budget
//! gates gets queried.
//!
//! | policy | utility | queried when |
//! |---|---|---|
//! | [`RandomUtility`] | uniform draw in `[0, 1)` | `utility < budget` |
//! | [`FixedUncertainty`] | `1 - max p` | `max p < 1/k + budget (1 - 1/k)` |
//! | [`VariableUncertainty`] | `1 - max p` | `max p < theta` |
//! | [`RandomVariableUncertainty`] | `1 - max p` | `max p < theta * eta`, `eta ~ N(1, delta)` |
//! | [`MarginUncertainty`] | `1 - (p1 - p2)` | `p1 - p2 < theta` |
//!
//! Adaptive thresholds shrink by `(1 - step)` after a query and grow by
//! `(1 + step)` after a skip, and only move in `update`.

use std::fmt;

use ndarray::ArrayView1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{QueryError, Result};

/// Call-level facts a policy may need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyContext {
    pub budget: f64,
    pub n_classes: usize,
}

/// Outcome of [`UtilityPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub queried: bool,
    /// Value the candidate was compared against.
    pub threshold: f64,
}

/// Scoring and acceptance rule of a stream strategy.
///
/// ```rust
/// use quarry::{PolicyContext, UtilityPolicy, VariableUncertainty};
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let mut p = VariableUncertainty::default();
/// let u = p.utility(ndarray::array![0.7, 0.3].view(), &mut rng);
/// let ctx = PolicyContext { budget: 0.1, n_classes: 2 };
/// let v = p.decide(u, ctx, &mut rng).unwrap();
/// assert!(v.queried);
/// p.observe(v.queried);
/// assert!(p.threshold().unwrap() < 1.0);
/// ```
pub trait UtilityPolicy: Clone + fmt::Debug + Send + Sync {
    /// Whether [`UtilityPolicy::utility`] reads class probabilities.
    fn uses_proba(&self) -> bool {
        true
    }

    /// Cognition window size used by [`StreamQuery::with_defaults`](crate::StreamQuery::with_defaults).
    fn default_window_size() -> i64 {
        10
    }

    /// Check policy parameters.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Raw utility of one candidate; always finite.
    fn utility<R: Rng + ?Sized>(&self, proba: ArrayView1<'_, f64>, rng: &mut R) -> f64;

    /// Decide a candidate that passed the density and budget gates.
    fn decide<R: Rng + ?Sized>(&self, utility: f64, ctx: PolicyContext, rng: &mut R) -> Result<Verdict>;

    /// Adapt internal state after a decision reached through [`UtilityPolicy::decide`].
    fn observe(&mut self, _queried: bool) {}

    /// Current adaptive threshold, if the policy has one.
    fn threshold(&self) -> Option<f64> {
        None
    }
}

fn max_proba(proba: ArrayView1<'_, f64>) -> f64 {
    proba.iter().copied().fold(0.0, f64::max)
}

/// Multiplicatively adapted threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptiveThreshold {
    pub theta: f64,
    /// Relative adjustment per decision, in `[0, 1)`.
    pub step: f64,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self {
            theta: 1.0,
            step: 0.01,
        }
    }
}

impl AdaptiveThreshold {
    fn validate(&self) -> Result<()> {
        if !(self.theta.is_finite() && self.theta > 0.0) {
            return Err(QueryError::invalid_value(
                "theta",
                format!("must be finite and positive, got {}", self.theta),
            ));
        }
        if !(0.0..1.0).contains(&self.step) {
            return Err(QueryError::invalid_value(
                "s",
                format!("must be in [0, 1), got {}", self.step),
            ));
        }
        Ok(())
    }

    fn observe(&mut self, queried: bool) {
        if queried {
            self.theta *= 1.0 - self.step;
        } else {
            self.theta *= 1.0 + self.step;
        }
    }
}

/// Random baseline: the utility is a uniform draw.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RandomUtility;

impl UtilityPolicy for RandomUtility {
    fn uses_proba(&self) -> bool {
        false
    }

    fn utility<R: Rng + ?Sized>(&self, _proba: ArrayView1<'_, f64>, rng: &mut R) -> f64 {
        rng.gen::<f64>()
    }

    fn decide<R: Rng + ?Sized>(&self, utility: f64, ctx: PolicyContext, _rng: &mut R) -> Result<Verdict> {
        Ok(Verdict {
            queried: utility < ctx.budget,
            threshold: ctx.budget,
        })
    }
}

/// Uncertainty against a fixed, budget-scaled threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedUncertainty;

impl UtilityPolicy for FixedUncertainty {
    fn utility<R: Rng + ?Sized>(&self, proba: ArrayView1<'_, f64>, _rng: &mut R) -> f64 {
        1.0 - max_proba(proba)
    }

    fn decide<R: Rng + ?Sized>(&self, utility: f64, ctx: PolicyContext, _rng: &mut R) -> Result<Verdict> {
        let inv_k = 1.0 / ctx.n_classes.max(1) as f64;
        let threshold = inv_k + ctx.budget * (1.0 - inv_k);
        Ok(Verdict {
            queried: 1.0 - utility < threshold,
            threshold,
        })
    }
}

/// Uncertainty against an adaptive threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableUncertainty {
    pub threshold: AdaptiveThreshold,
}

impl UtilityPolicy for VariableUncertainty {
    fn validate(&self) -> Result<()> {
        self.threshold.validate()
    }

    fn utility<R: Rng + ?Sized>(&self, proba: ArrayView1<'_, f64>, _rng: &mut R) -> f64 {
        1.0 - max_proba(proba)
    }

    fn decide<R: Rng + ?Sized>(&self, utility: f64, _ctx: PolicyContext, _rng: &mut R) -> Result<Verdict> {
        let threshold = self.threshold.theta;
        Ok(Verdict {
            queried: 1.0 - utility < threshold,
            threshold,
        })
    }

    fn observe(&mut self, queried: bool) {
        self.threshold.observe(queried);
    }

    fn threshold(&self) -> Option<f64> {
        Some(self.threshold.theta)
    }
}

/// Variable uncertainty with a normally jittered threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RandomVariableUncertainty {
    pub threshold: AdaptiveThreshold,
    /// Standard deviation of the multiplier `eta ~ N(1, delta)`.
    pub delta: f64,
}

impl Default for RandomVariableUncertainty {
    fn default() -> Self {
        Self {
            threshold: AdaptiveThreshold::default(),
            delta: 1.0,
        }
    }
}

impl UtilityPolicy for RandomVariableUncertainty {
    fn validate(&self) -> Result<()> {
        self.threshold.validate()?;
        if !(self.delta.is_finite() && self.delta >= 0.0) {
            return Err(QueryError::invalid_value(
                "delta",
                format!("must be finite and non-negative, got {}", self.delta),
            ));
        }
        Ok(())
    }

    fn utility<R: Rng + ?Sized>(&self, proba: ArrayView1<'_, f64>, _rng: &mut R) -> f64 {
        1.0 - max_proba(proba)
    }

    fn decide<R: Rng + ?Sized>(&self, utility: f64, _ctx: PolicyContext, rng: &mut R) -> Result<Verdict> {
        let eta = Normal::new(1.0, self.delta)
            .map_err(|e| QueryError::invalid_value("delta", e.to_string()))?
            .sample(rng);
        let threshold = self.threshold.theta * eta;
        Ok(Verdict {
            queried: 1.0 - utility < threshold,
            threshold,
        })
    }

    fn observe(&mut self, queried: bool) {
        self.threshold.observe(queried);
    }

    fn threshold(&self) -> Option<f64> {
        Some(self.threshold.theta)
    }
}

/// Margin between the two most probable classes against an adaptive threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarginUncertainty {
    pub threshold: AdaptiveThreshold,
}

impl UtilityPolicy for MarginUncertainty {
    fn default_window_size() -> i64 {
        100
    }

    fn validate(&self) -> Result<()> {
        self.threshold.validate()
    }

    fn utility<R: Rng + ?Sized>(&self, proba: ArrayView1<'_, f64>, _rng: &mut R) -> f64 {
        let (mut p1, mut p2) = (0.0f64, 0.0f64);
        for &p in proba.iter() {
            if p > p1 {
                p2 = p1;
                p1 = p;
            } else if p > p2 {
                p2 = p;
            }
        }
        1.0 - (p1 - p2)
    }

    fn decide<R: Rng + ?Sized>(&self, utility: f64, _ctx: PolicyContext, _rng: &mut R) -> Result<Verdict> {
        let threshold = self.threshold.theta;
        Ok(Verdict {
            queried: 1.0 - utility < threshold,
            threshold,
        })
    }

    fn observe(&mut self, queried: bool) {
        self.threshold.observe(queried);
    }

    fn threshold(&self) -> Option<f64> {
        Some(self.threshold.theta)
    }
}
