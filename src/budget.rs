//! Spent-budget accounting for stream strategies.
//!
//! [`BudgetManager`] is the seam: [`StreamQuery`](crate::StreamQuery) asks it
//! whether a label still fits and tells it every decision. [`BudgetLedger`]
//! (exponentially weighted estimate) is the default; [`ExactBudget`] compares the
//! exact running ratio.

use std::fmt;

/// Products `budget * horizon` this close to an integer count as that integer.
const TARGET_EPS: f64 = 1e-9;

/// Number of queries `floor(budget * horizon)` owed after `horizon` instances.
///
/// The product is snapped to the nearest integer first when it is within rounding
/// error of it, so `0.29 * 100` owes 29 labels, not 28.
pub fn budget_target(budget: f64, horizon: u64) -> u64 {
    let raw = budget.clamp(0.0, 1.0) * horizon as f64;
    let nearest = raw.round();
    if (raw - nearest).abs() <= TARGET_EPS * nearest.max(1.0) {
        nearest as u64
    } else {
        raw.floor() as u64
    }
}

/// Budget accounting used by stream strategies.
///
/// Implementations track how many instances were seen and queried and turn that
/// into a spend figure comparable with the configured budget fraction.
///
/// # Example
///
/// ```rust
/// use quarry::{BudgetManager, ExactBudget};
///
/// let mut b = ExactBudget::default();
/// b.record(true);
/// b.record(false);
/// assert_eq!(b.spend(), 0.5);
/// assert!(!b.budget_available(0.5));
/// assert_eq!(b.outstanding(0.5, 4), 1);
/// ```
pub trait BudgetManager: Clone + fmt::Debug + Send + Sync {
    fn queried_count(&self) -> u64;

    fn seen_count(&self) -> u64;

    /// Current spend in `[0, 1]`.
    fn spend(&self) -> f64;

    /// Account for one more instance.
    fn record(&mut self, queried: bool);

    /// Exact `queried / seen` (0 before anything was seen).
    fn ratio(&self) -> f64 {
        let seen = self.seen_count();
        if seen == 0 {
            0.0
        } else {
            self.queried_count() as f64 / seen as f64
        }
    }

    /// Whether another label fits: spend strictly below `budget`.
    fn budget_available(&self, budget: f64) -> bool {
        self.spend() < budget
    }

    /// Labels still missing to reach [`budget_target`] after `horizon` instances.
    fn outstanding(&self, budget: f64, horizon: u64) -> u64 {
        budget_target(budget, horizon).saturating_sub(self.queried_count())
    }
}

/// Exact query/seen counts plus an exponentially weighted spend estimate.
///
/// The estimate follows `u_t = u_{t-1} * (w - 1) / w + l_t`, where `l_t` is 1 when
/// instance `t` was queried. Until `w` instances have been seen the exact ratio is
/// used instead, since the estimate has not warmed up.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BudgetLedger {
    queried: u64,
    seen: u64,
    ew_spend: f64,
    window: u64,
}

impl BudgetLedger {
    /// Ledger with estimation window `window` (clamped to at least 1).
    pub fn new(window: u64) -> Self {
        Self {
            queried: 0,
            seen: 0,
            ew_spend: 0.0,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl BudgetManager for BudgetLedger {
    fn queried_count(&self) -> u64 {
        self.queried
    }

    fn seen_count(&self) -> u64 {
        self.seen
    }

    fn spend(&self) -> f64 {
        if self.seen < self.window {
            self.ratio()
        } else {
            self.ew_spend / self.window as f64
        }
    }

    fn record(&mut self, queried: bool) {
        self.seen += 1;
        let l = if queried {
            self.queried += 1;
            1.0
        } else {
            0.0
        };
        let w = self.window as f64;
        self.ew_spend = self.ew_spend * (w - 1.0) / w + l;
    }
}

/// Spend is the exact ratio over the whole stream.
///
/// Early bursts stay charged forever, unlike [`BudgetLedger`], whose estimate
/// forgets decisions older than its window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExactBudget {
    queried: u64,
    seen: u64,
}

impl ExactBudget {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BudgetManager for ExactBudget {
    fn queried_count(&self) -> u64 {
        self.queried
    }

    fn seen_count(&self) -> u64 {
        self.seen
    }

    fn spend(&self) -> f64 {
        self.ratio()
    }

    fn record(&mut self, queried: bool) {
        self.seen += 1;
        if queried {
            self.queried += 1;
        }
    }
}
