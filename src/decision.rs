//! Audit notes for stream decisions.
//!
//! Every candidate processed by a stream strategy gets one [`DecisionNote`] saying
//! which stage settled it. Notes are small, typed, and stable; prefer adding new
//! variants over changing existing semantics.

/// Why a stream candidate was queried or skipped.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecisionNote {
    /// `force_full_budget`: the candidates left in the call were no more than the
    /// labels still owed, so the candidate was queried unconditionally.
    Forced { outstanding: u64, remaining: usize },

    /// Too few window records had this candidate as their new nearest neighbour.
    SparseRegion {
        density_factor: usize,
        density_threshold: i64,
    },

    /// The spend estimate had reached the budget.
    BudgetExhausted { spend: f64, budget: f64 },

    /// The utility policy decided. `threshold` is the value the candidate was
    /// compared against (after any randomization).
    Policy { queried: bool, threshold: f64 },
}

impl DecisionNote {
    /// Whether the candidate ended up queried.
    pub fn queried(&self) -> bool {
        match self {
            Self::Forced { .. } => true,
            Self::SparseRegion { .. } | Self::BudgetExhausted { .. } => false,
            Self::Policy { queried, .. } => *queried,
        }
    }
}
