//! `quarry`: active-learning query strategies.
//!
//! Query strategies decide which unlabeled instances are worth a label. This crate
//! has two families:
//!
//! - **Batch, pool-based**: [`Optimal`] searches label combinations of up to
//!   `nonmyopic_look_ahead` candidates, scores each refit on a held-out evaluation
//!   set, and greedily fills a batch. It knows the candidates' true labels, so it is
//!   an oracle baseline for other strategies.
//! - **Stream-based**: [`StreamQuery`] decides per arriving instance whether to
//!   query it, under a labeling budget, with a cognition window for local density.
//!   The variants [`CogDqsRan`], [`CogDqsFixUn`], [`CogDqsVarUn`],
//!   [`CogDqsRanVarUn`] and [`DbStream`] differ only in their [`UtilityPolicy`].
//!
//! **Goals:**
//! - **Deterministic by default**: every random choice comes from a seeded RNG;
//!   repeating a query on the same state gives the same answer.
//! - **Deferred validation**: configurations are plain records; `query` / `update`
//!   validate them and return a [`QueryError`] instead of panicking.
//! - **No hidden mutation**: strategies clone the classifier before fitting, and
//!   stream state only advances in [`StreamQuery::update`].
//!
//! **Collaborators:**
//! - [`Classifier`]: `fit` / `predict_proba` / `predict` over `ndarray` matrices,
//!   with an optional precomputed-similarity capability that [`Optimal`] uses to
//!   avoid recomputing kernels. [`ParzenWindowClassifier`] is a reference
//!   implementation.
//! - [`Scorer`]: evaluation metric for [`Optimal`] ([`Accuracy`], [`ZeroOneLoss`],
//!   [`FnScorer`]).
//! - [`BudgetManager`]: spend accounting for [`StreamQuery`] ([`BudgetLedger`] by
//!   default, [`ExactBudget`]).
//!
//! Labels are `i64`; [`MISSING_LABEL`] marks unlabeled rows.
//!
//! **Features:**
//! - `serde`: derives for configuration and result types.
//! - `parallel`: evaluates label combinations in [`Optimal`] with rayon. Ties still
//!   resolve as in the sequential scan.
//!
//! **Non-goals:**
//! - Not a classifier library: [`ParzenWindowClassifier`] exists for tests and as
//!   a reference collaborator.
//! - No data loading, plotting, or experiment harnesses.

#![forbid(unsafe_code)]

/// Epsilon used for floating-point tie-breaking.
///
/// Utilities within this distance of the maximum count as tied.
const TIEBREAK_EPS: f64 = 1e-12;

mod error;
pub use error::*;

mod label;
pub use label::*;

mod utils;
pub use utils::{mix_seed, n_combinations, rand_argmax};

mod kernel;
pub use kernel::*;

mod classifier;
pub use classifier::*;

mod scoring;
pub use scoring::*;

mod optimal;
pub use optimal::*;

mod budget;
pub use budget::*;

mod window;
pub use window::*;

mod decision;
pub use decision::*;

mod policy;
pub use policy::*;

mod stream;
pub use stream::*;
