//! Integration tests for the optimal batch selector.

use ndarray::{array, Array2, ArrayView1, ArrayView2};
use proptest::prelude::*;
use quarry::{
    Accuracy, Classifier, ErrorKind, Label, Optimal, OptimalConfig, OptimalQuery,
    ParzenWindowClassifier, PwcConfig, Result, Scorer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

fn pwc() -> ParzenWindowClassifier {
    ParzenWindowClassifier::with_classes([0, 1])
}

/// Same classifier without the precomputed-similarity capability.
#[derive(Debug, Clone)]
struct FeaturesOnly(ParzenWindowClassifier);

impl Classifier for FeaturesOnly {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[Label],
        sample_weight: Option<ArrayView1<'_, f64>>,
    ) -> Result<()> {
        self.0.fit(x, y, sample_weight)
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.0.predict_proba(x)
    }

    fn classes(&self) -> &[Label] {
        self.0.classes()
    }
}

/// Two Gaussian blobs centred at -2 and +2 on every axis.
fn blobs(n: usize, dims: usize, seed: u64) -> (Array2<f64>, Vec<Label>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    let mut x = Array2::zeros((n, dims));
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let label: Label = if rng.gen_bool(0.5) { 1 } else { 0 };
        let centre = if label == 1 { 2.0 } else { -2.0 };
        for d in 0..dims {
            x[[i, d]] = centre + noise.sample(&mut rng);
        }
        y.push(label);
    }
    (x, y)
}

fn same_utilities(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
}

#[test]
fn distant_candidate_wins_and_redundant_one_is_worst() {
    let x_cand = array![[0.0], [1.0], [2.0], [5.0]];
    let y_cand = [0, 1, 0, 1];
    let x = array![[1.0]];
    let y = [0];

    let strategy = Optimal::new(pwc(), OptimalConfig::default());
    let q = OptimalQuery::new(x_cand.view(), &y_cand, x.view(), &y, x_cand.view(), &y_cand);
    let sel = strategy.query(&q).unwrap();

    assert_eq!(sel.indices, vec![3]);
    assert_eq!(sel.utilities.dim(), (1, 4));
    let u = sel.utilities.row(0);
    let expected = [0.125, 0.0, 0.125, 0.25];
    for (got, want) in u.iter().zip(expected) {
        assert!((got - want).abs() < 1e-12, "utilities {u:?}");
    }
    let lowest = (0..4)
        .min_by(|&a, &b| u[a].partial_cmp(&u[b]).unwrap())
        .unwrap();
    assert_eq!(lowest, 1);
}

#[test]
fn repeated_queries_are_identical() {
    let (x_cand, y_cand) = blobs(8, 2, 1);
    let (x, y) = blobs(4, 2, 2);
    let (x_eval, y_eval) = blobs(12, 2, 3);
    let strategy = Optimal::new(
        pwc(),
        OptimalConfig {
            seed: 17,
            ..OptimalConfig::default()
        },
    );
    let q = OptimalQuery::new(
        x_cand.view(),
        &y_cand,
        x.view(),
        &y,
        x_eval.view(),
        &y_eval,
    )
    .batch_size(3);
    let a = strategy.query(&q).unwrap();
    let b = strategy.query(&q).unwrap();
    assert_eq!(a.indices, b.indices);
    assert!(same_utilities(&a.utilities, &b.utilities));
}

#[test]
fn batch_utilities_have_one_row_per_round() {
    let (x_cand, y_cand) = blobs(6, 2, 4);
    let (x, y) = blobs(2, 2, 5);
    let strategy = Optimal::new(pwc(), OptimalConfig::default());
    let q = OptimalQuery::new(
        x_cand.view(),
        &y_cand,
        x.view(),
        &y,
        x_cand.view(),
        &y_cand,
    )
    .batch_size(5);
    let sel = strategy.query(&q).unwrap();
    assert_eq!(sel.utilities.dim(), (5, 6));
    assert_eq!(sel.indices.len(), 5);
    for (round, row) in sel.utilities.outer_iter().enumerate() {
        assert_eq!(row.iter().filter(|v| v.is_nan()).count(), round);
    }
}

#[test]
fn oversized_batch_fails_unless_truncation_is_allowed() {
    let (x_cand, y_cand) = blobs(10, 2, 6);
    let (x, y) = blobs(2, 2, 7);
    let q = OptimalQuery::new(
        x_cand.view(),
        &y_cand,
        x.view(),
        &y,
        x_cand.view(),
        &y_cand,
    )
    .batch_size(15);

    let strict = Optimal::new(
        pwc(),
        OptimalConfig {
            nonmyopic_look_ahead: 1,
            ..OptimalConfig::default()
        },
    );
    let err = strict.query(&q).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);

    let lenient = Optimal::new(
        pwc(),
        OptimalConfig {
            nonmyopic_look_ahead: 1,
            allow_batch_truncation: true,
            ..OptimalConfig::default()
        },
    );
    let sel = lenient.query(&q).unwrap();
    assert_eq!(sel.indices.len(), 10);
    assert_eq!(sel.utilities.dim(), (10, 10));
    let mut sorted = sel.indices.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..10).collect::<Vec<_>>());
}

#[test]
fn input_errors_are_reported_before_any_fit() {
    let x_cand = array![[0.0], [1.0]];
    let strategy = Optimal::new(pwc(), OptimalConfig::default());

    let empty = Array2::<f64>::zeros((0, 1));
    let err = strategy
        .query(&OptimalQuery::new(
            empty.view(),
            &[],
            x_cand.view(),
            &[0, 1],
            x_cand.view(),
            &[0, 1],
        ))
        .unwrap_err();
    assert_eq!(err.param(), Some("x_cand"));

    let err = strategy
        .query(&OptimalQuery::new(
            x_cand.view(),
            &[0],
            x_cand.view(),
            &[0, 1],
            x_cand.view(),
            &[0, 1],
        ))
        .unwrap_err();
    assert_eq!(err.param(), Some("y_cand"));

    let w = array![1.0, -1.0];
    let err = strategy
        .query(
            &OptimalQuery::new(
                x_cand.view(),
                &[0, 1],
                x_cand.view(),
                &[0, 1],
                x_cand.view(),
                &[0, 1],
            )
            .sample_weight_cand(w.view()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.param(), Some("sample_weight_cand"));
}

#[test]
fn classifier_failures_abort_the_query() {
    // No fixed classes and no labels anywhere: the classifier cannot predict.
    let x_cand = array![[0.0], [1.0]];
    let missing = [quarry::MISSING_LABEL, quarry::MISSING_LABEL];
    let strategy = Optimal::new(ParzenWindowClassifier::default(), OptimalConfig::default());
    let err = strategy
        .query(&OptimalQuery::new(
            x_cand.view(),
            &missing,
            x_cand.view(),
            &missing,
            x_cand.view(),
            &[0, 1],
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Classifier);
}

#[test]
fn eval_weights_reach_the_scorer() {
    struct WeightSum;
    impl Scorer for WeightSum {
        fn score(&self, t: &[Label], p: &[Label], w: Option<ArrayView1<'_, f64>>) -> Result<f64> {
            Accuracy.score(t, p, None)?;
            Ok(w.map_or(0.0, |w| w.sum()))
        }
    }
    let x_cand = array![[0.0], [5.0]];
    let y_cand = [0, 1];
    let w_eval = array![2.0, 3.0];
    let strategy = Optimal::with_scorer(pwc(), WeightSum, OptimalConfig::default());
    let q = OptimalQuery::new(
        x_cand.view(),
        &y_cand,
        x_cand.view(),
        &y_cand,
        x_cand.view(),
        &y_cand,
    )
    .sample_weight_eval(w_eval.view());
    // Constant score: every delta is zero.
    let sel = strategy.query(&q).unwrap();
    assert!(sel.utilities.iter().all(|&u| u == 0.0));
}

#[test]
fn active_learning_cycle_labels_distinct_candidates() {
    let (x_pool, y_pool) = blobs(16, 2, 11);
    let (x_eval, y_eval) = blobs(30, 2, 12);
    let strategy = Optimal::new(
        pwc(),
        OptimalConfig {
            nonmyopic_look_ahead: 1,
            ..OptimalConfig::default()
        },
    );

    // Start with everything unlabeled; move one candidate per cycle.
    let mut y_known = vec![quarry::MISSING_LABEL; x_pool.nrows()];
    let mut picked = Vec::new();
    for _ in 0..6 {
        let unlabeled = quarry::unlabeled_indices(&y_known);
        let x_cand = x_pool.select(ndarray::Axis(0), &unlabeled);
        let y_cand: Vec<Label> = unlabeled.iter().map(|&i| y_pool[i]).collect();
        let sel = strategy
            .query(&OptimalQuery::new(
                x_cand.view(),
                &y_cand,
                x_pool.view(),
                &y_known,
                x_eval.view(),
                &y_eval,
            ))
            .unwrap();
        let idx = unlabeled[sel.indices[0]];
        y_known[idx] = y_pool[idx];
        picked.push(idx);
    }

    let mut uniq = picked.clone();
    uniq.sort_unstable();
    uniq.dedup();
    assert_eq!(uniq.len(), picked.len());
    assert_eq!(quarry::labeled_indices(&y_known).len(), 6);

    let mut clf = pwc();
    clf.fit(x_pool.view(), &y_known, None).unwrap();
    let pred = clf.predict(x_eval.view()).unwrap();
    let acc = Accuracy.score(&y_eval, &pred, None).unwrap();
    assert!(acc >= 0.9, "accuracy after 6 oracle picks: {acc}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Precomputing the similarity matrix never changes the outcome.
    #[test]
    fn kernel_path_matches_feature_path(seed in any::<u64>(), n in 2usize..7, look_ahead in 1usize..3) {
        let (x_cand, y_cand) = blobs(n, 2, seed);
        let (x, y) = blobs(3, 2, seed.wrapping_add(1));
        let (x_eval, y_eval) = blobs(10, 2, seed.wrapping_add(2));
        let cfg = OptimalConfig { nonmyopic_look_ahead: look_ahead, seed, ..OptimalConfig::default() };
        let clf = ParzenWindowClassifier::new(PwcConfig {
            classes: Some(vec![0, 1]),
            ..PwcConfig::default()
        });
        let q = OptimalQuery::new(x_cand.view(), &y_cand, x.view(), &y, x_eval.view(), &y_eval)
            .batch_size(n.min(3));

        let fast = Optimal::new(clf.clone(), cfg).query(&q).unwrap();
        let slow = Optimal::new(FeaturesOnly(clf), cfg).query(&q).unwrap();
        prop_assert_eq!(&fast.indices, &slow.indices);
        prop_assert!(same_utilities(&fast.utilities, &slow.utilities));
    }

    /// Selected indices are distinct, in range, and carry the round maximum.
    #[test]
    fn selection_is_a_round_maximum(seed in any::<u64>(), n in 1usize..7, batch in 1usize..4) {
        let (x_cand, y_cand) = blobs(n, 1, seed);
        let (x_eval, y_eval) = blobs(8, 1, seed ^ 0xA5A5);
        let empty = Array2::<f64>::zeros((0, 1));
        let strategy = Optimal::new(pwc(), OptimalConfig {
            seed,
            allow_batch_truncation: true,
            ..OptimalConfig::default()
        });
        let q = OptimalQuery::new(x_cand.view(), &y_cand, empty.view(), &[], x_eval.view(), &y_eval)
            .batch_size(batch);
        let sel = strategy.query(&q).unwrap();
        prop_assert_eq!(sel.indices.len(), batch.min(n));
        for (round, &i) in sel.indices.iter().enumerate() {
            prop_assert!(i < n);
            let row = sel.utilities.row(round);
            let best = row.iter().copied().filter(|v| !v.is_nan()).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!((row[i] - best).abs() <= 1e-12);
        }
        let mut uniq = sel.indices.clone();
        uniq.sort_unstable();
        uniq.dedup();
        prop_assert_eq!(uniq.len(), sel.indices.len());
    }
}
