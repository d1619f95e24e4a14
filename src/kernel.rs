//! Pairwise similarity kernels and distance functions.
//!
//! Kernels feed kernel-based classifiers (and the precomputed-similarity fast path
//! of [`Optimal`](crate::Optimal)); distances feed the cognition window of the
//! stream strategies.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{QueryError, Result};

/// Pairwise similarity kernel.
///
/// `gamma: None` means `1 / n_features`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kernel {
    /// `exp(-gamma * ||a - b||^2)`
    Rbf { gamma: Option<f64> },
    /// `exp(-gamma * ||a - b||_1)`
    Laplacian { gamma: Option<f64> },
    /// `<a, b>`
    Linear,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Rbf { gamma: None }
    }
}

impl Kernel {
    fn gamma_for(gamma: Option<f64>, n_features: usize) -> f64 {
        match gamma {
            Some(g) if g.is_finite() && g > 0.0 => g,
            _ => 1.0 / (n_features.max(1) as f64),
        }
    }

    /// Similarity between two feature vectors.
    pub fn eval(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match *self {
            Kernel::Rbf { gamma } => {
                let g = Self::gamma_for(gamma, a.len());
                let d2: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-g * d2).exp()
            }
            Kernel::Laplacian { gamma } => {
                let g = Self::gamma_for(gamma, a.len());
                let d1: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
                (-g * d1).exp()
            }
            Kernel::Linear => a.dot(&b),
        }
    }
}

/// Kernel matrix `K[i, j] = kernel(a_i, b_j)`.
pub fn pairwise_kernels(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>, kernel: Kernel) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| kernel.eval(a.row(i), b.row(j)))
}

/// Built-in distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
}

impl DistanceMetric {
    /// Parse a metric name (`"euclidean"`, `"l2"`, `"manhattan"`, `"cityblock"`,
    /// `"l1"`, `"chebyshev"`, `"infinity"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Some(Self::Euclidean),
            "manhattan" | "cityblock" | "l1" => Some(Self::Manhattan),
            "chebyshev" | "infinity" => Some(Self::Chebyshev),
            _ => None,
        }
    }

    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match self {
            Self::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Self::Manhattan => diffs.sum(),
            Self::Chebyshev => diffs.fold(0.0, f64::max),
        }
    }
}

/// Signature of a caller-supplied distance function.
pub type DistanceFn = dyn Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64 + Send + Sync;

/// Distance configuration for the cognition window.
///
/// Stored unchecked; [`DistanceFunc::resolve`] runs at query/update time, so an
/// unknown metric name constructs fine and only fails when used.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceFunc {
    /// A built-in metric.
    Metric(DistanceMetric),
    /// A metric by name, resolved on use.
    Named(String),
    /// A custom function.
    #[cfg_attr(feature = "serde", serde(skip))]
    Custom(Arc<DistanceFn>),
}

impl Default for DistanceFunc {
    fn default() -> Self {
        Self::Metric(DistanceMetric::Euclidean)
    }
}

impl fmt::Debug for DistanceFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric(m) => f.debug_tuple("Metric").field(m).finish(),
            Self::Named(n) => f.debug_tuple("Named").field(n).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl DistanceFunc {
    /// Wrap a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Resolve into something callable, or fail with a type error.
    pub fn resolve(&self) -> Result<Distance> {
        match self {
            Self::Metric(m) => Ok(Distance::Metric(*m)),
            Self::Named(name) => DistanceMetric::from_name(name)
                .map(Distance::Metric)
                .ok_or_else(|| {
                    QueryError::invalid_type(
                        "dist_func",
                        format!("`{name}` is not a known distance function"),
                    )
                }),
            Self::Custom(f) => Ok(Distance::Custom(Arc::clone(f))),
        }
    }
}

/// A resolved, callable distance.
#[derive(Clone)]
pub enum Distance {
    Metric(DistanceMetric),
    Custom(Arc<DistanceFn>),
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric(m) => f.debug_tuple("Metric").field(m).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl Distance {
    /// Distance between two rows; a custom function returning a negative or NaN
    /// value is rejected.
    pub fn between(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Result<f64> {
        let d = match self {
            Self::Metric(m) => m.distance(a, b),
            Self::Custom(f) => f(a, b),
        };
        if d.is_nan() || d < 0.0 {
            return Err(QueryError::invalid_value(
                "dist_func",
                format!("distance must be a non-negative number, got {d}"),
            ));
        }
        Ok(d)
    }
}
