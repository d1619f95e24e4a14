//! Cognition window: recent stream instances used for local density estimates.

use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

use crate::{Distance, Result};

/// One instance remembered by the window.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowRecord {
    pub features: Array1<f64>,
    /// Distance to the nearest instance seen while this one was in the window
    /// (infinite until a neighbour arrives).
    pub nearest: f64,
    /// Whether the instance was queried.
    pub queried: bool,
    /// Stream position at arrival.
    pub arrived_at: u64,
}

/// Bounded FIFO of [`WindowRecord`]s.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CognitionWindow {
    cap: usize,
    buf: VecDeque<WindowRecord>,
}

impl CognitionWindow {
    /// Create an empty window with capacity `cap` (minimum 1).
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            buf: VecDeque::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &WindowRecord> + '_ {
        self.buf.iter()
    }

    /// Change the capacity, evicting the oldest records if it shrinks.
    pub fn set_cap(&mut self, cap: usize) {
        self.cap = cap.max(1);
        while self.buf.len() > self.cap {
            self.buf.pop_front();
        }
    }

    /// Admit `x` and return its local density factor: the number of records for
    /// which `x` is now the nearest neighbour.
    ///
    /// Those records' nearest distances shrink to their distance to `x`. The new
    /// record starts unqueried; the oldest record is evicted at capacity. On error
    /// the window is left unchanged.
    pub fn admit(&mut self, x: ArrayView1<'_, f64>, arrived_at: u64, dist: &Distance) -> Result<usize> {
        let dists = self
            .buf
            .iter()
            .map(|r| dist.between(x, r.features.view()))
            .collect::<Result<Vec<f64>>>()?;

        let mut ldf = 0usize;
        let mut own = f64::INFINITY;
        for (r, &d) in self.buf.iter_mut().zip(&dists) {
            if d < r.nearest {
                r.nearest = d;
                ldf += 1;
            }
            own = own.min(d);
        }

        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(WindowRecord {
            features: x.to_owned(),
            nearest: own,
            queried: false,
            arrived_at,
        });
        Ok(ldf)
    }

    /// Set the decision flag of the most recent record.
    pub fn set_last_queried(&mut self, queried: bool) {
        if let Some(last) = self.buf.back_mut() {
            last.queried = queried;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DistanceFunc, DistanceMetric};
    use ndarray::array;

    fn euclid() -> Distance {
        DistanceFunc::Metric(DistanceMetric::Euclidean).resolve().unwrap()
    }

    #[test]
    fn fifo_eviction_keeps_newest() {
        let d = euclid();
        let mut w = CognitionWindow::new(3);
        for t in 0..5u64 {
            w.admit(array![t as f64].view(), t, &d).unwrap();
        }
        assert_eq!(w.len(), 3);
        let arrivals: Vec<u64> = w.iter().map(|r| r.arrived_at).collect();
        assert_eq!(arrivals, vec![2, 3, 4]);
    }

    #[test]
    fn density_factor_counts_new_nearest_neighbours() {
        let d = euclid();
        let mut w = CognitionWindow::new(10);
        assert_eq!(w.admit(array![0.0].view(), 0, &d).unwrap(), 0);
        // First neighbour of 0.0.
        assert_eq!(w.admit(array![10.0].view(), 1, &d).unwrap(), 1);
        // Closer to both than they are to each other.
        assert_eq!(w.admit(array![5.0].view(), 2, &d).unwrap(), 2);
        // Far away: improves nobody.
        assert_eq!(w.admit(array![100.0].view(), 3, &d).unwrap(), 0);
        assert_eq!(w.iter().last().map(|r| r.nearest), Some(90.0));
    }

    #[test]
    fn failing_distance_leaves_window_untouched() {
        let bad = DistanceFunc::custom(|_, _| -1.0).resolve().unwrap();
        let mut w = CognitionWindow::new(4);
        w.admit(array![0.0].view(), 0, &euclid()).unwrap();
        let before = w.clone();
        assert!(w.admit(array![1.0].view(), 1, &bad).is_err());
        assert_eq!(w, before);
    }

    #[test]
    fn last_record_carries_decision() {
        let mut w = CognitionWindow::new(2);
        w.admit(array![0.0].view(), 0, &euclid()).unwrap();
        w.set_last_queried(true);
        assert!(w.iter().all(|r| r.queried));
    }
}
