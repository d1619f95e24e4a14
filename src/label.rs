//! Class labels and the missing-label sentinel.

/// A class label.
pub type Label = i64;

/// Marks an instance whose label is not (yet) known.
///
/// Never part of a [`ClassAlphabet`]; classifiers skip rows carrying it.
pub const MISSING_LABEL: Label = i64::MIN;

/// Whether `y` carries a real class label.
#[inline]
pub fn is_labeled(y: Label) -> bool {
    y != MISSING_LABEL
}

/// Whether `y` is the missing-label sentinel.
#[inline]
pub fn is_unlabeled(y: Label) -> bool {
    y == MISSING_LABEL
}

/// Positions of labeled entries, in order.
pub fn labeled_indices(y: &[Label]) -> Vec<usize> {
    y.iter()
        .enumerate()
        .filter(|(_, &l)| is_labeled(l))
        .map(|(i, _)| i)
        .collect()
}

/// Positions of unlabeled entries, in order.
pub fn unlabeled_indices(y: &[Label]) -> Vec<usize> {
    y.iter()
        .enumerate()
        .filter(|(_, &l)| is_unlabeled(l))
        .map(|(i, _)| i)
        .collect()
}

/// Sorted, de-duplicated set of class labels (the sentinel excluded).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassAlphabet {
    classes: Vec<Label>,
}

impl ClassAlphabet {
    /// Build from explicit classes.
    pub fn new(classes: impl IntoIterator<Item = Label>) -> Self {
        let mut classes: Vec<Label> = classes.into_iter().filter(|&l| is_labeled(l)).collect();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    /// Infer from observed labels.
    pub fn from_labels(y: &[Label]) -> Self {
        Self::new(y.iter().copied())
    }

    /// Classes in ascending order.
    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Column index of `label`, or `None` for unknown labels and the sentinel.
    pub fn index_of(&self, label: Label) -> Option<usize> {
        if is_unlabeled(label) {
            return None;
        }
        self.classes.binary_search(&label).ok()
    }

    /// Label at column `idx`.
    pub fn label_at(&self, idx: usize) -> Option<Label> {
        self.classes.get(idx).copied()
    }
}
