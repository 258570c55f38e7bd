//! Page selection: which rendered pages take part in the comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Include/exclude filters over 0-based page indexes.
///
/// Both sets may be populated at once: a page must be in `only` (when `only`
/// is non-empty) and must not be in `skip`. Indexes beyond the document are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSelector {
    pub only: BTreeSet<usize>,
    pub skip: BTreeSet<usize>,
}

impl PageSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only(&mut self, pages: impl IntoIterator<Item = usize>) {
        self.only.extend(pages);
    }

    pub fn skip(&mut self, pages: impl IntoIterator<Item = usize>) {
        self.skip.extend(pages);
    }

    /// True when neither filter is set.
    pub fn is_all(&self) -> bool {
        self.only.is_empty() && self.skip.is_empty()
    }

    /// Effective page list, ascending, drawn from `available`.
    pub fn to_indices(&self, available: &[usize]) -> Vec<usize> {
        let mut indices: Vec<usize> = available
            .iter()
            .copied()
            .filter(|p| self.only.is_empty() || self.only.contains(p))
            .filter(|p| !self.skip.contains(p))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
