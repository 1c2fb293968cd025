#![forbid(unsafe_code)]

//! Dropdown open state and keyboard highlight.
//!
//! # Invariants
//!
//! - While open with a non-empty candidate list, the highlighted index is
//!   within bounds.
//! - Replacing the candidate list resets the highlight to the first row.
//! - The highlight is only moved while open.

use tracing::trace;

use dynlookup_core::CandidateRecord;

/// Open/closed state, shown candidates, and the highlighted row.
#[derive(Debug, Clone, Default)]
pub struct DropdownController {
    open: bool,
    candidates: Vec<CandidateRecord>,
    highlighted: usize,
    loading: bool,
}

impl DropdownController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the dropdown, dropping previously shown candidates.
    ///
    /// Returns `false` if it was already open (nothing changes).
    pub fn open(&mut self) -> bool {
        if self.open {
            return false;
        }
        self.open = true;
        self.candidates.clear();
        self.highlighted = 0;
        trace!("dropdown opened");
        true
    }

    /// Close the dropdown. Returns whether it was open.
    pub fn close(&mut self) -> bool {
        let was_open = std::mem::replace(&mut self.open, false);
        if was_open {
            trace!("dropdown closed");
        }
        was_open
    }

    /// Replace the shown candidates and highlight the first row.
    pub fn set_candidates(&mut self, candidates: Vec<CandidateRecord>) {
        self.candidates = candidates;
        self.highlighted = 0;
        self.loading = false;
    }

    pub fn clear_candidates(&mut self) {
        self.candidates.clear();
        self.highlighted = 0;
    }

    /// Move the highlight back to the first row (the search text changed).
    pub fn reset_highlight(&mut self) {
        self.highlighted = 0;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Move the highlight down, wrapping to the top.
    ///
    /// Returns the new index, or `None` when closed or empty.
    pub fn move_down(&mut self) -> Option<usize> {
        let len = self.navigable_len()?;
        self.highlighted = (self.highlighted + 1) % len;
        Some(self.highlighted)
    }

    /// Move the highlight up, wrapping to the bottom.
    pub fn move_up(&mut self) -> Option<usize> {
        let len = self.navigable_len()?;
        self.highlighted = (self.highlighted + len - 1) % len;
        Some(self.highlighted)
    }

    fn navigable_len(&self) -> Option<usize> {
        (self.open && !self.candidates.is_empty()).then_some(self.candidates.len())
    }

    /// The highlighted candidate if it can be committed.
    #[must_use]
    pub fn highlighted(&self) -> Option<&CandidateRecord> {
        if !self.open {
            return None;
        }
        self.candidates
            .get(self.highlighted)
            .filter(|c| c.is_selectable())
    }

    /// Index of the highlighted row while open.
    #[must_use]
    pub fn highlighted_index(&self) -> Option<usize> {
        self.navigable_len().map(|_| self.highlighted)
    }

    /// Candidate at `index` if it can be committed.
    #[must_use]
    pub fn selectable(&self, index: usize) -> Option<&CandidateRecord> {
        self.candidates.get(index).filter(|c| c.is_selectable())
    }

    #[must_use]
    pub fn candidates(&self) -> &[CandidateRecord] {
        &self.candidates
    }

    /// Whether there is at least one selectable candidate.
    #[must_use]
    pub fn has_results(&self) -> bool {
        self.candidates.iter().any(CandidateRecord::is_selectable)
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynlookup_core::Row;
    use proptest::prelude::*;
    use serde_json::Value;

    fn candidates(n: usize) -> Vec<CandidateRecord> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("Id".into(), Value::String(format!("{i}")));
                row.insert("Name".into(), Value::String(format!("Row {i}")));
                CandidateRecord::from_row(row, "Name", "Id")
            })
            .collect()
    }

    fn open_with(n: usize) -> DropdownController {
        let mut d = DropdownController::new();
        d.open();
        d.set_candidates(candidates(n));
        d
    }

    #[test]
    fn open_clears_previous_candidates() {
        let mut d = open_with(3);
        d.close();
        assert_eq!(d.candidates().len(), 3);
        assert!(d.open());
        assert!(d.candidates().is_empty());
        assert!(!d.open());
    }

    #[test]
    fn navigation_requires_open() {
        let mut d = open_with(3);
        d.close();
        assert_eq!(d.move_down(), None);
        assert_eq!(d.highlighted_index(), None);
        assert!(d.highlighted().is_none());
    }

    #[test]
    fn wraps_both_ways() {
        let mut d = open_with(3);
        assert_eq!(d.move_up(), Some(2));
        assert_eq!(d.move_down(), Some(0));
        assert_eq!(d.move_down(), Some(1));
    }

    #[test]
    fn new_candidates_reset_highlight() {
        let mut d = open_with(4);
        d.move_down();
        d.move_down();
        d.set_candidates(candidates(2));
        assert_eq!(d.highlighted_index(), Some(0));
    }

    #[test]
    fn placeholder_is_never_highlighted_for_commit() {
        let mut d = DropdownController::new();
        d.open();
        d.set_candidates(vec![CandidateRecord::no_records("No Records Found")]);
        assert_eq!(d.highlighted_index(), Some(0));
        assert!(d.highlighted().is_none());
        assert!(!d.has_results());
        assert!(d.selectable(0).is_none());
    }

    proptest! {
        #[test]
        fn down_is_successor_mod_n(n in 1usize..30, k in 0usize..30) {
            let k = k % n;
            let mut d = open_with(n);
            for _ in 0..k {
                d.move_down();
            }
            prop_assert_eq!(d.highlighted_index(), Some(k));
            prop_assert_eq!(d.move_down(), Some((k + 1) % n));
        }

        #[test]
        fn up_is_predecessor_mod_n(n in 1usize..30, k in 0usize..30) {
            let k = k % n;
            let mut d = open_with(n);
            for _ in 0..k {
                d.move_down();
            }
            prop_assert_eq!(d.move_up(), Some((k + n - 1) % n));
        }

        #[test]
        fn highlight_stays_in_bounds(n in 1usize..20, moves in proptest::collection::vec(any::<bool>(), 0..60)) {
            let mut d = open_with(n);
            for down in moves {
                if down { d.move_down(); } else { d.move_up(); }
                let idx = d.highlighted_index().unwrap();
                prop_assert!(idx < n);
            }
        }
    }
}
