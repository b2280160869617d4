use std::collections::HashSet;

use smartopen_core::{Candidate, CandidateId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateEvent {
    Added(Candidate),
    Removed(CandidateId),
}

/// The candidate universe a session ranks over. Kept sorted by label, then
/// id, with at most one entry per id.
#[derive(Debug, Clone, Default)]
pub struct CandidateSnapshot {
    candidates: Vec<Candidate>,
}

impl CandidateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut snapshot = Self::new();
        snapshot.refresh(candidates);
        snapshot
    }

    /// Replaces the whole universe. The first occurrence of a duplicated id
    /// wins.
    pub fn refresh(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        let mut seen = HashSet::new();
        let mut next = candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.id.clone()))
            .collect::<Vec<_>>();
        next.sort_by(|left, right| {
            left.label
                .cmp(&right.label)
                .then_with(|| left.id.cmp(&right.id))
        });

        tracing::debug!(
            previous = self.candidates.len(),
            current = next.len(),
            "refreshed candidate snapshot"
        );
        self.candidates = next;
    }

    /// Applies one change; returns whether the universe changed.
    pub fn apply(&mut self, event: CandidateEvent) -> bool {
        match event {
            CandidateEvent::Added(candidate) => {
                if let Some(existing) = self.position_of(&candidate.id) {
                    if self.candidates[existing] == candidate {
                        return false;
                    }
                    self.candidates.remove(existing);
                }
                let index = self
                    .candidates
                    .binary_search_by(|entry| {
                        entry
                            .label
                            .cmp(&candidate.label)
                            .then_with(|| entry.id.cmp(&candidate.id))
                    })
                    .unwrap_or_else(|index| index);
                self.candidates.insert(index, candidate);
                true
            }
            CandidateEvent::Removed(id) => match self.position_of(&id) {
                Some(index) => {
                    self.candidates.remove(index);
                    true
                }
                None => false,
            },
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position_of(id).is_some()
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|candidate| candidate.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(snapshot: &CandidateSnapshot) -> Vec<&str> {
        snapshot
            .candidates()
            .iter()
            .map(|candidate| candidate.label.as_str())
            .collect()
    }

    #[test]
    fn refresh_sorts_and_dedups_by_id() {
        let snapshot = CandidateSnapshot::from_candidates([
            Candidate::from_relative("src/b.rs"),
            Candidate::from_relative("src/a.rs"),
            Candidate::new("src/b.rs", "duplicate/b.rs"),
        ]);

        assert_eq!(labels(&snapshot), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains("src/a.rs"));
    }

    #[test]
    fn refresh_replaces_previous_universe() {
        let mut snapshot = CandidateSnapshot::from_candidates([Candidate::from_relative("old.rs")]);
        snapshot.refresh([Candidate::from_relative("new.rs")]);

        assert_eq!(labels(&snapshot), vec!["new.rs"]);
        assert!(!snapshot.contains("old.rs"));
    }

    #[test]
    fn apply_reports_changes_and_keeps_order() {
        let mut snapshot = CandidateSnapshot::from_candidates([
            Candidate::from_relative("a.rs"),
            Candidate::from_relative("c.rs"),
        ]);

        assert!(snapshot.apply(CandidateEvent::Added(Candidate::from_relative("b.rs"))));
        assert_eq!(labels(&snapshot), vec!["a.rs", "b.rs", "c.rs"]);

        assert!(!snapshot.apply(CandidateEvent::Added(Candidate::from_relative("b.rs"))));
        assert_eq!(snapshot.len(), 3);

        assert!(snapshot.apply(CandidateEvent::Removed("a.rs".to_owned())));
        assert!(!snapshot.apply(CandidateEvent::Removed("a.rs".to_owned())));
        assert_eq!(labels(&snapshot), vec!["b.rs", "c.rs"]);
    }

    #[test]
    fn apply_relabels_existing_id() {
        let mut snapshot = CandidateSnapshot::from_candidates([
            Candidate::new("id-1", "z.rs"),
            Candidate::new("id-2", "m.rs"),
        ]);

        assert!(snapshot.apply(CandidateEvent::Added(Candidate::new("id-1", "a.rs"))));
        assert_eq!(labels(&snapshot), vec!["a.rs", "m.rs"]);
        assert!(CandidateSnapshot::new().is_empty());
    }
}
