//! Per-node CPU use tally
//!
//! Counts how many containers currently hold each CPU id. The tally is a plain
//! value owned by whoever replays allocations on a node; the over-quota
//! checker only reads it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreUseTally {
    counts: BTreeMap<u32, u32>,
}

impl CoreUseTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one container's bound CPU ids
    pub fn record(&mut self, cpu_ids: &[u32]) {
        for &id in cpu_ids {
            *self.counts.entry(id).or_insert(0) += 1;
        }
    }

    /// Release one container's bound CPU ids.
    ///
    /// Counts never go below zero and entries reaching zero are dropped.
    pub fn release(&mut self, cpu_ids: &[u32]) {
        for id in cpu_ids {
            if let Some(count) = self.counts.get_mut(id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.counts.remove(id);
                }
            }
        }
    }

    pub fn get(&self, cpu_id: u32) -> u32 {
        self.counts.get(&cpu_id).copied().unwrap_or(0)
    }

    /// Sum of all use counts
    pub fn bound_total(&self) -> u64 {
        self.counts.values().map(|&count| u64::from(count)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.counts.iter().map(|(&id, &count)| (id, count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(u32, u32)> for CoreUseTally {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        let mut tally = CoreUseTally::new();
        for (id, count) in iter {
            if count > 0 {
                *tally.counts.entry(id).or_insert(0) += count;
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_release() {
        let mut tally = CoreUseTally::new();
        tally.record(&[0, 1, 2]);
        tally.record(&[1, 2]);

        assert_eq!(tally.get(0), 1);
        assert_eq!(tally.get(1), 2);
        assert_eq!(tally.bound_total(), 5);

        tally.release(&[0, 1]);
        assert_eq!(tally.get(0), 0);
        assert_eq!(tally.get(1), 1);
        assert_eq!(tally.len(), 2);
    }

    #[test]
    fn test_release_unknown_id_is_noop() {
        let mut tally = CoreUseTally::new();
        tally.record(&[4]);
        tally.release(&[4, 4, 9]);

        assert!(tally.is_empty());
        assert_eq!(tally.bound_total(), 0);
    }

    #[test]
    fn test_collect_from_pairs() {
        let tally: CoreUseTally = vec![(0, 2), (1, 0), (3, 1)].into_iter().collect();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally.bound_total(), 3);

        let json = serde_json::to_string(&tally).unwrap();
        assert_eq!(json, r#"{"0":2,"3":1}"#);
    }
}
