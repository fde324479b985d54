// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Episode progress state (spec §3.7): the per-region arrays an adaptive
//! join or scan-select owns across episode boundaries, and the safe
//! resumption rule of spec §4.6.3.

use crate::error::{Error, Result};

/// Flags[p][t]: whether predicate `p` is evaluable once the chosen order
/// has bound tables `0..=t`.
#[derive(Debug, Clone)]
pub struct FlagArray {
    num_predicates: usize,
    num_levels: usize,
    flags: Vec<bool>,
}

impl FlagArray {
    pub fn new(num_predicates: usize, num_levels: usize) -> Self {
        FlagArray {
            num_predicates,
            num_levels,
            flags: vec![false; num_predicates * num_levels],
        }
    }

    fn index(&self, predicate: usize, level: usize) -> usize {
        predicate * self.num_levels + level
    }

    pub fn get(&self, predicate: usize, level: usize) -> bool {
        self.flags[self.index(predicate, level)]
    }

    pub fn set(&mut self, predicate: usize, level: usize, value: bool) {
        let idx = self.index(predicate, level);
        self.flags[idx] = value;
    }

    pub fn clear(&mut self) {
        self.flags.iter_mut().for_each(|f| *f = false);
    }
}

/// The arrays of spec §3.7, owned by one adaptive region (one join or one
/// scan-select) for the lifetime of the query.
#[derive(Debug)]
pub struct ProgressState {
    num_levels: usize,
    cardinalities: Vec<i32>,
    /// Largest tuple index known fully processed at level k, across all
    /// orders tried so far. Monotonically non-decreasing (spec §3.7).
    progress: Vec<i32>,
    /// Resume point for level k under the next order.
    offset: Vec<i32>,
    /// Scratch: tuple index currently being examined at level k.
    idx: Vec<i32>,
    /// Level the most recent episode suspended at.
    table_ctr: usize,
    num_result_tuples: u64,
}

impl ProgressState {
    pub fn new(num_levels: usize, cardinalities: Vec<i32>) -> Self {
        assert_eq!(cardinalities.len(), num_levels);
        ProgressState {
            num_levels,
            cardinalities,
            progress: vec![-1; num_levels],
            offset: vec![-1; num_levels],
            idx: vec![-1; num_levels],
            table_ctr: 0,
            num_result_tuples: 0,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn progress(&self, level: usize) -> i32 {
        self.progress[level]
    }

    pub fn offset(&self, level: usize) -> i32 {
        self.offset[level]
    }

    pub fn idx(&self, level: usize) -> i32 {
        self.idx[level]
    }

    pub fn table_ctr(&self) -> usize {
        self.table_ctr
    }

    pub fn num_result_tuples(&self) -> u64 {
        self.num_result_tuples
    }

    pub fn increment_result_tuples(&mut self) {
        self.num_result_tuples += 1;
    }

    pub fn cardinality(&self, level: usize) -> i32 {
        self.cardinalities[level]
    }

    /// Writes `idx` as the scratch position at `level`, validating the
    /// no-negative-progress invariant of spec §7: a handler reporting an
    /// `idx` below the already-committed `progress[level]` is an ABI
    /// violation, not a recoverable condition.
    pub fn set_idx(&mut self, level: usize, idx: i32) -> Result<()> {
        if idx < self.progress[level] {
            return Err(Error::NegativeProgress {
                level,
                idx,
                progress: self.progress[level],
            });
        }
        self.idx[level] = idx;
        Ok(())
    }

    pub fn set_table_ctr(&mut self, level: usize) {
        self.table_ctr = level;
    }

    /// Commits `idx[k]` as the new `progress[k]` for every level up to and
    /// including `last_completed_level`, applying spec §3.7's monotonicity
    /// invariant (never move `progress[k]` backwards).
    pub fn commit_progress_up_to(&mut self, last_completed_level: usize) -> Result<()> {
        for level in 0..=last_completed_level {
            let candidate = self.idx[level];
            if candidate < self.progress[level] {
                return Err(Error::NegativeProgress {
                    level,
                    idx: candidate,
                    progress: self.progress[level],
                });
            }
            self.progress[level] = candidate;
        }
        Ok(())
    }

    /// Safe-resumption rule of spec §4.6.3: the new order agrees with the
    /// previous one on its first `divergence_level` levels, so
    /// `offset[j] = progress[j]` for `j < divergence_level`; everything at
    /// or after `divergence_level` is zeroed (rescanned from the start,
    /// made safe by the dedup table).
    pub fn install_offsets_for_new_order(&mut self, divergence_level: usize) {
        for level in 0..self.num_levels {
            self.offset[level] = if level < divergence_level {
                self.progress[level]
            } else {
                -1
            };
        }
    }

    /// `last_completed_tuple` at the root level, used by the episode loop
    /// to decide whether the whole region is exhausted (spec §4.6.1).
    pub fn is_exhausted(&self) -> bool {
        self.progress[0] >= self.cardinalities[0] - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_decreases() {
        let mut state = ProgressState::new(2, vec![10, 10]);
        state.set_idx(0, 3).unwrap();
        state.set_idx(1, 5).unwrap();
        state.commit_progress_up_to(1).unwrap();
        assert_eq!(state.progress(0), 3);
        assert_eq!(state.progress(1), 5);

        // a later episode that only reaches idx=2 at level 0 is an ABI
        // violation and must be rejected, not silently applied.
        let err = state.set_idx(0, 2).unwrap_err();
        assert!(matches!(err, Error::NegativeProgress { .. }));
    }

    #[test]
    fn install_offsets_keeps_prefix_and_zeroes_tail() {
        let mut state = ProgressState::new(3, vec![10, 10, 10]);
        state.set_idx(0, 4).unwrap();
        state.set_idx(1, 6).unwrap();
        state.set_idx(2, 2).unwrap();
        state.commit_progress_up_to(2).unwrap();

        state.install_offsets_for_new_order(2);
        assert_eq!(state.offset(0), 4);
        assert_eq!(state.offset(1), 6);
        assert_eq!(state.offset(2), -1);
    }

    #[test]
    fn flag_array_get_set_roundtrip() {
        let mut flags = FlagArray::new(2, 3);
        assert!(!flags.get(0, 1));
        flags.set(0, 1, true);
        assert!(flags.get(0, 1));
        assert!(!flags.get(1, 1));
        flags.clear();
        assert!(!flags.get(0, 1));
    }
}
