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

//! R7: tuple-idx dedup table (spec §3.6, §4.7).
//!
//! A set of fixed-length `i32` tuple-index arrays, one per joined base
//! table, used to deduplicate join result tuples that different episodes
//! may rediscover after resuming from different prefixes (spec §4.6.3).

use std::collections::HashSet;

#[derive(Debug)]
pub struct TupleIdxTable {
    num_tables: usize,
    seen: HashSet<Vec<i32>>,
}

impl TupleIdxTable {
    pub fn new(num_tables: usize) -> Self {
        TupleIdxTable {
            num_tables,
            seen: HashSet::new(),
        }
    }

    /// Inserts `tuple_idxs`, returning `true` if it was not already
    /// present (i.e. the caller should emit it).
    pub fn insert(&mut self, tuple_idxs: &[i32]) -> bool {
        assert_eq!(tuple_idxs.len(), self.num_tables);
        self.seen.insert(tuple_idxs.to_vec())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<i32>> {
        self.seen.iter()
    }

    pub fn free(&mut self) {
        self.seen.clear();
        self.seen.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_was_new_flag() {
        let mut t = TupleIdxTable::new(2);
        assert!(t.insert(&[1, 2]));
        assert!(!t.insert(&[1, 2]));
        assert!(t.insert(&[1, 3]));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn size_never_decreases_across_inserts() {
        let mut t = TupleIdxTable::new(1);
        let mut last = 0;
        for v in [1, 1, 2, 2, 3, 1, 4] {
            t.insert(&[v]);
            assert!(t.len() >= last);
            last = t.len();
        }
    }
}
