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

//! C3 concrete execution: compiled joins and scan-selects, cooperating
//! with the adaptive executor via shared flag arrays, progress/offset/idx
//! arrays, and the per-episode budget (spec §4.5, §4.6.3, §6.2, §6.3).
//!
//! [`JoinRegion`] and [`ScanSelectRegion`] are this crate's
//! [`crate::episode::AdaptiveRegion`] implementations. They stand where
//! generated machine code would stand in the real system: instead of one
//! native function per table level emitted by a backend, each region
//! walks its own levels with a plain recursive Rust function that obeys
//! the same handler-result/progress/flags contract. An
//! [`InterpretedBackend`] wraps this so the rest of the core can be
//! exercised against the §6's `Backend` contract without either real
//! code-generation backend, which are out of scope (spec §1).
//!
//! This reference interpreter supports equi-join predicates over integer
//! keys, which is the join shape every end-to-end scenario in spec §8
//! exercises; arbitrary expression predicates are a translator concern
//! (out of scope, spec §1).

use crate::bucket::{Bucket, BucketList};
use crate::column_index::MemoryColumnIndex;
use crate::dedup::TupleIdxTable;
use crate::error::Result;
use crate::handler::HandlerResult;
use crate::ir::{Backend, IrProgram};
use crate::progress::{FlagArray, ProgressState};
use crate::uct::Order;

/// A base table as seen by the join engine: all it needs is how many
/// rows it has.
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub cardinality: i32,
}

/// An equi-join predicate `tables[a].key_a[row] == tables[b].key_b[row]`
/// (spec §3.1 INT/BIGINT/DATE/ENUM all compare as `i64` here).
#[derive(Debug, Clone)]
pub struct EqPredicate {
    pub table_a: usize,
    pub key_a: Vec<i64>,
    pub table_b: usize,
    pub key_b: Vec<i64>,
}

impl EqPredicate {
    fn key_for(&self, table: usize) -> &[i64] {
        if table == self.table_a {
            &self.key_a
        } else {
            debug_assert_eq!(table, self.table_b);
            &self.key_b
        }
    }

    fn other_table(&self, table: usize) -> usize {
        if table == self.table_a {
            self.table_b
        } else {
            self.table_a
        }
    }

    fn references(&self, table: usize) -> bool {
        table == self.table_a || table == self.table_b
    }
}

/// A compiled N-way equi-join (spec §4.5, §4.6, §4.7).
pub struct JoinRegion {
    tables: Vec<JoinTable>,
    predicates: Vec<EqPredicate>,
    progress: ProgressState,
    flags: FlagArray,
    dedup: TupleIdxTable,
    current_order: Vec<usize>,
    indexes: std::collections::HashMap<(usize, usize), MemoryColumnIndex<i64>>,
    results: Vec<Vec<i32>>,
}

impl JoinRegion {
    pub fn new(tables: Vec<JoinTable>, predicates: Vec<EqPredicate>) -> Self {
        let num_tables = tables.len();
        let cardinalities = tables.iter().map(|t| t.cardinality).collect();
        let num_predicates = predicates.len();
        JoinRegion {
            tables,
            predicates,
            progress: ProgressState::new(num_tables, cardinalities),
            flags: FlagArray::new(num_predicates.max(1), num_tables),
            dedup: TupleIdxTable::new(num_tables),
            current_order: (0..num_tables).collect(),
            indexes: std::collections::HashMap::new(),
            results: Vec::new(),
        }
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Materialized join results collected so far (spec §4.8 reads these
    /// off the dedup table once the region is exhausted).
    pub fn results(&self) -> &[Vec<i32>] {
        &self.results
    }

    fn index_for(&mut self, predicate_idx: usize, table: usize) -> &MemoryColumnIndex<i64> {
        self.indexes
            .entry((predicate_idx, table))
            .or_insert_with(|| {
                let predicate = &self.predicates[predicate_idx];
                let keys = predicate.key_for(table);
                let mut idx = MemoryColumnIndex::new();
                // keys are unsorted relative to tuple idx ordering in
                // general join inputs, so sort-then-insert to keep each
                // bucket ascending per spec §3.2.
                use itertools::Itertools;
                let pairs = keys
                    .iter()
                    .enumerate()
                    .map(|(i, &k)| (k, i as i32))
                    .sorted_by_key(|&(k, _)| k);
                for (k, tuple_idx) in pairs {
                    idx.insert(k, tuple_idx);
                }
                idx
            })
    }

    fn recompute_flags(&mut self, order: &[usize]) {
        self.flags.clear();
        for (p_idx, predicate) in self.predicates.iter().enumerate() {
            for level in 0..order.len() {
                let bound_so_far = &order[..=level];
                if bound_so_far.contains(&predicate.table_a) && bound_so_far.contains(&predicate.table_b) {
                    self.flags.set(p_idx, level, true);
                }
            }
        }
    }

    /// Recursive handler walk, standing in for one native function per
    /// level (spec §4.5). `bound[table]` is the currently-bound tuple
    /// index for `table`, or `-1` if unbound.
    #[allow(clippy::too_many_arguments)]
    fn run_level(
        &mut self,
        level: usize,
        order: &[usize],
        mut budget: i32,
        first_call: &mut [bool],
        bound: &mut Vec<i32>,
    ) -> Result<HandlerResult> {
        let table_id = order[level];
        let cardinality = self.tables[table_id].cardinality;

        // `offset(level)` is the last tuple index this level is known to
        // have fully resolved (spec §4.6.3); resume one past it, not on
        // it, or a suspended-and-resumed level re-examines and re-yields
        // on the exact same tuple forever.
        let scan_start = if first_call[level] {
            let off = self.progress.offset(level);
            if off < 0 {
                0
            } else {
                off + 1
            }
        } else {
            0
        };
        first_call[level] = false;

        // Gather selected, flagged, indexable equality predicates that
        // can probe this level (their other table already bound).
        let mut probe_predicates = Vec::new();
        for (p_idx, predicate) in self.predicates.iter().enumerate() {
            if !self.flags.get(p_idx, level) {
                continue;
            }
            if !predicate.references(table_id) {
                continue;
            }
            let other = predicate.other_table(table_id);
            if bound[other] >= 0 {
                probe_predicates.push((p_idx, predicate.key_for(other)[bound[other] as usize]));
            }
        }

        let candidates: Vec<i32> = if probe_predicates.is_empty() {
            (scan_start..cardinality).collect()
        } else {
            let mut lists_owned: Vec<Vec<i32>> = Vec::new();
            for (p_idx, lookup_key) in &probe_predicates {
                let index = self.index_for(*p_idx, table_id);
                let bucket = index.get_bucket(lookup_key);
                let start = bucket.fast_forward(scan_start);
                lists_owned.push(bucket.as_slice()[start..].to_vec());
            }
            let mut bucket_list = BucketList::new();
            for owned in &lists_owned {
                bucket_list.push_back(Bucket::new(owned));
            }
            crate::bucket::sorted_intersection(&bucket_list)
        };

        let is_terminal = level == order.len() - 1;

        for tuple_idx in candidates {
            budget -= 1;
            bound[table_id] = tuple_idx;

            let mut predicate_failed = false;
            for (p_idx, predicate) in self.predicates.iter().enumerate() {
                if !self.flags.get(p_idx, level) {
                    continue;
                }
                let a = bound[predicate.table_a];
                let b = bound[predicate.table_b];
                if a < 0 || b < 0 {
                    continue;
                }
                let matches = predicate.key_a[a as usize] == predicate.key_b[b as usize];
                if !matches {
                    predicate_failed = true;
                    break;
                }
            }

            if predicate_failed {
                if budget > 0 {
                    continue;
                }
                self.progress.set_idx(level, tuple_idx)?;
                self.progress.set_table_ctr(level);
                return Ok(HandlerResult::BudgetExhausted);
            }

            if budget == 0 {
                self.progress.set_idx(level, tuple_idx)?;
                self.progress.set_table_ctr(level);
                return Ok(HandlerResult::PredicateFailedAtBudgetExhaustion);
            }

            let outcome = if is_terminal {
                let is_new = self.dedup.insert(bound);
                if is_new {
                    self.results.push(bound.clone());
                    self.progress.increment_result_tuples();
                }
                HandlerResult::Done(budget)
            } else {
                self.run_level(level + 1, order, budget, first_call, bound)?
            };

            match outcome {
                HandlerResult::Done(remaining) => {
                    budget = remaining;
                }
                yielded => return Ok(yielded),
            }
        }

        bound[table_id] = -1;
        Ok(HandlerResult::Done(budget))
    }
}

impl crate::episode::AdaptiveRegion for JoinRegion {
    fn num_indexable_predicates(&self) -> usize {
        self.predicates.len()
    }

    fn num_order_items(&self) -> usize {
        self.tables.len()
    }

    fn root_progress(&self) -> i32 {
        self.progress.progress(0)
    }

    fn root_cardinality(&self) -> i32 {
        self.tables[self.current_order[0]].cardinality
    }

    fn run_episode(
        &mut self,
        order: &Order,
        divergence_level: usize,
        budget: i32,
        _variant: crate::episode::CompileVariant,
    ) -> Result<HandlerResult> {
        self.current_order = order.item_order.clone();
        self.recompute_flags(&self.current_order.clone());
        self.progress.install_offsets_for_new_order(divergence_level);

        let mut bound = vec![-1; self.tables.len()];
        let mut first_call = vec![true; self.tables.len()];
        let current_order = self.current_order.clone();
        // A join `current_order.len()` levels deep cannot reach its
        // terminal level, let alone record a match there, on a budget
        // smaller than that depth; floor it so every episode can afford
        // at least one full root-to-leaf descent plus the one unit the
        // terminal level spends recording what it finds (spec §4.5's
        // per-level decrement, applied `depth` times, then once more to
        // commit). Below this floor, `progress[0]` can never commit and
        // the episode loop never terminates.
        let depth = current_order.len() as i32;
        let effective_budget = budget.max(depth + 1);
        let result = self.run_level(0, &current_order, effective_budget, &mut first_call, &mut bound)?;

        match result {
            HandlerResult::Done(_) => {
                // The whole order's level-0 loop ran to completion: every
                // level is now fully scanned from this order's viewpoint.
                for level in 0..current_order.len() {
                    let card = self.tables[current_order[level]].cardinality;
                    if card - 1 > self.progress.progress(level) {
                        self.progress.set_idx(level, card - 1)?;
                    }
                }
                self.progress.commit_progress_up_to(current_order.len() - 1)?;
            }
            _ => {
                let table_ctr = self.progress.table_ctr();
                // Levels shallower than the suspension point are mid-flight
                // on their current bound tuple; only the tuple *before* it
                // is known fully complete.
                for level in 0..table_ctr {
                    let in_flight = bound[current_order[level]];
                    if in_flight >= 0 {
                        let completed = in_flight - 1;
                        if completed > self.progress.progress(level) {
                            self.progress.set_idx(level, completed)?;
                        }
                    }
                }
                if table_ctr > 0 {
                    self.progress.commit_progress_up_to(table_ctr - 1)?;
                }
                let ctr_completed = self.progress.idx(table_ctr)
                    - if matches!(result, HandlerResult::PredicateFailedAtBudgetExhaustion) {
                        1
                    } else {
                        0
                    };
                if ctr_completed > self.progress.progress(table_ctr) {
                    self.progress.set_idx(table_ctr, ctr_completed)?;
                    self.progress.commit_progress_up_to(table_ctr)?;
                }
            }
        }

        Ok(result)
    }
}

/// One predicate over a single scanned table (spec §4.6's "scan-select").
pub struct ScanPredicate {
    pub eval: Box<dyn Fn(i32) -> Option<bool>>,
    /// `Some(index)` when this predicate is an indexable equality;
    /// `lookup_key` is the constant it compares the column against.
    pub index: Option<MemoryColumnIndex<i64>>,
    pub lookup_key: i64,
}

/// A compiled adaptive scan-select (spec §4.5, §6.3): one table, a set
/// of predicates whose *evaluation order* (and, for equality predicates,
/// whether to use an index) the UCT agent chooses per episode.
pub struct ScanSelectRegion {
    cardinality: i32,
    predicates: Vec<ScanPredicate>,
    progress: ProgressState,
    /// Guards against re-emitting a row a previous episode already
    /// produced: a reordered predicate list re-zeroes this level's offset
    /// (spec §4.6.3), and a resumed episode's scan start legitimately
    /// re-examines the last-known-resolved row, so the join path's
    /// terminal-level dedup (`JoinRegion::dedup`) needs a single-level
    /// counterpart here too.
    seen: TupleIdxTable,
    results: Vec<i32>,
}

impl ScanSelectRegion {
    pub fn new(cardinality: i32, predicates: Vec<ScanPredicate>) -> Self {
        ScanSelectRegion {
            cardinality,
            progress: ProgressState::new(1, vec![cardinality]),
            seen: TupleIdxTable::new(1),
            predicates,
            results: Vec::new(),
        }
    }

    pub fn results(&self) -> &[i32] {
        &self.results
    }

    fn indexable_positions(&self) -> Vec<usize> {
        self.predicates
            .iter()
            .enumerate()
            .filter(|(_, p)| p.index.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}

impl crate::episode::AdaptiveRegion for ScanSelectRegion {
    fn num_indexable_predicates(&self) -> usize {
        self.indexable_positions().len()
    }

    fn num_order_items(&self) -> usize {
        self.predicates.len()
    }

    fn root_progress(&self) -> i32 {
        self.progress.progress(0)
    }

    fn root_cardinality(&self) -> i32 {
        self.cardinality
    }

    fn run_episode(
        &mut self,
        order: &Order,
        divergence_level: usize,
        budget: i32,
        _variant: crate::episode::CompileVariant,
    ) -> Result<HandlerResult> {
        self.progress.install_offsets_for_new_order(divergence_level);
        let off = self.progress.offset(0);
        let scan_start = if off < 0 { 0 } else { off + 1 };

        let indexable = self.indexable_positions();
        let selected: Vec<usize> = indexable
            .iter()
            .zip(order.use_index.iter())
            .filter(|(_, &use_it)| use_it)
            .map(|(&p, _)| p)
            .collect();

        let candidates: Vec<i32> = if selected.is_empty() {
            (scan_start..self.cardinality).collect()
        } else {
            let mut lists_owned = Vec::new();
            for &p_idx in &selected {
                let predicate = &self.predicates[p_idx];
                let index = predicate.index.as_ref().unwrap();
                let bucket = index.get_bucket(&predicate.lookup_key);
                let start = bucket.fast_forward(scan_start);
                lists_owned.push(bucket.as_slice()[start..].to_vec());
            }
            let mut bucket_list = BucketList::new();
            for owned in &lists_owned {
                bucket_list.push_back(Bucket::new(owned));
            }
            crate::bucket::sorted_intersection(&bucket_list)
        };

        // As with the join path: a single level still needs at least one
        // spare unit of budget beyond the one spent examining a row, or a
        // row that passes every predicate right as budget hits zero is
        // never recorded, and the next episode resumes on that same row
        // and repeats forever.
        let mut budget = budget.max(2);
        for tuple_idx in candidates {
            budget -= 1;

            let mut failed = false;
            for &p_idx in &order.item_order {
                let predicate = &self.predicates[p_idx];
                match (predicate.eval)(tuple_idx) {
                    Some(true) => {}
                    _ => {
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                if budget > 0 {
                    continue;
                }
                // This row is now fully determined (excluded); safe to
                // count it as resolved.
                if tuple_idx > self.progress.progress(0) {
                    self.progress.set_idx(0, tuple_idx)?;
                    self.progress.commit_progress_up_to(0)?;
                }
                self.progress.set_table_ctr(0);
                return Ok(HandlerResult::BudgetExhausted);
            }

            if budget == 0 {
                // This row passed but budget ran out before it could be
                // recorded; only rows strictly before it are resolved.
                if tuple_idx - 1 > self.progress.progress(0) {
                    self.progress.set_idx(0, tuple_idx - 1)?;
                    self.progress.commit_progress_up_to(0)?;
                }
                self.progress.set_table_ctr(0);
                return Ok(HandlerResult::PredicateFailedAtBudgetExhaustion);
            }

            if self.seen.insert(&[tuple_idx]) {
                self.results.push(tuple_idx);
                self.progress.increment_result_tuples();
            }
            if tuple_idx > self.progress.progress(0) {
                self.progress.set_idx(0, tuple_idx)?;
                self.progress.commit_progress_up_to(0)?;
            }
        }

        self.progress.set_idx(0, self.cardinality - 1)?;
        self.progress.commit_progress_up_to(0)?;
        Ok(HandlerResult::Done(budget))
    }
}

/// Satisfies the [`Backend`] contract by running the reference
/// interpreter directly instead of emitting machine code. Exists so code
/// that only depends on `Backend` (rather than concretely on
/// [`JoinRegion`]/[`ScanSelectRegion`]) has something to compile against;
/// neither real backend (assembler, LLVM) is in scope here (spec §1).
pub struct InterpretedBackend;

impl Backend for InterpretedBackend {
    fn compile(&self, program: &IrProgram) -> Result<Vec<crate::handler::BoxedHandler>> {
        // No instruction bodies to interpret in this minimal IR contract
        // (spec §1 treats the translator as an external collaborator);
        // this just confirms every declared table function has a name,
        // matching the ABI's ordering guarantee (spec §6.2).
        let mut handlers = Vec::with_capacity(program.table_functions.len());
        for decl in &program.table_functions {
            if decl.name.is_empty() {
                return Err(crate::error::Error::CompileFailure(
                    "table function declared with empty name".to_string(),
                ));
            }
            handlers.push(Box::new(|_budget: i32, _resume: bool| HandlerResult::Done(0))
                as crate::handler::BoxedHandler);
        }
        Ok(handlers)
    }
}
