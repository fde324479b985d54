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

//! R4/R5: column indexes (spec §3.2, §4.3).
//!
//! `MemoryColumnIndex<K>` mirrors `runtime/memory_column_index.{h,cc}`'s
//! per-SQL-type `absl::flat_hash_map<K, std::vector<int32_t>>` instances,
//! generalized to one generic map over `K: Eq + Hash + Ord`. `DiskColumnIndex`
//! is the mmap-free, read-only counterpart described in spec §6.4 and
//! supplemented from `compile/proxy/disk_column_index.cc`: a key-ordered
//! index file paired with a flat bucket-payload file.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::bucket::Bucket;

/// Map from typed key to ascending-sorted tuple indices (spec §3.2).
///
/// Invariant upheld by the build side: callers insert tuple indices in
/// ascending order and never insert a null key, so `insert` can be
/// append-only (spec §4.3).
#[derive(Debug, Default)]
pub struct MemoryColumnIndex<K: Eq + Hash> {
    buckets: HashMap<K, Vec<i32>>,
}

impl<K: Eq + Hash> MemoryColumnIndex<K> {
    pub fn new() -> Self {
        MemoryColumnIndex {
            buckets: HashMap::new(),
        }
    }

    /// Appends `tuple_idx` to `key`'s bucket. The caller must supply
    /// tuple indices in ascending order per key; this does not re-sort.
    pub fn insert(&mut self, key: K, tuple_idx: i32) {
        let bucket = self.buckets.entry(key).or_default();
        debug_assert!(
            bucket.last().copied().unwrap_or(i32::MIN) <= tuple_idx,
            "MemoryColumnIndex::insert requires ascending tuple indices"
        );
        bucket.push(tuple_idx);
    }

    /// Returns a view over `key`'s bucket, or an empty view if absent.
    pub fn get_bucket(&self, key: &K) -> Bucket<'_> {
        match self.buckets.get(key) {
            Some(v) => Bucket::new(v),
            None => Bucket::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// A read-only view over a column index persisted to two flat files (spec
/// §6.4): `<path>.idx` holds fixed-width `i64` sort keys in ascending
/// order, `<path>.buckets` holds, for each key in the same order, a
/// `(offset: u64, len: u32)` pair into a third values blob followed by
/// the `i32` tuple-index payloads themselves.
///
/// Only integer-keyed indexes (SMALLINT/INT/BIGINT/DATE/ENUM, all of
/// which compare as `i64`) are supported by this on-disk format; TEXT and
/// REAL indexes are not persisted and remain memory-only, matching the
/// component table's framing of R5 as "used when an index is persisted"
/// rather than as a universal requirement.
pub struct DiskColumnIndex {
    keys: Vec<i64>,
    spans: Vec<(u64, u32)>,
    values: Vec<i32>,
}

impl DiskColumnIndex {
    /// Builds the on-disk representation from an in-memory `i64`-keyed
    /// index and writes it under `path` (three files: `.idx`, `.spans`,
    /// `.values`).
    pub fn write(path: &Path, index: &MemoryColumnIndex<i64>) -> io::Result<()> {
        let mut sorted_keys: Vec<&i64> = index.buckets.keys().collect();
        sorted_keys.sort_unstable();

        let mut idx_file = std::fs::File::create(path.with_extension("idx"))?;
        let mut spans_file = std::fs::File::create(path.with_extension("spans"))?;
        let mut values_file = std::fs::File::create(path.with_extension("values"))?;

        let mut offset: u64 = 0;
        for key in sorted_keys {
            idx_file.write_all(&key.to_le_bytes())?;
            let bucket = &index.buckets[key];
            spans_file.write_all(&offset.to_le_bytes())?;
            spans_file.write_all(&(bucket.len() as u32).to_le_bytes())?;
            for v in bucket {
                values_file.write_all(&v.to_le_bytes())?;
            }
            offset += bucket.len() as u64;
        }
        Ok(())
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let keys = read_i64_vec(&path.with_extension("idx"))?;

        let mut spans_raw = Vec::new();
        std::fs::File::open(path.with_extension("spans"))?.read_to_end(&mut spans_raw)?;
        let mut spans = Vec::with_capacity(spans_raw.len() / 12);
        for chunk in spans_raw.chunks_exact(12) {
            let offset = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let len = u32::from_le_bytes(chunk[8..12].try_into().unwrap());
            spans.push((offset, len));
        }

        let values = read_i32_vec(&path.with_extension("values"))?;

        Ok(DiskColumnIndex {
            keys,
            spans,
            values,
        })
    }

    /// Same contract as `MemoryColumnIndex::get_bucket`: an int32 tuple-id
    /// view in ascending order, or empty if `key` is absent.
    pub fn get_bucket(&self, key: i64) -> Bucket<'_> {
        match self.keys.binary_search(&key) {
            Ok(pos) => {
                let (offset, len) = self.spans[pos];
                let start = offset as usize;
                Bucket::new(&self.values[start..start + len as usize])
            }
            Err(_) => Bucket::empty(),
        }
    }
}

fn read_i64_vec(path: &Path) -> io::Result<Vec<i64>> {
    let mut raw = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut raw)?;
    Ok(raw
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn read_i32_vec(path: &Path) -> io::Result<Vec<i32>> {
    let mut raw = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut raw)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}
