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

//! R3: aggregate hash table (spec §3.5, §4.2).
//!
//! Grounded in `runtime/aggregate_hash_table.{h,cc}`: entries pack
//! `(salt: u16, block_offset: u16, block_idx: u32)` into a 64-bit word;
//! payloads live in 256-KiB blocks with `block_idx == 0` reserved as
//! "empty". Per the REDESIGN FLAGS in spec §9 ("arena-with-indices: each
//! payload is addressed by `(block_idx, block_offset)`; no raw pointers
//! escape the table"), payloads are addressed by index pairs and accessed
//! only through [`AggregateHashTable::payload`]/`payload_mut`, never as a
//! raw pointer handed back to the caller.

use tracing::trace;

const BLOCK_SIZE: usize = 256 * 1024;
const INITIAL_CAPACITY: usize = 1024;
const LOAD_FACTOR_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
struct Entry {
    salt: u16,
    block_offset: u16,
    block_idx: u32,
}

impl Entry {
    const EMPTY: Entry = Entry {
        salt: 0,
        block_offset: 0,
        block_idx: 0,
    };

    fn is_empty(&self) -> bool {
        self.block_idx == 0
    }
}

/// Address of a payload: block 0 is reserved, real payloads start at
/// block 1 (spec §3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadAddr {
    pub block_idx: u32,
    pub block_offset: u16,
}

/// Open-addressed map from 32-bit hash to variable-size payload, stored
/// in 256-KiB blocks (spec §3.5, §4.2).
///
/// `payload_size` is fixed per table (grouping key bytes followed by
/// per-aggregator state); `hash` is stored at byte offset 0 of every
/// payload so resize can recover it without re-hashing the key.
pub struct AggregateHashTable {
    payload_size: usize,
    entries: Vec<Entry>,
    mask: u64,
    size: u32,
    blocks: Vec<Vec<u8>>,
    last_payload_offset: usize,
}

impl AggregateHashTable {
    pub fn new(payload_size: usize) -> Self {
        assert!(payload_size >= 8, "payload must fit the stored hash");
        AggregateHashTable {
            payload_size,
            entries: vec![Entry::EMPTY; INITIAL_CAPACITY],
            mask: (INITIAL_CAPACITY - 1) as u64,
            size: 0,
            // block 0 reserved as "null"
            blocks: vec![Vec::new()],
            last_payload_offset: BLOCK_SIZE,
        }
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn payload_hash(&self, addr: PayloadAddr) -> u64 {
        let bytes = &self.blocks[addr.block_idx as usize]
            [addr.block_offset as usize..addr.block_offset as usize + 8];
        u64::from_ne_bytes(bytes.try_into().unwrap())
    }

    pub fn payload(&self, addr: PayloadAddr) -> &[u8] {
        let start = addr.block_offset as usize;
        &self.blocks[addr.block_idx as usize][start..start + self.payload_size]
    }

    pub fn payload_mut(&mut self, addr: PayloadAddr) -> &mut [u8] {
        let start = addr.block_offset as usize;
        &mut self.blocks[addr.block_idx as usize][start..start + self.payload_size]
    }

    /// Probes for an entry whose salt matches `hash >> 48` and whose
    /// payload satisfies `key_eq`. On miss, allocates a new payload slot,
    /// writes `hash` into its first 8 bytes, and installs a new entry.
    /// Returns `(address, is_new)`.
    pub fn insert_or_update(
        &mut self,
        hash: u64,
        mut key_eq: impl FnMut(&[u8]) -> bool,
    ) -> (PayloadAddr, bool) {
        let salt = (hash >> 48) as u16;
        let mut idx = (hash & self.mask) as usize;
        loop {
            let entry = self.entries[idx];
            if entry.is_empty() {
                break;
            }
            if entry.salt == salt {
                let addr = PayloadAddr {
                    block_idx: entry.block_idx,
                    block_offset: entry.block_offset,
                };
                if key_eq(self.payload(addr)) {
                    return (addr, false);
                }
            }
            idx = (idx + 1) & (self.mask as usize);
        }

        let addr = self.allocate_payload(hash);
        self.entries[idx] = Entry {
            salt,
            block_offset: addr.block_offset,
            block_idx: addr.block_idx,
        };
        self.size += 1;

        if self.size as f64 / self.entries.len() as f64 > LOAD_FACTOR_THRESHOLD {
            self.resize();
        }

        (addr, true)
    }

    fn allocate_payload(&mut self, hash: u64) -> PayloadAddr {
        if self.last_payload_offset + self.payload_size > BLOCK_SIZE {
            self.blocks.push(vec![0u8; BLOCK_SIZE]);
            self.last_payload_offset = 0;
            trace!(blocks = self.blocks.len(), "allocated new aggregate hash table block");
        }
        let block_idx = (self.blocks.len() - 1) as u32;
        let block_offset = self.last_payload_offset as u16;
        self.blocks[block_idx as usize][self.last_payload_offset..self.last_payload_offset + 8]
            .copy_from_slice(&hash.to_ne_bytes());
        self.last_payload_offset += self.payload_size;
        PayloadAddr {
            block_idx,
            block_offset,
        }
    }

    fn resize(&mut self) {
        let new_capacity = self.entries.len() * 2;
        let new_mask = (new_capacity - 1) as u64;
        let mut new_entries = vec![Entry::EMPTY; new_capacity];

        for block_idx in 1..self.blocks.len() {
            let is_last = block_idx == self.blocks.len() - 1;
            let end = if is_last {
                self.last_payload_offset
            } else {
                BLOCK_SIZE
            };
            let mut offset = 0usize;
            while offset < end {
                let addr = PayloadAddr {
                    block_idx: block_idx as u32,
                    block_offset: offset as u16,
                };
                let hash = self.payload_hash(addr);
                let salt = (hash >> 48) as u16;
                let mut idx = (hash & new_mask) as usize;
                while !new_entries[idx].is_empty() {
                    idx = (idx + 1) & (new_mask as usize);
                }
                new_entries[idx] = Entry {
                    salt,
                    block_offset: addr.block_offset,
                    block_idx: addr.block_idx,
                };
                offset += self.payload_size;
            }
        }

        trace!(old = self.entries.len(), new = new_capacity, "resized aggregate hash table");
        self.entries = new_entries;
        self.mask = new_mask;
    }

    /// Visits every live payload in block/offset order.
    pub fn iterate(&self, mut f: impl FnMut(&[u8])) {
        for block_idx in 1..self.blocks.len() {
            let is_last = block_idx == self.blocks.len() - 1;
            let end = if is_last {
                self.last_payload_offset
            } else {
                BLOCK_SIZE
            };
            let mut offset = 0usize;
            while offset < end {
                let addr = PayloadAddr {
                    block_idx: block_idx as u32,
                    block_offset: offset as u16,
                };
                f(self.payload(addr));
                offset += self.payload_size;
            }
        }
    }

    pub fn free(&mut self) {
        self.entries.clear();
        self.entries.shrink_to_fit();
        self.blocks.clear();
        self.blocks.shrink_to_fit();
        self.size = 0;
    }
}
