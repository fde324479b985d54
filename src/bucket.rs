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

//! R6: bucket, bucket list, and sorted intersection (spec §3.3, §4.4).
//!
//! Grounded in `runtime/column_index_bucket.{h,cc}` from the original
//! implementation: `FastForwardBucket` is a binary search for the first
//! position `>= prev_tuple`; the sorted walk across a bucket list is a
//! min-heap merge that advances only the bucket that produced the current
//! minimum.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A non-owning view over a sorted ascending `i32` sequence (spec §3.3).
/// Unlike the C++ `{ptr, size}` pair this borrows its slice, so the
/// non-ownership invariant is enforced by the borrow checker rather than
/// documentation.
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    data: &'a [i32],
}

impl<'a> Bucket<'a> {
    pub fn new(data: &'a [i32]) -> Self {
        Bucket { data }
    }

    pub fn empty() -> Self {
        Bucket { data: &[] }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, idx: usize) -> i32 {
        self.data[idx]
    }

    pub fn as_slice(&self) -> &[i32] {
        self.data
    }

    /// Binary search for the first index `i` with `self[i] >= prev`, or
    /// `size()` if no such index exists (spec §8 testable property 4).
    pub fn fast_forward(&self, prev: i32) -> usize {
        self.data.partition_point(|&v| v < prev)
    }
}

/// A growable, non-owning array of [`Bucket`]s (spec §3.3).
#[derive(Debug, Default)]
pub struct BucketList<'a> {
    buckets: Vec<Bucket<'a>>,
}

impl<'a> BucketList<'a> {
    pub fn new() -> Self {
        BucketList::default()
    }

    pub fn push_back(&mut self, bucket: Bucket<'a>) {
        self.buckets.push(bucket);
    }

    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, idx: usize) -> Bucket<'a> {
        self.buckets[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Emits up to `result_max_size` values from the sorted merge of `list`,
/// in ascending order, starting each bucket at the cursor in
/// `bucket_cursors[i]`. Cursors are advanced in place so repeated calls
/// resume where the last one left off (spec §4.4).
///
/// This is the min-heap *sorted merge* described in spec §4.4: it emits
/// the minimum at each step and advances only that bucket, the same
/// primitive the generated code layers set-semantics on top of to
/// implement true intersection (by checking that a value was emitted by
/// every bucket before treating it as "in the intersection").
pub fn sorted_merge(
    list: &BucketList<'_>,
    bucket_cursors: &mut [usize],
    result_max_size: usize,
) -> Vec<i32> {
    assert_eq!(bucket_cursors.len(), list.size());

    if list.is_empty() {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<(i32, usize)>> = BinaryHeap::new();
    for (i, cursor) in bucket_cursors.iter().enumerate() {
        let bucket = list.get(i);
        if *cursor < bucket.size() {
            heap.push(Reverse((bucket.get(*cursor), i)));
        }
    }

    let mut result = Vec::with_capacity(result_max_size.min(heap.len()));
    while let Some(Reverse((min_val, min_list_idx))) = heap.pop() {
        if result.len() >= result_max_size {
            heap.push(Reverse((min_val, min_list_idx)));
            break;
        }
        result.push(min_val);
        bucket_cursors[min_list_idx] += 1;
        let bucket = list.get(min_list_idx);
        let next = bucket_cursors[min_list_idx];
        if next < bucket.size() {
            heap.push(Reverse((bucket.get(next), min_list_idx)));
        }
    }
    result
}

/// True set intersection over `list`: a value is emitted only once it has
/// been seen from every bucket. Short-circuits to empty the moment any
/// bucket is exhausted, per spec §4.4 ("empty buckets short-circuit").
pub fn sorted_intersection(list: &BucketList<'_>) -> Vec<i32> {
    let n = list.size();
    if n == 0 {
        return Vec::new();
    }
    for i in 0..n {
        if list.get(i).size() == 0 {
            return Vec::new();
        }
    }

    let mut cursors = vec![0usize; n];
    let mut out = Vec::new();
    loop {
        // current candidate: max of the cursor values across buckets
        let mut candidate = i32::MIN;
        let mut exhausted = false;
        for i in 0..n {
            let bucket = list.get(i);
            if cursors[i] >= bucket.size() {
                exhausted = true;
                break;
            }
            candidate = candidate.max(bucket.get(cursors[i]));
        }
        if exhausted {
            break;
        }

        let mut all_match = true;
        for i in 0..n {
            let bucket = list.get(i);
            let fwd = bucket.fast_forward(candidate);
            cursors[i] = fwd;
            if fwd >= bucket.size() || bucket.get(fwd) != candidate {
                all_match = false;
            }
        }

        if all_match {
            out.push(candidate);
            for i in 0..n {
                cursors[i] += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_forward_law_literal_fixture() {
        let data = [0, 4, 5, 8, 9];
        let bucket = Bucket::new(&data);
        let cases: Vec<(i32, usize)> = vec![
            (i32::MIN, 0),
            (-1, 0),
            (0, 0),
            (1, 1),
            (2, 1),
            (3, 1),
            (4, 1),
            (5, 2),
            (6, 3),
            (7, 3),
            (8, 3),
            (9, 4),
            (10, 5),
            (11, 5),
        ];
        for (prev, expected) in cases {
            assert_eq!(bucket.fast_forward(prev), expected, "prev={prev}");
        }
    }

    #[test]
    fn fast_forward_on_empty_bucket_returns_zero() {
        let data: [i32; 0] = [];
        let bucket = Bucket::new(&data);
        assert_eq!(bucket.fast_forward(5), 0);
    }

    #[test]
    fn sorted_intersection_of_singletons() {
        let a = [7];
        let b = [7];
        let mut list = BucketList::new();
        list.push_back(Bucket::new(&a));
        list.push_back(Bucket::new(&b));
        assert_eq!(sorted_intersection(&list), vec![7]);

        let c = [8];
        let mut list2 = BucketList::new();
        list2.push_back(Bucket::new(&a));
        list2.push_back(Bucket::new(&c));
        assert_eq!(sorted_intersection(&list2), Vec::<i32>::new());
    }

    #[test]
    fn sorted_intersection_multi_bucket() {
        let a = [1, 2, 3, 5, 8];
        let b = [2, 3, 4, 5, 9];
        let c = [0, 2, 3, 5, 7];
        let mut list = BucketList::new();
        list.push_back(Bucket::new(&a));
        list.push_back(Bucket::new(&b));
        list.push_back(Bucket::new(&c));
        assert_eq!(sorted_intersection(&list), vec![2, 3, 5]);
    }

    #[test]
    fn empty_bucket_short_circuits_to_empty() {
        let a = [1, 2, 3];
        let empty: [i32; 0] = [];
        let mut list = BucketList::new();
        list.push_back(Bucket::new(&a));
        list.push_back(Bucket::new(&empty));
        assert_eq!(sorted_intersection(&list), Vec::<i32>::new());
    }

    #[test]
    fn sorted_merge_respects_result_cap_and_cursor_state() {
        let a = [1, 4, 7];
        let b = [2, 3, 9];
        let mut list = BucketList::new();
        list.push_back(Bucket::new(&a));
        list.push_back(Bucket::new(&b));
        let mut cursors = vec![0, 0];
        let first = sorted_merge(&list, &mut cursors, 3);
        assert_eq!(first, vec![1, 2, 3]);
        let rest = sorted_merge(&list, &mut cursors, 10);
        assert_eq!(rest, vec![4, 7, 9]);
    }
}
