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

//! A compiled, adaptive SQL execution core: Skinner-style adaptive join
//! and scan-select execution driven by a UCT agent, sitting on top of a
//! small set of runtime primitives (typed vectors, an aggregate hash
//! table, column indexes, bucket intersection, a tuple-idx dedup table).
//!
//! Generated machine code is out of scope; [`backend::InterpretedBackend`]
//! and the [`ir::Backend`] trait mark where that code would be plugged in.

pub mod agg_table;
pub mod backend;
pub mod bucket;
pub mod column_index;
pub mod config;
pub mod dedup;
pub mod episode;
pub mod error;
pub mod handler;
pub mod ir;
pub mod progress;
pub mod registry;
pub mod types;
pub mod uct;
pub mod vector;

pub use error::{Error, Result};
