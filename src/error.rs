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

//! Crate-wide error taxonomy (spec §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The IR translator refused to emit code because an expression's SQL
    /// types don't support the requested operator (e.g. `SUM(text_col)`).
    #[error("type mismatch in IR generation: {0}")]
    TypeMismatch(String),

    /// A compiled handler returned an `idx[level]` below `progress[level]`,
    /// which can only happen if a handler violated the table-function ABI.
    #[error(
        "negative progress detected at level {level}: idx={idx} < progress={progress}"
    )]
    NegativeProgress {
        level: usize,
        idx: i32,
        progress: i32,
    },

    /// A code-generation backend (assembler or LLVM) failed to compile the
    /// IR program it was given.
    #[error("backend compile failure: {0}")]
    CompileFailure(String),

    /// An external symbol referenced by generated IR has no bound runtime
    /// entry point.
    #[error("unresolved external symbol: {0}")]
    UnresolvedSymbol(String),

    /// A configuration value in §6.5 failed validation (e.g. budget <= 0).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
