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

//! The contract boundary with the two machine-code backends, which spec
//! §1 places deliberately out of scope: "given an IR program with named
//! external functions declared, I can compile it and get back native
//! function pointers callable with the C ABI."
//!
//! This module only describes that boundary's shape — enough for the
//! translator side (also out of scope: SQL planning/expression
//! translation) to declare what it needs, and for [`crate::backend`] to
//! satisfy it. It intentionally does not model instruction-level IR.

use crate::handler::BoxedHandler;

/// One runtime entry point generated code references by stable name
/// (spec §6.1), e.g. `"hashtable::insert"`, `"vector::push_back"`.
/// Binding these names to native entry points is the backend's job;
/// this crate exposes the primitives (R1–R7) those names resolve to.
#[derive(Debug, Clone)]
pub struct ExternalSymbol {
    pub name: &'static str,
}

/// One compiled-function declaration the backend must produce: a table
/// function obeying the handler ABI of spec §4.5/§6.2.
#[derive(Debug, Clone)]
pub struct TableFunctionDecl {
    pub name: String,
    pub level: usize,
}

/// The minimal shape of an IR program as seen from this core: a set of
/// external symbols it needs resolved, and a set of table functions it
/// expects back. A real translator fills in instruction bodies; that
/// detail is out of scope here (spec §1).
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub external_symbols: Vec<ExternalSymbol>,
    pub table_functions: Vec<TableFunctionDecl>,
}

/// A backend turns an [`IrProgram`] into native, callable handlers. The
/// two real implementations (register-allocating assembler, LLVM JIT)
/// are out of scope; [`crate::backend::InterpretedBackend`] satisfies
/// this trait by running the reference interpreter instead of emitting
/// machine code, so the rest of the core (episode loop, UCT agents,
/// handler ABI) can be exercised without either backend.
pub trait Backend {
    /// Compiles `program`, returning one handler per declared table
    /// function, in declaration order.
    fn compile(&self, program: &IrProgram) -> crate::error::Result<Vec<BoxedHandler>>;
}
