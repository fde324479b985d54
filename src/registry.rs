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

//! Enum-id -> keyed-string tables (spec §3.1, R1) and their one piece of
//! process-wide global state (spec §5, §9): the registry is an ordinary
//! object passed into queries; [`global`] is a thin wrapper added only at
//! the binary entry point, per the "explicit registry object" redesign
//! note.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Maps `(namespace_id, enum_id) <-> text` for one enum namespace.
#[derive(Debug, Default)]
pub struct EnumRegistry {
    namespaces: HashMap<u32, Namespace>,
}

#[derive(Debug, Default)]
struct Namespace {
    id_to_text: Vec<String>,
    text_to_id: HashMap<String, u32>,
}

impl EnumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `text` under `namespace`, returning its stable id. Calling
    /// this twice with equal text in the same namespace returns the same
    /// id.
    pub fn intern(&mut self, namespace: u32, text: &str) -> u32 {
        let ns = self.namespaces.entry(namespace).or_default();
        if let Some(id) = ns.text_to_id.get(text) {
            return *id;
        }
        let id = ns.id_to_text.len() as u32;
        ns.id_to_text.push(text.to_string());
        ns.text_to_id.insert(text.to_string(), id);
        id
    }

    pub fn resolve(&self, namespace: u32, id: u32) -> Option<&str> {
        self.namespaces
            .get(&namespace)
            .and_then(|ns| ns.id_to_text.get(id as usize))
            .map(|s| s.as_str())
    }

    pub fn lookup_id(&self, namespace: u32, text: &str) -> Option<u32> {
        self.namespaces
            .get(&namespace)
            .and_then(|ns| ns.text_to_id.get(text))
            .copied()
    }
}

static GLOBAL: OnceLock<RwLock<EnumRegistry>> = OnceLock::new();

/// Process-wide registry used only by the binary entry point; library code
/// should thread an explicit `&mut EnumRegistry` through query execution
/// instead of reaching for this.
pub fn global() -> &'static RwLock<EnumRegistry> {
    GLOBAL.get_or_init(|| RwLock::new(EnumRegistry::new()))
}
