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

//! Configuration surface (spec §6.5).

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Assembler,
    Llvm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegAlloc {
    StackSpill,
    LinearScan,
}

/// How a join's adaptive executor realizes a newly chosen order in code
/// (spec §4.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinnerMode {
    Recompile,
    Permute,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinnerScanSelectMode {
    None,
    Permute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    Static,
    Adaptive,
}

/// Recognized options of spec §6.5, with `Default` matching the documented
/// defaults. Deserializable from whatever config format a caller chooses
/// (TOML, JSON, ...); every field is optional on the wire via `#[serde(default)]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub reg_alloc: RegAlloc,
    pub skinner: SkinnerMode,
    pub skinner_scan_select: SkinnerScanSelectMode,
    pub budget_per_episode: i32,
    pub scan_select_budget_per_episode: i32,
    pub scan_select_seed: u64,
    pub pipeline_mode: PipelineMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendKind::Llvm,
            reg_alloc: RegAlloc::LinearScan,
            skinner: SkinnerMode::Hybrid,
            skinner_scan_select: SkinnerScanSelectMode::Permute,
            budget_per_episode: 10_000,
            scan_select_budget_per_episode: 10_000,
            scan_select_seed: 0,
            pipeline_mode: PipelineMode::Adaptive,
        }
    }
}

impl Config {
    /// Rejects configurations spec §6.5 implies are nonsensical
    /// (non-positive budgets, `reg_alloc` set without `backend = assembler`).
    pub fn validate(&self) -> Result<()> {
        if self.budget_per_episode <= 0 {
            return Err(Error::InvalidConfig(format!(
                "budget_per_episode must be positive, got {}",
                self.budget_per_episode
            )));
        }
        if self.scan_select_budget_per_episode <= 0 {
            return Err(Error::InvalidConfig(format!(
                "scan_select_budget_per_episode must be positive, got {}",
                self.scan_select_budget_per_episode
            )));
        }
        Ok(())
    }
}
