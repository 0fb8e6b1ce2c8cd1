// Copyright 2025 Crucible Authors
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

//! Crucible Matching Engine
//!
//! This crate provides an in-memory limit order book matching engine for a
//! single instrument. It maintains price-time priority on both sides,
//! continuously matches crossing orders into two-leg trades, and exposes
//! aggregated level snapshots for market-data consumers.
//!
//! Architecture:
//! - Dual price-indexed ladders with a FIFO queue per level
//! - Slab arena of intrusively linked order nodes for O(1) cancellation
//! - Per-level aggregates kept in sync with every book mutation
//! - One mutex over all book state; client threads call straight in
//! - Background pruner sweeping good-for-day orders at the session close
//!
//! State is strictly in-memory and ephemeral: there is no journal, replay,
//! or crash recovery, and no network surface. An embedding process supplies
//! those, along with the `tracing` subscriber that receives the engine's
//! logs.

pub mod config;
pub mod engine;
pub mod orderbook;
pub mod types;

pub use config::EngineConfig;
pub use engine::MatchingEngine;
pub use orderbook::OrderBook;
pub use types::*;
