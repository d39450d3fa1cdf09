// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Bridge Client 🕸️
//!
//! Everything the relayer sends to, or asks from, the coordination chain.
//!
//! ## Overview
//!
//! The [`CoordinatorRpc`] trait is the raw boundary: queries and a
//! synchronous broadcast of an unsigned [`TxEnvelope`]. [`BridgeClient`]
//! sits on top of it and owns the operator account sequence, skips votes
//! that were already cast, batches block proofs and spawns a monitor for
//! every vote transaction that resends it once when it ran out of gas.
//!
//! [`TxEnvelope`]: webb_relayer_types::coordinator::TxEnvelope

mod client;
/// Gas limits and fee constants of the coordination chain transactions.
pub mod constants;
/// A coordination chain kept in memory, for tests and local runs.
pub mod mocked;
mod monitor;
/// REST gateway implementation of [`CoordinatorRpc`].
pub mod rest;
mod rpc;
/// Periodic refresh of the [`CoreContext`](webb_relayer_context::CoreContext).
pub mod updater;

pub use client::{compute_fee, BridgeClient, VoteReceipt};
pub use monitor::{classify_vote_result, MonitorVerdict, VoteKind};
pub use rpc::CoordinatorRpc;

#[cfg(test)]
mod tests;
