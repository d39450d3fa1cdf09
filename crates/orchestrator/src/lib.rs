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
//! # Relayer Orchestrator 🎼
//!
//! The only place that decides which outbound jobs get a signing attempt.
//!
//! Every coordination block the [`Orchestrator`] reads the pending jobs of
//! each external chain, through the rate limiter when it is usable, keeps
//! a bounded nonce window per chain and dispatches the jobs whose retry
//! slot falls on that block. Attempts run detached from the scheduler and
//! an outbound is never attempted twice at the same time.
//!
//! A second loop starts and stops observers and signers as chains become
//! supported or get dropped by the coordination chain.

/// Outbound jobs with a signing attempt in flight.
pub mod active_set;
/// Sliding average of the fees burned by the operator key.
pub mod burn_rate;
mod orchestrator;
pub mod rate_limiter;
pub mod schedule;

#[cfg(test)]
mod tests;

pub use active_set::{ActiveGuard, ActiveOutboundSet};
pub use orchestrator::{
    supervise, ChainFactory, Orchestrator, OrchestratorOptions, SyncReport,
};
