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
//! # Outbound Signer Module 🕸️
//!
//! Turns outbound jobs of the coordination chain into signed EVM
//! transactions and gets them mined.
//!
//! ## Overview
//!
//! For every job the orchestrator dispatches, the [`EvmSigner`] checks with
//! the chain observer whether the nonce is already handled, builds the
//! connector call (or a cancel transaction for restricted parties), asks the
//! TSS for a signature and broadcasts the result with bounded retries. Hashes
//! that may have reached the mempool are handed to a [`TrackerReporter`],
//! which reports them to the coordination chain once they are mined.

/// Broadcast retries and error classification.
pub mod broadcast;
/// Gas limits and fee scheme selection.
pub mod gas;
/// Destination, calldata and cancel transactions of a job.
pub mod outbound_data;
/// TSS signing of EVM transactions.
pub mod sign;
mod signer;
/// Reports mined outbound hashes to the coordination chain.
pub mod tracker_reporter;

pub use broadcast::BroadcastOptions;
pub use signer::EvmSigner;
pub use tracker_reporter::{ReporterOptions, TrackerReporter};
