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

//! # Relayer Types Module 🕸️
//!
//! The data shared between the observers, signers, the orchestrator and the
//! coordination chain client.

#![warn(missing_docs)]

/// Chain descriptors and hot-swappable chain parameters.
pub mod chain;
/// Messages sent to the coordination chain and their responses.
pub mod coordinator;
/// Inbound events and the votes built from them.
pub mod inbound;
/// Keygen records, TSS records and blame data.
pub mod keygen;
/// Outbound jobs decided by the coordination chain.
pub mod outbound;
/// Private key parsing for config files.
pub mod private_key;
/// Rate limiter flags and inputs.
pub mod rate_limit;
/// Inbound and outbound trackers.
pub mod tracker;

pub use chain::{Chain, ChainId, ChainKind, ChainParams};
pub use inbound::{BlockProof, InboundEvent, InboundVote};
pub use outbound::{JobStatus, OutboundJob};

/// Hashes any serializable value with keccak256 over its JSON form and
/// returns it as a `0x` prefixed hex string.
///
/// Field order of the structs in this crate is fixed, so the digest is
/// deterministic across relayer nodes.
pub fn json_digest<T: serde::Serialize>(
    value: &T,
) -> webb_relayer_utils::Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let hash = ethers::utils::keccak256(bytes);
    Ok(format!("0x{}", hex::encode(hash)))
}
