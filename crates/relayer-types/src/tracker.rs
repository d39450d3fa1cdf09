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

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;

/// Maximum number of hashes the coordination chain keeps per tracker.
pub const MAX_OUT_TX_TRACKER_HASHES: usize = 2;

/// One candidate hash reported for an outbound nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHashEntry {
    /// Transaction hash.
    pub tx_hash: String,
    /// Operator that reported it.
    pub reporter: String,
}

/// Candidate outbound transaction hashes for one nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutTxTracker {
    /// Destination chain.
    pub chain_id: ChainId,
    /// TSS nonce.
    pub nonce: u64,
    /// Reported hashes.
    pub hash_list: Vec<TxHashEntry>,
}

impl OutTxTracker {
    /// Whether `tx_hash` was already reported, ignoring case.
    pub fn contains(&self, tx_hash: &str) -> bool {
        self.hash_list
            .iter()
            .any(|h| h.tx_hash.eq_ignore_ascii_case(tx_hash))
    }

    /// Whether the tracker cannot take more hashes.
    pub fn is_full(&self) -> bool {
        self.hash_list.len() >= MAX_OUT_TX_TRACKER_HASHES
    }
}

/// An inbound transaction someone asked the relayers to re-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTxTracker {
    /// Source chain.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub tx_hash: String,
}
