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

/// State of a keygen ceremony on the coordination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeygenStatus {
    /// Waiting for the target block.
    Pending,
    /// A key was generated.
    Success,
    /// The ceremony failed, a new one will be scheduled.
    Failed,
}

/// A keygen request as stored on the coordination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRecord {
    /// Current status.
    pub status: KeygenStatus,
    /// Coordination block at which the ceremony has to run.
    pub block_number: i64,
    /// Public keys of the participants.
    pub grantee_pubkeys: Vec<String>,
}

/// The TSS key currently in use on the coordination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssRecord {
    /// Public key.
    pub tss_pubkey: String,
    /// Height of the ceremony that produced it.
    pub keygen_height: i64,
}

/// One participant blamed for a failed ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameNode {
    /// Participant public key.
    pub pubkey: String,
}

/// Blame attribution of a failed ceremony.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blame {
    /// Why the ceremony failed.
    pub failure_reason: String,
    /// Blamed participants.
    pub nodes: Vec<BlameNode>,
}
