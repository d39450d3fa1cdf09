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

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::inbound::InboundEvent;

/// Status of a cross-chain message on the coordination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Still collecting inbound votes.
    PendingInbound,
    /// Waiting for the outbound transaction to be mined.
    PendingOutbound,
    /// Outbound transaction mined.
    OutboundMined,
    /// Waiting for the revert transaction to be mined.
    PendingRevert,
    /// Reverted to the sender.
    Reverted,
    /// Given up.
    Aborted,
}

impl JobStatus {
    /// Whether the job still waits for a transaction from the relayers.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingOutbound | Self::PendingRevert)
    }
}

/// Outbound parameters decided by the coordination chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundParams {
    /// Receiver on the destination chain.
    pub receiver: String,
    /// Destination chain.
    pub receiver_chain_id: ChainId,
    /// Nonce of the TSS account on the destination chain.
    pub tss_nonce: u64,
    /// Gas limit decided by the coordination chain.
    pub gas_limit: u64,
    /// Gas price as a decimal string.
    pub gas_price: String,
    /// Priority fee as a decimal string. Empty or zero selects a legacy tx.
    #[serde(default)]
    pub gas_priority_fee: String,
    /// TSS public key expected to sign.
    pub tss_pubkey: String,
}

/// A pending cross-chain message, as seen in one scheduling tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundJob {
    /// `0x` + 64 hex chars.
    pub index: String,
    /// Sender on the source chain.
    pub sender: String,
    /// Source chain.
    pub sender_chain_id: ChainId,
    /// Current status.
    pub status: JobStatus,
    /// Value carried by the message.
    pub value: U256,
    /// The inbound event that created the job.
    pub inbound_event: Option<InboundEvent>,
    /// Outbound parameters.
    pub outbound: OutboundParams,
}

impl OutboundJob {
    /// Identifier of the job in the active set: `index-chain-nonce`.
    pub fn outbound_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.index, self.outbound.receiver_chain_id, self.outbound.tss_nonce
        )
    }

    /// Destination chain of the outbound leg.
    pub fn receiver_chain_id(&self) -> ChainId {
        self.outbound.receiver_chain_id
    }

    /// TSS nonce of the outbound leg.
    pub fn nonce(&self) -> u64 {
        self.outbound.tss_nonce
    }
}

/// Outcome of an outbound transaction as voted back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveStatus {
    /// Executed successfully.
    Success,
    /// Failed.
    Failed,
}
