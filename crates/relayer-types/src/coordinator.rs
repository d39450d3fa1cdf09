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
use crate::inbound::{InboundBlockVote, InboundVote};
use crate::keygen::Blame;
use crate::outbound::ReceiveStatus;

/// Vote on the result of an outbound transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundVote {
    /// Operator address of the voting relayer.
    pub signer: String,
    /// Index of the job.
    pub job_index: String,
    /// Hash of the outbound transaction.
    pub out_tx_hash: String,
    /// Block the transaction was mined in.
    pub out_block_height: u64,
    /// Gas used by the transaction.
    pub gas_used: u64,
    /// Effective gas price paid.
    pub effective_gas_price: U256,
    /// Gas limit of the transaction.
    pub effective_gas_limit: u64,
    /// Execution outcome.
    pub status: ReceiveStatus,
    /// Failure reason found in the connector logs, if any.
    pub failed_reason: String,
    /// Destination chain.
    pub chain_id: ChainId,
    /// TSS nonce.
    pub nonce: u64,
}

impl OutboundVote {
    /// Ballot digest, shared by every voter.
    pub fn digest(&self) -> webb_relayer_utils::Result<String> {
        let mut ballot = self.clone();
        ballot.signer = String::new();
        crate::json_digest(&ballot)
    }
}

/// Gas price observed on an external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceVote {
    /// Operator address.
    pub signer: String,
    /// Chain.
    pub chain_id: ChainId,
    /// Gas price.
    pub price: U256,
    /// Supply reported with the price.
    pub supply: String,
    /// External block the price was read at.
    pub block_number: u64,
}

/// Result of a keygen ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TssVote {
    /// Operator address.
    pub signer: String,
    /// Generated public key, empty on failure.
    pub tss_pubkey: String,
    /// Target height of the ceremony.
    pub keygen_height: i64,
    /// Outcome.
    pub status: ReceiveStatus,
}

impl TssVote {
    /// Ballot digest, shared by every voter.
    pub fn digest(&self) -> webb_relayer_utils::Result<String> {
        let mut ballot = self.clone();
        ballot.signer = String::new();
        crate::json_digest(&ballot)
    }
}

/// Blame data of a failed ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameVote {
    /// Operator address.
    pub signer: String,
    /// Chain the ceremony belongs to.
    pub chain_id: ChainId,
    /// `keygen-<digest>-<height>`.
    pub index: String,
    /// Blame attribution.
    pub blame: Blame,
}

/// Adds a candidate hash to the outbound tracker of a nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddToOutTxTracker {
    /// Operator address.
    pub signer: String,
    /// Destination chain.
    pub chain_id: ChainId,
    /// TSS nonce.
    pub nonce: u64,
    /// Transaction hash.
    pub tx_hash: String,
}

/// Which TSS balance a recharge vote is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RechargeToken {
    /// The bridged ERC20 token.
    BridgeToken,
    /// The native gas token.
    GasToken,
}

/// Asks the coordination chain to top up a TSS balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeVote {
    /// Operator address.
    pub signer: String,
    /// Chain.
    pub chain_id: ChainId,
    /// Token to top up.
    pub token: RechargeToken,
    /// Recharge operation this vote is for.
    pub vote_index: u64,
}

impl RechargeVote {
    /// Ballot digest, shared by every voter.
    pub fn digest(&self) -> webb_relayer_utils::Result<String> {
        let mut ballot = self.clone();
        ballot.signer = String::new();
        crate::json_digest(&ballot)
    }
}

/// Any message the relayer sends to the coordination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CoordinatorMsg {
    /// Vote on a single inbound event.
    VoteInbound(InboundVote),
    /// Vote on a block proof.
    VoteInboundBlock(InboundBlockVote),
    /// Vote on an outbound result.
    VoteOutbound(OutboundVote),
    /// Gas price post.
    GasPrice(GasPriceVote),
    /// Keygen result.
    VoteTss(TssVote),
    /// Keygen blame.
    Blame(BlameVote),
    /// Outbound tracker report.
    AddToOutTxTracker(AddToOutTxTracker),
    /// Balance recharge request.
    VoteRecharge(RechargeVote),
}

impl CoordinatorMsg {
    /// Short name of the message, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VoteInbound(_) => "vote_inbound",
            Self::VoteInboundBlock(_) => "vote_inbound_block",
            Self::VoteOutbound(_) => "vote_outbound",
            Self::GasPrice(_) => "gas_price",
            Self::VoteTss(_) => "vote_tss",
            Self::Blame(_) => "blame",
            Self::AddToOutTxTracker(_) => "add_to_out_tx_tracker",
            Self::VoteRecharge(_) => "vote_recharge",
        }
    }

    /// Operator that signed the message.
    pub fn signer(&self) -> &str {
        match self {
            Self::VoteInbound(m) => &m.signer,
            Self::VoteInboundBlock(m) => &m.signer,
            Self::VoteOutbound(m) => &m.signer,
            Self::GasPrice(m) => &m.signer,
            Self::VoteTss(m) => &m.signer,
            Self::Blame(m) => &m.signer,
            Self::AddToOutTxTracker(m) => &m.signer,
            Self::VoteRecharge(m) => &m.signer,
        }
    }

    /// The ballot this message votes on, if it is a vote.
    pub fn ballot_digest(&self) -> webb_relayer_utils::Result<Option<String>> {
        let digest = match self {
            Self::VoteInbound(m) => Some(m.digest()?),
            Self::VoteInboundBlock(m) => Some(m.digest()?),
            Self::VoteOutbound(m) => Some(m.digest()?),
            Self::VoteTss(m) => Some(m.digest()?),
            Self::VoteRecharge(m) => Some(m.digest()?),
            Self::GasPrice(_) | Self::Blame(_) | Self::AddToOutTxTracker(_) => {
                None
            }
        };
        Ok(digest)
    }
}

/// A transaction for the coordination chain, before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    /// Messages carried by the transaction.
    pub msgs: Vec<CoordinatorMsg>,
    /// Gas limit.
    pub gas_limit: u64,
    /// Fee paid, `gas_limit * gas_price`.
    pub fee: U256,
    /// Account number of the operator.
    pub account_number: u64,
    /// Sequence of the operator account.
    pub sequence: u64,
}

/// Synchronous broadcast response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    /// ABCI code, zero on success.
    pub code: u32,
    /// Transaction hash.
    pub tx_hash: String,
    /// Raw log of the check.
    pub raw_log: String,
}

/// Execution result of a transaction, once included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// ABCI code, zero on success.
    pub code: u32,
    /// Raw execution log.
    pub raw_log: String,
}

/// Fee market parameters of the coordination chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeemarketParams {
    /// Current base fee.
    pub base_fee: u128,
    /// Minimum gas price.
    pub min_gas_price: f64,
}

/// Account number and sequence of the operator account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account number.
    pub account_number: u64,
    /// Next sequence.
    pub sequence: u64,
}
