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

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;

/// How the destination connector should deliver a cross-chain message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Call the receiver, no revert path.
    ReceiveCall,
    /// Call the receiver, the sender gets a revert callback on failure.
    RevertableCall,
    /// Plain value transfer to the receiver.
    Transfer,
}

impl MessageKind {
    /// Decodes the message kind from the trailing byte of the event params.
    pub fn from_params(params: &[u8]) -> Option<Self> {
        match params.last()? {
            0 => Some(Self::ReceiveCall),
            1 => Some(Self::RevertableCall),
            2 => Some(Self::Transfer),
            _ => None,
        }
    }
}

/// A withdrawal queued on the restaking protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedWithdrawal {
    /// Owner of the shares.
    pub staker: Address,
    /// Operator the shares were delegated to.
    pub delegated_to: Address,
    /// Address allowed to complete the withdrawal.
    pub withdrawer: Address,
    /// Withdrawal nonce of the staker.
    pub nonce: U256,
    /// Timestamp the withdrawal was queued at.
    pub start_timestamp: u32,
    /// Strategies withdrawn from.
    pub strategies: Vec<Address>,
    /// Shares withdrawn, one entry per strategy.
    pub shares: Vec<U256>,
}

/// Signature of the chain approver over a service registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverSignature {
    /// Raw signature bytes.
    pub signature: Bytes,
    /// Salt used when signing.
    pub salt: H256,
    /// Expiry of the signature.
    pub expiry: U256,
}

/// A bridge relevant event observed on an external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Shares deposited into a strategy.
    StakerDeposited {
        /// Depositor.
        staker: Address,
        /// Token deposited.
        token: Address,
        /// Strategy receiving the deposit.
        strategy: Address,
        /// Shares minted.
        shares: U256,
    },
    /// A staker delegated to an operator.
    StakerDelegated {
        /// Delegator.
        staker: Address,
        /// Operator.
        operator: Address,
    },
    /// A staker undelegated from an operator.
    StakerUndelegated {
        /// Delegator.
        staker: Address,
        /// Operator.
        operator: Address,
    },
    /// A withdrawal was queued.
    WithdrawalQueued {
        /// Root identifying the withdrawal.
        withdrawal_root: H256,
        /// The withdrawal.
        withdrawal: QueuedWithdrawal,
    },
    /// A service registered its contracts with the coordination chain.
    /// Built from three correlated events of the same transaction.
    ChainRegistered {
        /// Registry router on the coordination chain.
        registry_router: Address,
        /// Central scheduler of the service.
        central_scheduler: Address,
        /// Stake manager of the service.
        stake_manager: Address,
        /// Ejection manager of the service.
        ejection_manager: Address,
        /// Approval by the chain approver.
        approver_signature: ApproverSignature,
    },
    /// A cross-chain message left the connector contract.
    MessageSent {
        /// Account that originated the transaction.
        tx_origin: Address,
        /// Contract that called the connector.
        sender: Address,
        /// Destination chain.
        receiver_chain_id: ChainId,
        /// Receiver on the destination chain.
        receiver: Bytes,
        /// Value attached to the message.
        value: U256,
        /// Gas limit requested on the destination chain.
        destination_gas_limit: U256,
        /// Message payload.
        message: Bytes,
        /// Delivery kind.
        message_kind: MessageKind,
    },
}

impl InboundEvent {
    /// Short name of the event, used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StakerDeposited { .. } => "staker_deposited",
            Self::StakerDelegated { .. } => "staker_delegated",
            Self::StakerUndelegated { .. } => "staker_undelegated",
            Self::WithdrawalQueued { .. } => "withdrawal_queued",
            Self::ChainRegistered { .. } => "chain_registered",
            Self::MessageSent { .. } => "message_sent",
        }
    }
}

/// One observed inbound event, ready to be voted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundVote {
    /// Operator address of the voting relayer.
    pub signer: String,
    /// Address that emitted or caused the event.
    pub sender: String,
    /// Chain the event was observed on.
    pub sender_chain_id: ChainId,
    /// Origin of the observed transaction.
    pub tx_origin: String,
    /// Receiver of the event, when it has one.
    pub receiver: String,
    /// Destination chain.
    pub receiver_chain_id: ChainId,
    /// Hash of the observed transaction.
    pub in_tx_hash: String,
    /// Height of the block holding the transaction.
    pub in_block_height: u64,
    /// Gas limit requested on the destination chain.
    pub gas_limit: u64,
    /// Log index of the event inside its block.
    pub event_index: u64,
    /// The event itself.
    pub event: InboundEvent,
}

impl InboundVote {
    /// Ballot digest of this vote. The voter is not part of it, so every
    /// relayer that saw the same event lands on the same ballot.
    pub fn digest(&self) -> webb_relayer_utils::Result<String> {
        let mut ballot = self.clone();
        ballot.signer = String::new();
        crate::json_digest(&ballot)
    }
}

/// One event referenced by a block proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEvent {
    /// Log index inside the block.
    pub index: u64,
    /// Transaction hash.
    pub tx_hash: String,
    /// Ballot digest of the matching vote.
    pub digest: String,
    /// Event name.
    pub kind: String,
}

/// Every vote observed at one external block, plus the previous voted block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProof {
    /// Chain the block belongs to.
    pub chain_id: ChainId,
    /// Height of the block voted before this one.
    pub prev_block_height: u64,
    /// Height of this block.
    pub block_height: u64,
    /// Events, sorted by ascending log index.
    pub events: Vec<ProofEvent>,
}

impl BlockProof {
    /// Builds a proof from the votes observed at `block_height`.
    pub fn new(
        chain_id: ChainId,
        prev_block_height: u64,
        block_height: u64,
        votes: &[InboundVote],
    ) -> webb_relayer_utils::Result<Self> {
        let mut events = votes
            .iter()
            .map(|v| {
                Ok(ProofEvent {
                    index: v.event_index,
                    tx_hash: v.in_tx_hash.clone(),
                    digest: v.digest()?,
                    kind: v.event.name().to_owned(),
                })
            })
            .collect::<webb_relayer_utils::Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.index);
        Ok(Self {
            chain_id,
            prev_block_height,
            block_height,
            events,
        })
    }
}

/// The vote on a [`BlockProof`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundBlockVote {
    /// Operator address of the voting relayer.
    pub signer: String,
    /// The proof.
    pub proof: BlockProof,
}

impl InboundBlockVote {
    /// Ballot digest, shared by every voter of the same proof.
    pub fn digest(&self) -> webb_relayer_utils::Result<String> {
        crate::json_digest(&self.proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(signer: &str, index: u64) -> InboundVote {
        InboundVote {
            signer: signer.into(),
            sender: "0x01".into(),
            sender_chain_id: 11155111,
            tx_origin: "0x01".into(),
            receiver: "0x01".into(),
            receiver_chain_id: 186,
            in_tx_hash: format!("0x{index:064x}"),
            in_block_height: 103,
            gas_limit: 0,
            event_index: index,
            event: InboundEvent::StakerDelegated {
                staker: Address::repeat_byte(1),
                operator: Address::repeat_byte(2),
            },
        }
    }

    #[test]
    fn digest_ignores_the_voter() {
        let a = vote("relayer-a", 1);
        let b = vote("relayer-b", 1);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), vote("relayer-a", 2).digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 66);
    }

    #[test]
    fn block_proof_sorts_events_by_index() {
        let votes = [vote("a", 7), vote("a", 2), vote("a", 5)];
        let proof = BlockProof::new(11155111, 99, 103, &votes).unwrap();
        let order: Vec<_> = proof.events.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![2, 5, 7]);
        assert_eq!(proof.prev_block_height, 99);
    }

    #[test]
    fn message_kind_uses_the_last_byte() {
        assert_eq!(MessageKind::from_params(&[9, 1]), Some(MessageKind::RevertableCall));
        assert_eq!(MessageKind::from_params(&[2]), Some(MessageKind::Transfer));
        assert_eq!(MessageKind::from_params(&[]), None);
        assert_eq!(MessageKind::from_params(&[3]), None);
    }
}
