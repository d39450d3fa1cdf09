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

//! How each contract event turns into an inbound vote.

use ethers::types::{Address, H256, U256};
use webb_relayer_types::inbound::{MessageKind, QueuedWithdrawal};
use webb_relayer_types::{ChainId, ChainParams, InboundEvent, InboundVote};

use super::{AbiFields, HandlerContext, InboundLog, LogOrigin};
use crate::contracts::{
    DepositFilter, MessageSentFilter, StakerDelegatedFilter,
    StakerUndelegatedFilter, WithdrawalQueuedFilter,
};

/// Staking votes are addressed to the coordination chain, on behalf of
/// the staker.
fn staking_vote(
    ctx: &HandlerContext,
    origin: &LogOrigin,
    staker: Address,
    event: InboundEvent,
) -> InboundVote {
    let staker = format!("{staker:?}");
    ctx.vote(
        origin,
        staker.clone(),
        staker,
        ctx.coordinator_chain_id(),
        0,
        event,
    )
}

impl InboundLog for DepositFilter {
    const TAG: &'static str = "Deposit";

    fn contract(params: &ChainParams) -> Address {
        params.strategy_manager_address
    }

    fn to_vote(
        self,
        ctx: &HandlerContext,
        origin: &LogOrigin,
    ) -> Option<InboundVote> {
        let event = InboundEvent::StakerDeposited {
            staker: self.staker,
            token: self.token,
            strategy: self.strategy,
            shares: self.shares,
        };
        Some(staking_vote(ctx, origin, self.staker, event))
    }
}

impl InboundLog for StakerDelegatedFilter {
    const TAG: &'static str = "StakerDelegated";

    fn contract(params: &ChainParams) -> Address {
        params.delegation_manager_address
    }

    fn to_vote(
        self,
        ctx: &HandlerContext,
        origin: &LogOrigin,
    ) -> Option<InboundVote> {
        let event = InboundEvent::StakerDelegated {
            staker: self.staker,
            operator: self.operator,
        };
        Some(staking_vote(ctx, origin, self.staker, event))
    }
}

impl InboundLog for StakerUndelegatedFilter {
    const TAG: &'static str = "StakerUndelegated";

    fn contract(params: &ChainParams) -> Address {
        params.delegation_manager_address
    }

    fn to_vote(
        self,
        ctx: &HandlerContext,
        origin: &LogOrigin,
    ) -> Option<InboundVote> {
        let event = InboundEvent::StakerUndelegated {
            staker: self.staker,
            operator: self.operator,
        };
        Some(staking_vote(ctx, origin, self.staker, event))
    }
}

impl InboundLog for WithdrawalQueuedFilter {
    const TAG: &'static str = "WithdrawalQueued";
    const MANY_PER_TX: bool = true;

    fn contract(params: &ChainParams) -> Address {
        params.delegation_manager_address
    }

    fn to_vote(
        self,
        ctx: &HandlerContext,
        origin: &LogOrigin,
    ) -> Option<InboundVote> {
        let Some(withdrawal) = read_withdrawal(self.withdrawal) else {
            tracing::error!(
                tx_hash = ?origin.tx_hash,
                "Malformed queued withdrawal"
            );
            return None;
        };
        if withdrawal.strategies.len() != withdrawal.shares.len() {
            tracing::error!(
                tx_hash = ?origin.tx_hash,
                "Withdrawal with {} strategies but {} share entries",
                withdrawal.strategies.len(),
                withdrawal.shares.len()
            );
            return None;
        }
        let staker = withdrawal.staker;
        let event = InboundEvent::WithdrawalQueued {
            withdrawal_root: H256::from(self.withdrawal_root),
            withdrawal,
        };
        Some(staking_vote(ctx, origin, staker, event))
    }
}

fn read_withdrawal(
    value: impl ethers::abi::Tokenizable,
) -> Option<QueuedWithdrawal> {
    let mut fields = AbiFields::of(value)?;
    Some(QueuedWithdrawal {
        staker: fields.next()?,
        delegated_to: fields.next()?,
        withdrawer: fields.next()?,
        nonce: fields.next()?,
        start_timestamp: fields.next()?,
        strategies: fields.next()?,
        shares: fields.next()?,
    })
}

/// Destination chain ids must fit the coordination chain id type.
fn destination_chain(id: U256) -> Option<ChainId> {
    if id > U256::from(ChainId::MAX as u64) {
        return None;
    }
    Some(id.as_u64() as ChainId)
}

impl InboundLog for MessageSentFilter {
    const TAG: &'static str = "MessageSent";

    fn contract(params: &ChainParams) -> Address {
        params.connector_contract_address
    }

    fn to_vote(
        self,
        ctx: &HandlerContext,
        origin: &LogOrigin,
    ) -> Option<InboundVote> {
        let Some(message_kind) = MessageKind::from_params(&self.params) else {
            tracing::warn!(
                tx_hash = ?origin.tx_hash,
                params = %self.params,
                "Unknown message kind, skipping"
            );
            return None;
        };
        let Some(receiver_chain_id) =
            destination_chain(self.destination_chain_id)
        else {
            tracing::warn!(
                tx_hash = ?origin.tx_hash,
                chain = %self.destination_chain_id,
                "Destination chain id out of range, skipping"
            );
            return None;
        };
        let gas_limit = if self.destination_gas_limit > U256::from(u64::MAX) {
            u64::MAX
        } else {
            self.destination_gas_limit.as_u64()
        };
        let mut vote = ctx.vote(
            origin,
            format!("{:?}", origin.sender),
            format!("0x{}", hex::encode(&self.destination_address)),
            receiver_chain_id,
            gas_limit,
            InboundEvent::MessageSent {
                tx_origin: origin.sender,
                sender: self.tx_sender_address,
                receiver_chain_id,
                receiver: self.destination_address,
                value: self.value_and_gas,
                destination_gas_limit: self.destination_gas_limit,
                message: self.message,
                message_kind,
            },
        );
        // The connector reports the contract that called it, the account
        // that signed the transaction is the origin.
        vote.sender = format!("{:?}", self.tx_sender_address);
        Some(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_chain_must_fit() {
        assert_eq!(destination_chain(U256::from(7000)), Some(7000));
        assert_eq!(destination_chain(U256::from(u64::MAX)), None);
    }
}
