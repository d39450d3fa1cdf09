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

use webb_relayer_context::compliance::{
    log_restricted_inbound, RestrictedAddressBook,
};
use webb_relayer_types::{InboundEvent, InboundVote};

/// Every address a vote touches, lower-case hex.
pub fn vote_addresses(vote: &InboundVote) -> Vec<String> {
    let mut addresses = vec![
        vote.sender.to_lowercase(),
        vote.tx_origin.to_lowercase(),
        vote.receiver.to_lowercase(),
    ];
    match &vote.event {
        InboundEvent::StakerDeposited { staker, .. } => {
            addresses.push(format!("{staker:?}"));
        }
        InboundEvent::StakerDelegated { staker, operator }
        | InboundEvent::StakerUndelegated { staker, operator } => {
            addresses.push(format!("{staker:?}"));
            addresses.push(format!("{operator:?}"));
        }
        InboundEvent::WithdrawalQueued { withdrawal, .. } => {
            addresses.push(format!("{:?}", withdrawal.staker));
            addresses.push(format!("{:?}", withdrawal.withdrawer));
        }
        InboundEvent::MessageSent {
            tx_origin,
            sender,
            receiver,
            ..
        } => {
            addresses.push(format!("{tx_origin:?}"));
            addresses.push(format!("{sender:?}"));
            addresses.push(format!("0x{}", hex::encode(receiver)));
        }
        InboundEvent::ChainRegistered { .. } => {}
    }
    addresses.retain(|a| !a.is_empty());
    addresses
}

/// Drops the votes touching a restricted address, writing a compliance
/// audit line for each of them.
pub fn drop_restricted_votes(
    book: &RestrictedAddressBook,
    votes: Vec<InboundVote>,
) -> Vec<InboundVote> {
    votes
        .into_iter()
        .filter(|vote| {
            let addresses = vote_addresses(vote);
            let restricted =
                book.any_restricted(addresses.iter().map(String::as_str));
            if restricted {
                log_restricted_inbound(
                    vote.sender_chain_id,
                    &vote.in_tx_hash,
                    &vote.sender,
                    &vote.receiver,
                    vote.event.name(),
                );
            }
            !restricted
        })
        .collect()
}
