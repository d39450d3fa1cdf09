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

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ethers::abi::{Token, Tokenizable};
use ethers::contract::{parse_log, EthEvent};
use ethers::types::{
    Address, Filter, Log, Transaction, TransactionReceipt, H256,
};
use webb_event_watcher_traits::compliance::drop_restricted_votes;
use webb_event_watcher_traits::{
    BoxedEventHandler, EventHandler, EventsByHeight, EvmRpcClient,
    HandledBlocks,
};
use webb_relayer_context::RestrictedAddressBook;
use webb_relayer_types::{ChainId, ChainParams, InboundEvent, InboundVote};
use webb_relayer_utils::{Error, Result};

use crate::contracts::{
    DepositFilter, MessageSentFilter, StakerDelegatedFilter,
    StakerUndelegatedFilter, WithdrawalQueuedFilter,
};

mod events;
mod registration;

pub use registration::RegistrationHandler;

/// Reads the fields of an ABI struct parameter in declaration order. The
/// bindings may expose such a parameter as a struct or as a tuple.
pub(crate) struct AbiFields(std::vec::IntoIter<Token>);

impl AbiFields {
    pub(crate) fn of(value: impl Tokenizable) -> Option<Self> {
        match value.into_token() {
            Token::Tuple(fields) => Some(Self(fields.into_iter())),
            _ => None,
        }
    }

    pub(crate) fn next<T: Tokenizable>(&mut self) -> Option<T> {
        T::from_token(self.0.next()?).ok()
    }
}

/// Chain parameters shared between an observer and its handlers.
pub type SharedChainParams = Arc<ArcSwap<ChainParams>>;

/// What every handler of one chain is built with.
///
/// Handlers never reach back into the observer, they only get the chain
/// RPC, the parameters and the identity of the voter.
#[derive(Clone, typed_builder::TypedBuilder)]
pub struct HandlerContext {
    rpc: Arc<dyn EvmRpcClient>,
    params: SharedChainParams,
    /// The observed chain.
    chain_id: ChainId,
    /// Receiver chain of every staking vote.
    coordinator_chain_id: ChainId,
    /// Operator address votes are signed with.
    #[builder(setter(into))]
    signer: String,
    #[builder(default)]
    restricted: Arc<RestrictedAddressBook>,
}

impl HandlerContext {
    /// The current chain parameters.
    pub fn params(&self) -> Arc<ChainParams> {
        self.params.load_full()
    }

    /// The observed chain.
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Receiver chain of the staking votes.
    pub fn coordinator_chain_id(&self) -> ChainId {
        self.coordinator_chain_id
    }

    pub(crate) fn rpc(&self) -> &Arc<dyn EvmRpcClient> {
        &self.rpc
    }

    pub(crate) fn vote(
        &self,
        origin: &LogOrigin,
        tx_origin: String,
        receiver: String,
        receiver_chain_id: ChainId,
        gas_limit: u64,
        event: InboundEvent,
    ) -> InboundVote {
        InboundVote {
            signer: self.signer.clone(),
            sender: format!("{:?}", origin.sender),
            sender_chain_id: self.chain_id,
            tx_origin,
            receiver,
            receiver_chain_id,
            in_tx_hash: format!("{:?}", origin.tx_hash),
            in_block_height: origin.height,
            gas_limit,
            event_index: origin.index,
            event,
        }
    }

    /// Drops restricted votes, writing the compliance log for each.
    pub(crate) fn compliant(&self, votes: Vec<InboundVote>) -> Vec<InboundVote> {
        drop_restricted_votes(&self.restricted, votes)
    }

    /// Fetches the transaction of a log and checks it can be voted on.
    pub(crate) async fn fetch_transaction(
        &self,
        tx_hash: H256,
    ) -> Result<Transaction> {
        let tx = self
            .rpc
            .transaction_by_hash(tx_hash)
            .await?
            .ok_or_else(|| Error::Rpc(format!("transaction {tx_hash:?} not found")))?;
        validate_transaction(&tx)?;
        Ok(tx)
    }
}

/// Where a log sits on the chain, and who sent its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOrigin {
    /// Sender of the transaction holding the log.
    pub sender: Address,
    /// Hash of the transaction holding the log.
    pub tx_hash: H256,
    /// Block height.
    pub height: u64,
    /// Log index inside the block.
    pub index: u64,
}

/// Checks that `log` was emitted by `address` with the `topic` event, in
/// `tx_hash` when given, and returns its position.
pub fn validate_log(
    log: &Log,
    address: Address,
    tx_hash: Option<H256>,
    topic: H256,
) -> Result<LogOrigin> {
    if log.removed == Some(true) {
        return Err(Error::Rpc("log was removed by a reorg".into()));
    }
    if log.address != address {
        return Err(Error::Rpc(format!(
            "log emitted by {:?}, expected {address:?}",
            log.address
        )));
    }
    if log.topics.first() != Some(&topic) {
        return Err(Error::Rpc(format!("unexpected topic in log of {address:?}")));
    }
    let log_tx = log
        .transaction_hash
        .ok_or(Error::Generic("log has no transaction hash"))?;
    if let Some(expected) = tx_hash {
        if log_tx != expected {
            return Err(Error::Rpc(format!(
                "log belongs to {log_tx:?}, expected {expected:?}"
            )));
        }
    }
    let height = log
        .block_number
        .ok_or(Error::Generic("log has no block number"))?
        .as_u64();
    let index = log
        .log_index
        .ok_or(Error::Generic("log has no index"))?
        .low_u64();
    Ok(LogOrigin {
        sender: Address::zero(),
        tx_hash: log_tx,
        height,
        index,
    })
}

/// A transaction can only be voted on when its sender is known.
pub fn validate_transaction(tx: &Transaction) -> Result<()> {
    if tx.from.is_zero() {
        return Err(Error::Rpc(format!("transaction {:?} has no sender", tx.hash)));
    }
    Ok(())
}

/// An event that becomes one inbound vote.
pub trait InboundLog: EthEvent + Send + 'static {
    /// Tag used in the logs.
    const TAG: &'static str;
    /// Whether one transaction may carry several of these events.
    const MANY_PER_TX: bool = false;

    /// The contract emitting the event.
    fn contract(params: &ChainParams) -> Address;

    /// Builds the vote, `None` when the event cannot be voted on.
    fn to_vote(self, ctx: &HandlerContext, origin: &LogOrigin)
        -> Option<InboundVote>;
}

/// Handles every event of type `E` emitted by its contract.
pub struct ContractEventHandler<E> {
    ctx: HandlerContext,
    _event: PhantomData<fn() -> E>,
}

impl<E: InboundLog> ContractEventHandler<E> {
    /// Creates a handler scanning with `ctx`.
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            ctx,
            _event: PhantomData,
        }
    }

    /// Boxes the handler for the reactor.
    pub fn boxed(ctx: HandlerContext) -> BoxedEventHandler {
        Box::new(Self::new(ctx))
    }
}

#[async_trait::async_trait]
impl<E: InboundLog> EventHandler for ContractEventHandler<E> {
    fn tag(&self) -> &'static str {
        E::TAG
    }

    #[tracing::instrument(skip(self), fields(chain_id = self.ctx.chain_id, tag = E::TAG))]
    async fn handle_blocks(&self, start: u64, end: u64) -> Result<HandledBlocks> {
        let address = E::contract(&self.ctx.params());
        let mut events = EventsByHeight::new();
        if address.is_zero() {
            return Ok(HandledBlocks {
                events,
                highest_scanned: end,
            });
        }
        let filter = Filter::new()
            .address(address)
            .topic0(E::signature())
            .from_block(start)
            .to_block(end);
        let logs = self.ctx.rpc.logs(&filter).await?;
        let mut seen = HashSet::new();
        for log in logs {
            let mut origin =
                match validate_log(&log, address, None, E::signature()) {
                    Ok(origin) => origin,
                    Err(e) => {
                        tracing::error!(%e, "Invalid event log, skipping");
                        continue;
                    }
                };
            let tx = self.ctx.fetch_transaction(origin.tx_hash).await?;
            if !E::MANY_PER_TX && !seen.insert(origin.tx_hash) {
                tracing::error!(
                    tx_hash = ?origin.tx_hash,
                    "Multiple {} events in one transaction, only the first is voted",
                    E::TAG
                );
                continue;
            }
            origin.sender = tx.from;
            let event = match parse_log::<E>(log) {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(%e, tx_hash = ?origin.tx_hash, "Unable to decode event");
                    continue;
                }
            };
            tracing::info!(tx_hash = ?origin.tx_hash, height = origin.height, "{} event detected", E::TAG);
            if let Some(vote) = event.to_vote(&self.ctx, &origin) {
                for vote in self.ctx.compliant(vec![vote]) {
                    events.entry(origin.height).or_default().push(vote);
                }
            }
        }
        Ok(HandledBlocks {
            events,
            highest_scanned: end,
        })
    }

    async fn build_vote_msgs(
        &self,
        tx: &Transaction,
        receipt: &TransactionReceipt,
    ) -> Result<Vec<InboundVote>> {
        let address = E::contract(&self.ctx.params());
        let mut votes = Vec::new();
        for log in &receipt.logs {
            if log.topics.first() != Some(&E::signature()) {
                continue;
            }
            let mut origin =
                validate_log(log, address, Some(tx.hash), E::signature())?;
            origin.sender = tx.from;
            let event = parse_log::<E>(log.clone()).map_err(Error::rpc)?;
            if let Some(vote) = event.to_vote(&self.ctx, &origin) {
                votes.push(vote);
                if !E::MANY_PER_TX {
                    break;
                }
            }
        }
        Ok(self.ctx.compliant(votes))
    }
}

/// Every handler an EVM observer runs, in registration order.
pub fn default_handlers(ctx: &HandlerContext) -> Vec<BoxedEventHandler> {
    vec![
        ContractEventHandler::<DepositFilter>::boxed(ctx.clone()),
        ContractEventHandler::<StakerDelegatedFilter>::boxed(ctx.clone()),
        ContractEventHandler::<StakerUndelegatedFilter>::boxed(ctx.clone()),
        ContractEventHandler::<WithdrawalQueuedFilter>::boxed(ctx.clone()),
        Box::new(RegistrationHandler::new(ctx.clone())),
        ContractEventHandler::<MessageSentFilter>::boxed(ctx.clone()),
    ]
}
