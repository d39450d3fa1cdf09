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

use std::collections::{BTreeMap, HashMap};

use ethers::contract::{parse_log, EthEvent};
use ethers::types::{Address, Filter, Log, Transaction, TransactionReceipt, H256};
use webb_event_watcher_traits::{EventHandler, EventsByHeight, HandledBlocks};
use webb_relayer_types::inbound::ApproverSignature;
use webb_relayer_types::{InboundEvent, InboundVote};
use webb_relayer_utils::{Error, Result};

use super::{validate_log, AbiFields, HandlerContext, LogOrigin};
use crate::contracts::{
    RegisterCentralSchedulerFilter, RegisterEjectionManagerFilter,
    RegisterStakeManagerFilter,
};

/// The parts of one registration seen so far, keyed by transaction.
#[derive(Debug, Default)]
struct Partial {
    scheduler: Option<(LogOrigin, RegisterCentralSchedulerFilter)>,
    stake_manager: Option<RegisterStakeManagerFilter>,
    ejection_manager: Option<RegisterEjectionManagerFilter>,
}

impl Partial {
    fn complete(self) -> Option<(LogOrigin, InboundEvent)> {
        let (origin, scheduler) = self.scheduler?;
        let stake = self.stake_manager?;
        let ejection = self.ejection_manager?;
        let mut signature = AbiFields::of(scheduler.approver_signature)?;
        let approver_signature = ApproverSignature {
            signature: signature.next()?,
            salt: signature.next()?,
            expiry: signature.next()?,
        };
        Some((
            origin,
            InboundEvent::ChainRegistered {
                registry_router: scheduler.registry_router,
                central_scheduler: scheduler.central_scheduler,
                stake_manager: stake.stake_manager,
                ejection_manager: ejection.ejection_manager,
                approver_signature,
            },
        ))
    }
}

/// Votes a service registration, which the registry contract emits as
/// three events in one transaction.
///
/// Partial registrations are only correlated within one scan window.
pub struct RegistrationHandler {
    ctx: HandlerContext,
}

impl RegistrationHandler {
    /// Creates the handler.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    fn absorb(
        partials: &mut HashMap<H256, Partial>,
        log: Log,
        address: Address,
        tx_hash: Option<H256>,
    ) -> Result<()> {
        let Some(topic) = log.topics.first().copied() else {
            return Ok(());
        };
        if topic == RegisterCentralSchedulerFilter::signature() {
            let origin = validate_log(&log, address, tx_hash, topic)?;
            let event = parse_log::<RegisterCentralSchedulerFilter>(log).map_err(Error::rpc)?;
            partials.entry(origin.tx_hash).or_default().scheduler =
                Some((origin, event));
        } else if topic == RegisterStakeManagerFilter::signature() {
            let origin = validate_log(&log, address, tx_hash, topic)?;
            let event = parse_log::<RegisterStakeManagerFilter>(log).map_err(Error::rpc)?;
            partials.entry(origin.tx_hash).or_default().stake_manager =
                Some(event);
        } else if topic == RegisterEjectionManagerFilter::signature() {
            let origin = validate_log(&log, address, tx_hash, topic)?;
            let event = parse_log::<RegisterEjectionManagerFilter>(log).map_err(Error::rpc)?;
            partials.entry(origin.tx_hash).or_default().ejection_manager =
                Some(event);
        }
        Ok(())
    }

    fn to_vote(&self, mut origin: LogOrigin, tx: &Transaction, event: InboundEvent) -> InboundVote {
        origin.sender = tx.from;
        let sender = format!("{:?}", tx.from);
        self.ctx.vote(
            &origin,
            sender.clone(),
            sender,
            self.ctx.coordinator_chain_id(),
            0,
            event,
        )
    }
}

#[async_trait::async_trait]
impl EventHandler for RegistrationHandler {
    fn tag(&self) -> &'static str {
        "Registration"
    }

    #[tracing::instrument(skip(self), fields(chain_id = self.ctx.chain_id()))]
    async fn handle_blocks(&self, start: u64, end: u64) -> Result<HandledBlocks> {
        let address = self.ctx.params().registry_router_address;
        let mut events = EventsByHeight::new();
        if address.is_zero() {
            return Ok(HandledBlocks {
                events,
                highest_scanned: end,
            });
        }
        let topics = [
            RegisterCentralSchedulerFilter::signature(),
            RegisterStakeManagerFilter::signature(),
            RegisterEjectionManagerFilter::signature(),
        ];
        let mut partials = HashMap::new();
        for topic in topics {
            let filter = Filter::new()
                .address(address)
                .topic0(topic)
                .from_block(start)
                .to_block(end);
            for log in self.ctx.rpc().logs(&filter).await? {
                if let Err(e) = Self::absorb(&mut partials, log, address, None) {
                    tracing::error!(%e, "Invalid registration log, skipping");
                }
            }
        }
        // order by position so the votes are deterministic.
        let mut complete = BTreeMap::new();
        for (tx_hash, partial) in partials {
            match partial.complete() {
                Some((origin, event)) => {
                    complete.insert((origin.height, origin.index), (origin, event));
                }
                None => tracing::debug!(
                    ?tx_hash,
                    "Incomplete registration in this window, dropped"
                ),
            }
        }
        for (origin, event) in complete.into_values() {
            let tx = self.ctx.fetch_transaction(origin.tx_hash).await?;
            tracing::info!(tx_hash = ?origin.tx_hash, height = origin.height, "Registration detected");
            let vote = self.to_vote(origin, &tx, event);
            for vote in self.ctx.compliant(vec![vote]) {
                events.entry(origin.height).or_default().push(vote);
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
        let address = self.ctx.params().registry_router_address;
        let mut partials = HashMap::new();
        for log in receipt.logs.iter().filter(|l| l.address == address) {
            Self::absorb(&mut partials, log.clone(), address, Some(tx.hash))?;
        }
        let votes = partials
            .remove(&tx.hash)
            .and_then(Partial::complete)
            .map(|(origin, event)| self.to_vote(origin, tx, event))
            .into_iter()
            .collect();
        Ok(self.ctx.compliant(votes))
    }
}
