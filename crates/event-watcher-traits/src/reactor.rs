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

use std::time::Duration;

use ethers::types::{Transaction, TransactionReceipt};
use webb_relayer_types::{ChainId, InboundVote};
use webb_relayer_utils::retry::ConstantWithMaxRetryCount;
use webb_relayer_utils::{Error, Result};

use crate::handler::{EventHandler, EventHandlerWithRetry, EventsByHeight};

/// A boxed [`EventHandler`].
pub type BoxedEventHandler = Box<dyn EventHandler>;

/// Runs every registered [`EventHandler`] over the same blocks and merges
/// what they found.
///
/// Handlers run in registration order. A failing handler is logged and
/// skipped, the others still contribute.
pub struct EventReactor {
    chain_id: ChainId,
    handlers: Vec<BoxedEventHandler>,
    retry_count: usize,
    retry_interval: Duration,
}

impl std::fmt::Debug for EventReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<_> = self.handlers.iter().map(|h| h.tag()).collect();
        f.debug_struct("EventReactor")
            .field("chain_id", &self.chain_id)
            .field("handlers", &tags)
            .finish()
    }
}

impl EventReactor {
    /// A reactor for `chain_id`. Each handler is retried up to 5 times,
    /// 100ms apart, before it is skipped for the range.
    pub fn new(chain_id: ChainId, handlers: Vec<BoxedEventHandler>) -> Self {
        Self {
            chain_id,
            handlers,
            retry_count: 5,
            retry_interval: Duration::from_millis(100),
        }
    }

    /// Overrides the per handler retry policy.
    pub fn with_retry(mut self, count: usize, interval: Duration) -> Self {
        self.retry_count = count;
        self.retry_interval = interval;
        self
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Scans `start..=end` with every handler.
    ///
    /// Returns the merged votes, sorted by event index inside each height,
    /// and the highest block scanned by a successful handler. The latter
    /// never goes below `start - 1`.
    #[tracing::instrument(skip(self), fields(chain_id = self.chain_id))]
    pub async fn handle_blocks(
        &self,
        start: u64,
        end: u64,
    ) -> (EventsByHeight, u64) {
        let mut merged = EventsByHeight::new();
        let mut highest = start.saturating_sub(1);
        for handler in &self.handlers {
            let backoff = ConstantWithMaxRetryCount::new(
                self.retry_interval,
                self.retry_count,
            );
            match handler.handle_blocks_with_retry(start, end, backoff).await {
                Ok(handled) => {
                    highest = highest.max(handled.highest_scanned.min(end));
                    for (height, votes) in handled.events {
                        merged.entry(height).or_default().extend(votes);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        %e,
                        tag = handler.tag(),
                        start,
                        end,
                        "Event handler failed, skipping it for this range"
                    );
                }
            }
        }
        for votes in merged.values_mut() {
            votes.sort_by_key(|v| v.event_index);
            votes.dedup_by(|a, b| {
                a.event_index == b.event_index && a.in_tx_hash == b.in_tx_hash
            });
        }
        (merged, highest)
    }

    /// Builds the votes of one mined transaction, once it has
    /// `confirmations` blocks on top of it as of `last_known_height`.
    #[tracing::instrument(
        skip_all,
        fields(chain_id = self.chain_id, tx_hash = ?receipt.transaction_hash)
    )]
    pub async fn check_and_build_vote_msgs(
        &self,
        tx: &Transaction,
        receipt: &TransactionReceipt,
        last_known_height: u64,
        confirmations: u64,
    ) -> Result<Vec<InboundVote>> {
        let block = receipt
            .block_number
            .ok_or(Error::Generic("receipt is not part of a block"))?
            .as_u64();
        if last_known_height < block.saturating_add(confirmations) {
            return Err(Error::NotEnoughConfirmations {
                chain_id: self.chain_id,
                height: last_known_height,
                confirmations,
            });
        }
        let mut votes = Vec::new();
        for handler in &self.handlers {
            match handler.build_vote_msgs(tx, receipt).await {
                Ok(found) => votes.extend(found),
                Err(e) => {
                    tracing::warn!(%e, tag = handler.tag(), "Unable to build votes");
                }
            }
        }
        votes.sort_by_key(|v| v.event_index);
        Ok(votes)
    }
}
