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

use std::collections::BTreeMap;

use ethers::types::{Transaction, TransactionReceipt};
use futures::prelude::*;
use webb_relayer_types::InboundVote;

/// Votes found in a block range, keyed by block height.
pub type EventsByHeight = BTreeMap<u64, Vec<InboundVote>>;

/// What a handler found in a block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandledBlocks {
    /// Votes by block height.
    pub events: EventsByHeight,
    /// Highest block the handler fully went through.
    pub highest_scanned: u64,
}

/// A trait that defines a handler for a specific set of event types.
///
/// The handlers are implemented separately from the observers, so that we
/// can have one observer and many event handlers scanning the same blocks.
/// Handlers get their chain and clients injected at construction time and
/// never reach back into the observer.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// A helper tag used to identify the handler in the logs.
    fn tag(&self) -> &'static str;

    /// Scans the blocks `start..=end` for the events of this handler.
    ///
    /// If this method returned an error, nothing it found is kept. To have a
    /// retry mechanism, use
    /// [`EventHandlerWithRetry::handle_blocks_with_retry`].
    async fn handle_blocks(
        &self,
        start: u64,
        end: u64,
    ) -> webb_relayer_utils::Result<HandledBlocks>;

    /// Builds the votes of one already mined transaction.
    ///
    /// Used to re-check transactions reported through the inbound tracker.
    async fn build_vote_msgs(
        &self,
        tx: &Transaction,
        receipt: &TransactionReceipt,
    ) -> webb_relayer_utils::Result<Vec<InboundVote>>;
}

/// An Auxiliary trait to handle blocks with retry logic.
///
/// this trait is automatically implemented for all the event handlers.
#[async_trait::async_trait]
pub trait EventHandlerWithRetry: EventHandler {
    /// Same as [`EventHandler::handle_blocks`], retried with `backoff`.
    ///
    /// **Note**: this method is automatically implemented for all the event handlers.
    async fn handle_blocks_with_retry(
        &self,
        start: u64,
        end: u64,
        backoff: impl backoff::backoff::Backoff + Send + Sync + 'static,
    ) -> webb_relayer_utils::Result<HandledBlocks> {
        let wrapped_task = || {
            self.handle_blocks(start, end).map_err(|e| {
                tracing::debug!(%e, tag = self.tag(), "Handler failed, retrying");
                backoff::Error::transient(e)
            })
        };
        backoff::future::retry(backoff, wrapped_task).await
    }
}

impl<T> EventHandlerWithRetry for T where T: EventHandler + ?Sized {}
