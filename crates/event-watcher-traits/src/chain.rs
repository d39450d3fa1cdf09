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

use std::sync::Arc;

use ethers::types::U256;
use webb_relayer_types::{Chain, ChainParams, OutboundJob};
use webb_relayer_utils::Result;

/// Watches one external chain.
///
/// The orchestrator holds observers as trait objects, one per enabled chain,
/// and drives their lifecycle through [`start`](Self::start) and
/// [`stop`](Self::stop).
#[async_trait::async_trait]
pub trait ChainObserver: Send + Sync + 'static {
    /// The chain this observer watches.
    fn chain(&self) -> &Chain;

    /// The cached chain parameters.
    fn chain_params(&self) -> ChainParams;

    /// Replaces the cached chain parameters.
    fn set_chain_params(&self, params: ChainParams);

    /// Spawns the watch tasks of this observer.
    fn start(self: Arc<Self>);

    /// Stops every watch task at its next tick.
    fn stop(&self);

    /// Checks whether the outbound of `job` was already mined, voting its
    /// result when it is confirmed. Returns `(included, confirmed)`.
    async fn is_outbound_processed(
        &self,
        job: &OutboundJob,
    ) -> Result<(bool, bool)>;

    /// Whether a transaction for `nonce` was already mined.
    fn is_nonce_included(&self, nonce: u64) -> bool;

    /// Gas price of the pending transaction known for `nonce`, if any.
    fn pending_gas_price(&self, nonce: u64) -> Option<U256>;
}

/// Signs and broadcasts outbound transactions for one external chain.
#[async_trait::async_trait]
pub trait ChainSigner: Send + Sync + 'static {
    /// The chain this signer signs for.
    fn chain(&self) -> &Chain;

    /// The cached chain parameters.
    fn chain_params(&self) -> ChainParams;

    /// Replaces the cached chain parameters.
    fn set_chain_params(&self, params: ChainParams);

    /// Signs and broadcasts the outbound of `job`, using `observer` to skip
    /// nonces already handled. `height` is the coordination chain height
    /// the attempt was scheduled at.
    async fn try_process_outbound(
        &self,
        job: OutboundJob,
        observer: Arc<dyn ChainObserver>,
        height: u64,
    ) -> Result<()>;
}
