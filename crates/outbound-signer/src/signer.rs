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

use webb_bridge_client::BridgeClient;
use webb_event_watcher_traits::{ChainObserver, ChainSigner, EvmRpcClient};
use webb_ew_evm::handlers::SharedChainParams;
use webb_relayer_context::compliance::log_restricted_outbound;
use webb_relayer_context::RestrictedAddressBook;
use webb_relayer_tss::TssSigner;
use webb_relayer_types::{Chain, ChainParams, OutboundJob};
use webb_relayer_utils::{probe, Error, Result};

use crate::broadcast::{broadcast, BroadcastOptions};
use crate::gas::Gas;
use crate::outbound_data::{OutboundData, OutboundTx};
use crate::sign::{sign_tx, SignedTx};
use crate::tracker_reporter::{ReporterOptions, TrackerReporter};

/// Signs and broadcasts the outbound transactions of one EVM chain.
#[derive(typed_builder::TypedBuilder)]
pub struct EvmSigner {
    chain: Chain,
    params: SharedChainParams,
    rpc: Arc<dyn EvmRpcClient>,
    tss: Arc<dyn TssSigner>,
    client: BridgeClient,
    #[builder(default)]
    restricted: Arc<RestrictedAddressBook>,
    #[builder(default)]
    broadcast: BroadcastOptions,
    #[builder(default)]
    reporter_options: ReporterOptions,
    #[builder(
        setter(skip),
        default = TrackerReporter::new(rpc.clone(), client.clone(), reporter_options)
    )]
    reporter: TrackerReporter,
}

impl std::fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSigner")
            .field("chain", &self.chain)
            .field("broadcast", &self.broadcast)
            .field("reporter_options", &self.reporter_options)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl EvmSigner {
    /// Client of the coordination chain.
    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    /// Reports broadcast hashes to the outbound tracker.
    pub fn reporter(&self) -> &TrackerReporter {
        &self.reporter
    }

    /// Whether the job was already handled, or a pending transaction for
    /// its nonce pays at least as much gas.
    async fn is_handled(
        &self,
        job: &OutboundJob,
        gas: &Gas,
        observer: &dyn ChainObserver,
    ) -> Result<bool> {
        let nonce = job.nonce();
        let (included, confirmed) = observer.is_outbound_processed(job).await?;
        if included || confirmed || observer.is_nonce_included(nonce) {
            tracing::info!("Outbound already processed");
            return Ok(true);
        }
        if let Some(pending) = observer.pending_gas_price(nonce) {
            if gas.price > pending {
                tracing::info!(%pending, price = %gas.price, "Replacing the pending outbound");
            } else {
                tracing::info!(%pending, "Waiting for the pending outbound to be mined");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The transaction to sign for `job`: the real payload, or a cancel
    /// transaction when a party of the job is restricted.
    fn build_tx(
        &self,
        job: &OutboundJob,
        data: &OutboundData,
        params: &ChainParams,
    ) -> Result<OutboundTx> {
        let receiver = format!("{:?}", data.to);
        if self
            .restricted
            .any_restricted([job.sender.as_str(), receiver.as_str()])
        {
            log_restricted_outbound(
                self.chain.id,
                &job.index,
                data.nonce,
                &job.sender,
                &receiver,
            );
            return Ok(data.cancel(self.tss.evm_address()?));
        }
        data.transaction(job, params.connector_contract_address)
    }
}

#[async_trait::async_trait]
impl ChainSigner for EvmSigner {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn chain_params(&self) -> ChainParams {
        ChainParams::clone(&self.params.load())
    }

    fn set_chain_params(&self, params: ChainParams) {
        self.params.store(Arc::new(params));
    }

    #[tracing::instrument(
        skip_all,
        fields(chain_id = self.chain.id, job = %job.index, nonce = job.nonce())
    )]
    async fn try_process_outbound(
        &self,
        job: OutboundJob,
        observer: Arc<dyn ChainObserver>,
        height: u64,
    ) -> Result<()> {
        let data = OutboundData::new(&job, height)?;
        if data.to_chain_id != self.chain.id {
            return Err(Error::InvalidOutbound(format!(
                "job {} goes to chain {}, not {}",
                job.index, data.to_chain_id, self.chain
            )));
        }
        if self.is_handled(&job, &data.gas, observer.as_ref()).await? {
            return Ok(());
        }

        let params = self.params.load_full();
        let tx = self.build_tx(&job, &data, &params)?;
        let SignedTx { raw, hash, .. } =
            sign_tx(self.tss.as_ref(), self.chain.id, &tx, data.height).await?;
        tracing::info!(
            tx_hash = ?hash,
            from = data.src_chain_id,
            to = data.to_chain_id,
            "Keysign success"
        );
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Signer,
            chain_id = self.chain.id,
            nonce = data.nonce,
            signed = true,
            tx_hash = ?hash,
        );

        if broadcast(self.rpc.as_ref(), &raw, hash, self.broadcast).await {
            self.reporter.spawn(self.chain.id, data.nonce, hash);
        }
        Ok(())
    }
}
