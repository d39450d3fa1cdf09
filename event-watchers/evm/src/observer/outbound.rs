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

use ethers::contract::{parse_log, EthEvent};
use ethers::types::{Address, Block, Transaction, TransactionReceipt, H256, U256, U64};
use webb_relayer_types::coordinator::OutboundVote;
use webb_relayer_types::outbound::ReceiveStatus;
use webb_relayer_types::OutboundJob;
use webb_relayer_utils::{Error, Result};

use super::EvmObserver;
use crate::contracts::BridgeMessageFailedFilter;

type Confirmed = (TransactionReceipt, Transaction);

impl EvmObserver {
    /// Looks for a confirmed transaction among the hashes reported to each
    /// outbound tracker of this chain.
    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    pub async fn observe_outbound(&self) -> Result<()> {
        let trackers = self.client.all_out_tx_trackers(self.chain.id).await?;
        if trackers.is_empty() {
            return Ok(());
        }
        let tss = self.tss.evm_address()?;
        let confirmations = self.params().confirmation_count;
        for tracker in trackers {
            let nonce = tracker.nonce;
            if self.outbound.lock().confirmed.contains_key(&nonce) {
                continue;
            }
            let mut found = Vec::new();
            for entry in &tracker.hash_list {
                let hash: H256 = match entry.tx_hash.parse() {
                    Ok(hash) => hash,
                    Err(e) => {
                        tracing::warn!(%e, nonce, tx_hash = %entry.tx_hash, "Invalid tracked hash");
                        continue;
                    }
                };
                match self.check_confirmed_tx(hash, nonce, tss, confirmations).await {
                    Ok(Some(confirmed)) => found.push(confirmed),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(%e, nonce, ?hash, "Tracked outbound rejected");
                    }
                }
            }
            match found.len() {
                0 if tracker.is_full() => tracing::warn!(
                    nonce,
                    "Outbound tracker is full and none of its hashes is confirmed"
                ),
                0 => {}
                1 => {
                    let mut outbound = self.outbound.lock();
                    outbound.pending.retain(|&pending, _| pending > nonce);
                    if let Some(confirmed) = found.pop() {
                        tracing::info!(nonce, tx_hash = ?confirmed.1.hash, "Outbound confirmed");
                        outbound.confirmed.insert(nonce, confirmed);
                    }
                }
                n => tracing::error!(
                    nonce,
                    confirmed = n,
                    "More than one confirmed outbound for one nonce"
                ),
            }
        }
        Ok(())
    }

    /// Checks that `hash` is a transaction of the TSS for `nonce`, mined in
    /// its block with enough confirmations on top.
    ///
    /// Mined but unconfirmed and unmined transactions are remembered as
    /// pending and yield `None`.
    pub(crate) async fn check_confirmed_tx(
        &self,
        hash: H256,
        nonce: u64,
        tss: Address,
        confirmations: u64,
    ) -> Result<Option<Confirmed>> {
        let Some(tx) = self.rpc.transaction_by_hash(hash).await? else {
            return Ok(None);
        };
        let from = tx.recover_from()?;
        if from != tss {
            return Err(Error::InvalidOutbound(format!(
                "{hash:?} is signed by {from:?}, not by the TSS {tss:?}"
            )));
        }
        if tx.nonce != U256::from(nonce) {
            return Err(Error::InvalidOutbound(format!(
                "{hash:?} has nonce {}, expected {nonce}",
                tx.nonce
            )));
        }
        if tx.block_number.is_none() {
            self.remember_pending(nonce, tx);
            return Ok(None);
        }
        let Some(receipt) = self.rpc.transaction_receipt(hash).await? else {
            self.remember_pending(nonce, tx);
            return Ok(None);
        };
        let mined = receipt
            .block_number
            .ok_or(Error::Generic("receipt is not part of a block"))?
            .as_u64();
        let height = self.rpc.block_number().await?;
        if height < mined.saturating_add(confirmations) {
            self.remember_pending(nonce, tx);
            return Ok(None);
        }
        let block = self.block(mined).await?;
        let position = receipt.transaction_index.as_usize();
        if block.transactions.get(position) != Some(&hash) {
            // the cached block may come from a fork.
            self.block_cache.lock().pop(&mined);
            return Err(Error::InvalidOutbound(format!(
                "{hash:?} is not at position {position} of block {mined}"
            )));
        }
        Ok(Some((receipt, tx)))
    }

    /// Nonces at or below a confirmed one are final, their leftovers are
    /// never pending again.
    fn remember_pending(&self, nonce: u64, tx: Transaction) {
        let mut outbound = self.outbound.lock();
        if outbound.confirmed.keys().all(|&confirmed| confirmed < nonce) {
            outbound.pending.insert(nonce, tx);
        }
    }

    async fn block(&self, height: u64) -> Result<Block<H256>> {
        if let Some(block) = self.block_cache.lock().get(&height).cloned() {
            return Ok(block);
        }
        let block = self
            .rpc
            .block_by_number(height)
            .await?
            .ok_or(Error::Generic("block not found"))?;
        self.block_cache.lock().put(height, block.clone());
        Ok(block)
    }

    /// Votes the result of the confirmed outbound of `job`, if any.
    pub(crate) async fn vote_outbound_result(
        &self,
        job: &OutboundJob,
    ) -> Result<(bool, bool)> {
        let nonce = job.nonce();
        let Some((receipt, tx)) =
            self.outbound.lock().confirmed.get(&nonce).cloned()
        else {
            return Ok((false, false));
        };
        let connector = self.params().connector_contract_address;
        let reasons: Vec<String> = receipt
            .logs
            .iter()
            .filter(|log| {
                log.address == connector
                    && log.topics.first()
                        == Some(&BridgeMessageFailedFilter::signature())
            })
            .filter_map(|log| {
                match parse_log::<BridgeMessageFailedFilter>(log.clone()) {
                    Ok(failed) if failed.reason.is_empty() => {
                        Some("unknownReason".to_owned())
                    }
                    Ok(failed) => Some(hex::encode(&failed.reason)),
                    Err(e) => {
                        tracing::warn!(%e, "Undecodable failure event");
                        None
                    }
                }
            })
            .collect();
        let status = if receipt.status == Some(U64::one()) && reasons.is_empty()
        {
            ReceiveStatus::Success
        } else {
            ReceiveStatus::Failed
        };
        let vote = OutboundVote {
            signer: self.client.operator().to_owned(),
            job_index: job.index.clone(),
            out_tx_hash: format!("{:?}", tx.hash),
            out_block_height: receipt
                .block_number
                .map(|b| b.as_u64())
                .unwrap_or_default(),
            gas_used: receipt.gas_used.map(|g| g.low_u64()).unwrap_or_default(),
            effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
            effective_gas_limit: tx.gas.low_u64(),
            status,
            failed_reason: reasons.join("-"),
            chain_id: self.chain.id,
            nonce,
        };
        match self.client.post_vote_outbound(vote).await {
            Ok(receipt) => tracing::info!(
                nonce,
                job = %job.index,
                ?status,
                tx_hash = %receipt.tx_hash,
                "Voted outbound result"
            ),
            Err(e) => tracing::error!(%e, nonce, "Unable to vote the outbound result"),
        }
        Ok((true, true))
    }
}
