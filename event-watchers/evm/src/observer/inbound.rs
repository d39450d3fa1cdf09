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

use ethers::types::H256;
use webb_bridge_client::constants::{
    POST_VOTE_INBOUND_GAS_LIMIT, POST_VOTE_INBOUND_RETRY_GAS_LIMIT,
};
use webb_event_watcher_traits::EventsByHeight;
use webb_relayer_store::ScanCursor;
use webb_relayer_types::inbound::InboundBlockVote;
use webb_relayer_types::BlockProof;
use webb_relayer_utils::{probe, Error, Result};

use super::EvmObserver;

/// Environment variable overriding the start of the scan of `chain_id`.
/// Either a block height or `latest`.
pub fn scan_from_env(chain_id: i64) -> String {
    format!("CHAIN_{chain_id}_SCAN_FROM_BLOCK")
}

/// Applies a scan start override to the stored `cursor`.
///
/// `latest` drops the stored cursor entirely, both of its heights are then
/// taken from the indexed height of the coordination chain.
pub(crate) fn apply_scan_override(cursor: &mut ScanCursor, value: &str) {
    match value.trim() {
        "latest" => *cursor = ScanCursor::default(),
        v => match v.parse::<u64>() {
            Ok(height) => cursor.last_block_scanned = height,
            Err(e) => tracing::warn!(
                %e,
                value = v,
                "Ignoring invalid scan start override"
            ),
        },
    }
}

impl EvmObserver {
    async fn indexed_height(&self) -> Result<u64> {
        Ok(self
            .client
            .rpc()
            .chain_index(self.chain.id)
            .await?
            .map(|index| index.curr_height)
            .unwrap_or_default())
    }

    /// Picks the cursor to resume from.
    ///
    /// A forced start height wins, then the environment override, then the
    /// stored cursor. Whatever is still unset starts from the height the
    /// coordination chain already indexed.
    pub(crate) async fn load_scan_cursor(&self) -> Result<()> {
        let params = self.params();
        let indexed = self.indexed_height().await?;
        let forced = self.options.force_start_height;
        let mut cursor = if forced > 0 {
            tracing::info!(chain = %self.chain, height = forced, "Forcing the scan start");
            ScanCursor {
                last_block_scanned: forced,
                last_inbound_block: forced,
            }
        } else {
            let mut cursor = match self.store.get_scan_cursor(self.chain.id) {
                Ok(cursor) => cursor.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(%e, chain = %self.chain, "Unable to read the stored cursor");
                    ScanCursor::default()
                }
            };
            if let Ok(value) = std::env::var(scan_from_env(self.chain.id)) {
                apply_scan_override(&mut cursor, &value);
            }
            cursor
        };
        if cursor.last_block_scanned == 0 {
            cursor.last_block_scanned =
                params.start_block_height.saturating_sub(1).max(indexed);
        }
        if cursor.last_inbound_block == 0 {
            cursor.last_inbound_block = indexed;
        }
        self.scan.lock().cursor = cursor;
        Ok(())
    }

    /// Scans the next window of confirmed blocks and votes what it found.
    ///
    /// The cursor only moves once every vote of the window was broadcast,
    /// a failed window is scanned again on the next tick.
    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    pub async fn observe_inbound(&self) -> Result<()> {
        let params = self.params();
        let height = self.rpc.block_number().await?;
        let cursor = {
            let mut scan = self.scan.lock();
            if height < scan.last_block {
                return Err(Error::BlockRewind {
                    chain_id: self.chain.id,
                    current: height,
                    last: scan.last_block,
                });
            }
            scan.last_block = height;
            scan.cursor
        };
        if height < params.confirmation_count {
            return Err(Error::NotEnoughConfirmations {
                chain_id: self.chain.id,
                height,
                confirmations: params.confirmation_count,
            });
        }
        let confirmed = height - params.confirmation_count;
        if confirmed <= cursor.last_block_scanned {
            return Ok(());
        }
        let start = cursor.last_block_scanned + 1;
        let batch = self.options.scan_batch_size.max(1);
        let end = confirmed.min(start + batch - 1);

        let indexed = self.indexed_height().await?;
        let gap = self.options.max_latest_indexed_block_gap;
        if start > indexed.saturating_add(gap)
            && cursor.last_inbound_block > indexed
        {
            tracing::warn!(
                start,
                indexed,
                gap,
                "Scan is too far ahead of the indexed height, waiting"
            );
            return Ok(());
        }

        let (events, highest) = self.reactor.handle_blocks(start, end).await;
        self.vote_events(events).await?;

        if highest >= start {
            let cursor = {
                let mut scan = self.scan.lock();
                scan.cursor.last_block_scanned =
                    scan.cursor.last_block_scanned.max(highest);
                scan.cursor
            };
            if let Err(e) = self.store.set_scan_cursor(self.chain.id, cursor) {
                tracing::error!(%e, "Unable to persist the scan cursor");
            }
            self.metrics
                .last_scanned_block
                .with_label_values(&[&self.chain_label()])
                .set(cursor.last_block_scanned as i64);
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Observer,
                chain_id = self.chain.id,
                start,
                end = highest,
            );
        }
        Ok(())
    }

    /// Votes one block proof per height, in height order.
    async fn vote_events(&self, events: EventsByHeight) -> Result<()> {
        for (height, votes) in events {
            if votes.is_empty() {
                continue;
            }
            let prev = self.scan.lock().cursor.last_inbound_block;
            if height <= prev {
                tracing::debug!(height, prev, "Block already voted");
                continue;
            }
            let proof = BlockProof::new(self.chain.id, prev, height, &votes)?;
            let block = InboundBlockVote {
                signer: self.client.operator().to_owned(),
                proof,
            };
            let receipts = self
                .client
                .post_vote_inbound_block(
                    POST_VOTE_INBOUND_GAS_LIMIT,
                    POST_VOTE_INBOUND_RETRY_GAS_LIMIT,
                    &block,
                    &votes,
                )
                .await?;
            tracing::info!(
                height,
                prev,
                events = votes.len(),
                txs = receipts.iter().filter(|r| r.is_broadcast()).count(),
                "Voted block proof"
            );
            self.scan.lock().cursor.last_inbound_block = height;
            self.metrics
                .last_inbound_block
                .with_label_values(&[&self.chain_label()])
                .set(height as i64);
        }
        Ok(())
    }

    /// Votes the inbound transactions reported to the coordination chain
    /// by hand, once they are confirmed.
    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    pub async fn observe_in_tx_trackers(&self) -> Result<()> {
        let trackers = self.client.rpc().in_tx_trackers(self.chain.id).await?;
        if trackers.is_empty() {
            return Ok(());
        }
        let params = self.params();
        let height = self.rpc.block_number().await?;
        for tracker in trackers {
            let hash: H256 = match tracker.tx_hash.parse() {
                Ok(hash) => hash,
                Err(e) => {
                    tracing::warn!(%e, tx_hash = %tracker.tx_hash, "Invalid tracked hash");
                    continue;
                }
            };
            let tx = self.rpc.transaction_by_hash(hash).await?;
            let receipt = self.rpc.transaction_receipt(hash).await?;
            let (Some(tx), Some(receipt)) = (tx, receipt) else {
                tracing::debug!(?hash, "Tracked transaction not mined yet");
                continue;
            };
            let votes = match self
                .reactor
                .check_and_build_vote_msgs(
                    &tx,
                    &receipt,
                    height,
                    params.confirmation_count,
                )
                .await
            {
                Ok(votes) => votes,
                Err(e) => {
                    tracing::debug!(%e, ?hash, "Tracked transaction not ready");
                    continue;
                }
            };
            for vote in votes {
                let receipt = self
                    .client
                    .post_vote_inbound_events(
                        POST_VOTE_INBOUND_GAS_LIMIT,
                        POST_VOTE_INBOUND_RETRY_GAS_LIMIT,
                        std::slice::from_ref(&vote),
                    )
                    .await?;
                tracing::info!(
                    ?hash,
                    index = vote.event_index,
                    broadcast = receipt.is_broadcast(),
                    "Voted tracked inbound"
                );
            }
        }
        Ok(())
    }
}
