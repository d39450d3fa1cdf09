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
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use typed_builder::TypedBuilder;
use webb_bridge_client::BridgeClient;
use webb_relayer_types::keygen::{Blame, KeygenRecord, KeygenStatus};
use webb_relayer_types::outbound::ReceiveStatus;
use webb_relayer_types::ChainId;
use webb_relayer_utils::metric::Metrics;
use webb_relayer_utils::{probe, Error, Result};

use crate::{KeygenOutcome, Tss, TssKey};

/// Knobs of the keygen driving loop.
#[derive(Debug, Clone, TypedBuilder)]
pub struct KeygenOptions {
    /// Chain id the blame data is posted under.
    coordinator_chain_id: ChainId,
    /// How often the keygen record is polled.
    #[builder(default = Duration::from_secs(1))]
    poll_interval: Duration,
    /// Whether a test keysign runs after a successful ceremony.
    #[builder(default = true)]
    test_keysign: bool,
    #[builder(default, setter(strip_option))]
    metrics: Option<Arc<Metrics>>,
}

/// Index of the blame data posted for a failed ceremony.
pub fn keygen_blame_index(request: &KeygenRecord) -> Result<String> {
    let digest = webb_relayer_types::json_digest(request)?;
    Ok(format!("keygen-{}-{}", digest, request.block_number))
}

/// Polls the keygen record until this node holds a TSS key.
///
/// A pending ceremony runs at most once per target height, whatever its
/// outcome. A failed record clears that mark, the coordination chain is
/// expected to schedule a new ceremony at a later height.
#[tracing::instrument(skip_all)]
pub async fn generate_tss(
    client: &BridgeClient,
    tss: &Tss,
    options: &KeygenOptions,
) -> Result<Arc<TssKey>> {
    let mut tried_at: Option<i64> = None;
    let mut interval = tokio::time::interval(options.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let keygen = match client.keygen().await {
            Ok(Some(keygen)) => keygen,
            Ok(None) => {
                tracing::debug!("No keygen request yet");
                continue;
            }
            Err(e) => {
                tracing::warn!(%e, "Unable to fetch the keygen record");
                continue;
            }
        };
        match keygen.status {
            KeygenStatus::Success => {
                if let Some(key) = tss.key() {
                    return Ok(key);
                }
                match client.current_tss().await {
                    Ok(Some(record)) => {
                        if tss.rehydrate(&record)? {
                            if let Some(key) = tss.key() {
                                return Ok(key);
                            }
                        }
                        return Err(Error::KeygenFailed(format!(
                            "no local share of the current TSS key {}",
                            record.tss_pubkey
                        )));
                    }
                    Ok(None) => {
                        tracing::debug!("Keygen succeeded, TSS not set yet");
                    }
                    Err(e) => {
                        tracing::warn!(%e, "Unable to fetch the current TSS");
                    }
                }
            }
            KeygenStatus::Failed => {
                if let Some(height) = tried_at.take() {
                    tracing::info!(
                        height,
                        "Keygen failed, waiting for a new ceremony"
                    );
                }
            }
            KeygenStatus::Pending => {
                let height = match client.block_height().await {
                    Ok(height) => height,
                    Err(e) => {
                        tracing::warn!(%e, "Unable to fetch the block height");
                        continue;
                    }
                };
                if height != keygen.block_number
                    || tried_at == Some(keygen.block_number)
                {
                    tracing::trace!(
                        height,
                        target_height = keygen.block_number,
                        "Waiting for the keygen height"
                    );
                    continue;
                }
                tried_at = Some(keygen.block_number);
                match run_ceremony(client, tss, &keygen, options).await {
                    Ok(key) => return Ok(key),
                    Err(e) => {
                        tracing::error!(
                            %e,
                            height = keygen.block_number,
                            "Keygen ceremony did not produce a key"
                        );
                    }
                }
            }
        }
    }
}

async fn run_ceremony(
    client: &BridgeClient,
    tss: &Tss,
    request: &KeygenRecord,
    options: &KeygenOptions,
) -> Result<Arc<TssKey>> {
    tracing::info!(
        height = request.block_number,
        grantees = request.grantee_pubkeys.len(),
        "Running the keygen ceremony"
    );
    let outcome = match tss.ceremony().keygen(request).await {
        Ok(outcome) => outcome,
        Err(e) => KeygenOutcome::Failed(Blame {
            failure_reason: e.to_string(),
            nodes: Vec::new(),
        }),
    };
    match outcome {
        KeygenOutcome::Generated { pubkey } => {
            let key = TssKey::new(
                pubkey,
                request.grantee_pubkeys.clone(),
                request.block_number,
            )?;
            let receipt = client
                .post_vote_tss(
                    &key.pubkey,
                    request.block_number,
                    ReceiveStatus::Success,
                )
                .await?;
            tracing::info!(
                pubkey = %key.pubkey,
                tx_hash = %receipt.tx_hash,
                "Voted the new TSS key"
            );
            let key = tss.set_key(key);
            if options.test_keysign {
                if let Err(e) = tss.test_keysign().await {
                    tracing::error!(%e, "Test keysign failed");
                }
            }
            Ok(key)
        }
        KeygenOutcome::Failed(blame) => {
            // the blame is posted even when the failed vote cannot be.
            if let Err(e) = client
                .post_vote_tss("", request.block_number, ReceiveStatus::Failed)
                .await
            {
                tracing::error!(%e, "Unable to vote the failed keygen");
            }
            let index = keygen_blame_index(request)?;
            if let Some(metrics) = &options.metrics {
                for node in &blame.nodes {
                    metrics
                        .tss_node_blame
                        .with_label_values(&[&node.pubkey])
                        .inc();
                }
            }
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Tss,
                keygen_failed = true,
                %index,
                blamed = blame.nodes.len(),
            );
            let reason = blame.failure_reason.clone();
            client
                .post_blame_data(blame, options.coordinator_chain_id, &index)
                .await?;
            Err(Error::KeygenFailed(reason))
        }
    }
}
