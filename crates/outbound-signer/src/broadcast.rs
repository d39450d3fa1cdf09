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

use ethers::types::{Bytes, H256};
use webb_event_watcher_traits::EvmRpcClient;
use webb_relayer_utils::retry::DoublingWithMaxRetryCount;
use webb_relayer_utils::{probe, Error};

/// First wait between two broadcast attempts.
pub const BROADCAST_BACKOFF: Duration = Duration::from_secs(1);
/// Broadcast attempts before giving up.
pub const BROADCAST_ATTEMPTS: usize = 5;

/// How a failed broadcast is handled, decided from the node's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastErrorKind {
    /// The nonce was already used, most likely by another relayer.
    NonceTooLow,
    /// A pending transaction with a higher price holds the nonce.
    ReplacementUnderpriced,
    /// The node already has this exact transaction.
    AlreadyKnown,
    /// Anything else.
    Other,
}

impl BroadcastErrorKind {
    /// Classifies a broadcast error message.
    pub fn classify(message: &str) -> Self {
        if message.contains("nonce too low") {
            Self::NonceTooLow
        } else if message.contains("replacement transaction underpriced") {
            Self::ReplacementUnderpriced
        } else if message.contains("already known") {
            Self::AlreadyKnown
        } else {
            Self::Other
        }
    }

    /// Whether another attempt may succeed.
    pub fn should_retry(self) -> bool {
        self == Self::Other
    }

    /// Whether the hash should be reported to the tracker once retries stop.
    pub fn should_report(self) -> bool {
        matches!(self, Self::AlreadyKnown | Self::Other)
    }
}

/// Retry policy of one broadcast.
#[derive(Debug, Clone, Copy, typed_builder::TypedBuilder)]
pub struct BroadcastOptions {
    /// Wait before the second attempt, doubled after every failure.
    #[builder(default = BROADCAST_BACKOFF)]
    pub initial_backoff: Duration,
    /// Total attempts.
    #[builder(default = BROADCAST_ATTEMPTS)]
    pub attempts: usize,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
struct Failure {
    kind: BroadcastErrorKind,
    error: Error,
}

/// Sends `raw` until the node accepts it or retrying is pointless.
///
/// Returns whether `hash` should be reported to the outbound tracker:
/// always after an accepted broadcast, after an `already known` answer, and
/// after running out of attempts on other errors.
#[tracing::instrument(skip_all, fields(tx_hash = ?hash))]
pub async fn broadcast(
    rpc: &dyn EvmRpcClient,
    raw: &Bytes,
    hash: H256,
    options: BroadcastOptions,
) -> bool {
    let policy = DoublingWithMaxRetryCount::new(
        options.initial_backoff,
        options.attempts.saturating_sub(1),
    );
    let outcome = backoff::future::retry(policy, || {
        let raw = raw.clone();
        async move {
            rpc.send_raw_transaction(raw).await.map_err(|error| {
                let kind = BroadcastErrorKind::classify(&error.to_string());
                tracing::warn!(%error, ?kind, "Error broadcasting the outbound tx");
                let failure = Failure { kind, error };
                if kind.should_retry() {
                    backoff::Error::transient(failure)
                } else {
                    backoff::Error::permanent(failure)
                }
            })
        }
    })
    .await;

    match outcome {
        Ok(accepted) => {
            if accepted != hash {
                tracing::warn!(?accepted, "Node returned another hash");
            }
            tracing::info!("Outbound tx broadcast");
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Signer,
                broadcast = true,
                tx_hash = ?hash,
            );
            true
        }
        Err(Failure { kind, error }) => {
            match kind {
                BroadcastErrorKind::NonceTooLow => tracing::warn!(
                    "Nonce too low, this keysign was likely unnecessary"
                ),
                BroadcastErrorKind::ReplacementUnderpriced => {
                    tracing::warn!("Replacement underpriced, waiting for the pending tx")
                }
                BroadcastErrorKind::AlreadyKnown => {
                    tracing::warn!("Outbound tx already known to the node")
                }
                BroadcastErrorKind::Other => {
                    tracing::error!(%error, "Giving up broadcasting the outbound tx")
                }
            }
            kind.should_report()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified_by_message() {
        use BroadcastErrorKind::*;
        let cases = [
            ("RPC error: nonce too low", NonceTooLow, false, false),
            (
                "replacement transaction underpriced",
                ReplacementUnderpriced,
                false,
                false,
            ),
            ("already known", AlreadyKnown, false, true),
            ("connection reset by peer", Other, true, true),
        ];
        for (message, kind, retry, report) in cases {
            let got = BroadcastErrorKind::classify(message);
            assert_eq!(got, kind, "{message}");
            assert_eq!(got.should_retry(), retry, "{message}");
            assert_eq!(got.should_report(), report, "{message}");
        }
    }
}
