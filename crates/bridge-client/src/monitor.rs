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

use webb_relayer_types::coordinator::CoordinatorMsg;
use webb_relayer_utils::retry::ConstantWithMaxRetryCount;
use webb_relayer_utils::{Error, Result};

use crate::BridgeClient;

/// Which vote a monitored transaction carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    /// Single inbound events.
    Inbound,
    /// A block proof and its first events.
    InboundBlock,
    /// An outbound result.
    Outbound,
}

/// What to do about an included vote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    /// Nothing, it went through.
    Success,
    /// Send it again, once, with the retry gas limit.
    Resend,
    /// The vote itself failed, only worth an error log.
    ExecutionFailed,
}

/// Classifies the raw execution log of a vote transaction.
///
/// Inbound votes are resent on `out of gas` and on `sequential error`, the
/// latter meaning the previous block proof was not finalized yet. Outbound
/// votes are only resent on `out of gas`.
pub fn classify_vote_result(kind: VoteKind, raw_log: &str) -> MonitorVerdict {
    let out_of_gas = raw_log.contains("out of gas");
    let failed = raw_log.contains("failed to execute message");
    match kind {
        VoteKind::Outbound if failed => MonitorVerdict::ExecutionFailed,
        VoteKind::Outbound if out_of_gas => MonitorVerdict::Resend,
        VoteKind::Inbound | VoteKind::InboundBlock
            if out_of_gas || raw_log.contains("sequential error") =>
        {
            MonitorVerdict::Resend
        }
        _ if failed => MonitorVerdict::ExecutionFailed,
        _ => MonitorVerdict::Success,
    }
}

/// A vote to send again when its first transaction ran out of gas.
#[derive(Debug, Clone)]
pub(crate) struct Resend {
    gas_limit: u64,
    ballot: String,
    voter: String,
    msgs: Vec<CoordinatorMsg>,
}

impl Resend {
    /// `None` when `gas_limit` is zero, that is, when no resend is wanted.
    pub(crate) fn new(
        gas_limit: u64,
        ballot: &str,
        voter: &str,
        msgs: Vec<CoordinatorMsg>,
    ) -> Option<Self> {
        (gas_limit > 0).then(|| Self {
            gas_limit,
            ballot: ballot.to_owned(),
            voter: voter.to_owned(),
            msgs,
        })
    }
}

impl BridgeClient {
    pub(crate) fn spawn_monitor(
        &self,
        tx_hash: String,
        kind: VoteKind,
        resend: Option<Resend>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.monitor_vote_result(&tx_hash, kind, resend).await
            {
                tracing::error!(%e, %tx_hash, ?kind, "Unable to query the vote result");
            }
        });
    }

    #[tracing::instrument(skip(self, resend))]
    async fn monitor_vote_result(
        &self,
        tx_hash: &str,
        kind: VoteKind,
        resend: Option<Resend>,
    ) -> Result<()> {
        let backoff = ConstantWithMaxRetryCount::new(
            self.monitor_interval,
            self.monitor_retry_count,
        );
        let result = backoff::future::retry(backoff, || async {
            match self.rpc.query_tx_result(tx_hash).await {
                Ok(Some(result)) => Ok(result),
                Ok(None) => Err(backoff::Error::transient(Error::Rpc(
                    format!("tx {tx_hash} is not included yet"),
                ))),
                Err(e) => Err(backoff::Error::transient(e)),
            }
        })
        .await?;

        match classify_vote_result(kind, &result.raw_log) {
            MonitorVerdict::Success => {
                tracing::debug!("Vote executed");
            }
            MonitorVerdict::ExecutionFailed => {
                tracing::error!(raw_log = %result.raw_log, "Vote failed to execute");
            }
            MonitorVerdict::Resend => {
                let Some(resend) = resend else {
                    tracing::debug!(raw_log = %result.raw_log, "Vote failed, no resend left");
                    return Ok(());
                };
                if self.has_voted(&resend.ballot, &resend.voter).await? {
                    return Ok(());
                }
                match self
                    .broadcast_with_retry(resend.gas_limit, &resend.msgs)
                    .await
                {
                    Ok(resent) => tracing::info!(%resent, "Vote resent"),
                    Err(e) => tracing::error!(%e, "Unable to resend the vote"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_votes_resend_on_sequence_errors() {
        assert_eq!(
            classify_vote_result(VoteKind::InboundBlock, "sequential error: prev block 9"),
            MonitorVerdict::Resend
        );
        assert_eq!(
            classify_vote_result(VoteKind::Inbound, "out of gas in location: x"),
            MonitorVerdict::Resend
        );
        assert_eq!(
            classify_vote_result(VoteKind::Inbound, "failed to execute message; index 0"),
            MonitorVerdict::ExecutionFailed
        );
        assert_eq!(
            classify_vote_result(VoteKind::Inbound, ""),
            MonitorVerdict::Success
        );
    }

    #[test]
    fn outbound_votes_only_resend_on_out_of_gas() {
        assert_eq!(
            classify_vote_result(VoteKind::Outbound, "sequential error"),
            MonitorVerdict::Success
        );
        assert_eq!(
            classify_vote_result(VoteKind::Outbound, "out of gas"),
            MonitorVerdict::Resend
        );
        assert_eq!(
            classify_vote_result(
                VoteKind::Outbound,
                "failed to execute message: out of gas"
            ),
            MonitorVerdict::ExecutionFailed
        );
    }
}
