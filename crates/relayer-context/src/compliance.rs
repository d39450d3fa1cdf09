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

use std::collections::HashSet;

use webb_relayer_types::ChainId;
use webb_relayer_utils::probe;

/// Addresses the relayer refuses to vote for or sign for.
///
/// Lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct RestrictedAddressBook {
    addresses: HashSet<String>,
}

impl RestrictedAddressBook {
    /// Builds the book out of any list of addresses.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses = addresses
            .into_iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        Self { addresses }
    }

    /// Whether `address` is restricted.
    pub fn is_restricted(&self, address: &str) -> bool {
        !self.addresses.is_empty()
            && self.addresses.contains(&address.to_lowercase())
    }

    /// Whether any of `addresses` is restricted.
    pub fn any_restricted<'a>(
        &self,
        addresses: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        addresses.into_iter().any(|a| self.is_restricted(a))
    }
}

/// Writes an audit line for an inbound event that will not be voted.
pub fn log_restricted_inbound(
    chain_id: ChainId,
    tx_hash: &str,
    sender: &str,
    receiver: &str,
    event: &str,
) {
    tracing::warn!(
        target: probe::COMPLIANCE_TARGET,
        chain_id,
        tx_hash,
        sender,
        receiver,
        event,
        "Restricted address detected in inbound event"
    );
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Compliance,
        direction = "inbound",
        chain_id,
        tx_hash,
    );
}

/// Writes an audit line for an outbound job that is cancelled.
pub fn log_restricted_outbound(
    chain_id: ChainId,
    job_index: &str,
    nonce: u64,
    sender: &str,
    receiver: &str,
) {
    tracing::warn!(
        target: probe::COMPLIANCE_TARGET,
        chain_id,
        job_index,
        nonce,
        sender,
        receiver,
        "Restricted address detected in outbound job, cancelling"
    );
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Compliance,
        direction = "outbound",
        chain_id,
        nonce,
    );
}
