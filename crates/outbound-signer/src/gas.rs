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

use ethers::types::U256;
use webb_relayer_types::{ChainId, OutboundJob};
use webb_relayer_utils::{Error, Result};

/// Lowest gas limit an outbound transaction is sent with.
pub const MIN_GAS_LIMIT: u64 = 100_000;
/// Highest gas limit an outbound transaction is sent with.
pub const MAX_GAS_LIMIT: u64 = 3_000_000;
/// Chains whose gas limit is used as given.
pub const UNCHECKED_CHAIN_IDS: [ChainId; 2] = [5000, 5003];
/// Gas of a plain value transfer, used by cancel transactions.
pub const CANCEL_GAS_LIMIT: u64 = 21_000;

/// Gas parameters of one outbound transaction.
///
/// `price` is the gas price of a legacy transaction, or the max fee per gas
/// of a dynamic fee one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gas {
    /// Gas limit.
    pub limit: u64,
    /// Total price per unit of gas.
    pub price: U256,
    /// Tip per unit of gas. Zero selects a legacy transaction.
    pub priority_fee: U256,
}

impl Gas {
    /// Reads the gas of `job`, clamping its limit for the destination chain.
    pub fn from_job(job: &OutboundJob) -> Result<Self> {
        let params = &job.outbound;
        let limit = clamp_gas_limit(params.receiver_chain_id, params.gas_limit);
        let price = parse_amount(&params.gas_price).ok_or_else(|| {
            Error::InvalidGas(format!(
                "unable to parse gas price {:?}",
                params.gas_price
            ))
        })?;
        let priority_fee = match params.gas_priority_fee.trim() {
            "" => U256::zero(),
            fee => parse_amount(fee).ok_or_else(|| {
                Error::InvalidGas(format!("unable to parse priority fee {fee:?}"))
            })?,
        };
        let gas = Self {
            limit,
            price,
            priority_fee,
        };
        gas.validate()?;
        Ok(gas)
    }

    /// Rejects parameters no node would accept.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::InvalidGas("gas limit is zero".into()));
        }
        if self.price < self.priority_fee {
            return Err(Error::InvalidGas(format!(
                "max fee per unit ({}) is less than priority fee per unit ({})",
                self.price, self.priority_fee
            )));
        }
        Ok(())
    }

    /// Whether the transaction is a pre EIP-1559 one.
    pub fn is_legacy(&self) -> bool {
        self.priority_fee.is_zero()
    }

    /// The same prices with the limit of a plain transfer.
    pub fn for_cancel(self) -> Self {
        Self {
            limit: CANCEL_GAS_LIMIT,
            ..self
        }
    }
}

fn parse_amount(value: &str) -> Option<U256> {
    U256::from_dec_str(value.trim()).ok()
}

/// Keeps `gas_limit` inside `[MIN_GAS_LIMIT, MAX_GAS_LIMIT]`, except on the
/// chains listed in [`UNCHECKED_CHAIN_IDS`].
pub fn clamp_gas_limit(chain_id: ChainId, gas_limit: u64) -> u64 {
    if UNCHECKED_CHAIN_IDS.contains(&chain_id) {
        return gas_limit;
    }
    let clamped = gas_limit.clamp(MIN_GAS_LIMIT, MAX_GAS_LIMIT);
    if clamped != gas_limit {
        tracing::warn!(
            chain_id,
            initial_gas_limit = gas_limit,
            gas_limit = clamped,
            "Gas limit out of range, clamped"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use webb_relayer_types::outbound::OutboundParams;
    use webb_relayer_types::JobStatus;

    fn job(gas_limit: u64, gas_price: &str, priority_fee: &str) -> OutboundJob {
        OutboundJob {
            index: format!("0x{}", "ab".repeat(32)),
            sender: "0x01".into(),
            sender_chain_id: 186,
            status: JobStatus::PendingOutbound,
            value: U256::zero(),
            inbound_event: None,
            outbound: OutboundParams {
                receiver: "0x02".into(),
                receiver_chain_id: 11155111,
                tss_nonce: 7,
                gas_limit,
                gas_price: gas_price.into(),
                gas_priority_fee: priority_fee.into(),
                tss_pubkey: String::new(),
            },
        }
    }

    #[test]
    fn limits_are_clamped_outside_the_exempt_chains() {
        for g in [0, 1, 99_999, 100_000, 250_000, 3_000_000, 3_000_001, u64::MAX] {
            assert_eq!(
                clamp_gas_limit(11155111, g),
                g.clamp(MIN_GAS_LIMIT, MAX_GAS_LIMIT)
            );
            assert_eq!(clamp_gas_limit(5000, g), g);
            assert_eq!(clamp_gas_limit(5003, g), g);
        }
    }

    #[test]
    fn priority_fee_picks_the_fee_scheme() {
        let legacy = Gas::from_job(&job(50_000, "20", "")).unwrap();
        assert!(legacy.is_legacy());
        assert_eq!(legacy.limit, MIN_GAS_LIMIT);
        assert_eq!(legacy.price, U256::from(20));

        let dynamic = Gas::from_job(&job(500_000, "20", "2")).unwrap();
        assert!(!dynamic.is_legacy());
        assert_eq!(dynamic.priority_fee, U256::from(2));
        assert_eq!(dynamic.for_cancel().limit, CANCEL_GAS_LIMIT);
    }

    #[test]
    fn unusable_prices_are_rejected() {
        assert!(matches!(
            Gas::from_job(&job(500_000, "-1", "")),
            Err(Error::InvalidGas(_))
        ));
        assert!(Gas::from_job(&job(500_000, "gwei", "")).is_err());
        assert!(Gas::from_job(&job(500_000, "1", "2")).is_err());
        let zero = Gas {
            limit: 0,
            price: U256::one(),
            priority_fee: U256::zero(),
        };
        assert!(zero.validate().is_err());
    }
}
