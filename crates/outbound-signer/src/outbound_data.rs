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

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};
use webb_ew_evm::contracts::{OnReceiveCall, ReceiveCallCall};
use webb_relayer_types::inbound::MessageKind;
use webb_relayer_types::{ChainId, InboundEvent, JobStatus, OutboundJob};
use webb_relayer_utils::{Error, Result};

use crate::gas::Gas;

/// Everything read out of a job before a transaction is built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundData {
    /// Source chain of the message.
    pub src_chain_id: ChainId,
    /// Sender on the source chain.
    pub sender: Address,
    /// Chain the transaction is sent on.
    pub to_chain_id: ChainId,
    /// Receiver of the transaction, as decided by the job status.
    pub to: Address,
    /// Gas parameters.
    pub gas: Gas,
    /// TSS nonce assigned by the coordination chain.
    pub nonce: u64,
    /// Coordination height the attempt was scheduled at.
    pub height: u64,
    /// Job index, handed to the connector.
    pub job_index: [u8; 32],
    /// Key expected to sign.
    pub tss_pubkey: String,
}

/// An unsigned outbound transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTx {
    /// Callee.
    pub to: Address,
    /// Native value sent along.
    pub value: U256,
    /// Calldata, empty for transfers.
    pub data: Bytes,
    /// Gas parameters.
    pub gas: Gas,
    /// TSS nonce.
    pub nonce: u64,
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    value.trim().parse::<Address>().map_err(|e| {
        Error::InvalidOutbound(format!("invalid {what} address {value:?}: {e}"))
    })
}

/// Picks the receiver and the chain of the transaction out of the status
/// of the job. Reverts go back to the sender.
pub fn destination(job: &OutboundJob) -> Result<(Address, ChainId)> {
    match job.status {
        JobStatus::PendingRevert => {
            tracing::info!(
                job = %job.index,
                chain_id = job.sender_chain_id,
                "Reverting the inbound to its sender"
            );
            Ok((parse_address(&job.sender, "sender")?, job.sender_chain_id))
        }
        JobStatus::PendingOutbound => Ok((
            parse_address(&job.outbound.receiver, "receiver")?,
            job.outbound.receiver_chain_id,
        )),
        status => Err(Error::InvalidOutbound(format!(
            "job {} is {status:?}, nothing to send",
            job.index
        ))),
    }
}

/// Decodes a job index, `0x` followed by 64 hex chars.
pub fn job_index_bytes(index: &str) -> Result<[u8; 32]> {
    let invalid = || Error::InvalidOutbound(format!("job index {index:?} is invalid"));
    let hex_part = index.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 64 {
        return Err(invalid());
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut out).map_err(|_| invalid())?;
    Ok(out)
}

impl OutboundData {
    /// Reads the fields of `job`, scheduled at coordination `height`.
    pub fn new(job: &OutboundJob, height: u64) -> Result<Self> {
        if job.outbound.gas_limit == 0 {
            return Err(Error::InvalidOutbound(format!(
                "job {} has no outbound gas limit",
                job.index
            )));
        }
        let (to, to_chain_id) = destination(job)?;
        Ok(Self {
            src_chain_id: job.sender_chain_id,
            sender: parse_address(&job.sender, "sender")?,
            to_chain_id,
            to,
            gas: Gas::from_job(job)?,
            nonce: job.nonce(),
            height,
            job_index: job_index_bytes(&job.index)?,
            tss_pubkey: job.outbound.tss_pubkey.clone(),
        })
    }

    /// Builds the transaction delivering the message of `job`.
    ///
    /// Calls go through `connector`, transfers go straight to the receiver.
    pub fn transaction(
        &self,
        job: &OutboundJob,
        connector: Address,
    ) -> Result<OutboundTx> {
        if job.status == JobStatus::PendingRevert {
            return Err(Error::Unsupported(format!(
                "revert of job {} on chain {}",
                job.index, self.to_chain_id
            )));
        }
        let (sender, value, message, kind) = match &job.inbound_event {
            Some(InboundEvent::MessageSent {
                sender,
                value,
                message,
                message_kind,
                ..
            }) => (*sender, *value, message.clone(), *message_kind),
            _ => {
                return Err(Error::InvalidOutbound(format!(
                    "job {} carries no cross-chain message",
                    job.index
                )))
            }
        };
        let call = |data: Vec<u8>| OutboundTx {
            to: connector,
            value: U256::zero(),
            data: data.into(),
            gas: self.gas,
            nonce: self.nonce,
        };
        let tx = match kind {
            MessageKind::ReceiveCall => call(
                ReceiveCallCall {
                    sender: sender.as_bytes().to_vec().into(),
                    source_chain_id: chain_id_word(self.src_chain_id),
                    destination_address: self.to,
                    message,
                    job_index: self.job_index,
                }
                .encode(),
            ),
            MessageKind::RevertableCall => call(
                OnReceiveCall {
                    sender: sender.as_bytes().to_vec().into(),
                    source_chain_id: chain_id_word(self.src_chain_id),
                    destination_address: self.to,
                    value,
                    message,
                    job_index: self.job_index,
                }
                .encode(),
            ),
            MessageKind::Transfer => OutboundTx {
                to: self.to,
                value,
                data: Bytes::default(),
                gas: self.gas,
                nonce: self.nonce,
            },
        };
        Ok(tx)
    }

    /// A zero value transaction from the TSS to itself, burning the nonce
    /// without delivering anything.
    pub fn cancel(&self, tss_address: Address) -> OutboundTx {
        OutboundTx {
            to: tss_address,
            value: U256::zero(),
            data: Bytes::default(),
            gas: self.gas.for_cancel(),
            nonce: self.nonce,
        }
    }
}

fn chain_id_word(chain_id: ChainId) -> U256 {
    U256::from(chain_id.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiDecode;
    use webb_relayer_types::outbound::OutboundParams;

    fn sender() -> Address {
        Address::repeat_byte(0x5e)
    }

    fn receiver() -> Address {
        Address::repeat_byte(0x7e)
    }

    fn job(status: JobStatus, kind: MessageKind) -> OutboundJob {
        OutboundJob {
            index: format!("0x{}", "0f".repeat(32)),
            sender: format!("{:?}", sender()),
            sender_chain_id: 97,
            status,
            value: U256::from(9),
            inbound_event: Some(InboundEvent::MessageSent {
                tx_origin: sender(),
                sender: sender(),
                receiver_chain_id: 11155111,
                receiver: receiver().as_bytes().to_vec().into(),
                value: U256::from(9),
                destination_gas_limit: U256::from(200_000),
                message: vec![1, 2, 3].into(),
                message_kind: kind,
            }),
            outbound: OutboundParams {
                receiver: format!("{:?}", receiver()),
                receiver_chain_id: 11155111,
                tss_nonce: 12,
                gas_limit: 200_000,
                gas_price: "30".into(),
                gas_priority_fee: String::new(),
                tss_pubkey: "0x04".into(),
            },
        }
    }

    #[test]
    fn reverts_go_back_to_the_sender() {
        let revert = OutboundData::new(
            &job(JobStatus::PendingRevert, MessageKind::Transfer),
            40,
        )
        .unwrap();
        assert_eq!((revert.to, revert.to_chain_id), (sender(), 97));

        let outbound = OutboundData::new(
            &job(JobStatus::PendingOutbound, MessageKind::Transfer),
            40,
        )
        .unwrap();
        assert_eq!((outbound.to, outbound.to_chain_id), (receiver(), 11155111));
        assert_eq!(outbound.job_index, [0x0f; 32]);
    }

    #[test]
    fn finished_jobs_are_not_sent() {
        for status in [JobStatus::OutboundMined, JobStatus::Aborted, JobStatus::PendingInbound] {
            assert!(matches!(
                OutboundData::new(&job(status, MessageKind::Transfer), 1),
                Err(Error::InvalidOutbound(_))
            ));
        }
    }

    #[test]
    fn message_kind_selects_the_connector_call() {
        let connector = Address::repeat_byte(0xc0);

        let j = job(JobStatus::PendingOutbound, MessageKind::ReceiveCall);
        let tx = OutboundData::new(&j, 1).unwrap().transaction(&j, connector).unwrap();
        assert_eq!(tx.to, connector);
        assert!(tx.value.is_zero());
        let call = ReceiveCallCall::decode(&tx.data).unwrap();
        assert_eq!(call.source_chain_id, U256::from(97));
        assert_eq!(call.destination_address, receiver());
        assert_eq!(call.job_index, [0x0f; 32]);

        let j = job(JobStatus::PendingOutbound, MessageKind::RevertableCall);
        let tx = OutboundData::new(&j, 1).unwrap().transaction(&j, connector).unwrap();
        let call = OnReceiveCall::decode(&tx.data).unwrap();
        assert_eq!(call.value, U256::from(9));
        assert_eq!(call.message.to_vec(), vec![1, 2, 3]);

        let j = job(JobStatus::PendingOutbound, MessageKind::Transfer);
        let tx = OutboundData::new(&j, 1).unwrap().transaction(&j, connector).unwrap();
        assert_eq!((tx.to, tx.value), (receiver(), U256::from(9)));
        assert!(tx.data.is_empty());
    }

    #[test]
    fn job_indices_must_be_32_bytes() {
        assert!(job_index_bytes("0x1234").is_err());
        assert!(job_index_bytes(&"0f".repeat(33)).is_err());
        assert!(job_index_bytes(&format!("0x{}", "zz".repeat(32))).is_err());
    }
}
