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

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Bytes, Eip1559TransactionRequest, Signature, TransactionRequest, H256,
    U256,
};
use webb_relayer_tss::{recover_signer, RecoverableSignature, TssSigner};
use webb_relayer_types::ChainId;
use webb_relayer_utils::Result;

use crate::outbound_data::OutboundTx;

/// A transaction signed by the TSS, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    /// The unsigned transaction.
    pub tx: TypedTransaction,
    /// EIP-2718 encoded signed transaction.
    pub raw: Bytes,
    /// Hash of the signed transaction.
    pub hash: H256,
}

/// Turns `tx` into a legacy or a dynamic fee transaction, depending on its
/// priority fee.
pub fn new_tx(chain_id: ChainId, tx: &OutboundTx) -> Result<TypedTransaction> {
    tx.gas.validate()?;
    let chain_id = chain_id.unsigned_abs();
    let typed = if tx.gas.is_legacy() {
        TransactionRequest::new()
            .to(tx.to)
            .value(tx.value)
            .data(tx.data.clone())
            .gas(tx.gas.limit)
            .gas_price(tx.gas.price)
            .nonce(tx.nonce)
            .chain_id(chain_id)
            .into()
    } else {
        Eip1559TransactionRequest::new()
            .to(tx.to)
            .value(tx.value)
            .data(tx.data.clone())
            .gas(tx.gas.limit)
            .max_fee_per_gas(tx.gas.price)
            .max_priority_fee_per_gas(tx.gas.priority_fee)
            .nonce(tx.nonce)
            .chain_id(chain_id)
            .into()
    };
    Ok(typed)
}

/// Builds the signature of `tx` out of a TSS `r ‖ s ‖ recid`.
///
/// Legacy transactions carry an EIP-155 `v`, typed ones the bare
/// recovery id.
pub fn assemble_signature(
    signature: &RecoverableSignature,
    tx: &TypedTransaction,
    chain_id: ChainId,
) -> Signature {
    let recid = u64::from(signature[64]);
    let v = match tx {
        TypedTransaction::Legacy(_) => recid + 35 + 2 * chain_id.unsigned_abs(),
        _ => recid,
    };
    Signature {
        r: U256::from_big_endian(&signature[..32]),
        s: U256::from_big_endian(&signature[32..64]),
        v,
    }
}

/// Signs `tx` with the TSS.
///
/// The keysign round is identified by the scheduling `height` and the
/// nonce. A signature that does not recover to the TSS address is logged
/// and still returned, the node will reject it.
#[tracing::instrument(skip_all, fields(chain_id = chain_id, nonce = tx.nonce))]
pub async fn sign_tx(
    tss: &dyn TssSigner,
    chain_id: ChainId,
    tx: &OutboundTx,
    height: u64,
) -> Result<SignedTx> {
    let typed = new_tx(chain_id, tx)?;
    let sighash = typed.sighash();
    let signature = tss
        .sign(sighash.to_fixed_bytes(), height, tx.nonce, chain_id)
        .await?;

    let expected = tss.evm_address()?;
    match recover_signer(sighash.to_fixed_bytes(), &signature) {
        Ok(recovered) if recovered == expected => {}
        Ok(recovered) => tracing::error!(
            ?recovered,
            ?expected,
            "Signature does not recover to the TSS address"
        ),
        Err(e) => tracing::error!(%e, "Unable to recover the TSS signature"),
    }

    let signature = assemble_signature(&signature, &typed, chain_id);
    let raw = typed.rlp_signed(&signature);
    let hash = H256::from(ethers::utils::keccak256(&raw));
    Ok(SignedTx {
        tx: typed,
        raw,
        hash,
    })
}
