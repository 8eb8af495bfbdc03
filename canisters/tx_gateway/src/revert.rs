//! Recovers the `Error(string)` message of a failed transaction by replaying
//! it as an `eth_call` at the block it was mined in.

use std::fmt;

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::codec::data_from_hex;
use crate::error::{TxError, TxResult};
use crate::gateway::{CallRequest, TxGateway};
use crate::rpc::RpcTransport;
use crate::views::ReceiptView;

pub const NOT_FAILED: &str = "transaction did not fail";
pub const OUT_OF_GAS: &str = "transaction ran out of gas";

const SELECTOR_LEN: usize = 4;
const WORD_LEN: usize = 32;
const LENGTH_START: usize = SELECTOR_LEN + WORD_LEN;
const MESSAGE_START: usize = LENGTH_START + WORD_LEN;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevertReason {
    /// The receipt reports success.
    NotFailed,
    /// Gas used equals the gas limit, so there is no payload to decode.
    OutOfGas,
    Reverted(String),
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::NotFailed => f.write_str(NOT_FAILED),
            RevertReason::OutOfGas => f.write_str(OUT_OF_GAS),
            RevertReason::Reverted(message) => f.write_str(message),
        }
    }
}

pub async fn decode_revert_reason<T: RpcTransport>(
    gateway: &TxGateway<T>,
    receipt: &ReceiptView,
) -> TxResult<RevertReason> {
    if receipt.status {
        return Ok(RevertReason::NotFailed);
    }

    let tx = gateway
        .get_transaction(&receipt.tx_hash)
        .await?
        .ok_or_else(|| TxError::TransactionNotFound {
            hash: receipt.tx_hash.clone(),
        })?;

    // heuristic: nodes charge the whole limit on exhaustion
    if receipt.gas_used == tx.gas_limit {
        return Ok(RevertReason::OutOfGas);
    }

    let result = gateway
        .call(&CallRequest::from(&tx), &tx.block_number)
        .await?;
    parse_revert_payload(&result).map(RevertReason::Reverted)
}

/// Reads an ABI-encoded `Error(string)` return value: a 4-byte selector, a
/// 32-byte offset word, a 32-byte length word and the UTF-8 message. The
/// selector and offset are skipped, not checked.
pub fn parse_revert_payload(result: &str) -> TxResult<String> {
    let bytes = data_from_hex(result)
        .map_err(|_| TxError::malformed_revert("result is not whole-byte hex"))?;
    if bytes.len() < MESSAGE_START {
        return Err(TxError::malformed_revert(format!(
            "{} bytes is shorter than the {} byte header",
            bytes.len(),
            MESSAGE_START
        )));
    }

    let len = BigUint::from_bytes_be(&bytes[LENGTH_START..MESSAGE_START])
        .to_usize()
        .ok_or_else(|| TxError::malformed_revert("message length out of range"))?;
    let end = MESSAGE_START
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            TxError::malformed_revert(format!(
                "message of {} bytes exceeds {} available",
                len,
                bytes.len() - MESSAGE_START
            ))
        })?;

    String::from_utf8(bytes[MESSAGE_START..end].to_vec())
        .map_err(|_| TxError::malformed_revert("message is not utf-8"))
}
