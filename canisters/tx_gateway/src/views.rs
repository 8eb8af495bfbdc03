//! Read-only projections of `eth_getTransactionByHash` and
//! `eth_getTransactionReceipt` results. Fields are decoded once; anything the
//! node leaves out takes a documented default.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;
use serde_json::Value;

use crate::codec::{from_hex, quantity_from_hex, Address};
use crate::error::TxResult;

/// Intrinsic cost of a plain value transfer.
pub const BASE_TRANSFER_GAS: u64 = 21_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionView {
    pub block_number: BigUint,
    pub from: Address,
    pub to: Address,
    pub gas_limit: BigUint,
    pub gas_price: BigUint,
    pub input: Vec<u8>,
    pub value: BigUint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptView {
    pub tx_hash: String,
    pub from: Address,
    pub to: Address,
    pub gas_used: BigUint,
    pub status: bool,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    block_number: Option<String>,
    from: Option<String>,
    to: Option<String>,
    gas: Option<String>,
    gas_price: Option<String>,
    input: Option<String>,
    value: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: Option<String>,
    from: Option<String>,
    to: Option<String>,
    gas_used: Option<String>,
    status: Option<String>,
}

fn quantity_or(value: Option<&str>, default: BigUint) -> TxResult<BigUint> {
    value.map_or(Ok(default), quantity_from_hex)
}

fn address_or_zero(value: Option<&str>) -> TxResult<Address> {
    value.map_or(Ok(Address::ZERO), |s| s.parse::<Address>())
}

impl TransactionView {
    pub fn from_json(value: &Value) -> TxResult<Self> {
        let raw = RawTransaction::deserialize(value)?;
        Ok(Self {
            block_number: quantity_or(raw.block_number.as_deref(), BigUint::zero())?,
            from: address_or_zero(raw.from.as_deref())?,
            to: address_or_zero(raw.to.as_deref())?,
            gas_limit: quantity_or(raw.gas.as_deref(), BigUint::from(BASE_TRANSFER_GAS))?,
            gas_price: quantity_or(raw.gas_price.as_deref(), BigUint::zero())?,
            input: raw.input.as_deref().map_or(Ok(Vec::new()), from_hex)?,
            value: quantity_or(raw.value.as_deref(), BigUint::zero())?,
        })
    }
}

impl ReceiptView {
    /// Receipts from before the Byzantium fork carry no `status`; they are
    /// read as successful.
    pub fn from_json(value: &Value) -> TxResult<Self> {
        let raw = RawReceipt::deserialize(value)?;
        let status = match raw.status.as_deref() {
            Some(status) => !quantity_from_hex(status)?.is_zero(),
            None => true,
        };
        Ok(Self {
            tx_hash: raw.transaction_hash.unwrap_or_default(),
            from: address_or_zero(raw.from.as_deref())?,
            to: address_or_zero(raw.to.as_deref())?,
            gas_used: quantity_or(raw.gas_used.as_deref(), BigUint::zero())?,
            status,
        })
    }
}
