//! Typed JSON-RPC operations over an [`RpcTransport`] and the
//! gas price -> nonce -> sign -> broadcast pipeline.

use log::{info, warn};
use num_bigint::BigUint;
use serde_json::{json, Value};

use crate::codec::{bytes_to_hex, quantity_from_hex, to_hex, Address};
use crate::error::{TxError, TxResult};
use crate::rpc::RpcTransport;
use crate::signer::{self, SignedTransactionBytes, UnsignedTransaction};
use crate::views::{ReceiptView, TransactionView};

/// Parameters of a read-only `eth_call`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: BigUint,
    pub gas: BigUint,
    pub gas_price: BigUint,
}

impl CallRequest {
    pub fn to_json(&self) -> Value {
        json!({
            "to": self.to.to_string(),
            "data": bytes_to_hex(&self.data),
            "from": self.from.to_string(),
            "value": to_hex(&self.value),
            "gas": to_hex(&self.gas),
            "gasPrice": to_hex(&self.gas_price),
        })
    }
}

impl From<&TransactionView> for CallRequest {
    fn from(tx: &TransactionView) -> Self {
        Self {
            from: tx.from,
            to: tx.to,
            data: tx.input.clone(),
            value: tx.value.clone(),
            gas: tx.gas_limit.clone(),
            gas_price: tx.gas_price.clone(),
        }
    }
}

/// What the caller wants sent; nonce always comes from the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Option<Address>,
    pub value: BigUint,
    pub data: Vec<u8>,
    pub gas_limit: BigUint,
    /// Fetched with `eth_gasPrice` when absent.
    pub gas_price: Option<BigUint>,
}

pub struct TxGateway<T> {
    transport: T,
}

fn expect_str<'a>(value: &'a Value, expected: &'static str) -> TxResult<&'a str> {
    value
        .as_str()
        .ok_or(TxError::RpcResultTypeMismatch { expected })
}

impl<T: RpcTransport> TxGateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn broadcast(&self, raw: &SignedTransactionBytes) -> TxResult<String> {
        let value = self
            .transport
            .request("eth_sendRawTransaction", json!([raw.to_hex()]))
            .await?;
        let hash = expect_str(&value, "transaction hash")?.to_string();
        info!("broadcast transaction {}", hash);
        Ok(hash)
    }

    /// `Ok(None)` when the node does not know the hash.
    pub async fn get_transaction(&self, hash: &str) -> TxResult<Option<TransactionView>> {
        let value = self
            .transport
            .request("eth_getTransactionByHash", json!([hash]))
            .await?;
        if value.is_null() {
            warn!("transaction {} not found", hash);
            return Ok(None);
        }
        TransactionView::from_json(&value).map(Some)
    }

    /// `Ok(None)` while the transaction is pending or unknown.
    pub async fn get_receipt(&self, hash: &str) -> TxResult<Option<ReceiptView>> {
        let value = self
            .transport
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if value.is_null() {
            warn!("receipt for {} not found", hash);
            return Ok(None);
        }
        ReceiptView::from_json(&value).map(Some)
    }

    /// Executes `request` against the state at `block_number` and returns the
    /// raw hex result.
    pub async fn call(&self, request: &CallRequest, block_number: &BigUint) -> TxResult<String> {
        let value = self
            .transport
            .request("eth_call", json!([request.to_json(), to_hex(block_number)]))
            .await?;
        Ok(expect_str(&value, "hex string")?.to_string())
    }

    pub async fn gas_price(&self) -> TxResult<BigUint> {
        let value = self.transport.request("eth_gasPrice", json!([])).await?;
        quantity_from_hex(expect_str(&value, "hex string")?)
    }

    pub async fn transaction_count(&self, address: &Address) -> TxResult<BigUint> {
        let value = self
            .transport
            .request(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        quantity_from_hex(expect_str(&value, "hex string")?)
    }

    /// Signs `request` with `private_key` for `chain_id` and broadcasts it.
    /// Each step waits on the previous one; the first error ends the chain.
    pub async fn send_transaction(
        &self,
        chain_id: u64,
        private_key: &[u8],
        request: &TransferRequest,
    ) -> TxResult<String> {
        let sender = signer::address_from_private_key(private_key)?;

        let gas_price = match &request.gas_price {
            Some(price) => price.clone(),
            None => self.gas_price().await?,
        };
        let nonce = self.transaction_count(&sender).await?;

        let tx = UnsignedTransaction {
            nonce,
            gas_price,
            gas_limit: request.gas_limit.clone(),
            to: request.to,
            value: request.value.clone(),
            data: request.data.clone(),
        };
        let raw = signer::sign(chain_id, &tx, private_key)?;
        self.broadcast(&raw).await
    }
}
