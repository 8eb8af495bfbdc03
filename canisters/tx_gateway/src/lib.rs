//! Transaction gateway canister for EVM chains.
//!
//! Builds and signs legacy (EIP-155) transactions, broadcasts them through the
//! EVM RPC canister, and explains failed transactions by replaying them as
//! `eth_call` at their original block and decoding the `Error(string)`
//! payload. The modules are usable on their own through any
//! [`rpc::RpcTransport`]; the canister methods below wire them to persisted
//! configuration.

pub mod codec;
pub mod error;
pub mod gateway;
pub mod revert;
pub mod rlp;
pub mod rpc;
pub mod signer;
pub mod state;
pub mod views;

use std::cell::RefCell;

use candid::{CandidType, Nat, Principal};
use ic_cdk::api::caller;
use ic_cdk::storage::{stable_restore, stable_save};
use ic_cdk::trap;
use ic_cdk_macros::{init, post_upgrade, pre_upgrade, query, update};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::codec::{bytes_to_hex, Address};
use crate::error::{TxError, TxResult};
use crate::gateway::{TransferRequest, TxGateway};
use crate::signer::UnsignedTransaction;
use crate::state::{GatewayState, InitArgs};
use crate::views::{ReceiptView, TransactionView, BASE_TRANSFER_GAS};

thread_local! {
    static STATE: RefCell<GatewayState> = RefCell::new(GatewayState::default());
}

fn state_ref<T>(f: impl FnOnce(&GatewayState) -> T) -> T {
    STATE.with(|cell| f(&cell.borrow()))
}

fn state_mut<T>(f: impl FnOnce(&mut GatewayState) -> T) -> T {
    STATE.with(|cell| f(&mut cell.borrow_mut()))
}

fn ensure_admin() -> TxResult<()> {
    let caller = caller();
    state_ref(|state| state.ensure_admin(&caller))
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct InfoResponse {
    chain_id: Option<u64>,
    rpc_canister: Option<Principal>,
    rpc_cycles: u128,
}

#[derive(Clone, Debug, CandidType, Deserialize)]
struct SignTransactionRequest {
    #[serde(with = "serde_bytes")]
    private_key: Vec<u8>,
    nonce: Nat,
    gas_price: Nat,
    gas_limit: Nat,
    to: Option<String>,
    value: Nat,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
}

#[derive(Clone, Debug, CandidType, Deserialize)]
struct SendTransactionRequest {
    #[serde(with = "serde_bytes")]
    private_key: Vec<u8>,
    to: Option<String>,
    value: Nat,
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
    gas_limit: Option<Nat>,
    gas_price: Option<Nat>,
}

#[derive(Clone, Debug, PartialEq, CandidType, Deserialize, Serialize)]
struct TransactionInfo {
    block_number: Nat,
    from: String,
    to: String,
    gas_limit: Nat,
    gas_price: Nat,
    input: String,
    value: Nat,
}

#[derive(Clone, Debug, PartialEq, CandidType, Deserialize, Serialize)]
struct ReceiptInfo {
    tx_hash: String,
    from: String,
    to: String,
    gas_used: Nat,
    status: bool,
}

impl From<TransactionView> for TransactionInfo {
    fn from(view: TransactionView) -> Self {
        Self {
            block_number: Nat(view.block_number),
            from: view.from.to_string(),
            to: view.to.to_string(),
            gas_limit: Nat(view.gas_limit),
            gas_price: Nat(view.gas_price),
            input: bytes_to_hex(&view.input),
            value: Nat(view.value),
        }
    }
}

impl From<ReceiptView> for ReceiptInfo {
    fn from(view: ReceiptView) -> Self {
        Self {
            tx_hash: view.tx_hash,
            from: view.from.to_string(),
            to: view.to.to_string(),
            gas_used: Nat(view.gas_used),
            status: view.status,
        }
    }
}

fn parse_recipient(to: Option<&str>) -> TxResult<Option<Address>> {
    to.map(str::parse::<Address>).transpose()
}

impl SignTransactionRequest {
    fn unsigned(&self) -> TxResult<UnsignedTransaction> {
        Ok(UnsignedTransaction {
            nonce: self.nonce.0.clone(),
            gas_price: self.gas_price.0.clone(),
            gas_limit: self.gas_limit.0.clone(),
            to: parse_recipient(self.to.as_deref())?,
            value: self.value.0.clone(),
            data: self.data.clone(),
        })
    }
}

impl SendTransactionRequest {
    fn transfer(&self) -> TxResult<TransferRequest> {
        Ok(TransferRequest {
            to: parse_recipient(self.to.as_deref())?,
            value: self.value.0.clone(),
            data: self.data.clone(),
            gas_limit: self
                .gas_limit
                .as_ref()
                .map(|n| n.0.clone())
                .unwrap_or_else(|| BigUint::from(BASE_TRANSFER_GAS)),
            gas_price: self.gas_price.as_ref().map(|n| n.0.clone()),
        })
    }
}

#[init]
fn init(args: Option<InitArgs>) {
    let state = GatewayState::from_init(args.unwrap_or_default(), caller());
    STATE.with(|cell| *cell.borrow_mut() = state);
}

#[pre_upgrade]
fn pre_upgrade() {
    let snapshot = state_ref(|state| state.clone());
    if let Err(e) = stable_save((snapshot,)) {
        trap(&format!("failed to save state: {}", e));
    }
}

#[post_upgrade]
fn post_upgrade() {
    let (snapshot,): (GatewayState,) =
        stable_restore().unwrap_or_else(|e| trap(&format!("failed to restore state: {}", e)));
    STATE.with(|cell| *cell.borrow_mut() = snapshot);
}

#[query]
fn info() -> InfoResponse {
    state_ref(|state| InfoResponse {
        chain_id: state.config.chain_id,
        rpc_canister: state.config.rpc_canister,
        rpc_cycles: state.config.rpc_cycles,
    })
}

#[update]
fn set_chain_id(chain_id: u64) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.chain_id = Some(chain_id));
}

#[update]
fn set_rpc_target(canister: Principal) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.rpc_canister = Some(canister));
}

#[update]
fn set_rpc_cycles(cycles: u128) {
    if let Err(err) = ensure_admin() {
        trap(&err.to_string());
    }
    state_mut(|state| state.config.rpc_cycles = cycles);
}

#[query]
fn sign_transaction(req: SignTransactionRequest) -> Result<String, String> {
    sign_transaction_internal(&req).map_err(|e| e.to_string())
}

fn sign_transaction_internal(req: &SignTransactionRequest) -> TxResult<String> {
    let chain_id = state_ref(GatewayState::chain_id)?;
    let signed = signer::sign(chain_id, &req.unsigned()?, &req.private_key)?;
    Ok(signed.to_hex())
}

#[update]
async fn send_transaction(req: SendTransactionRequest) -> Result<String, String> {
    send_transaction_internal(req)
        .await
        .map_err(|e| e.to_string())
}

async fn send_transaction_internal(req: SendTransactionRequest) -> TxResult<String> {
    let chain_id = state_ref(GatewayState::chain_id)?;
    let transport = state_ref(GatewayState::transport)?;
    let transfer = req.transfer()?;
    TxGateway::new(transport)
        .send_transaction(chain_id, &req.private_key, &transfer)
        .await
}

#[update]
async fn get_transaction(hash: String) -> Result<Option<TransactionInfo>, String> {
    get_transaction_internal(&hash)
        .await
        .map(|view| view.map(TransactionInfo::from))
        .map_err(|e| e.to_string())
}

async fn get_transaction_internal(hash: &str) -> TxResult<Option<TransactionView>> {
    let transport = state_ref(GatewayState::transport)?;
    TxGateway::new(transport).get_transaction(hash).await
}

#[update]
async fn get_receipt(hash: String) -> Result<Option<ReceiptInfo>, String> {
    get_receipt_internal(&hash)
        .await
        .map(|view| view.map(ReceiptInfo::from))
        .map_err(|e| e.to_string())
}

async fn get_receipt_internal(hash: &str) -> TxResult<Option<ReceiptView>> {
    let transport = state_ref(GatewayState::transport)?;
    TxGateway::new(transport).get_receipt(hash).await
}

#[update]
async fn revert_reason(hash: String) -> Result<String, String> {
    revert_reason_internal(&hash)
        .await
        .map(|reason| reason.to_string())
        .map_err(|e| e.to_string())
}

async fn revert_reason_internal(hash: &str) -> TxResult<revert::RevertReason> {
    let transport = state_ref(GatewayState::transport)?;
    let gateway = TxGateway::new(transport);
    let receipt = gateway
        .get_receipt(hash)
        .await?
        .ok_or_else(|| TxError::ReceiptNotFound {
            hash: hash.to_string(),
        })?;
    revert::decode_revert_reason(&gateway, &receipt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_request(to: Option<&str>) -> SignTransactionRequest {
        SignTransactionRequest {
            private_key: vec![0x46; 32],
            nonce: Nat::from(9u32),
            gas_price: Nat::from(20_000_000_000u64),
            gas_limit: Nat::from(21_000u32),
            to: to.map(str::to_string),
            value: Nat::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
        }
    }

    #[test]
    fn sign_uses_configured_chain() {
        state_mut(|state| state.config.chain_id = Some(1));
        let raw = sign_transaction_internal(&sign_request(Some(
            "0x3535353535353535353535353535353535353535",
        )))
        .unwrap();
        assert!(raw.starts_with("0xf86c09"));
        let decoded = signer::decode_signed(&codec::from_hex(&raw).unwrap()).unwrap();
        assert_eq!(decoded.chain_id, Some(1));
    }

    #[test]
    fn sign_rejects_bad_recipient() {
        state_mut(|state| state.config.chain_id = Some(1));
        assert!(matches!(
            sign_transaction_internal(&sign_request(Some("0x1234"))),
            Err(TxError::InvalidAddressLength { .. })
        ));
    }

    #[test]
    fn sign_requires_chain_id() {
        state_mut(|state| state.config.chain_id = None);
        assert_eq!(
            sign_transaction_internal(&sign_request(None)),
            Err(TxError::ConfigurationMissing {
                field: "chain_id".into()
            })
        );
    }

    #[test]
    fn send_request_defaults_gas_limit() {
        let req = SendTransactionRequest {
            private_key: vec![0x46; 32],
            to: None,
            value: Nat::from(0u32),
            data: vec![0x60, 0x80],
            gas_limit: None,
            gas_price: None,
        };
        let transfer = req.transfer().unwrap();
        assert_eq!(transfer.gas_limit, BigUint::from(BASE_TRANSFER_GAS));
        assert_eq!(transfer.to, None);
        assert_eq!(transfer.gas_price, None);
    }

    #[test]
    fn views_convert_to_candid() {
        let info = TransactionInfo::from(TransactionView {
            block_number: BigUint::from(42u32),
            from: Address::ZERO,
            to: Address::new([0x35; 20]),
            gas_limit: BigUint::from(21_000u32),
            gas_price: BigUint::from(1u32),
            input: vec![0xab, 0xcd],
            value: BigUint::from(0u32),
        });
        assert_eq!(info.block_number, Nat::from(42u32));
        assert_eq!(info.input, "0xabcd");
        assert_eq!(info.from, "0x0000000000000000000000000000000000000000");

        let receipt = ReceiptInfo::from(ReceiptView {
            tx_hash: "0x01".into(),
            from: Address::ZERO,
            to: Address::ZERO,
            gas_used: BigUint::from(21_000u32),
            status: false,
        });
        assert!(!receipt.status);
        assert_eq!(receipt.gas_used, Nat::from(21_000u32));
    }
}
