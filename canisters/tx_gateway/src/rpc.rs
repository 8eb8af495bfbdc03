//! JSON-RPC plumbing. Requests are forwarded to the EVM RPC canister, which
//! relays them to the configured chain.

use std::sync::atomic::{AtomicU64, Ordering};

use candid::{CandidType, Principal};
use ic_cdk::api::call::call_with_payment128;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{TxError, TxResult};

pub const DEFAULT_RPC_CYCLES: u128 = 2_000_000_000_000;
pub const DEFAULT_RESPONSE_ESTIMATE: u64 = 64 * 1024;
const UNKNOWN_ERROR_CODE: i64 = -32_000;

static JSON_RPC_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_json_rpc_id() -> u64 {
    JSON_RPC_ID.fetch_add(1, Ordering::Relaxed)
}

/// One request/response round trip with the node. Implementations must not
/// retry; a failure is reported as-is.
#[allow(async_fn_in_trait)]
pub trait RpcTransport {
    async fn request(&self, method: &str, params: Value) -> TxResult<Value>;
}

pub fn request_payload(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Unwraps a JSON-RPC 2.0 response body. A present `error` object wins over
/// `result`; a `null` result is returned as [`Value::Null`].
pub fn parse_envelope(body: &str) -> TxResult<Value> {
    let value: Value = serde_json::from_str(body)?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or(UNKNOWN_ERROR_CODE);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(TxError::Rpc { code, message });
    }

    value
        .get("result")
        .cloned()
        .ok_or(TxError::RpcResultTypeMismatch { expected: "result" })
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
enum RpcService {
    Chain(u64),
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
struct RpcCanisterError {
    code: i64,
    message: String,
}

/// Transport backed by the EVM RPC canister's raw `request` method.
#[derive(Clone, Debug)]
pub struct EvmRpcCanister {
    pub canister: Principal,
    pub chain_id: u64,
    pub cycles: u128,
    pub max_response_bytes: u64,
}

impl EvmRpcCanister {
    pub fn new(canister: Principal, chain_id: u64) -> Self {
        Self {
            canister,
            chain_id,
            cycles: DEFAULT_RPC_CYCLES,
            max_response_bytes: DEFAULT_RESPONSE_ESTIMATE,
        }
    }
}

impl RpcTransport for EvmRpcCanister {
    async fn request(&self, method: &str, params: Value) -> TxResult<Value> {
        let id = next_json_rpc_id();
        debug!("rpc request {} id={} chain={}", method, id, self.chain_id);
        let payload = request_payload(id, method, params);
        let payload_str = serde_json::to_string(&payload)?;

        let (response,): (Result<String, RpcCanisterError>,) = call_with_payment128(
            self.canister,
            "request",
            (
                RpcService::Chain(self.chain_id),
                payload_str,
                self.max_response_bytes,
            ),
            self.cycles,
        )
        .await
        .map_err(|(code, message)| TxError::RpcTransport {
            code: format!("{:?}", code),
            message,
        })?;

        let body = response.map_err(|err| TxError::RpcTransport {
            code: err.code.to_string(),
            message: err.message,
        })?;

        parse_envelope(&body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use serde_json::Value;

    use super::RpcTransport;
    use crate::error::{TxError, TxResult};

    /// Replays scripted responses in order and records every call.
    #[derive(Default)]
    pub struct MockTransport {
        responses: RefCell<VecDeque<TxResult<Value>>>,
        calls: RefCell<Vec<(String, Value)>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, response: Value) -> Self {
            self.responses.borrow_mut().push_back(Ok(response));
            self
        }

        pub fn fail(self, err: TxError) -> Self {
            self.responses.borrow_mut().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<(String, Value)> {
            self.calls.borrow().clone()
        }

        pub fn methods(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(m, _)| m.clone()).collect()
        }
    }

    impl RpcTransport for MockTransport {
        async fn request(&self, method: &str, params: Value) -> TxResult<Value> {
            self.calls.borrow_mut().push((method.to_string(), params));
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected rpc call: {}", method))
        }
    }
}
