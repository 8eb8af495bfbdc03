//! Error type shared by every layer of the gateway.

use thiserror::Error;

pub type TxResult<T> = std::result::Result<T, TxError>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("malformed hex: {value}")]
    MalformedHex { value: String },

    #[error("invalid private key")]
    InvalidKey,

    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidAddressLength {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("number out of range: {field}")]
    NumberOutOfRange { field: String },

    #[error("malformed rlp: {reason}")]
    MalformedRlp { reason: String },

    #[error("malformed revert payload: {reason}")]
    MalformedRevertPayload { reason: String },

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("rpc transport error {code}: {message}")]
    RpcTransport { code: String, message: String },

    #[error("unexpected rpc result type, expected {expected}")]
    RpcResultTypeMismatch { expected: &'static str },

    #[error("json error: {message}")]
    Json { message: String },

    #[error("transaction not found: {hash}")]
    TransactionNotFound { hash: String },

    #[error("receipt not found: {hash}")]
    ReceiptNotFound { hash: String },

    #[error("configuration missing: {field}")]
    ConfigurationMissing { field: String },

    #[error("not authorized")]
    NotAuthorized,
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        TxError::Json {
            message: err.to_string(),
        }
    }
}

impl TxError {
    pub(crate) fn malformed_rlp(reason: impl Into<String>) -> Self {
        TxError::MalformedRlp {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_revert(reason: impl Into<String>) -> Self {
        TxError::MalformedRevertPayload {
            reason: reason.into(),
        }
    }
}
