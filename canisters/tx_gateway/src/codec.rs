//! Conversions between unsigned integers, byte strings and `0x` hex.
//!
//! Two hex forms are in play on the JSON-RPC wire: QUANTITY values carry no
//! leading zero digits (`0x0`, `0x400`), DATA values are full bytes
//! (`0x0400`). [`to_hex`] produces the former, [`bytes_to_hex`] the latter,
//! and [`from_hex`] accepts both.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::{TxError, TxResult};

pub const ADDRESS_LEN: usize = 20;

/// Encodes `value` as a minimal-digit `0x` quantity. Zero is `0x0`. Digits
/// are not padded to an even count since nodes reject leading zero digits in
/// quantities.
pub fn to_hex(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes a hex string into bytes. The `0x` prefix is optional and an odd
/// number of digits is read as if left-padded with a zero.
pub fn from_hex(value: &str) -> TxResult<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let decoded = if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits))
    } else {
        hex::decode(digits)
    };
    decoded.map_err(|_| TxError::MalformedHex {
        value: value.to_string(),
    })
}

/// Decodes DATA hex, where every byte is two digits. An odd digit count is
/// `MalformedHex` rather than being padded.
pub fn data_from_hex(value: &str) -> TxResult<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|_| TxError::MalformedHex {
        value: value.to_string(),
    })
}

/// Decodes a quantity. `0x` (no digits) is read as zero.
pub fn quantity_from_hex(value: &str) -> TxResult<BigUint> {
    let bytes = from_hex(value)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

pub fn trim_leading_zeroes(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| *b != 0).unwrap_or(data.len());
    &data[start..]
}

/// Minimal big-endian representation; zero is the empty byte string.
pub fn biguint_to_be_bytes(value: &BigUint) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_bytes_be()
}

/// Left-pads a big-endian integer to exactly 32 bytes.
pub fn biguint_to_word(value: &BigUint) -> TxResult<[u8; 32]> {
    let bytes = biguint_to_be_bytes(value);
    if bytes.len() > 32 {
        return Err(TxError::NumberOutOfRange {
            field: "uint256".into(),
        });
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> TxResult<Self> {
        let raw: [u8; ADDRESS_LEN] =
            bytes
                .try_into()
                .map_err(|_| TxError::InvalidAddressLength {
                    field: "address".into(),
                    expected: ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Address(raw))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl FromStr for Address {
    type Err = TxError;

    fn from_str(s: &str) -> TxResult<Self> {
        let digits = s.strip_prefix("0x").ok_or_else(|| TxError::MalformedHex {
            value: s.to_string(),
        })?;
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(TxError::InvalidAddressLength {
                field: "address".into(),
                expected: ADDRESS_LEN * 2 + 2,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(digits).map_err(|_| TxError::MalformedHex {
            value: s.to_string(),
        })?;
        Address::from_slice(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}
