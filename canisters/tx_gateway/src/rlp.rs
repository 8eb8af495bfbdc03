//! Recursive length prefix encoding.

use num_bigint::BigUint;

use crate::codec::{biguint_to_be_bytes, trim_leading_zeroes, Address};
use crate::error::{TxError, TxResult};

const STRING_OFFSET: u8 = 0x80;
const LONG_STRING_OFFSET: u8 = 0xb7;
const LIST_OFFSET: u8 = 0xc0;
const LONG_LIST_OFFSET: u8 = 0xf7;
const SHORT_LIMIT: usize = 55;
/// Deepest list nesting the decoder accepts.
pub const MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        RlpItem::Bytes(data.into())
    }

    /// Integers go on the wire as their minimal big-endian bytes, so zero is
    /// the empty string.
    pub fn uint(value: &BigUint) -> Self {
        RlpItem::Bytes(biguint_to_be_bytes(value))
    }

    pub fn u64(value: u64) -> Self {
        RlpItem::Bytes(trim_leading_zeroes(&value.to_be_bytes()).to_vec())
    }

    /// A missing recipient (contract creation) is the empty string.
    pub fn address(address: Option<&Address>) -> Self {
        match address {
            Some(addr) => RlpItem::Bytes(addr.as_bytes().to_vec()),
            None => RlpItem::Bytes(Vec::new()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            RlpItem::Bytes(data) => encode_bytes(data),
            RlpItem::List(items) => encode(items),
        }
    }

    pub fn as_bytes(&self) -> TxResult<&[u8]> {
        match self {
            RlpItem::Bytes(data) => Ok(data),
            RlpItem::List(_) => Err(TxError::malformed_rlp("expected string, found list")),
        }
    }

    /// Reads a string item as a canonical unsigned integer.
    pub fn as_uint(&self) -> TxResult<BigUint> {
        let data = self.as_bytes()?;
        if data.first() == Some(&0) {
            return Err(TxError::malformed_rlp("integer with leading zero byte"));
        }
        Ok(BigUint::from_bytes_be(data))
    }
}

/// Encodes `items` as one RLP list.
pub fn encode(items: &[RlpItem]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flat_map(RlpItem::encode).collect();
    with_prefix(LIST_OFFSET, LONG_LIST_OFFSET, &payload)
}

pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < STRING_OFFSET {
        return vec![data[0]];
    }
    with_prefix(STRING_OFFSET, LONG_STRING_OFFSET, data)
}

fn with_prefix(short_base: u8, long_base: u8, payload: &[u8]) -> Vec<u8> {
    if payload.len() <= SHORT_LIMIT {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(short_base + payload.len() as u8);
        out.extend_from_slice(payload);
        out
    } else {
        let len_bytes = length_to_bytes(payload.len());
        let mut out = Vec::with_capacity(1 + len_bytes.len() + payload.len());
        out.push(long_base + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(payload);
        out
    }
}

fn length_to_bytes(len: usize) -> Vec<u8> {
    trim_leading_zeroes(&(len as u64).to_be_bytes()).to_vec()
}

/// Decodes exactly one item spanning all of `input`.
pub fn decode(input: &[u8]) -> TxResult<RlpItem> {
    let (item, consumed) = decode_item(input, 0)?;
    if consumed != input.len() {
        return Err(TxError::malformed_rlp(format!(
            "{} trailing bytes",
            input.len() - consumed
        )));
    }
    Ok(item)
}

/// Decodes a top-level list and returns its elements.
pub fn decode_list(input: &[u8]) -> TxResult<Vec<RlpItem>> {
    match decode(input)? {
        RlpItem::List(items) => Ok(items),
        RlpItem::Bytes(_) => Err(TxError::malformed_rlp("expected list, found string")),
    }
}

fn decode_item(input: &[u8], depth: usize) -> TxResult<(RlpItem, usize)> {
    let prefix = *input
        .first()
        .ok_or_else(|| TxError::malformed_rlp("unexpected end of input"))?;
    match prefix {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), 1)),
        0x80..=0xbf => {
            let (offset, len) = payload_bounds(input, prefix, STRING_OFFSET, LONG_STRING_OFFSET)?;
            let data = &input[offset..offset + len];
            if len == 1 && data[0] < STRING_OFFSET {
                return Err(TxError::malformed_rlp(
                    "single byte below 0x80 must not carry a prefix",
                ));
            }
            Ok((RlpItem::Bytes(data.to_vec()), offset + len))
        }
        _ => {
            if depth >= MAX_DEPTH {
                return Err(TxError::malformed_rlp(format!(
                    "lists nested deeper than {}",
                    MAX_DEPTH
                )));
            }
            let (offset, len) = payload_bounds(input, prefix, LIST_OFFSET, LONG_LIST_OFFSET)?;
            let mut payload = &input[offset..offset + len];
            let mut items = Vec::new();
            while !payload.is_empty() {
                let (item, consumed) = decode_item(payload, depth + 1)?;
                items.push(item);
                payload = &payload[consumed..];
            }
            Ok((RlpItem::List(items), offset + len))
        }
    }
}

/// Returns `(payload offset, payload length)` for a string or list header,
/// checked against the available input.
fn payload_bounds(input: &[u8], prefix: u8, short_base: u8, long_base: u8) -> TxResult<(usize, usize)> {
    let (offset, len) = if prefix <= long_base {
        (1, (prefix - short_base) as usize)
    } else {
        let len_of_len = (prefix - long_base) as usize;
        let len_bytes = input
            .get(1..1 + len_of_len)
            .ok_or_else(|| TxError::malformed_rlp("truncated length"))?;
        if len_bytes[0] == 0 {
            return Err(TxError::malformed_rlp("length with leading zero byte"));
        }
        if len_of_len > std::mem::size_of::<usize>() {
            return Err(TxError::malformed_rlp("length does not fit in usize"));
        }
        let len = len_bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        if len <= SHORT_LIMIT {
            return Err(TxError::malformed_rlp("long form used for short payload"));
        }
        (1 + len_of_len, len)
    };
    let end = offset
        .checked_add(len)
        .ok_or_else(|| TxError::malformed_rlp("length overflow"))?;
    if end > input.len() {
        return Err(TxError::malformed_rlp(format!(
            "payload needs {} bytes, {} available",
            end,
            input.len()
        )));
    }
    Ok((offset, len))
}
