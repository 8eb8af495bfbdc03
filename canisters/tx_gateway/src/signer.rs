//! Legacy transaction signing with EIP-155 replay protection.
//!
//! The signing payload is the RLP list
//! `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`; its
//! Keccak-256 hash is signed and the broadcast payload replaces the three
//! trailing fields with `[v, r, s]` where `v = recoveryId + chainId * 2 + 35`.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use tiny_keccak::{Hasher, Keccak};

use crate::codec::{biguint_to_word, bytes_to_hex, Address};
use crate::error::{TxError, TxResult};
use crate::rlp::{self, RlpItem};

const PRIVATE_KEY_LEN: usize = 32;
const EIP155_V_OFFSET: u32 = 35;
const PRE_EIP155_V_OFFSET: u32 = 27;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: BigUint,
    pub gas_price: BigUint,
    pub gas_limit: BigUint,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub value: BigUint,
    pub data: Vec<u8>,
}

impl UnsignedTransaction {
    fn base_items(&self) -> Vec<RlpItem> {
        vec![
            RlpItem::uint(&self.nonce),
            RlpItem::uint(&self.gas_price),
            RlpItem::uint(&self.gas_limit),
            RlpItem::address(self.to.as_ref()),
            RlpItem::uint(&self.value),
            RlpItem::bytes(self.data.clone()),
        ]
    }

    /// Hash signed under EIP-155 for `chain_id`.
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut items = self.base_items();
        items.push(RlpItem::u64(chain_id));
        items.push(RlpItem::u64(0));
        items.push(RlpItem::u64(0));
        keccak256(&rlp::encode(&items))
    }

    fn legacy_signing_hash(&self) -> [u8; 32] {
        keccak256(&rlp::encode(&self.base_items()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: BigUint,
    pub s: BigUint,
    pub recovery_id: u8,
}

impl Signature {
    pub fn v(&self, chain_id: u64) -> BigUint {
        BigUint::from(chain_id) * 2u32 + EIP155_V_OFFSET + self.recovery_id as u32
    }

    fn to_ecdsa(&self) -> TxResult<(EcdsaSignature, RecoveryId)> {
        let mut raw = [0u8; 64];
        raw[..32].copy_from_slice(&biguint_to_word(&self.r)?);
        raw[32..].copy_from_slice(&biguint_to_word(&self.s)?);
        let signature = EcdsaSignature::from_slice(&raw)
            .map_err(|_| TxError::malformed_rlp("signature scalars out of range"))?;
        let recovery_id = RecoveryId::from_byte(self.recovery_id)
            .ok_or_else(|| TxError::malformed_rlp("recovery id out of range"))?;
        Ok((signature, recovery_id))
    }
}

/// RLP bytes of a signed transaction, ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransactionBytes(Vec<u8>);

impl SignedTransactionBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }

    /// Transaction hash as reported by nodes.
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.0)
    }
}

impl AsRef<[u8]> for SignedTransactionBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn signing_key(private_key: &[u8]) -> TxResult<SigningKey> {
    if private_key.len() != PRIVATE_KEY_LEN {
        return Err(TxError::InvalidKey);
    }
    SigningKey::from_slice(private_key).map_err(|_| TxError::InvalidKey)
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::new(out)
}

pub fn address_from_private_key(private_key: &[u8]) -> TxResult<Address> {
    let key = signing_key(private_key)?;
    Ok(address_from_verifying_key(key.verifying_key()))
}

/// Signs a 32-byte prehash, returning scalars and the recovery id.
pub fn sign_hash(private_key: &[u8], hash: &[u8; 32]) -> TxResult<Signature> {
    let key = signing_key(private_key)?;
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(hash)
        .map_err(|_| TxError::InvalidKey)?;
    Ok(Signature {
        r: BigUint::from_bytes_be(&signature.r().to_bytes()),
        s: BigUint::from_bytes_be(&signature.s().to_bytes()),
        recovery_id: recovery_id.is_y_odd() as u8,
    })
}

pub fn sign(
    chain_id: u64,
    tx: &UnsignedTransaction,
    private_key: &[u8],
) -> TxResult<SignedTransactionBytes> {
    let signature = sign_hash(private_key, &tx.signing_hash(chain_id))?;
    Ok(encode_signed(tx, chain_id, &signature))
}

fn encode_signed(
    tx: &UnsignedTransaction,
    chain_id: u64,
    signature: &Signature,
) -> SignedTransactionBytes {
    let mut items = tx.base_items();
    items.push(RlpItem::uint(&signature.v(chain_id)));
    items.push(RlpItem::uint(&signature.r));
    items.push(RlpItem::uint(&signature.s));
    SignedTransactionBytes(rlp::encode(&items))
}

/// A decoded legacy transaction. `chain_id` is `None` for pre-EIP-155
/// signatures (`v` of 27 or 28).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub chain_id: Option<u64>,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn signing_hash(&self) -> [u8; 32] {
        match self.chain_id {
            Some(chain_id) => self.tx.signing_hash(chain_id),
            None => self.tx.legacy_signing_hash(),
        }
    }

    pub fn recover_sender(&self) -> TxResult<Address> {
        let (signature, recovery_id) = self.signature.to_ecdsa()?;
        let key = VerifyingKey::recover_from_prehash(&self.signing_hash(), &signature, recovery_id)
            .map_err(|_| TxError::malformed_rlp("signature does not recover a public key"))?;
        Ok(address_from_verifying_key(&key))
    }
}

pub fn decode_signed(raw: &[u8]) -> TxResult<SignedTransaction> {
    let items = rlp::decode_list(raw)?;
    if items.len() != 9 {
        return Err(TxError::malformed_rlp(format!(
            "legacy transaction has 9 fields, found {}",
            items.len()
        )));
    }
    let to = match items[3].as_bytes()? {
        [] => None,
        bytes => Some(Address::from_slice(bytes)?),
    };
    let tx = UnsignedTransaction {
        nonce: items[0].as_uint()?,
        gas_price: items[1].as_uint()?,
        gas_limit: items[2].as_uint()?,
        to,
        value: items[4].as_uint()?,
        data: items[5].as_bytes()?.to_vec(),
    };
    let v = items[6].as_uint()?;
    let (chain_id, recovery_id) = split_v(&v)?;
    Ok(SignedTransaction {
        tx,
        chain_id,
        signature: Signature {
            r: items[7].as_uint()?,
            s: items[8].as_uint()?,
            recovery_id,
        },
    })
}

fn split_v(v: &BigUint) -> TxResult<(Option<u64>, u8)> {
    let eip155_offset = BigUint::from(EIP155_V_OFFSET);
    if *v >= eip155_offset {
        let shifted = v - &eip155_offset;
        let recovery_id = (&shifted % 2u32).to_u8().unwrap_or_default();
        let chain_id: BigUint = shifted / 2u32;
        let chain_id = chain_id.to_u64().ok_or_else(|| TxError::NumberOutOfRange {
            field: "chain_id".into(),
        })?;
        return Ok((Some(chain_id), recovery_id));
    }
    let legacy = v
        .to_u32()
        .filter(|v| *v == PRE_EIP155_V_OFFSET || *v == PRE_EIP155_V_OFFSET + 1)
        .ok_or_else(|| TxError::malformed_rlp(format!("unsupported v value {}", v)))?;
    Ok((None, (legacy - PRE_EIP155_V_OFFSET) as u8))
}

impl Default for UnsignedTransaction {
    fn default() -> Self {
        Self {
            nonce: BigUint::zero(),
            gas_price: BigUint::zero(),
            gas_limit: BigUint::from(21_000u32),
            to: None,
            value: BigUint::zero(),
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::from_hex;

    const KEY: [u8; 32] = [0x46; 32];

    fn eip155_example() -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: BigUint::from(9u32),
            gas_price: BigUint::from(20_000_000_000u64),
            gas_limit: BigUint::from(21_000u32),
            to: Some(Address::new([0x35; 20])),
            value: BigUint::from(1_000_000_000_000_000_000u64),
            data: Vec::new(),
        }
    }

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            bytes_to_hex(&keccak256(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn eip155_signing_hash() {
        assert_eq!(
            bytes_to_hex(&eip155_example().signing_hash(1)),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn eip155_known_answer() {
        let signed = sign(1, &eip155_example(), &KEY).unwrap();
        assert_eq!(
            signed.to_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let tx = UnsignedTransaction {
            data: vec![0xde, 0xad, 0xbe, 0xef],
            ..eip155_example()
        };
        let first = sign(137, &tx, &KEY).unwrap();
        let second = sign(137, &tx, &KEY).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn v_follows_eip155() {
        let sig = |recovery_id| Signature {
            r: BigUint::from(1u32),
            s: BigUint::from(1u32),
            recovery_id,
        };
        assert_eq!(sig(0).v(1), BigUint::from(37u32));
        assert_eq!(sig(1).v(1), BigUint::from(38u32));
        assert_eq!(sig(0).v(137), BigUint::from(309u32));
        assert_eq!(
            sig(1).v(u64::MAX),
            BigUint::from(u64::MAX) * 2u32 + 36u32
        );
    }

    #[test]
    fn known_key_address() {
        assert_eq!(
            address_from_private_key(&KEY).unwrap().to_string(),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
    }

    #[test]
    fn recovered_sender_matches_key_across_chains() {
        let expected = address_from_private_key(&KEY).unwrap();
        for chain_id in [1u64, 3, 4, 5, 56, 137, 11_155_111] {
            let signed = sign(chain_id, &eip155_example(), &KEY).unwrap();
            let decoded = decode_signed(signed.as_bytes()).unwrap();
            assert_eq!(decoded.chain_id, Some(chain_id));
            assert_eq!(decoded.tx, eip155_example());
            assert_eq!(decoded.recover_sender().unwrap(), expected);
        }
    }

    #[test]
    fn contract_creation_has_empty_recipient() {
        let tx = UnsignedTransaction {
            to: None,
            data: from_hex("0x6080604052").unwrap(),
            ..eip155_example()
        };
        let signed = sign(1, &tx, &KEY).unwrap();
        let decoded = decode_signed(signed.as_bytes()).unwrap();
        assert_eq!(decoded.tx.to, None);
        assert_eq!(decoded.tx.data, tx.data);
    }

    #[test]
    fn pre_eip155_signature_recovers() {
        let tx = eip155_example();
        let signature = sign_hash(&KEY, &tx.legacy_signing_hash()).unwrap();
        let mut items = tx.base_items();
        items.push(RlpItem::u64(27 + signature.recovery_id as u64));
        items.push(RlpItem::uint(&signature.r));
        items.push(RlpItem::uint(&signature.s));
        let decoded = decode_signed(&rlp::encode(&items)).unwrap();
        assert_eq!(decoded.chain_id, None);
        assert_eq!(
            decoded.recover_sender().unwrap(),
            address_from_private_key(&KEY).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(
            sign(1, &eip155_example(), &[0u8; 32]),
            Err(TxError::InvalidKey)
        );
        assert_eq!(
            sign(1, &eip155_example(), &[0x46; 31]),
            Err(TxError::InvalidKey)
        );
        // group order n is not a valid scalar
        let order = from_hex("0xfffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141")
            .unwrap();
        assert_eq!(address_from_private_key(&order), Err(TxError::InvalidKey));
    }

    #[test]
    fn decode_rejects_wrong_field_count() {
        let raw = rlp::encode(&[RlpItem::u64(1), RlpItem::u64(2)]);
        assert!(matches!(
            decode_signed(&raw),
            Err(TxError::MalformedRlp { .. })
        ));
    }
}
