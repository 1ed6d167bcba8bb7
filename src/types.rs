use std::fmt;
use std::str::FromStr;

use bitcoin::secp256k1::SecretKey;
use bitcoin::script::PushBytesBuf;
use bitcoin::{CompressedPublicKey, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxOut, Txid};
use serde::{Deserialize, Serialize};

use crate::address;
use crate::error::{Result, TxError};
use crate::network::NetworkParams;

/// Largest OP_RETURN payload accepted as a memo.
pub const MAX_MEMO_LEN: usize = 80;

/// The four spend types the builder can sign for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressType {
    Legacy,
    SegwitNested,
    SegwitNative,
    Taproot,
}

impl AddressType {
    pub const ALL: [AddressType; 4] = [
        AddressType::Legacy,
        AddressType::SegwitNested,
        AddressType::SegwitNative,
        AddressType::Taproot,
    ];

    /// Spend type of a previous output script. P2SH is assumed to wrap P2WPKH.
    pub fn from_script(script: &Script) -> Result<Self> {
        if script.is_p2pkh() {
            Ok(AddressType::Legacy)
        } else if script.is_p2sh() {
            Ok(AddressType::SegwitNested)
        } else if script.is_p2wpkh() {
            Ok(AddressType::SegwitNative)
        } else if script.is_p2tr() {
            Ok(AddressType::Taproot)
        } else {
            Err(TxError::UnsupportedAddressType(format!(
                "script {}",
                script.to_hex_string()
            )))
        }
    }

    /// Whether spending this type puts data in the witness.
    pub fn has_witness(self) -> bool {
        !matches!(self, AddressType::Legacy)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressType::Legacy => "legacy",
            AddressType::SegwitNested => "segwit-nested",
            AddressType::SegwitNative => "segwit-native",
            AddressType::Taproot => "taproot",
        };
        f.write_str(name)
    }
}

impl FromStr for AddressType {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "legacy" | "p2pkh" => Ok(AddressType::Legacy),
            "segwit-nested" | "nested" | "p2sh-p2wpkh" => Ok(AddressType::SegwitNested),
            "segwit-native" | "native" | "p2wpkh" => Ok(AddressType::SegwitNative),
            "taproot" | "p2tr" => Ok(AddressType::Taproot),
            other => Err(TxError::UnsupportedAddressType(other.to_string())),
        }
    }
}

/// Where funds come from or go to: an address string, or a raw script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address(String),
    Script(ScriptBuf),
}

impl Destination {
    pub fn script_pubkey(&self, network: &NetworkParams) -> Result<ScriptBuf> {
        match self {
            Destination::Address(addr) => address::script_pubkey_for_address(addr, network),
            Destination::Script(script) => Ok(script.clone()),
        }
    }
}

impl From<&str> for Destination {
    fn from(address: &str) -> Self {
        Destination::Address(address.to_string())
    }
}

impl From<ScriptBuf> for Destination {
    fn from(script: ScriptBuf) -> Self {
        Destination::Script(script)
    }
}

/// A previous output to spend, plus the optional key material for it.
#[derive(Debug, Clone)]
pub struct UnsignedInput {
    pub txid: Txid,
    pub vout: u32,
    pub amount: u64,
    pub source: Destination,
    pub sequence: u32,
    pub private_key: Option<SecretKey>,
    pub public_key: Option<CompressedPublicKey>,
    /// Full previous transaction, carried into hardware-mode PSBTs.
    pub non_witness_utxo: Option<Transaction>,
}

impl UnsignedInput {
    pub fn new(txid: Txid, vout: u32, amount: u64, source: impl Into<Destination>) -> Self {
        UnsignedInput {
            txid,
            vout,
            amount,
            source: source.into(),
            sequence: Sequence::MAX.0,
            private_key: None,
            public_key: None,
            non_witness_utxo: None,
        }
    }

    /// Same as [`UnsignedInput::new`] with the txid given in its usual hex form.
    pub fn from_hex_txid(txid: &str, vout: u32, amount: u64, source: impl Into<Destination>) -> Result<Self> {
        let txid = Txid::from_str(txid)
            .map_err(|e| TxError::InvalidInput(format!("invalid txid {}: {}", txid, e)))?;
        Ok(Self::new(txid, vout, amount, source))
    }

    pub fn with_private_key(mut self, key: SecretKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_public_key(mut self, key: CompressedPublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_previous_transaction(mut self, tx: Transaction) -> Self {
        self.non_witness_utxo = Some(tx);
        self
    }

    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub destination: Destination,
    pub amount: u64,
}

impl Output {
    pub fn new(destination: impl Into<Destination>, amount: u64) -> Self {
        Output { destination: destination.into(), amount }
    }
}

/// Sum of satoshi amounts; an overflowing total is malformed input.
pub fn total_amount(amounts: impl IntoIterator<Item = u64>) -> Result<u64> {
    amounts.into_iter().try_fold(0u64, |total, amount| {
        total
            .checked_add(amount)
            .ok_or_else(|| TxError::InvalidInput(format!("amounts overflow after {} sats", total)))
    })
}

/// OP_RETURN payload, either UTF-8 text or hex-encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Memo {
    Text(String),
    Hex(String),
}

impl Memo {
    pub fn payload(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Memo::Text(text) => text.as_bytes().to_vec(),
            Memo::Hex(encoded) => {
                let trimmed = encoded.strip_prefix("0x").unwrap_or(encoded);
                hex::decode(trimmed)?
            }
        };
        if bytes.len() > MAX_MEMO_LEN {
            return Err(TxError::MemoTooLong { len: bytes.len(), max: MAX_MEMO_LEN });
        }
        Ok(bytes)
    }

    /// The zero-value output script: `OP_RETURN <payload>`.
    pub fn script(&self) -> Result<ScriptBuf> {
        let payload = PushBytesBuf::try_from(self.payload()?)
            .map_err(|_| TxError::InvalidInput("memo does not fit in a push".to_string()))?;
        Ok(ScriptBuf::new_op_return(payload))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoPosition {
    First,
    At(usize),
    #[default]
    Last,
}

/// An input after validation, with its previous output resolved.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub out_point: OutPoint,
    pub prevout: TxOut,
    pub address_type: AddressType,
    pub sequence: Sequence,
    pub secret: Option<SecretKey>,
    pub public_key: Option<CompressedPublicKey>,
    pub non_witness_utxo: Option<Transaction>,
}
