//! Per-input signature hashes: legacy, BIP143 (with the FORKID variant) and
//! BIP341 key path.

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::{CompressedPublicKey, Script, ScriptBuf, Transaction, TxOut};

use crate::error::{Result, TxError};
use crate::network::NetworkParams;
use crate::types::AddressType;

pub const SIGHASH_DEFAULT: u32 = 0x00;
pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;
/// Low bits selecting ALL, NONE or SINGLE.
pub const SIGHASH_MASK: u32 = 0x1f;

pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    sighash_type: u32,
) -> Result<[u8; 32]> {
    let hash = SighashCache::new(tx)
        .legacy_signature_hash(input_index, script_code, sighash_type)
        .map_err(|source| TxError::LegacySighash { input_index, source })?;
    Ok(hash.to_byte_array())
}

fn hash_of(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

/// BIP143 preimage. Also used by Bitcoin Cash, where the type carries FORKID.
pub fn segwit_v0_preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    amount: u64,
    sighash_type: u32,
) -> Result<Vec<u8>> {
    let input = tx.input.get(input_index).ok_or_else(|| {
        TxError::InvalidInput(format!(
            "input index {} out of range ({} inputs)",
            input_index,
            tx.input.len()
        ))
    })?;
    let base_type = sighash_type & SIGHASH_MASK;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;

    let hash_prevouts = if anyone_can_pay {
        [0u8; 32]
    } else {
        let mut buf = Vec::with_capacity(tx.input.len() * 36);
        for txin in &tx.input {
            buf.extend(serialize(&txin.previous_output));
        }
        hash_of(&buf)
    };

    let hash_sequence =
        if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE {
            [0u8; 32]
        } else {
            let mut buf = Vec::with_capacity(tx.input.len() * 4);
            for txin in &tx.input {
                buf.extend(txin.sequence.0.to_le_bytes());
            }
            hash_of(&buf)
        };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        let mut buf = Vec::new();
        for out in &tx.output {
            buf.extend(serialize(out));
        }
        hash_of(&buf)
    } else if base_type == SIGHASH_SINGLE && input_index < tx.output.len() {
        hash_of(&serialize(&tx.output[input_index]))
    } else {
        [0u8; 32]
    };

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend(tx.version.0.to_le_bytes());
    preimage.extend(hash_prevouts);
    preimage.extend(hash_sequence);
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(script_code));
    preimage.extend(amount.to_le_bytes());
    preimage.extend(input.sequence.0.to_le_bytes());
    preimage.extend(hash_outputs);
    preimage.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend(sighash_type.to_le_bytes());
    Ok(preimage)
}

pub fn segwit_v0_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    amount: u64,
    sighash_type: u32,
) -> Result<[u8; 32]> {
    let preimage = segwit_v0_preimage(tx, input_index, script_code, amount, sighash_type)?;
    Ok(hash_of(&preimage))
}

/// Maps a raw type to BIP341's, where 0 means `SIGHASH_DEFAULT`.
pub fn tap_sighash_type(sighash_type: u32) -> Result<TapSighashType> {
    let byte = u8::try_from(sighash_type)
        .map_err(|_| TxError::InvalidInput(format!("sighash type 0x{:x} out of range", sighash_type)))?;
    TapSighashType::from_consensus_u8(byte).map_err(|e| TxError::InvalidInput(e.to_string()))
}

pub fn taproot_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    sighash_type: TapSighashType,
) -> Result<[u8; 32]> {
    let hash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(input_index, &Prevouts::All(prevouts), sighash_type)
        .map_err(|source| TxError::TaprootSighash { input_index, source })?;
    Ok(hash.to_byte_array())
}

/// Everything the sighash of one input depends on besides the transaction.
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    pub network: &'a NetworkParams,
    pub address_types: Vec<AddressType>,
    /// Explicit type; `None` means the network default (ECDSA) or
    /// `SIGHASH_DEFAULT` (taproot).
    pub sighash_type: Option<u32>,
}

impl<'a> SigningContext<'a> {
    pub fn new(network: &'a NetworkParams, address_types: Vec<AddressType>, sighash_type: Option<u32>) -> Self {
        SigningContext { network, address_types, sighash_type }
    }

    pub fn ecdsa_sighash_type(&self) -> u32 {
        self.sighash_type.unwrap_or_else(|| self.network.default_sighash_type())
    }

    pub fn taproot_sighash_type(&self) -> Result<TapSighashType> {
        match self.sighash_type {
            Some(t) => tap_sighash_type(t),
            None => Ok(TapSighashType::Default),
        }
    }

    /// Sighash of input `index`. `prevouts` holds every input's previous
    /// output in order; nested segwit also needs the spending public key.
    pub fn input_sighash(
        &self,
        tx: &Transaction,
        index: usize,
        prevouts: &[TxOut],
        pubkey: Option<&CompressedPublicKey>,
    ) -> Result<[u8; 32]> {
        let address_type = *self.address_types.get(index).ok_or_else(|| {
            TxError::InvalidInput(format!("no address type for input {}", index))
        })?;
        let prevout = prevouts.get(index).ok_or_else(|| {
            TxError::InvalidInput(format!("no previous output for input {}", index))
        })?;

        if self.network.is_bitcoin_cash() {
            if address_type != AddressType::Legacy {
                return Err(TxError::UnsupportedAddressType(format!(
                    "{} inputs on {}",
                    address_type, self.network.name
                )));
            }
            let sighash_type = self.ecdsa_sighash_type();
            if sighash_type & SIGHASH_FORKID == 0 {
                return Err(TxError::InvalidInput(format!(
                    "sighash type 0x{:x} lacks FORKID",
                    sighash_type
                )));
            }
            return segwit_v0_sighash(
                tx,
                index,
                &prevout.script_pubkey,
                prevout.value.to_sat(),
                sighash_type,
            );
        }

        match address_type {
            AddressType::Legacy => {
                legacy_sighash(tx, index, &prevout.script_pubkey, self.ecdsa_sighash_type())
            }
            AddressType::SegwitNative => {
                let script_code = prevout.script_pubkey.as_script().p2wpkh_script_code().ok_or_else(|| {
                    TxError::InvalidInput(format!("input {} does not spend a P2WPKH output", index))
                })?;
                segwit_v0_sighash(tx, index, &script_code, prevout.value.to_sat(), self.ecdsa_sighash_type())
            }
            AddressType::SegwitNested => {
                let pubkey = pubkey.ok_or_else(|| {
                    TxError::InvalidInput(format!("input {} needs a public key for its redeem script", index))
                })?;
                let script_code: ScriptBuf = pubkey.p2wpkh_script_code();
                segwit_v0_sighash(tx, index, &script_code, prevout.value.to_sat(), self.ecdsa_sighash_type())
            }
            AddressType::Taproot => {
                taproot_sighash(tx, index, prevouts, self.taproot_sighash_type()?)
            }
        }
    }
}
