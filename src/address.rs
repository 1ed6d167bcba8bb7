//! Address classification and the address <-> scriptPubKey mapping.
//!
//! Witness addresses are bech32/bech32m with the network HRP; everything else
//! is base58Check with the network's pubKeyHash or scriptHash version byte.

use bitcoin::base58;
use bitcoin::bech32::primitives::decode::SegwitHrpstring;
use bitcoin::bech32::{segwit, Hrp};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::{
    CompressedPublicKey, PubkeyHash, Script, ScriptBuf, ScriptHash, WitnessProgram, WitnessVersion,
    XOnlyPublicKey,
};

use crate::error::{Result, TxError};
use crate::network::NetworkParams;
use crate::types::AddressType;

/// Spend type of an address. Never fails: anything unrecognised is Legacy.
pub fn classify(address: &str, network: &NetworkParams) -> AddressType {
    if let Ok((_, version, _)) = segwit::decode(address) {
        match version.to_u8() {
            0 => return AddressType::SegwitNative,
            1 => return AddressType::Taproot,
            v => log::debug!("witness version {} of {} has no spend type", v, address),
        }
    } else if let Ok(payload) = base58::decode_check(address) {
        if payload.len() == 21 {
            if payload[0] == network.script_hash {
                return AddressType::SegwitNested;
            }
            if payload[0] == network.pub_key_hash {
                return AddressType::Legacy;
            }
        }
    }
    log::debug!("could not classify {} on {}, assuming legacy", address, network.name);
    AddressType::Legacy
}

pub fn script_pubkey_for_address(address: &str, network: &NetworkParams) -> Result<ScriptBuf> {
    if let Ok((hrp, version, program)) = segwit::decode(address) {
        let expected = network.bech32_hrp.ok_or_else(|| {
            TxError::UnsupportedAddressType(format!("{} has no segwit addresses", network.name))
        })?;
        if hrp.to_lowercase() != expected {
            return Err(TxError::NetworkMismatch {
                expected: format!("{} (hrp {})", network.name, expected),
                found: format!("hrp {}", hrp),
            });
        }
        let version = WitnessVersion::try_from(version.to_u8())
            .map_err(|e| TxError::InvalidInput(format!("{}: {}", address, e)))?;
        let program = WitnessProgram::new(version, &program)
            .map_err(|e| TxError::InvalidInput(format!("{}: {}", address, e)))?;
        return Ok(ScriptBuf::new_witness_program(&program));
    }

    let payload = base58::decode_check(address)
        .map_err(|e| TxError::InvalidInput(format!("invalid address {}: {}", address, e)))?;
    if payload.len() != 21 {
        return Err(TxError::InvalidInput(format!(
            "invalid address {}: payload is {} bytes",
            address,
            payload.len()
        )));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    match payload[0] {
        v if v == network.pub_key_hash => Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))),
        v if v == network.script_hash => Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash))),
        v => Err(TxError::NetworkMismatch {
            expected: format!(
                "{} (version 0x{:02x} or 0x{:02x})",
                network.name, network.pub_key_hash, network.script_hash
            ),
            found: format!("version 0x{:02x}", v),
        }),
    }
}

pub fn address_from_script(script: &Script, network: &NetworkParams) -> Result<String> {
    let bytes = script.as_bytes();
    if script.is_p2pkh() {
        return Ok(base58_address(network.pub_key_hash, &bytes[3..23]));
    }
    if script.is_p2sh() {
        return Ok(base58_address(network.script_hash, &bytes[2..22]));
    }
    if let Some(version) = script.witness_version() {
        let hrp = network.bech32_hrp.ok_or_else(|| {
            TxError::UnsupportedAddressType(format!("{} has no segwit addresses", network.name))
        })?;
        let hrp = Hrp::parse(hrp).map_err(|e| TxError::InvalidInput(e.to_string()))?;
        return segwit::encode(hrp, version.into(), &bytes[2..])
            .map_err(|e| TxError::InvalidInput(e.to_string()));
    }
    Err(TxError::UnsupportedAddressType(format!(
        "no address form for script {}",
        script.to_hex_string()
    )))
}

fn base58_address(version: u8, hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    base58::encode_check(&payload)
}

/// `0014<hash160(pubkey)>`, the redeem script of a nested segwit output.
pub fn nested_redeem_script(pubkey: &CompressedPublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash())
}

/// scriptPubKey paying `pubkey` as `address_type`. Taproot uses the BIP86
/// tweak with no script tree.
pub fn script_pubkey_for_key<C: Verification>(
    secp: &Secp256k1<C>,
    pubkey: &CompressedPublicKey,
    address_type: AddressType,
) -> ScriptBuf {
    match address_type {
        AddressType::Legacy => ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()),
        AddressType::SegwitNested => ScriptBuf::new_p2sh(&nested_redeem_script(pubkey).script_hash()),
        AddressType::SegwitNative => ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()),
        AddressType::Taproot => ScriptBuf::new_p2tr(secp, XOnlyPublicKey::from(pubkey.0), None),
    }
}

pub fn address_from_public_key<C: Verification>(
    secp: &Secp256k1<C>,
    pubkey: &CompressedPublicKey,
    address_type: AddressType,
    network: &NetworkParams,
) -> Result<String> {
    if address_type.has_witness() && !network.supports_segwit() {
        return Err(TxError::UnsupportedAddressType(format!(
            "{} addresses on {}",
            address_type, network.name
        )));
    }
    address_from_script(&script_pubkey_for_key(secp, pubkey, address_type), network)
}

/// Whether `address` is usable on `network`, optionally as a given type.
///
/// Witness types are checked against the bech32 (BIP173) checksum only, so a
/// bech32m taproot address is reported invalid when `Taproot` is expected.
pub fn valid_address(address: &str, network: &NetworkParams, expected: Option<AddressType>) -> bool {
    match expected {
        None => script_pubkey_for_address(address, network).is_ok(),
        Some(t @ (AddressType::SegwitNative | AddressType::Taproot)) => {
            let Some(hrp) = network.bech32_hrp else {
                return false;
            };
            match SegwitHrpstring::new_bech32(address) {
                Ok(parsed) => {
                    let version = parsed.witness_version().to_u8();
                    let wanted = if t == AddressType::Taproot { 1 } else { 0 };
                    parsed.hrp().to_lowercase() == hrp && version == wanted
                }
                Err(e) => {
                    log::debug!("{} is not a bech32 address: {}", address, e);
                    false
                }
            }
        }
        Some(t) => match script_pubkey_for_address(address, network) {
            Ok(script) => AddressType::from_script(&script).map(|found| found == t).unwrap_or(false),
            Err(_) => false,
        },
    }
}
