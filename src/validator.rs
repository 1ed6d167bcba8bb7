//! Re-verification of finalized transactions, one verdict per input.
//!
//! With the spent outputs at hand every input is checked end to end: spend
//! shape, key ownership of the prevout script, and the signature over the
//! recomputed sighash. Without them only legacy inputs can be verified fully
//! (their script code follows from the embedded public key); the other types
//! get a shape check.

use bitcoin::consensus::encode;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{ecdsa, schnorr, Message, Secp256k1, Verification};
use bitcoin::{CompressedPublicKey, PublicKey, ScriptBuf, Transaction, TxIn, TxOut, XOnlyPublicKey};

use crate::address::script_pubkey_for_key;
use crate::error::{Result, TxError};
use crate::network::{NetworkParams, BITCOIN};
use crate::sighash::{legacy_sighash, SigningContext, SIGHASH_FORKID};
use crate::signer::SCHNORR_SIG_LEN;
use crate::types::{AddressType, UnsignedInput};

const P2WPKH_REDEEM_LEN: usize = 22;

/// Signature and public key found in an input's scriptSig and witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendShape {
    pub address_type: AddressType,
    pub signature: Vec<u8>,
    /// Absent for taproot key-path spends.
    pub public_key: Option<Vec<u8>>,
}

fn pushes(script: &ScriptBuf) -> Option<Vec<Vec<u8>>> {
    script
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
            _ => None,
        })
        .collect()
}

/// Spend type of a signed (or placeholder-signed) input, from the layout of
/// its scriptSig and witness. `None` for anything outside the four layouts.
pub fn detect_spend(tx_in: &TxIn) -> Option<SpendShape> {
    let script_pushes = pushes(&tx_in.script_sig)?;
    let witness = tx_in.witness.to_vec();
    match (script_pushes.as_slice(), witness.as_slice()) {
        ([sig, pubkey], []) => Some(SpendShape {
            address_type: AddressType::Legacy,
            signature: sig.clone(),
            public_key: Some(pubkey.clone()),
        }),
        ([redeem], [sig, pubkey]) if redeem.len() == P2WPKH_REDEEM_LEN && redeem[..2] == [0x00, 0x14] => {
            Some(SpendShape {
                address_type: AddressType::SegwitNested,
                signature: sig.clone(),
                public_key: Some(pubkey.clone()),
            })
        }
        ([], [sig, pubkey]) => Some(SpendShape {
            address_type: AddressType::SegwitNative,
            signature: sig.clone(),
            public_key: Some(pubkey.clone()),
        }),
        ([], [sig]) => Some(SpendShape {
            address_type: AddressType::Taproot,
            signature: sig.clone(),
            public_key: None,
        }),
        _ => None,
    }
}

/// Splits an ECDSA script signature into DER and sighash type.
fn split_ecdsa(sig: &[u8], network: &NetworkParams) -> Result<(ecdsa::Signature, u32)> {
    let (type_byte, der) = sig
        .split_last()
        .ok_or_else(|| TxError::InvalidInput("empty signature".to_string()))?;
    let mut sighash_type = *type_byte as u32;
    if let Some(fork_id) = network.fork_id {
        if sighash_type & SIGHASH_FORKID != 0 {
            sighash_type |= fork_id << 8;
        }
    }
    Ok((ecdsa::Signature::from_der(der)?, sighash_type))
}

/// Splits a BIP341 signature; 64 bytes means `SIGHASH_DEFAULT`, which is
/// never spelled out as a trailing `0x00`.
fn split_schnorr(sig: &[u8]) -> Result<(schnorr::Signature, u32)> {
    let sighash_type = match sig.len() {
        SCHNORR_SIG_LEN => 0,
        65 if sig[SCHNORR_SIG_LEN] == 0x00 => {
            return Err(TxError::InvalidInput("65-byte schnorr signature with type 0x00".to_string()));
        }
        65 => sig[SCHNORR_SIG_LEN] as u32,
        len => {
            return Err(TxError::InvalidInput(format!("schnorr signature of {} bytes", len)));
        }
    };
    Ok((schnorr::Signature::from_slice(&sig[..SCHNORR_SIG_LEN])?, sighash_type))
}

fn verify_input<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    index: usize,
    prevouts: &[TxOut],
    address_types: &[Option<AddressType>],
    network: &NetworkParams,
) -> Result<()> {
    let expected = address_types[index].ok_or_else(|| {
        TxError::UnsupportedAddressType(prevouts[index].script_pubkey.to_hex_string())
    })?;
    let shape = detect_spend(&tx.input[index])
        .ok_or_else(|| TxError::InvalidInput("unrecognised spend layout".to_string()))?;
    if shape.address_type != expected {
        return Err(TxError::InvalidInput(format!(
            "{} spend of a {} output",
            shape.address_type, expected
        )));
    }
    let types: Vec<AddressType> = address_types.iter().map(|t| t.unwrap_or(AddressType::Legacy)).collect();
    let script_pubkey = &prevouts[index].script_pubkey;

    if expected == AddressType::Taproot {
        let (sig, sighash_type) = split_schnorr(&shape.signature)?;
        let ctx = SigningContext::new(network, types, Some(sighash_type));
        let hash = ctx.input_sighash(tx, index, prevouts, None)?;
        let output_key = XOnlyPublicKey::from_slice(&script_pubkey.as_bytes()[2..])?;
        return secp
            .verify_schnorr(&sig, &Message::from_digest(hash), &output_key)
            .map_err(|_| TxError::SighashMismatch { input_index: index });
    }

    let key_bytes = shape.public_key.unwrap_or_default();
    let pubkey = PublicKey::from_slice(&key_bytes)
        .map_err(|e| TxError::InvalidInput(format!("public key: {}", e)))?;
    let compressed = CompressedPublicKey::try_from(pubkey).ok();
    let owner = match (expected, compressed) {
        (AddressType::Legacy, _) => ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()),
        (_, Some(compressed)) => script_pubkey_for_key(secp, &compressed, expected),
        (_, None) => {
            return Err(TxError::InvalidInput("uncompressed key in a witness".to_string()));
        }
    };
    if &owner != script_pubkey {
        return Err(TxError::InvalidInput("public key does not own the spent output".to_string()));
    }

    let (sig, sighash_type) = split_ecdsa(&shape.signature, network)?;
    let ctx = SigningContext::new(network, types, Some(sighash_type));
    let hash = ctx.input_sighash(tx, index, prevouts, compressed.as_ref())?;
    secp.verify_ecdsa(&Message::from_digest(hash), &sig, &pubkey.inner)
        .map_err(|_| TxError::SighashMismatch { input_index: index })
}

/// Check without the spent outputs.
fn check_shape<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    index: usize,
    network: &NetworkParams,
) -> Result<()> {
    let shape = detect_spend(&tx.input[index])
        .ok_or_else(|| TxError::InvalidInput("unrecognised spend layout".to_string()))?;
    if shape.address_type == AddressType::Taproot {
        split_schnorr(&shape.signature)?;
        return Ok(());
    }
    let key_bytes = shape.public_key.unwrap_or_default();
    let pubkey = PublicKey::from_slice(&key_bytes)
        .map_err(|e| TxError::InvalidInput(format!("public key: {}", e)))?;
    let (sig, sighash_type) = split_ecdsa(&shape.signature, network)?;
    if shape.address_type != AddressType::Legacy || sighash_type & SIGHASH_FORKID != 0 {
        return Ok(());
    }
    let script_code = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());
    let hash = legacy_sighash(tx, index, &script_code, sighash_type)?;
    secp.verify_ecdsa(&Message::from_digest(hash), &sig, &pubkey.inner)
        .map_err(|_| TxError::SighashMismatch { input_index: index })
}

/// Verdict for every input of `tx`. Per-input failures are `false`, never
/// `Err`; only a `prevouts` list of the wrong length is an error.
pub fn validate_transaction(
    tx: &Transaction,
    prevouts: Option<&[TxOut]>,
    network: &NetworkParams,
) -> Result<Vec<bool>> {
    let secp = Secp256k1::verification_only();
    if let Some(prevouts) = prevouts {
        if prevouts.len() != tx.input.len() {
            return Err(TxError::InvalidInput(format!(
                "{} previous outputs for {} inputs",
                prevouts.len(),
                tx.input.len()
            )));
        }
    }
    let address_types: Vec<Option<AddressType>> = prevouts
        .map(|prevouts| prevouts.iter().map(|p| AddressType::from_script(&p.script_pubkey).ok()).collect())
        .unwrap_or_default();

    let verdicts = (0..tx.input.len())
        .map(|index| {
            let outcome = match prevouts {
                Some(prevouts) => verify_input(&secp, tx, index, prevouts, &address_types, network),
                None => check_shape(&secp, tx, index, network),
            };
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("input {} failed validation: {}", index, e);
                    false
                }
            }
        })
        .collect();
    Ok(verdicts)
}

/// Validates a hex transaction. With both `inputs` and `network` every input
/// is cross-checked against the claimed outpoint, script and amount;
/// otherwise only signature shape is checked.
pub fn valid_signed_transaction(
    signed_tx_hex: &str,
    inputs: Option<&[UnsignedInput]>,
    network: Option<&NetworkParams>,
) -> Result<Vec<bool>> {
    let tx: Transaction = encode::deserialize(&hex::decode(signed_tx_hex.trim())?)?;
    log::info!("validating transaction {} ({} inputs)", tx.compute_txid(), tx.input.len());

    let (Some(inputs), Some(network)) = (inputs, network) else {
        log::debug!("no inputs or network given, checking signature shape only");
        return validate_transaction(&tx, None, network.unwrap_or(&BITCOIN));
    };
    if inputs.len() != tx.input.len() {
        return Err(TxError::InvalidInput(format!(
            "{} inputs claimed for a transaction with {}",
            inputs.len(),
            tx.input.len()
        )));
    }
    let prevouts = inputs
        .iter()
        .map(|input| {
            Ok(TxOut {
                value: bitcoin::Amount::from_sat(input.amount),
                script_pubkey: input.source.script_pubkey(network)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut verdicts = validate_transaction(&tx, Some(&prevouts), network)?;
    for (index, (verdict, input)) in verdicts.iter_mut().zip(inputs).enumerate() {
        if tx.input[index].previous_output != input.out_point() {
            log::debug!("input {} spends {}, not the claimed outpoint", index, tx.input[index].previous_output);
            *verdict = false;
        }
    }
    Ok(verdicts)
}
