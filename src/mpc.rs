//! Completes placeholder-signed transactions with signatures produced by an
//! MPC quorum. No private key ever reaches this module.

use bitcoin::consensus::encode;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Transaction;

use crate::error::{Result, TxError};
use crate::network::{NetworkParams, BITCOIN, BITCOIN_CASH};
use crate::sighash::{SigningContext, SIGHASH_FORKID};
use crate::signer::{produce_signature, SignatureSource};
use crate::transaction::assemble_input;
use crate::types::AddressType;
use crate::validator::detect_spend;

/// Replaces the placeholder signature of every input of `raw_hex` with the
/// matching 64-byte `r || s` (hex) from `signatures`, in input order.
///
/// The transaction must come from a placeholder-mode build whose inputs knew
/// their public keys; each input's spend type and key are read back from the
/// placeholder layout. Signatures get the network default type byte; use
/// [`get_mpc_transaction_with_sighash`] for templates built with an explicit
/// `BuildOptions::sighash_type`.
pub fn get_mpc_transaction(raw_hex: &str, signatures: &[String], is_bitcoin_cash: bool) -> Result<String> {
    let network = if is_bitcoin_cash { &BITCOIN_CASH } else { &BITCOIN };
    get_mpc_transaction_with_sighash(raw_hex, signatures, network, None)
}

/// Like [`get_mpc_transaction`], encoding every signature with
/// `sighash_type` (or the network default when `None`). Pass the same value
/// the template was built with.
pub fn get_mpc_transaction_with_sighash(
    raw_hex: &str,
    signatures: &[String],
    network: &NetworkParams,
    sighash_type: Option<u32>,
) -> Result<String> {
    let mut tx: Transaction = encode::deserialize(&hex::decode(raw_hex.trim())?)?;
    if signatures.len() != tx.input.len() {
        return Err(TxError::InvalidInput(format!(
            "{} signatures for {} inputs",
            signatures.len(),
            tx.input.len()
        )));
    }
    let ctx = SigningContext::new(network, Vec::new(), sighash_type);
    let ecdsa_type = ctx.ecdsa_sighash_type();
    let taproot_type = ctx.taproot_sighash_type()?;
    if network.is_bitcoin_cash() && ecdsa_type & SIGHASH_FORKID == 0 {
        return Err(TxError::InvalidInput(format!("sighash type 0x{:x} lacks FORKID", ecdsa_type)));
    }
    let secp = Secp256k1::new();

    for (index, signature) in signatures.iter().enumerate() {
        let shape = detect_spend(&tx.input[index]).ok_or_else(|| {
            TxError::InvalidInput(format!("input {} is not a placeholder spend", index))
        })?;
        if network.is_bitcoin_cash() && shape.address_type != AddressType::Legacy {
            return Err(TxError::UnsupportedAddressType(format!(
                "{} input {} on {}",
                shape.address_type, index, network.name
            )));
        }
        let pubkey = match shape.address_type {
            AddressType::Taproot => Vec::new(),
            address_type => {
                let pubkey = shape.public_key.unwrap_or_default();
                if pubkey.iter().all(|b| *b == 0) {
                    return Err(TxError::InvalidInput(format!(
                        "{} input {} has no public key in its placeholder",
                        address_type, index
                    )));
                }
                pubkey
            }
        };
        let raw = hex::decode(signature.trim())?;
        // The sighash is already folded into the external signature.
        let sig = produce_signature(
            &secp,
            SignatureSource::External(&raw),
            shape.address_type,
            &[0u8; 32],
            ecdsa_type,
            taproot_type,
        )?;
        assemble_input(&mut tx.input[index], shape.address_type, &sig, &pubkey)?;
        log::debug!("input {} ({}) completed with external signature", index, shape.address_type);
    }

    log::info!("assembled MPC transaction {}", tx.compute_txid());
    Ok(encode::serialize_hex(&tx))
}
