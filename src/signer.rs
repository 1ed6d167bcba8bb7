//! Signature production over a precomputed sighash.
//!
//! Signing is a pure function of `(hash, key)`. Where no local key exists the
//! signature comes from a [`SignatureSource::External`] `(r, s)` produced by
//! an MPC quorum. Size probing uses [`fake_sign`] instead of any signature.

use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{ecdsa, schnorr, Keypair, Message, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::TapSighashType;
use bitcoin::{ScriptBuf, Witness};

use crate::error::{Result, TxError};
use crate::transaction::spend_data;
use crate::types::AddressType;

/// Upper bound of a DER signature plus its sighash byte.
pub const PLACEHOLDER_ECDSA_LEN: usize = 72;
pub const SCHNORR_SIG_LEN: usize = 64;
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// DER-encoded low-S ECDSA signature followed by the sighash type byte.
pub fn sign_ecdsa<C: Signing>(
    secp: &Secp256k1<C>,
    hash: &[u8; 32],
    secret: &SecretKey,
    sighash_type: u32,
) -> Vec<u8> {
    let msg = Message::from_digest(*hash);
    let mut sig = secp.sign_ecdsa(&msg, secret);
    sig.normalize_s();
    encode_ecdsa(&sig, sighash_type)
}

fn encode_ecdsa(sig: &ecdsa::Signature, sighash_type: u32) -> Vec<u8> {
    let mut out = sig.serialize_der().to_vec();
    out.push(sighash_type as u8);
    out
}

/// BIP340 signature with the BIP86-tweaked key. No type byte for
/// `SIGHASH_DEFAULT`.
pub fn sign_schnorr<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    hash: &[u8; 32],
    secret: &SecretKey,
    sighash_type: TapSighashType,
) -> Vec<u8> {
    let keypair = Keypair::from_secret_key(secp, secret).tap_tweak(secp, None).to_keypair();
    let sig = secp.sign_schnorr_no_aux_rand(&Message::from_digest(*hash), &keypair);
    encode_schnorr(&sig, sighash_type)
}

fn encode_schnorr(sig: &schnorr::Signature, sighash_type: TapSighashType) -> Vec<u8> {
    let mut out = sig.serialize().to_vec();
    if sighash_type != TapSighashType::Default {
        out.push(sighash_type as u8);
    }
    out
}

/// Converts an external 64-byte `r || s` into the encoding a script expects.
pub fn ecdsa_from_raw(raw: &[u8], sighash_type: u32) -> Result<Vec<u8>> {
    let mut sig = ecdsa::Signature::from_compact(raw)?;
    sig.normalize_s();
    Ok(encode_ecdsa(&sig, sighash_type))
}

pub fn schnorr_from_raw(raw: &[u8], sighash_type: TapSighashType) -> Result<Vec<u8>> {
    if raw.len() != SCHNORR_SIG_LEN {
        return Err(TxError::InvalidInput(format!(
            "schnorr signature must be {} bytes, got {}",
            SCHNORR_SIG_LEN,
            raw.len()
        )));
    }
    let sig = schnorr::Signature::from_slice(raw)?;
    Ok(encode_schnorr(&sig, sighash_type))
}

/// Where an input's signature comes from.
#[derive(Debug, Clone, Copy)]
pub enum SignatureSource<'a> {
    LocalKey(&'a SecretKey),
    /// Raw 64-byte signature computed elsewhere over the same sighash.
    External(&'a [u8]),
}

/// Signature bytes for one input, encoded for its spend type.
pub fn produce_signature<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    source: SignatureSource<'_>,
    address_type: AddressType,
    hash: &[u8; 32],
    ecdsa_type: u32,
    taproot_type: TapSighashType,
) -> Result<Vec<u8>> {
    let taproot = address_type == AddressType::Taproot;
    let sig = match source {
        SignatureSource::LocalKey(secret) if taproot => sign_schnorr(secp, hash, secret, taproot_type),
        SignatureSource::LocalKey(secret) => sign_ecdsa(secp, hash, secret, ecdsa_type),
        SignatureSource::External(raw) if taproot => schnorr_from_raw(raw, taproot_type)?,
        SignatureSource::External(raw) => ecdsa_from_raw(raw, ecdsa_type)?,
    };
    Ok(sig)
}

/// Fixed-shape placeholder spend data for size estimation: zero bytes of the
/// longest signature. Uses `pubkey` when known so that the MPC assembler can
/// complete the result later. Never broadcast these.
pub fn fake_sign(
    address_type: AddressType,
    pubkey: Option<&[u8; COMPRESSED_PUBKEY_LEN]>,
) -> Result<(ScriptBuf, Witness)> {
    let zero_key = [0u8; COMPRESSED_PUBKEY_LEN];
    let pubkey = pubkey.unwrap_or(&zero_key);
    let sig_len = if address_type == AddressType::Taproot {
        SCHNORR_SIG_LEN
    } else {
        PLACEHOLDER_ECDSA_LEN
    };
    spend_data(address_type, &vec![0u8; sig_len], pubkey)
}
