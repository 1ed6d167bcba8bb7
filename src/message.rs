//! Signed messages: magic-hash scheme with BIP137 recovery headers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::{CompressedPublicKey, ScriptBuf};

use crate::address::{classify, script_pubkey_for_address, script_pubkey_for_key};
use crate::error::{Result, TxError};
use crate::keys::decode_wif;
use crate::network::NetworkParams;
use crate::types::AddressType;

const SIGNATURE_LEN: usize = 65;
const HEADER_UNCOMPRESSED: u8 = 27;
const HEADER_COMPRESSED: u8 = 31;
const HEADER_SEGWIT_NESTED: u8 = 35;
const HEADER_SEGWIT_NATIVE: u8 = 39;

/// `sha256d(varint(len(prefix)) || prefix || varint(len(message)) || message)`
pub fn magic_hash(message: &str, prefix: &str) -> [u8; 32] {
    let mut data = Vec::with_capacity(prefix.len() + message.len() + 18);
    data.extend(serialize(&VarInt(prefix.len() as u64)));
    data.extend_from_slice(prefix.as_bytes());
    data.extend(serialize(&VarInt(message.len() as u64)));
    data.extend_from_slice(message.as_bytes());
    sha256d::Hash::hash(&data).to_byte_array()
}

/// Recovery id and key compression encoded in a BIP137 header byte.
fn decode_header(header: u8) -> Result<(RecoveryId, bool)> {
    let (base, compressed) = match header {
        27..=30 => (HEADER_UNCOMPRESSED, false),
        31..=34 => (HEADER_COMPRESSED, true),
        35..=38 => (HEADER_SEGWIT_NESTED, true),
        39..=42 => (HEADER_SEGWIT_NATIVE, true),
        other => {
            return Err(TxError::InvalidInput(format!("invalid signature header {}", other)));
        }
    };
    Ok((RecoveryId::from_i32((header - base) as i32)?, compressed))
}

fn encode_signature(header_base: u8, recovery_id: RecoveryId, compact: &[u8; 64]) -> String {
    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.push(header_base + recovery_id.to_i32() as u8);
    out.extend_from_slice(compact);
    STANDARD.encode(out)
}

/// Signs `message` with a WIF key. `prefix` defaults to the network's.
pub fn sign_message(wif: &str, message: &str, network: &NetworkParams, prefix: Option<&str>) -> Result<String> {
    let key = decode_wif(wif, network)?;
    let hash = magic_hash(message, prefix.unwrap_or(network.message_prefix));
    let secp = Secp256k1::signing_only();
    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&Message::from_digest(hash), &key.secret)
        .serialize_compact();
    let header_base = if key.compressed { HEADER_COMPRESSED } else { HEADER_UNCOMPRESSED };
    Ok(encode_signature(header_base, recovery_id, &compact))
}

/// Public key that produced `signature_b64` over `message`, and whether the
/// header marks it compressed.
fn recover(message: &str, signature_b64: &str, prefix: &str) -> Result<(PublicKey, bool)> {
    let raw = STANDARD.decode(signature_b64.trim())?;
    if raw.len() != SIGNATURE_LEN {
        return Err(TxError::InvalidInput(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            raw.len()
        )));
    }
    let (recovery_id, compressed) = decode_header(raw[0])?;
    let sig = RecoverableSignature::from_compact(&raw[1..], recovery_id)?;
    let hash = magic_hash(message, prefix);
    let pubkey = Secp256k1::verification_only()
        .recover_ecdsa(&Message::from_digest(hash), &sig)
        .map_err(|e| TxError::SignatureRecovery(e.to_string()))?;
    Ok((pubkey, compressed))
}

/// True when the signature recovers to exactly `public_key` (33 or 65 bytes).
/// Malformed keys or signatures are errors; a different signer is `false`.
pub fn verify_message(public_key: &[u8], message: &str, signature_b64: &str, prefix: &str) -> Result<bool> {
    let expected = bitcoin::PublicKey::from_slice(public_key)
        .map_err(|e| TxError::InvalidInput(format!("invalid public key: {}", e)))?;
    let (recovered, compressed) = recover(message, signature_b64, prefix)?;
    let recovered = bitcoin::PublicKey { inner: recovered, compressed };
    Ok(recovered.to_bytes() == expected.to_bytes())
}

/// True when the signature was made by the key behind `address`. The
/// recovered key is turned into an address of the same type as `address`.
pub fn verify_message_with_address(
    address: &str,
    message: &str,
    signature_b64: &str,
    network: &NetworkParams,
    prefix: Option<&str>,
) -> Result<bool> {
    let (recovered, compressed) = recover(message, signature_b64, prefix.unwrap_or(network.message_prefix))?;
    let expected = match script_pubkey_for_address(address, network) {
        Ok(script) => script,
        Err(e) => {
            log::debug!("cannot decode {}: {}", address, e);
            return Ok(false);
        }
    };
    let address_type = classify(address, network);
    let candidate = if compressed {
        let secp = Secp256k1::verification_only();
        script_pubkey_for_key(&secp, &CompressedPublicKey(recovered), address_type)
    } else if address_type == AddressType::Legacy {
        ScriptBuf::new_p2pkh(&bitcoin::PublicKey::new_uncompressed(recovered).pubkey_hash())
    } else {
        return Ok(false);
    };
    Ok(candidate == expected)
}

/// Turns a raw `r || s` from an MPC signer into a message signature by
/// trying each recovery id against the known compressed public key.
pub fn get_mpc_signed_message(hash_hex: &str, raw_sig_hex: &str, public_key: &[u8]) -> Result<String> {
    let hash: [u8; 32] = hex::decode(hash_hex)?
        .try_into()
        .map_err(|_| TxError::InvalidInput("message hash must be 32 bytes".to_string()))?;
    let raw: [u8; 64] = hex::decode(raw_sig_hex)?
        .try_into()
        .map_err(|_| TxError::InvalidInput("raw signature must be 64 bytes".to_string()))?;
    let expected = CompressedPublicKey::from_slice(public_key)
        .map_err(|e| TxError::InvalidInput(format!("invalid public key: {}", e)))?;

    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest(hash);
    for id in 0..4 {
        let recovery_id = RecoveryId::from_i32(id)?;
        let Ok(sig) = RecoverableSignature::from_compact(&raw, recovery_id) else {
            continue;
        };
        match secp.recover_ecdsa(&msg, &sig) {
            Ok(pubkey) if pubkey == expected.0 => {
                log::debug!("MPC signature matches with recovery id {}", id);
                return Ok(encode_signature(HEADER_COMPRESSED, recovery_id, &raw));
            }
            _ => continue,
        }
    }
    Err(TxError::SignatureRecovery(format!(
        "no recovery id yields public key {}",
        hex::encode(public_key)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::address_from_public_key;
    use crate::keys::encode_wif;
    use crate::network::{BITCOIN, DOGECOIN};

    const WIF: &str = "KwTqEP5swztao5UdMWpxaAGtvmvQFjYGe1UDyrsZxjkLX9KVpN36";
    const PUBKEY: &str = "03052b16e71e4413f24f8504c3b188b7edebf97b424582877e4993ef9b23d0f045";
    const HELLO_SIG: &str = "IINJ7RyvLle3ydIeQXs8L4NoXL/abbhAAMIn6sGFunmGR43fUdaqBm/nw9qFn48xuyLl40G6abLWmD9p0VB1I6s=";
    const BITCOIN_PREFIX: &str = "Bitcoin Signed Message:\n";

    fn with_header(sig_b64: &str, base: u8) -> String {
        let mut raw = STANDARD.decode(sig_b64).unwrap();
        raw[0] = base + (raw[0] - HEADER_COMPRESSED);
        STANDARD.encode(raw)
    }

    #[test]
    fn magic_hash_vectors() {
        assert_eq!(
            hex::encode(magic_hash("Hello World", BITCOIN_PREFIX)),
            "a7af0baad5ae99b97fc69b3a0d1abcf3ef17f131cc4776e1bc11933ec8550f49"
        );
        assert_eq!(
            hex::encode(magic_hash("Hello World", DOGECOIN.message_prefix)),
            "4f3cd5faf2618acd18b62736aaa83b6f31d2f29519f7152aa9b84bd70565e8d4"
        );
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(sign_message(WIF, "Hello World", &BITCOIN, None).unwrap(), HELLO_SIG);
    }

    #[test]
    fn verify_by_public_key() {
        let pubkey = hex::decode(PUBKEY).unwrap();
        assert!(verify_message(&pubkey, "Hello World", HELLO_SIG, BITCOIN_PREFIX).unwrap());
        assert!(!verify_message(&pubkey, "Hello World!", HELLO_SIG, BITCOIN_PREFIX).unwrap());
        assert!(verify_message(&pubkey, "Hello World", "not base64!", BITCOIN_PREFIX).is_err());
        assert!(verify_message(&[2u8; 10], "Hello World", HELLO_SIG, BITCOIN_PREFIX).is_err());
    }

    #[test]
    fn verify_by_address_for_every_type() {
        let secp = Secp256k1::new();
        let pubkey = CompressedPublicKey::from_slice(&hex::decode(PUBKEY).unwrap()).unwrap();
        for address_type in AddressType::ALL {
            let address = address_from_public_key(&secp, &pubkey, address_type, &BITCOIN).unwrap();
            assert!(
                verify_message_with_address(&address, "Hello World", HELLO_SIG, &BITCOIN, None).unwrap(),
                "{}",
                address_type
            );
            assert!(!verify_message_with_address(&address, "Hello", HELLO_SIG, &BITCOIN, None).unwrap());
        }
    }

    #[test]
    fn segwit_headers_are_accepted() {
        let native = "bc1q4s4n983qnlhppajgn8enmgn4dts7g3c74jnwpd";
        let nested = "3FAS9ewd56NoQkZCccAJonDyTkubU87qrt";
        let sig39 = with_header(HELLO_SIG, HEADER_SEGWIT_NATIVE);
        let sig35 = with_header(HELLO_SIG, HEADER_SEGWIT_NESTED);
        assert!(verify_message_with_address(native, "Hello World", &sig39, &BITCOIN, None).unwrap());
        assert!(verify_message_with_address(nested, "Hello World", &sig35, &BITCOIN, None).unwrap());
        let bad = with_header(HELLO_SIG, 43);
        assert!(verify_message_with_address(native, "Hello World", &bad, &BITCOIN, None).is_err());
    }

    #[test]
    fn uncompressed_key_signs_for_uncompressed_address() {
        let key = decode_wif(WIF, &BITCOIN).unwrap();
        let wif = encode_wif(&key.secret, false, &BITCOIN);
        let sig = sign_message(&wif, "Hello World", &BITCOIN, None).unwrap();
        let header = STANDARD.decode(&sig).unwrap()[0];
        assert!((27..=30).contains(&header));

        let secp = Secp256k1::new();
        let uncompressed = bitcoin::PublicKey::new_uncompressed(key.public_key(&secp));
        let script = ScriptBuf::new_p2pkh(&uncompressed.pubkey_hash());
        let address = crate::address::address_from_script(&script, &BITCOIN).unwrap();
        assert!(verify_message_with_address(&address, "Hello World", &sig, &BITCOIN, None).unwrap());
        assert!(!verify_message_with_address(
            "1GhLyRg4zzFixW3ZY5ViFzT4W5zTT9h7Pc",
            "Hello World",
            &sig,
            &BITCOIN,
            None
        )
        .unwrap());
    }

    #[test]
    fn mpc_signature_is_completed_with_recovery_id() {
        let raw = STANDARD.decode(HELLO_SIG).unwrap();
        let hash = hex::encode(magic_hash("Hello World", BITCOIN_PREFIX));
        let pubkey = hex::decode(PUBKEY).unwrap();
        let sig = get_mpc_signed_message(&hash, &hex::encode(&raw[1..]), &pubkey).unwrap();
        assert_eq!(sig, HELLO_SIG);

        let other = hex::decode("02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5").unwrap();
        assert!(matches!(
            get_mpc_signed_message(&hash, &hex::encode(&raw[1..]), &other),
            Err(TxError::SignatureRecovery(_))
        ));
    }

    #[test]
    fn dogecoin_uses_its_own_prefix() {
        let secp = Secp256k1::new();
        let key = decode_wif(WIF, &BITCOIN).unwrap();
        let doge_wif = encode_wif(&key.secret, true, &DOGECOIN);
        let sig = sign_message(&doge_wif, "Hello World", &DOGECOIN, None).unwrap();
        let address =
            address_from_public_key(&secp, &key.compressed_public_key(&secp), AddressType::Legacy, &DOGECOIN)
                .unwrap();
        assert!(verify_message_with_address(&address, "Hello World", &sig, &DOGECOIN, None).unwrap());
        assert!(!verify_message_with_address(&address, "Hello World", HELLO_SIG, &DOGECOIN, None).unwrap());
    }
}
