//! BIP174 round trip for hardware signers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::psbt::{Input, Psbt};
use bitcoin::{Transaction, TxOut, XOnlyPublicKey};

use crate::address::nested_redeem_script;
use crate::error::{Result, TxError};
use crate::transaction::assemble_input;
use crate::types::{AddressType, PreparedInput};

/// PSBT for an unsigned transaction, with the metadata an external signer
/// needs for each input.
pub fn build_psbt(unsigned: Transaction, prepared: &[PreparedInput]) -> Result<Psbt> {
    let mut psbt = Psbt::from_unsigned_tx(unsigned)?;
    for (index, (psbt_input, input)) in psbt.inputs.iter_mut().zip(prepared).enumerate() {
        if input.address_type.has_witness() {
            psbt_input.witness_utxo = Some(input.prevout.clone());
        }
        match &input.non_witness_utxo {
            Some(prev_tx) => psbt_input.non_witness_utxo = Some(prev_tx.clone()),
            None if input.address_type == AddressType::Legacy => {
                log::warn!("input {}: legacy spend without previous transaction, signers may refuse it", index);
            }
            None => {}
        }
        if let Some(pubkey) = &input.public_key {
            match input.address_type {
                AddressType::SegwitNested => psbt_input.redeem_script = Some(nested_redeem_script(pubkey)),
                AddressType::Taproot => psbt_input.tap_internal_key = Some(XOnlyPublicKey::from(pubkey.0)),
                _ => {}
            }
        }
    }
    Ok(psbt)
}

pub fn encode_psbt(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}

/// Accepts base64 or hex.
pub fn decode_psbt(encoded: &str) -> Result<Psbt> {
    let encoded = encoded.trim();
    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(b64_err) => hex::decode(encoded).map_err(|_| TxError::Base64(b64_err))?,
    };
    Ok(Psbt::deserialize(&bytes)?)
}

fn input_prevout(psbt: &Psbt, index: usize, input: &Input) -> Result<TxOut> {
    if let Some(utxo) = &input.witness_utxo {
        return Ok(utxo.clone());
    }
    if let Some(prev_tx) = &input.non_witness_utxo {
        let vout = psbt.unsigned_tx.input[index].previous_output.vout as usize;
        return prev_tx.output.get(vout).cloned().ok_or_else(|| {
            TxError::InvalidInput(format!("input {}: previous transaction has no output {}", index, vout))
        });
    }
    Err(TxError::InvalidInput(format!("input {} carries no previous output", index)))
}

/// Previous outputs of every input, from `witness_utxo` or `non_witness_utxo`.
pub fn psbt_prevouts(psbt: &Psbt) -> Result<Vec<TxOut>> {
    psbt.inputs
        .iter()
        .enumerate()
        .map(|(index, input)| input_prevout(psbt, index, input))
        .collect()
}

/// Turns a signed PSBT into a network transaction. Inputs that are already
/// final keep their scripts; the rest are assembled from `partial_sigs` or
/// `tap_key_sig`.
pub fn finalize_psbt(psbt: &Psbt) -> Result<Transaction> {
    let mut tx = psbt.unsigned_tx.clone();
    for (index, input) in psbt.inputs.iter().enumerate() {
        if input.final_script_sig.is_some() || input.final_script_witness.is_some() {
            tx.input[index].script_sig = input.final_script_sig.clone().unwrap_or_default();
            tx.input[index].witness = input.final_script_witness.clone().unwrap_or_default();
            continue;
        }
        let prevout = input_prevout(psbt, index, input)?;
        let address_type = AddressType::from_script(&prevout.script_pubkey)?;
        if address_type == AddressType::Taproot {
            let sig = input
                .tap_key_sig
                .ok_or_else(|| TxError::InvalidInput(format!("input {} has no taproot signature", index)))?;
            assemble_input(&mut tx.input[index], address_type, &sig.to_vec(), &[])?;
            continue;
        }
        let (pubkey, sig) = input
            .partial_sigs
            .iter()
            .next()
            .ok_or_else(|| TxError::InvalidInput(format!("input {} has no partial signature", index)))?;
        if !pubkey.compressed {
            return Err(TxError::InvalidInput(format!("input {} is signed by an uncompressed key", index)));
        }
        assemble_input(&mut tx.input[index], address_type, &sig.to_vec(), &pubkey.to_bytes())?;
        log::debug!("input {} finalized as {}", index, address_type);
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::encode::serialize_hex;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::sighash::TapSighashType;
    use bitcoin::{ecdsa, taproot, CompressedPublicKey, PublicKey};

    use super::*;
    use crate::keys::decode_wif;
    use crate::network::BITCOIN;
    use crate::signer::{sign_ecdsa, sign_schnorr};
    use crate::transaction::{BuildOptions, TxBuilder};
    use crate::types::{Output, UnsignedInput};

    const WIF: &str = "KwTqEP5swztao5UdMWpxaAGtvmvQFjYGe1UDyrsZxjkLX9KVpN36";
    const ADDRESSES: [&str; 4] = [
        "1GhLyRg4zzFixW3ZY5ViFzT4W5zTT9h7Pc",
        "3FAS9ewd56NoQkZCccAJonDyTkubU87qrt",
        "bc1q4s4n983qnlhppajgn8enmgn4dts7g3c74jnwpd",
        "bc1ptdyzxxmr4qm6cvgdug5u9n0ns8fdjr3m294y7ec5nffhuz3pnk3s6upms2",
    ];

    fn key() -> SecretKey {
        decode_wif(WIF, &BITCOIN).unwrap().secret
    }

    fn builder(pubkey: CompressedPublicKey, with_previous_tx: bool) -> TxBuilder<'static> {
        let mut builder = TxBuilder::new(&BITCOIN);
        for (i, addr) in ADDRESSES.iter().enumerate() {
            let txid = format!("{:x}", i + 1).repeat(64);
            let mut input = UnsignedInput::from_hex_txid(&txid, i as u32, 100_000, *addr)
                .unwrap()
                .with_public_key(pubkey);
            if i == 0 && with_previous_tx {
                let funding = Transaction {
                    version: bitcoin::transaction::Version(2),
                    lock_time: bitcoin::absolute::LockTime::ZERO,
                    input: vec![],
                    output: vec![TxOut {
                        value: bitcoin::Amount::from_sat(100_000),
                        script_pubkey: input.source.script_pubkey(&BITCOIN).unwrap(),
                    }],
                };
                input.txid = funding.compute_txid();
                input.vout = 0;
                input = input.with_previous_transaction(funding);
            }
            builder.add_input(input);
        }
        builder.add_output(Output::new(ADDRESSES[2], 390_000));
        builder
    }

    #[test]
    fn hardware_round_trip_equals_local_signing() {
        let secp = Secp256k1::new();
        let pubkey = CompressedPublicKey(key().public_key(&secp));
        let builder = builder(pubkey, true);
        let hardware = builder.build(&BuildOptions::hardware()).unwrap();

        // What a hardware signer would send back.
        let mut psbt = decode_psbt(&hardware.psbt_base64().unwrap()).unwrap();
        for (index, hash) in hardware.sighashes.iter().enumerate() {
            if hardware.address_types[index] == AddressType::Taproot {
                let sig = sign_schnorr(&secp, hash, &key(), TapSighashType::Default);
                psbt.inputs[index].tap_key_sig = Some(taproot::Signature::from_slice(&sig).unwrap());
            } else {
                let sig = sign_ecdsa(&secp, hash, &key(), 0x01);
                psbt.inputs[index]
                    .partial_sigs
                    .insert(PublicKey::new(pubkey.0), ecdsa::Signature::from_slice(&sig).unwrap());
            }
        }
        assert_eq!(psbt.inputs[1].redeem_script, Some(nested_redeem_script(&pubkey)));
        assert!(psbt.inputs[3].tap_internal_key.is_some());
        assert!(psbt.inputs[0].witness_utxo.is_none());
        assert!(psbt.inputs[0].non_witness_utxo.is_some());

        let finalized = finalize_psbt(&psbt).unwrap();
        let local = builder.build(&BuildOptions::local(key())).unwrap();
        assert_eq!(serialize_hex(&finalized), local.to_hex());
    }

    #[test]
    fn decode_accepts_hex_and_base64() {
        let pubkey = CompressedPublicKey(key().public_key(&Secp256k1::new()));
        let built = builder(pubkey, true).build(&BuildOptions::hardware()).unwrap();
        let psbt = built.psbt.unwrap();
        let from_hex = decode_psbt(&hex::encode(psbt.serialize())).unwrap();
        assert_eq!(from_hex, psbt);
        assert!(decode_psbt("not a psbt").is_err());
    }

    #[test]
    fn legacy_prevout_needs_previous_transaction() {
        let pubkey = CompressedPublicKey(key().public_key(&Secp256k1::new()));
        let psbt = builder(pubkey, false).build(&BuildOptions::hardware()).unwrap().psbt.unwrap();
        assert!(psbt_prevouts(&psbt).is_err());
        assert!(matches!(finalize_psbt(&psbt), Err(TxError::InvalidInput(_))));
    }
}
