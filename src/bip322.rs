//! BIP322 generic message signing.
//!
//! A proof is a signature over a virtual `to_sign` transaction that spends a
//! virtual `to_spend` output paying the signing address. Both are built and
//! signed with the same machinery as real transactions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::{sha256, Hash};
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::opcodes::OP_0;
use bitcoin::script::Builder;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::address::script_pubkey_for_address;
use crate::error::{Result, TxError};
use crate::keys::decode_wif;
use crate::network::NetworkParams;
use crate::transaction::{BuildOptions, TxBuilder};
use crate::types::{AddressType, Destination, Output, UnsignedInput};
use crate::validator::validate_transaction;

const MESSAGE_TAG: &[u8] = b"BIP0322-signed-message";

/// Tagged hash of the message under `BIP0322-signed-message`.
pub fn message_hash(message: &str) -> [u8; 32] {
    let tag = sha256::Hash::hash(MESSAGE_TAG);
    let mut data = Vec::with_capacity(64 + message.len());
    data.extend_from_slice(tag.as_byte_array());
    data.extend_from_slice(tag.as_byte_array());
    data.extend_from_slice(message.as_bytes());
    sha256::Hash::hash(&data).to_byte_array()
}

pub fn create_to_spend(script_pubkey: &Script, message: &str) -> Transaction {
    let script_sig = Builder::new()
        .push_opcode(OP_0)
        .push_slice(message_hash(message))
        .into_script();
    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut { value: Amount::ZERO, script_pubkey: script_pubkey.to_owned() }],
    }
}

fn op_return() -> ScriptBuf {
    Builder::new().push_opcode(OP_RETURN).into_script()
}

/// Unsigned `to_sign` spending output 0 of `to_spend`.
pub fn create_to_sign(to_spend: &Transaction) -> Transaction {
    Transaction {
        version: Version(0),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint { txid: to_spend.compute_txid(), vout: 0 },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut { value: Amount::ZERO, script_pubkey: op_return() }],
    }
}

/// Base64 proof that the owner of `wif` controls `address`. Witness-only
/// spends yield the simple encoding (the witness); legacy and nested spends
/// need a scriptSig and yield the full `to_sign` transaction.
pub fn sign(wif: &str, address: &str, message: &str, network: &NetworkParams) -> Result<String> {
    let key = decode_wif(wif, network)?;
    let script_pubkey = script_pubkey_for_address(address, network)?;
    let address_type = AddressType::from_script(&script_pubkey)?;
    let to_spend = create_to_spend(&script_pubkey, message);

    let mut builder = TxBuilder::new(network);
    builder
        .set_version(0)
        .add_input(
            UnsignedInput::new(to_spend.compute_txid(), 0, 0, Destination::Script(script_pubkey))
                .with_private_key(key.secret)
                .with_sequence(0),
        )
        .add_output(Output::new(op_return(), 0));
    let built = builder.build(&BuildOptions::default())?;
    log::info!("BIP322 proof for {} ({})", address, address_type);

    let proof = match address_type {
        AddressType::SegwitNative | AddressType::Taproot => serialize(&built.transaction.input[0].witness),
        AddressType::Legacy | AddressType::SegwitNested => serialize(&built.transaction),
    };
    Ok(STANDARD.encode(proof))
}

/// Checks a simple or full proof for `address`. An unparseable proof is an
/// error; a proof that does not verify is `false`.
pub fn verify(address: &str, message: &str, proof_b64: &str, network: &NetworkParams) -> Result<bool> {
    let script_pubkey = script_pubkey_for_address(address, network)?;
    let to_spend = create_to_spend(&script_pubkey, message);
    let bytes = STANDARD.decode(proof_b64.trim())?;

    let to_sign = if let Ok(witness) = deserialize::<Witness>(&bytes) {
        let mut to_sign = create_to_sign(&to_spend);
        to_sign.input[0].witness = witness;
        to_sign
    } else {
        let to_sign: Transaction = deserialize(&bytes)
            .map_err(|e| TxError::InvalidInput(format!("proof is neither a witness nor a transaction: {}", e)))?;
        let expected = create_to_sign(&to_spend);
        let shape_matches = to_sign.input.len() == 1
            && to_sign.input[0].previous_output == expected.input[0].previous_output
            && to_sign.output == expected.output;
        if !shape_matches {
            log::debug!("full proof does not spend the to_spend output of {}", address);
            return Ok(false);
        }
        to_sign
    };

    let verdicts = validate_transaction(&to_sign, Some(to_spend.output.as_slice()), network)?;
    Ok(verdicts.first().copied().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use bitcoin::secp256k1::Secp256k1;

    use super::*;
    use crate::address::address_from_public_key;
    use crate::network::BITCOIN;

    const WIF: &str = "L3VFeEujGtevx9w18HD1fhRbCH67Az2dpCymeRE1SoPK6XQtaN2k";
    const ADDRESS: &str = "bc1q9vza2e8x573nczrlzms0wvx3gsqjx7vavgkx0l";
    const EMPTY_PROOF: &str = "AkgwRQIhAPkJ1Q4oYS0htvyuSFHLxRQpFAY56b70UvE7Dxazen0ZAiAtZfFz1S6T6I23MWI2lK/pcNTWncuyL8UL+oMdydVgzAEhAsfxIAMZZEKUPYWI4BruhAQjzFT8FSFSajuFwrDL1Yhy";
    const HELLO_PROOF: &str = "AkgwRQIhAOzyynlqt93lOKJr+wmmxIens//zPzl9tqIOua93wO6MAiBi5n5EyAcPScOjf1lAqIUIQtr3zKNeavYabHyR8eGhowEhAsfxIAMZZEKUPYWI4BruhAQjzFT8FSFSajuFwrDL1Yhy";

    #[test]
    fn message_hashes() {
        assert_eq!(
            hex::encode(message_hash("")),
            "c90c269c4f8fcbe6880f72a721ddfbf1914268a794cbb21cfafee13770ae19f1"
        );
        assert_eq!(
            hex::encode(message_hash("Hello World")),
            "f0eb03b1a75ac6d9847f55c624a99169b5dccba2a31f5b23bea77ba270de0a7a"
        );
    }

    #[test]
    fn virtual_transaction_ids() {
        let script = script_pubkey_for_address(ADDRESS, &BITCOIN).unwrap();
        let cases = [
            (
                "",
                "c5680aa69bb8d860bf82d4e9cd3504b55dde018de765a91bb566283c545a99a7",
                "1e9654e951a5ba44c8604c4de6c67fd78a27e81dcadcfe1edf638ba3aaebaed6",
            ),
            (
                "Hello World",
                "b79d196740ad5217771c1098fc4a4b51e0535c32236c71f1ea4d61a2d603352b",
                "88737ae86f2077145f93cc4b153ae9a1cb8d56afa511988c149c5c8c9d93bddf",
            ),
        ];
        for (message, to_spend_id, to_sign_id) in cases {
            let to_spend = create_to_spend(&script, message);
            assert_eq!(to_spend.compute_txid().to_string(), to_spend_id);
            assert_eq!(create_to_sign(&to_spend).compute_txid().to_string(), to_sign_id);
        }
    }

    #[test]
    fn simple_proofs_match_published_vectors() {
        assert_eq!(sign(WIF, ADDRESS, "", &BITCOIN).unwrap(), EMPTY_PROOF);
        assert_eq!(sign(WIF, ADDRESS, "Hello World", &BITCOIN).unwrap(), HELLO_PROOF);
    }

    #[test]
    fn published_proofs_verify() {
        assert!(verify(ADDRESS, "", EMPTY_PROOF, &BITCOIN).unwrap());
        assert!(verify(ADDRESS, "Hello World", HELLO_PROOF, &BITCOIN).unwrap());
        assert!(!verify(ADDRESS, "Hello World", EMPTY_PROOF, &BITCOIN).unwrap());
        assert!(verify(ADDRESS, "", "////", &BITCOIN).is_err());
    }

    #[test]
    fn every_address_type_round_trips() {
        let secp = Secp256k1::new();
        let key = decode_wif(WIF, &BITCOIN).unwrap();
        for address_type in AddressType::ALL {
            let address =
                address_from_public_key(&secp, &key.compressed_public_key(&secp), address_type, &BITCOIN).unwrap();
            let proof = sign(WIF, &address, "Hello World", &BITCOIN).unwrap();
            assert!(verify(&address, "Hello World", &proof, &BITCOIN).unwrap(), "{}", address_type);
            assert!(!verify(&address, "Hello", &proof, &BITCOIN).unwrap(), "{}", address_type);
        }
    }

    #[test]
    fn signing_for_someone_elses_address_fails() {
        let other = "1GhLyRg4zzFixW3ZY5ViFzT4W5zTT9h7Pc";
        assert!(matches!(sign(WIF, other, "Hello World", &BITCOIN), Err(TxError::InvalidInput(_))));
    }
}
