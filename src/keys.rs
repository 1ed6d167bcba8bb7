//! WIF private keys for any configured network.

use bitcoin::base58;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};
use bitcoin::CompressedPublicKey;

use crate::error::{Result, TxError};
use crate::network::NetworkParams;

/// A private key decoded from WIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifKey {
    pub secret: SecretKey,
    pub compressed: bool,
}

impl WifKey {
    pub fn public_key<C: Signing>(&self, secp: &Secp256k1<C>) -> PublicKey {
        PublicKey::from_secret_key(secp, &self.secret)
    }

    pub fn compressed_public_key<C: Signing>(&self, secp: &Secp256k1<C>) -> CompressedPublicKey {
        CompressedPublicKey(self.public_key(secp))
    }
}

pub fn decode_wif(wif: &str, network: &NetworkParams) -> Result<WifKey> {
    let payload = base58::decode_check(wif)
        .map_err(|e| TxError::InvalidInput(format!("invalid WIF encoding: {}", e)))?;
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == 0x01 => true,
        len => {
            return Err(TxError::InvalidInput(format!("invalid WIF payload length {}", len)));
        }
    };
    if payload[0] != network.wif {
        return Err(TxError::NetworkMismatch {
            expected: format!("{} (WIF version 0x{:02x})", network.name, network.wif),
            found: format!("WIF version 0x{:02x}", payload[0]),
        });
    }
    let secret = SecretKey::from_slice(&payload[1..33])?;
    Ok(WifKey { secret, compressed })
}

pub fn encode_wif(secret: &SecretKey, compressed: bool, network: &NetworkParams) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(network.wif);
    payload.extend_from_slice(&secret.secret_bytes());
    if compressed {
        payload.push(0x01);
    }
    base58::encode_check(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{BITCOIN, DOGECOIN, TESTNET};

    const MAINNET_WIF: &str = "KwTqEP5swztao5UdMWpxaAGtvmvQFjYGe1UDyrsZxjkLX9KVpN36";
    const TESTNET_WIF: &str = "cMpphJ5jP4aqxWwtjve5wUmxZ1DovBdxi3ch6HL5TrQLmtNDjuhj";

    #[test]
    fn decodes_compressed_mainnet_key() {
        let key = decode_wif(MAINNET_WIF, &BITCOIN).unwrap();
        assert!(key.compressed);
        let secp = Secp256k1::new();
        assert_eq!(
            hex::encode(key.compressed_public_key(&secp).to_bytes()),
            "03052b16e71e4413f24f8504c3b188b7edebf97b424582877e4993ef9b23d0f045"
        );
    }

    #[test]
    fn same_secret_reencodes_for_testnet() {
        let key = decode_wif(MAINNET_WIF, &BITCOIN).unwrap();
        assert_eq!(encode_wif(&key.secret, true, &TESTNET), TESTNET_WIF);
        assert_eq!(encode_wif(&key.secret, true, &BITCOIN), MAINNET_WIF);
    }

    #[test]
    fn wrong_network_is_rejected() {
        let err = decode_wif(TESTNET_WIF, &BITCOIN).unwrap_err();
        assert!(matches!(err, TxError::NetworkMismatch { .. }));
        assert!(matches!(
            decode_wif(MAINNET_WIF, &DOGECOIN),
            Err(TxError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn garbage_is_invalid_input() {
        assert!(matches!(decode_wif("not-a-key", &BITCOIN), Err(TxError::InvalidInput(_))));
    }
}
