//! Per-chain constants for Bitcoin and its UTXO forks.
//!
//! A [`NetworkParams`] value is passed by reference through every call that
//! needs version bytes, HRPs or sighash flags. Nothing here is mutable.

use crate::error::{Result, TxError};
use crate::sighash::{SIGHASH_ALL, SIGHASH_FORKID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    /// Base58Check version byte of P2PKH addresses.
    pub pub_key_hash: u8,
    /// Base58Check version byte of P2SH addresses.
    pub script_hash: u8,
    /// Version byte of WIF-encoded private keys.
    pub wif: u8,
    /// Human readable part of segwit addresses; `None` on chains without segwit.
    pub bech32_hrp: Option<&'static str>,
    pub message_prefix: &'static str,
    /// Replay-protection fork id (Bitcoin Cash).
    pub fork_id: Option<u32>,
}

pub const BITCOIN: NetworkParams = NetworkParams {
    name: "bitcoin",
    pub_key_hash: 0x00,
    script_hash: 0x05,
    wif: 0x80,
    bech32_hrp: Some("bc"),
    message_prefix: "Bitcoin Signed Message:\n",
    fork_id: None,
};

pub const TESTNET: NetworkParams = NetworkParams {
    name: "testnet",
    pub_key_hash: 0x6f,
    script_hash: 0xc4,
    wif: 0xef,
    bech32_hrp: Some("tb"),
    message_prefix: "Bitcoin Signed Message:\n",
    fork_id: None,
};

pub const REGTEST: NetworkParams = NetworkParams {
    name: "regtest",
    pub_key_hash: 0x6f,
    script_hash: 0xc4,
    wif: 0xef,
    bech32_hrp: Some("bcrt"),
    message_prefix: "Bitcoin Signed Message:\n",
    fork_id: None,
};

pub const LITECOIN: NetworkParams = NetworkParams {
    name: "litecoin",
    pub_key_hash: 0x30,
    script_hash: 0x32,
    wif: 0xb0,
    bech32_hrp: Some("ltc"),
    message_prefix: "Litecoin Signed Message:\n",
    fork_id: None,
};

pub const DOGECOIN: NetworkParams = NetworkParams {
    name: "dogecoin",
    pub_key_hash: 0x1e,
    script_hash: 0x16,
    wif: 0x9e,
    bech32_hrp: None,
    message_prefix: "Dogecoin Signed Message:\n",
    fork_id: None,
};

pub const BITCOIN_CASH: NetworkParams = NetworkParams {
    name: "bitcoincash",
    pub_key_hash: 0x00,
    script_hash: 0x05,
    wif: 0x80,
    bech32_hrp: None,
    message_prefix: "Bitcoin Signed Message:\n",
    fork_id: Some(0),
};

impl NetworkParams {
    pub fn from_name(name: &str) -> Result<&'static NetworkParams> {
        match name.to_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(&BITCOIN),
            "testnet" => Ok(&TESTNET),
            "regtest" => Ok(&REGTEST),
            "litecoin" | "ltc" => Ok(&LITECOIN),
            "dogecoin" | "doge" => Ok(&DOGECOIN),
            "bitcoincash" | "bch" => Ok(&BITCOIN_CASH),
            other => Err(TxError::InvalidInput(format!("unknown network: {}", other))),
        }
    }

    pub fn is_bitcoin_cash(&self) -> bool {
        self.fork_id.is_some()
    }

    /// Segwit and taproot spends need a bech32 HRP and no fork id.
    pub fn supports_segwit(&self) -> bool {
        self.bech32_hrp.is_some() && self.fork_id.is_none()
    }

    /// Default ECDSA sighash type: `ALL`, or `ALL|FORKID` with the fork id in
    /// the upper bits on forked chains.
    pub fn default_sighash_type(&self) -> u32 {
        match self.fork_id {
            Some(fork_id) => SIGHASH_ALL | SIGHASH_FORKID | (fork_id << 8),
            None => SIGHASH_ALL,
        }
    }
}
