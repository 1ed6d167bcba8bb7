use std::path::PathBuf;
use bitcoin::consensus::encode::Error as BitcoinEncodeError;
use bitcoin::psbt::Error as PsbtError;
use bitcoin::secp256k1::Error as SecpError;
use bitcoin::sighash::TaprootError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON file {file_path:?}: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("consensus encoding error: {0}")]
    BitcoinConsensus(#[from] BitcoinEncodeError),

    #[error("PSBT error: {0}")]
    Psbt(#[from] PsbtError),

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] SecpError),

    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(String),

    #[error("memo is {len} bytes, the limit is {max} bytes")]
    MemoTooLong { len: usize, max: usize },

    #[error("insufficient funds: {available} sats available, {required} sats required (fee {fee} sats)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("signature recovery failed: {0}")]
    SignatureRecovery(String),

    #[error("signature of input {input_index} does not match its sighash")]
    SighashMismatch { input_index: usize },

    #[error("network mismatch: expected {expected}, found {found}")]
    NetworkMismatch { expected: String, found: String },

    #[error("legacy sighash error (input {input_index}): {source}")]
    LegacySighash {
        input_index: usize,
        #[source]
        source: bitcoin::transaction::InputsIndexError,
    },

    #[error("taproot sighash error (input {input_index}): {source}")]
    TaprootSighash {
        input_index: usize,
        #[source]
        source: TaprootError,
    },
}

pub type Result<T> = std::result::Result<T, TxError>;
