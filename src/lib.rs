//! Transaction building and signing for Bitcoin and its UTXO forks
//! (Bitcoin Cash, Litecoin, Dogecoin).

pub mod address;
pub mod api;
pub mod bip322;
pub mod config;
pub mod error;
pub mod fee;
pub mod keys;
pub mod message;
pub mod mpc;
pub mod network;
pub mod psbt;
pub mod sighash;
pub mod signer;
pub mod transaction;
pub mod types;
pub mod validator;

pub use error::{Result, TxError};
pub use network::NetworkParams;
pub use transaction::{BuildOptions, BuiltTransaction, SigningMode, TxBuilder};
pub use types::{AddressType, Destination, Memo, MemoPosition, Output, UnsignedInput};
