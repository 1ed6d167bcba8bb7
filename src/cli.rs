use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Network: bitcoin, testnet, regtest, litecoin, dogecoin or bitcoincash
    #[clap(short, long, global = true, default_value = "testnet")]
    pub network: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and sign a transaction described by a JSON request file
    Build {
        #[clap(short, long, value_parser)]
        input_file: PathBuf,
        /// Also write the raw transaction (or PSBT in hardware mode) here
        #[clap(short, long, value_parser)]
        output_file: Option<PathBuf>,
    },
    /// Print the fee estimate for a JSON request file
    Estimate {
        #[clap(short, long, value_parser)]
        input_file: PathBuf,
    },
    /// Sign a message with a WIF key
    SignMessage {
        #[clap(long)]
        wif: String,
        #[clap(short, long)]
        message: String,
        /// Message prefix; defaults to the network's
        #[clap(long)]
        prefix: Option<String>,
    },
    /// Verify a message signature against an address or a public key
    VerifyMessage {
        #[clap(short, long)]
        message: String,
        #[clap(short, long)]
        signature: String,
        #[clap(long, conflicts_with = "public_key", required_unless_present = "public_key")]
        address: Option<String>,
        /// Hex public key, compressed or not
        #[clap(long)]
        public_key: Option<String>,
        #[clap(long)]
        prefix: Option<String>,
    },
    /// Produce a BIP322 proof for an address
    Bip322Sign {
        #[clap(long)]
        wif: String,
        #[clap(long)]
        address: String,
        #[clap(short, long)]
        message: String,
    },
    /// Check a BIP322 proof
    Bip322Verify {
        #[clap(long)]
        address: String,
        #[clap(short, long)]
        message: String,
        #[clap(short, long)]
        proof: String,
    },
    /// Validate the signatures of a signed transaction
    Validate {
        #[clap(short, long, value_parser)]
        input_file: PathBuf,
    },
    /// Complete a placeholder transaction with raw MPC signatures
    MpcAssemble {
        #[clap(long)]
        raw_tx: String,
        /// One hex `r || s` per input, in order
        #[clap(long, num_args = 1.., required = true)]
        signatures: Vec<String>,
        #[clap(long)]
        bitcoin_cash: bool,
    },
    /// Finalize a signed PSBT (base64 or hex) into a raw transaction
    FinalizePsbt {
        #[clap(short, long)]
        psbt: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn network_defaults_to_testnet() {
        let args = CliArgs::parse_from(["utxo-signer", "finalize-psbt", "--psbt", "cHNidP8="]);
        assert_eq!(args.network, "testnet");
        assert!(matches!(args.command, Command::FinalizePsbt { .. }));
    }

    #[test]
    fn mpc_takes_many_signatures() {
        let args = CliArgs::parse_from([
            "utxo-signer",
            "--network",
            "bitcoincash",
            "mpc-assemble",
            "--raw-tx",
            "00",
            "--signatures",
            "aa",
            "bb",
            "--bitcoin-cash",
        ]);
        match args.command {
            Command::MpcAssemble { signatures, bitcoin_cash, .. } => {
                assert_eq!(signatures, vec!["aa", "bb"]);
                assert!(bitcoin_cash);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn verify_message_needs_a_key_or_address() {
        let result = CliArgs::try_parse_from(["utxo-signer", "verify-message", "-m", "hi", "-s", "sig"]);
        assert!(result.is_err());
    }
}
