use std::fs::File;
use std::io::Write;
use std::path::Path;

use bitcoin::consensus::encode;
use clap::Parser;

use utxo_signer::config::{load_json, resolve_network, BuildConfig, ValidateConfig};
use utxo_signer::error::{Result, TxError};
use utxo_signer::network::NetworkParams;
use utxo_signer::{api, bip322, fee, message, mpc, psbt};

mod cli;

use cli::{CliArgs, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("starting with network {}", args.network);

    let output = run(args).await.map_err(|e| {
        log::error!("{}", e);
        e
    })?;
    println!("{}", output);
    Ok(())
}

async fn run(args: CliArgs) -> Result<String> {
    match args.command {
        Command::Build { input_file, output_file } => {
            let config: BuildConfig = load_json(&input_file)?;
            let network = resolve_network(config.network.as_deref(), &args.network)?;
            let result = build(&config, network).await?;
            if let Some(path) = output_file {
                write_output(&path, &result)?;
            }
            Ok(result)
        }
        Command::Estimate { input_file } => {
            let config: BuildConfig = load_json(&input_file)?;
            let network = resolve_network(config.network.as_deref(), &args.network)?;
            let estimate = fee::calculate_tx_size(&config.fee_request(network)?)?;
            serde_json::to_string_pretty(&estimate).map_err(|e| TxError::InvalidInput(e.to_string()))
        }
        Command::SignMessage { wif, message, prefix } => {
            let network = NetworkParams::from_name(&args.network)?;
            api::sign_message(&wif, &message, network, prefix.as_deref()).await
        }
        Command::VerifyMessage { message, signature, address, public_key, prefix } => {
            let network = NetworkParams::from_name(&args.network)?;
            let valid = match (address, public_key) {
                (Some(address), _) => {
                    message::verify_message_with_address(&address, &message, &signature, network, prefix.as_deref())?
                }
                (None, Some(public_key)) => message::verify_message(
                    &hex::decode(public_key)?,
                    &message,
                    &signature,
                    prefix.as_deref().unwrap_or(network.message_prefix),
                )?,
                (None, None) => {
                    return Err(TxError::InvalidInput("an address or a public key is required".to_string()));
                }
            };
            Ok(valid.to_string())
        }
        Command::Bip322Sign { wif, address, message } => {
            let network = NetworkParams::from_name(&args.network)?;
            bip322::sign(&wif, &address, &message, network)
        }
        Command::Bip322Verify { address, message, proof } => {
            let network = NetworkParams::from_name(&args.network)?;
            Ok(bip322::verify(&address, &message, &proof, network)?.to_string())
        }
        Command::Validate { input_file } => {
            let config: ValidateConfig = load_json(&input_file)?;
            let network = resolve_network(config.network.as_deref(), &args.network)?;
            let inputs = config.inputs(network)?;
            let verdicts = api::validate(&config.signed_tx_hex, inputs.as_deref(), Some(network)).await?;
            Ok(verdicts.iter().map(bool::to_string).collect::<Vec<_>>().join(" "))
        }
        Command::MpcAssemble { raw_tx, signatures, bitcoin_cash } => {
            mpc::get_mpc_transaction(&raw_tx, &signatures, bitcoin_cash)
        }
        Command::FinalizePsbt { psbt } => {
            let psbt = psbt::decode_psbt(&psbt)?;
            Ok(encode::serialize_hex(&psbt::finalize_psbt(&psbt)?))
        }
    }
}

/// Raw hex when signed, base64 PSBT in hardware mode.
async fn build(config: &BuildConfig, network: &NetworkParams) -> Result<String> {
    let request = config.fee_request(network)?;
    let (estimate, built) = api::build_with_change(&request, &config.build_options(network)?).await?;
    log::info!("fee {} sats, change {:?}", estimate.fee, estimate.change);
    match built.psbt_base64() {
        Some(psbt) => Ok(psbt),
        None => Ok(built.to_hex()),
    }
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        log::error!("failed to create {:?}", path);
        TxError::Io(e)
    })?;
    file.write_all(content.as_bytes()).map_err(|e| {
        log::error!("failed to write {:?}", path);
        TxError::Io(e)
    })?;
    log::info!("saved to {:?}", path);
    Ok(())
}
