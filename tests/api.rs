use bitcoin::secp256k1::Secp256k1;

use utxo_signer::fee::FeeRequest;
use utxo_signer::keys::decode_wif;
use utxo_signer::network::{BITCOIN, DOGECOIN};
use utxo_signer::{api, BuildOptions, Output, TxBuilder, TxError, UnsignedInput};

const WIF: &str = "KwTqEP5swztao5UdMWpxaAGtvmvQFjYGe1UDyrsZxjkLX9KVpN36";
const NATIVE: &str = "bc1q4s4n983qnlhppajgn8enmgn4dts7g3c74jnwpd";
const LEGACY: &str = "1GhLyRg4zzFixW3ZY5ViFzT4W5zTT9h7Pc";

fn request() -> FeeRequest<'static> {
    let mut request = FeeRequest::new(&BITCOIN, 5.0);
    request.inputs = vec![
        UnsignedInput::from_hex_txid(&"0a".repeat(32), 0, 60_000, NATIVE).unwrap(),
        UnsignedInput::from_hex_txid(&"0b".repeat(32), 1, 40_000, LEGACY).unwrap(),
    ];
    request.outputs = vec![Output::new(LEGACY, 70_000)];
    request.change_address = Some(NATIVE.to_string());
    request.shared_key = Some(decode_wif(WIF, &BITCOIN).unwrap().secret);
    request
}

#[tokio::test]
async fn build_then_validate() {
    let key = decode_wif(WIF, &BITCOIN).unwrap().secret;
    let mut builder = TxBuilder::new(&BITCOIN);
    builder
        .add_input(UnsignedInput::from_hex_txid(&"0a".repeat(32), 0, 60_000, NATIVE).unwrap())
        .add_output(Output::new(LEGACY, 59_000));
    let built = api::build(&builder, &BuildOptions::local(key)).await.unwrap();
    let verdicts = api::validate(&built.to_hex(), Some(builder.inputs()), Some(&BITCOIN)).await.unwrap();
    assert_eq!(verdicts, vec![true]);
}

#[tokio::test]
async fn fee_matches_the_built_transaction() {
    let request = request();
    let fee = api::estimate_fee(&request).await.unwrap();
    let (estimate, built) = api::build_with_change(&request, &BuildOptions::local(request.shared_key.unwrap()))
        .await
        .unwrap();
    assert_eq!(estimate.fee, fee);
    let change = estimate.change.unwrap();
    assert_eq!(estimate.input_amount, 70_000 + change + fee);
    assert!(fee >= built.virtual_size() as u64 * 5);
    assert_eq!(built.transaction.output[1].value.to_sat(), change);
}

#[tokio::test]
async fn hardware_build_returns_psbt() {
    let mut request = request();
    request.hardware = true;
    let secp = Secp256k1::new();
    let pubkey = decode_wif(WIF, &BITCOIN).unwrap().compressed_public_key(&secp);
    for input in request.inputs.iter_mut() {
        input.public_key = Some(pubkey);
    }
    let options = BuildOptions::hardware();
    let (_, built) = api::build_with_change(&request, &options).await.unwrap();
    assert!(built.psbt_base64().unwrap().starts_with("cHNidP8"));
}

#[tokio::test]
async fn message_signing_uses_network_prefix() {
    let bitcoin = api::sign_message(WIF, "hi", &BITCOIN, None).await.unwrap();
    let explicit = api::sign_message(WIF, "hi", &BITCOIN, Some("Dogecoin Signed Message:\n")).await.unwrap();
    assert_ne!(bitcoin, explicit);
    assert!(matches!(
        api::sign_message(WIF, "hi", &DOGECOIN, None).await,
        Err(TxError::NetworkMismatch { .. })
    ));
}

#[tokio::test]
async fn shape_only_validation_without_inputs() {
    let key = decode_wif(WIF, &BITCOIN).unwrap().secret;
    let mut builder = TxBuilder::new(&BITCOIN);
    builder
        .add_input(UnsignedInput::from_hex_txid(&"0c".repeat(32), 0, 10_000, LEGACY).unwrap())
        .add_output(Output::new(NATIVE, 9_000));
    let hex = api::build(&builder, &BuildOptions::local(key)).await.unwrap().to_hex();
    assert_eq!(api::validate(&hex, None, None).await.unwrap(), vec![true]);
}
