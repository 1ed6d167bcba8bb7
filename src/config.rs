use std::fs;
use std::path::Path;
use std::str::FromStr;

use bitcoin::consensus::encode;
use bitcoin::{CompressedPublicKey, ScriptBuf};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, TxError};
use crate::fee::{FeeRequest, DEFAULT_DUST_THRESHOLD};
use crate::keys::decode_wif;
use crate::network::NetworkParams;
use crate::transaction::{BuildOptions, SigningMode};
use crate::types::{Destination, Memo, MemoPosition, Output, UnsignedInput};

/// A transaction request file.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Overrides the command line network when present.
    #[serde(default)]
    pub network: Option<String>,
    pub utxos: Vec<UtxoConfig>,
    pub outputs: Vec<OutputConfig>,
    pub fee_rate_sats_per_vb: f64,
    #[serde(default)]
    pub change_address: Option<String>,
    /// Signs every utxo that has no key of its own.
    #[serde(default)]
    pub private_key_wif: Option<String>,
    #[serde(default)]
    pub default_sequence: Option<u32>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub memo_hex: Option<String>,
    #[serde(default)]
    pub memo_position: MemoPosition,
    #[serde(default)]
    pub dust_threshold: Option<u64>,
    #[serde(default)]
    pub mode: SigningMode,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UtxoConfig {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
    /// Either `address` or `scriptPubkeyHex` identifies the spent output.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub script_pubkey_hex: Option<String>,
    #[serde(default)]
    pub private_key_wif: Option<String>,
    #[serde(default)]
    pub public_key_hex: Option<String>,
    #[serde(default)]
    pub sequence: Option<u32>,
    /// Full funding transaction, for hardware signers.
    #[serde(default)]
    pub previous_tx_hex: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub script_hex: Option<String>,
    pub value_sats: u64,
}

/// A validation request file.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidateConfig {
    pub signed_tx_hex: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub inputs: Option<Vec<UtxoConfig>>,
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("failed to read {:?}", path);
        TxError::Io(e)
    })?;
    serde_json::from_str(&content).map_err(|e| {
        log::error!("failed to parse {:?}", path);
        TxError::JsonParse { file_path: path.to_path_buf(), source: e }
    })
}

/// The file's network if it names one, else `fallback`.
pub fn resolve_network(configured: Option<&str>, fallback: &str) -> Result<&'static NetworkParams> {
    NetworkParams::from_name(configured.unwrap_or(fallback))
}

fn destination(address: &Option<String>, script_hex: &Option<String>, what: &str) -> Result<Destination> {
    match (address, script_hex) {
        (Some(address), None) => Ok(Destination::Address(address.clone())),
        (None, Some(script)) => Ok(Destination::Script(ScriptBuf::from_bytes(hex::decode(script)?))),
        _ => Err(TxError::InvalidInput(format!("{} needs exactly one of address or script", what))),
    }
}

impl UtxoConfig {
    pub fn to_input(&self, network: &NetworkParams, default_sequence: Option<u32>) -> Result<UnsignedInput> {
        let what = format!("utxo {}:{}", self.txid, self.vout);
        let source = destination(&self.address, &self.script_pubkey_hex, &what)?;
        let mut input = UnsignedInput::from_hex_txid(&self.txid, self.vout, self.value_sats, source)?;
        if let Some(sequence) = self.sequence.or(default_sequence) {
            input = input.with_sequence(sequence);
        }
        if let Some(wif) = &self.private_key_wif {
            input = input.with_private_key(decode_wif(wif, network)?.secret);
        }
        if let Some(pubkey) = &self.public_key_hex {
            let pubkey = CompressedPublicKey::from_str(pubkey)
                .map_err(|e| TxError::InvalidInput(format!("{}: public key: {}", what, e)))?;
            input = input.with_public_key(pubkey);
        }
        if let Some(prev_tx) = &self.previous_tx_hex {
            input = input.with_previous_transaction(encode::deserialize(&hex::decode(prev_tx)?)?);
        }
        Ok(input)
    }
}

impl OutputConfig {
    pub fn to_output(&self) -> Result<Output> {
        let destination = destination(&self.address, &self.script_hex, "output")?;
        Ok(Output::new(destination, self.value_sats))
    }
}

impl BuildConfig {
    pub fn memo(&self) -> Result<Option<Memo>> {
        match (&self.memo, &self.memo_hex) {
            (Some(_), Some(_)) => Err(TxError::InvalidInput("memo and memoHex are exclusive".to_string())),
            (Some(text), None) => Ok(Some(Memo::Text(text.clone()))),
            (None, Some(hex)) => Ok(Some(Memo::Hex(hex.clone()))),
            (None, None) => Ok(None),
        }
    }

    pub fn inputs(&self, network: &NetworkParams) -> Result<Vec<UnsignedInput>> {
        self.utxos
            .iter()
            .map(|utxo| utxo.to_input(network, self.default_sequence))
            .collect()
    }

    pub fn fee_request<'a>(&self, network: &'a NetworkParams) -> Result<FeeRequest<'a>> {
        let mut request = FeeRequest::new(network, self.fee_rate_sats_per_vb);
        request.inputs = self.inputs(network)?;
        request.outputs = self.outputs.iter().map(OutputConfig::to_output).collect::<Result<_>>()?;
        request.change_address = self.change_address.clone();
        request.shared_key = self.shared_key(network)?;
        request.dust_threshold = self.dust_threshold.unwrap_or(DEFAULT_DUST_THRESHOLD);
        request.hardware = self.mode != SigningMode::Local;
        request.memo = self.memo()?;
        request.memo_position = self.memo_position;
        Ok(request)
    }

    pub fn build_options(&self, network: &NetworkParams) -> Result<BuildOptions> {
        Ok(BuildOptions { mode: self.mode, shared_key: self.shared_key(network)?, sighash_type: None })
    }

    fn shared_key(&self, network: &NetworkParams) -> Result<Option<bitcoin::secp256k1::SecretKey>> {
        self.private_key_wif
            .as_deref()
            .map(|wif| decode_wif(wif, network).map(|key| key.secret))
            .transpose()
    }
}

impl ValidateConfig {
    pub fn inputs(&self, network: &NetworkParams) -> Result<Option<Vec<UnsignedInput>>> {
        self.inputs
            .as_ref()
            .map(|utxos| utxos.iter().map(|utxo| utxo.to_input(network, None)).collect::<Result<Vec<_>>>())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TESTNET;

    const REQUEST: &str = r#"{
        "utxos": [{
            "txid": "7c3f3e0c6a8f0f6c2b8d7b8f0b5a6f9d3a1c2e4f5a6b7c8d9e0f1a2b3c4d5e6f",
            "vout": 1,
            "valueSats": 100000,
            "address": "tb1q4s4n983qnlhppajgn8enmgn4dts7g3c7l5ga67",
            "privateKeyWif": "cMpphJ5jP4aqxWwtjve5wUmxZ1DovBdxi3ch6HL5TrQLmtNDjuhj"
        }],
        "outputs": [],
        "feeRateSatsPerVb": 2.0,
        "changeAddress": "mwDJGUm3p1gyjcXBFeU65ufPN5bARvz8JX",
        "memo": "hello"
    }"#;

    #[test]
    fn request_file_becomes_fee_request() {
        let config: BuildConfig = serde_json::from_str(REQUEST).unwrap();
        assert_eq!(config.mode, SigningMode::Local);
        assert_eq!(config.memo_position, MemoPosition::Last);
        let request = config.fee_request(&TESTNET).unwrap();
        assert_eq!(request.inputs.len(), 1);
        assert!(request.inputs[0].private_key.is_some());
        assert_eq!(request.inputs[0].sequence, u32::MAX);
        assert_eq!(request.memo, Some(Memo::Text("hello".to_string())));
        assert!(!request.hardware);
    }

    #[test]
    fn memo_forms_are_exclusive() {
        let mut config: BuildConfig = serde_json::from_str(REQUEST).unwrap();
        config.memo_hex = Some("beef".to_string());
        assert!(matches!(config.memo(), Err(TxError::InvalidInput(_))));
    }

    #[test]
    fn modes_and_positions_parse() {
        let json = REQUEST.replace(
            r#""memo": "hello""#,
            r#""memoHex": "beef", "memoPosition": {"at": 0}, "mode": "hardware", "defaultSequence": 4294967293"#,
        );
        let config: BuildConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.mode, SigningMode::Hardware);
        assert_eq!(config.memo_position, MemoPosition::At(0));
        let request = config.fee_request(&TESTNET).unwrap();
        assert!(request.hardware);
        assert_eq!(request.inputs[0].sequence, 0xffff_fffd);
    }

    #[test]
    fn utxo_needs_one_source() {
        let utxo = UtxoConfig {
            txid: "11".repeat(32),
            vout: 0,
            value_sats: 1,
            address: None,
            script_pubkey_hex: None,
            private_key_wif: None,
            public_key_hex: None,
            sequence: None,
            previous_tx_hex: None,
        };
        assert!(matches!(utxo.to_input(&TESTNET, None), Err(TxError::InvalidInput(_))));
        let with_script = UtxoConfig { script_pubkey_hex: Some("0014".to_string() + &"ac".repeat(20)), ..utxo };
        assert!(with_script.to_input(&TESTNET, None).is_ok());
    }

    #[test]
    fn network_from_file_wins() {
        assert_eq!(resolve_network(Some("doge"), "testnet").unwrap().name, "dogecoin");
        assert_eq!(resolve_network(None, "testnet").unwrap(), &TESTNET);
    }
}
