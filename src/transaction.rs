use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytes};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, CompressedPublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, WPubkeyHash, Witness};
use serde::{Deserialize, Serialize};

use crate::address::script_pubkey_for_key;
use crate::error::{Result, TxError};
use crate::network::NetworkParams;
use crate::psbt::build_psbt;
use crate::sighash::SigningContext;
use crate::signer::{fake_sign, produce_signature, SignatureSource};
use crate::types::{total_amount, AddressType, Memo, MemoPosition, Output, PreparedInput, UnsignedInput};

pub const DEFAULT_TX_VERSION: i32 = 2;

/// How `build` obtains signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SigningMode {
    /// Sign with the input key or the shared key.
    #[default]
    Local,
    /// Fixed-shape placeholder signatures, for size estimation and for MPC
    /// templates.
    Placeholder,
    /// No signatures; a PSBT carries the inputs to an external signer.
    Hardware,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub mode: SigningMode,
    /// Used for every input without its own key.
    pub shared_key: Option<SecretKey>,
    /// Overrides the network default sighash type.
    pub sighash_type: Option<u32>,
}

impl BuildOptions {
    pub fn local(shared_key: SecretKey) -> Self {
        BuildOptions { shared_key: Some(shared_key), ..Default::default() }
    }

    pub fn placeholder() -> Self {
        BuildOptions { mode: SigningMode::Placeholder, ..Default::default() }
    }

    pub fn hardware() -> Self {
        BuildOptions { mode: SigningMode::Hardware, ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    /// Sighash of every input, in input order. Zero where it could not be
    /// computed (a nested input without a known public key).
    pub sighashes: Vec<[u8; 32]>,
    pub address_types: Vec<AddressType>,
    pub prevouts: Vec<TxOut>,
    /// Only set in hardware mode.
    pub psbt: Option<Psbt>,
}

impl BuiltTransaction {
    pub fn to_hex(&self) -> String {
        encode::serialize_hex(&self.transaction)
    }

    pub fn virtual_size(&self) -> usize {
        self.transaction.vsize()
    }

    pub fn weight(&self) -> u64 {
        self.transaction.weight().to_wu()
    }

    pub fn psbt_base64(&self) -> Option<String> {
        self.psbt.as_ref().map(crate::psbt::encode_psbt)
    }
}

/// Collects inputs, outputs and an optional memo, then builds and signs.
///
/// `build` takes `&self`: calling it again with the same state yields the
/// same bytes.
#[derive(Debug, Clone)]
pub struct TxBuilder<'a> {
    network: &'a NetworkParams,
    inputs: Vec<UnsignedInput>,
    outputs: Vec<Output>,
    memo: Option<(Memo, MemoPosition)>,
    version: i32,
    lock_time: u32,
}

impl<'a> TxBuilder<'a> {
    pub fn new(network: &'a NetworkParams) -> Self {
        TxBuilder {
            network,
            inputs: Vec::new(),
            outputs: Vec::new(),
            memo: None,
            version: DEFAULT_TX_VERSION,
            lock_time: 0,
        }
    }

    pub fn network(&self) -> &'a NetworkParams {
        self.network
    }

    pub fn add_input(&mut self, input: UnsignedInput) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: Output) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn set_memo(&mut self, memo: Memo, position: MemoPosition) -> &mut Self {
        self.memo = Some((memo, position));
        self
    }

    pub fn set_version(&mut self, version: i32) -> &mut Self {
        self.version = version;
        self
    }

    pub fn set_lock_time(&mut self, lock_time: u32) -> &mut Self {
        self.lock_time = lock_time;
        self
    }

    pub fn inputs(&self) -> &[UnsignedInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Size of the transaction once signed, from a placeholder build.
    pub fn virtual_size(&self) -> Result<usize> {
        Ok(self.build(&BuildOptions::placeholder())?.virtual_size())
    }

    pub fn build(&self, options: &BuildOptions) -> Result<BuiltTransaction> {
        log::info!(
            "building {} transaction: {} inputs, {} outputs, mode {:?}",
            self.network.name,
            self.inputs.len(),
            self.outputs.len(),
            options.mode
        );
        let secp = Secp256k1::new();

        // Everything that can fail on caller data fails here, before signing.
        let prepared = self.prepare_inputs(&secp, options)?;
        let outputs = self.prepare_outputs()?;

        let available = total_amount(prepared.iter().map(|p| p.prevout.value.to_sat()))?;
        let required = total_amount(outputs.iter().map(|o| o.value.to_sat()))?;
        if available < required {
            return Err(TxError::InsufficientFunds { available, required, fee: 0 });
        }

        let mut transaction = Transaction {
            version: Version(self.version),
            lock_time: LockTime::from_consensus(self.lock_time),
            input: prepared
                .iter()
                .map(|p| TxIn {
                    previous_output: p.out_point,
                    script_sig: ScriptBuf::new(),
                    sequence: p.sequence,
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs,
        };
        let prevouts: Vec<TxOut> = prepared.iter().map(|p| p.prevout.clone()).collect();
        let address_types: Vec<AddressType> = prepared.iter().map(|p| p.address_type).collect();
        let ctx = SigningContext::new(self.network, address_types.clone(), options.sighash_type);

        // Phase 1: every sighash, over the transaction with empty scriptSigs.
        let mut sighashes = Vec::with_capacity(prepared.len());
        for (index, input) in prepared.iter().enumerate() {
            let missing_key = input.address_type == AddressType::SegwitNested && input.public_key.is_none();
            if missing_key && options.mode != SigningMode::Local {
                log::debug!("input {}: nested spend without public key, sighash left empty", index);
                sighashes.push([0u8; 32]);
                continue;
            }
            let hash = ctx.input_sighash(&transaction, index, &prevouts, input.public_key.as_ref())?;
            log::debug!("input {} ({}) sighash {}", index, input.address_type, hex::encode(hash));
            sighashes.push(hash);
        }

        if options.mode == SigningMode::Hardware {
            let psbt = build_psbt(transaction.clone(), &prepared)?;
            log::info!("hardware mode: returning unsigned transaction and PSBT");
            return Ok(BuiltTransaction {
                transaction,
                sighashes,
                address_types,
                prevouts,
                psbt: Some(psbt),
            });
        }

        // Phase 2: sign and place the spend data.
        let ecdsa_type = ctx.ecdsa_sighash_type();
        let taproot_type = ctx.taproot_sighash_type()?;
        for (index, input) in prepared.iter().enumerate() {
            let pubkey = input.public_key.map(|pk| pk.to_bytes());
            if options.mode == SigningMode::Placeholder {
                let (script_sig, witness) = fake_sign(input.address_type, pubkey.as_ref())?;
                transaction.input[index].script_sig = script_sig;
                transaction.input[index].witness = witness;
                continue;
            }
            let (Some(secret), Some(pubkey)) = (input.secret.as_ref(), pubkey) else {
                return Err(TxError::InvalidInput(format!("input {} has no private key", index)));
            };
            let sig = produce_signature(
                &secp,
                SignatureSource::LocalKey(secret),
                input.address_type,
                &sighashes[index],
                ecdsa_type,
                taproot_type,
            )?;
            assemble_input(&mut transaction.input[index], input.address_type, &sig, &pubkey)?;
        }

        log::info!(
            "built transaction {}: vsize {} weight {}",
            transaction.compute_txid(),
            transaction.vsize(),
            transaction.weight().to_wu()
        );
        Ok(BuiltTransaction { transaction, sighashes, address_types, prevouts, psbt: None })
    }

    fn prepare_inputs(&self, secp: &Secp256k1<All>, options: &BuildOptions) -> Result<Vec<PreparedInput>> {
        if self.inputs.is_empty() {
            return Err(TxError::InvalidInput("transaction has no inputs".to_string()));
        }
        let mut prepared = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            let script_pubkey = input.source.script_pubkey(self.network)?;
            let address_type = AddressType::from_script(&script_pubkey)?;
            if address_type.has_witness() && !self.network.supports_segwit() {
                return Err(TxError::UnsupportedAddressType(format!(
                    "input {} is {} on {}",
                    index, address_type, self.network.name
                )));
            }

            let secret = input.private_key.or(options.shared_key);
            let public_key = match secret {
                Some(secret) => Some(CompressedPublicKey(secret.public_key(secp))),
                None => input.public_key,
            };

            if options.mode == SigningMode::Local {
                let pubkey = match (secret, public_key) {
                    (Some(_), Some(pubkey)) => pubkey,
                    _ => return Err(TxError::InvalidInput(format!("input {} has no private key", index))),
                };
                if script_pubkey_for_key(secp, &pubkey, address_type) != script_pubkey {
                    return Err(TxError::InvalidInput(format!(
                        "key for input {} does not control {}",
                        index,
                        script_pubkey.to_hex_string()
                    )));
                }
            }

            log::debug!(
                "input {}: {}:{} {} sats, {}",
                index,
                input.txid,
                input.vout,
                input.amount,
                address_type
            );
            prepared.push(PreparedInput {
                out_point: input.out_point(),
                prevout: TxOut { value: Amount::from_sat(input.amount), script_pubkey },
                address_type,
                sequence: Sequence(input.sequence),
                secret,
                public_key,
                non_witness_utxo: input.non_witness_utxo.clone(),
            });
        }
        Ok(prepared)
    }

    fn prepare_outputs(&self) -> Result<Vec<TxOut>> {
        let mut outputs = Vec::with_capacity(self.outputs.len() + 1);
        for (index, output) in self.outputs.iter().enumerate() {
            let script_pubkey = output.destination.script_pubkey(self.network)?;
            log::debug!("output {}: {} sats to {}", index, output.amount, script_pubkey.to_hex_string());
            outputs.push(TxOut { value: Amount::from_sat(output.amount), script_pubkey });
        }
        if let Some((memo, position)) = &self.memo {
            let memo_out = TxOut { value: Amount::ZERO, script_pubkey: memo.script()? };
            match *position {
                MemoPosition::First => outputs.insert(0, memo_out),
                MemoPosition::At(at) if at <= outputs.len() => outputs.insert(at, memo_out),
                MemoPosition::At(at) => {
                    return Err(TxError::InvalidInput(format!(
                        "memo position {} beyond {} outputs",
                        at,
                        outputs.len()
                    )));
                }
                MemoPosition::Last => outputs.push(memo_out),
            }
        }
        if outputs.is_empty() {
            return Err(TxError::InvalidInput("transaction has no outputs".to_string()));
        }
        Ok(outputs)
    }
}

fn push_bytes(data: &[u8]) -> Result<&PushBytes> {
    <&PushBytes>::try_from(data).map_err(|_| TxError::InvalidInput(format!("{} bytes do not fit a push", data.len())))
}

/// scriptSig and witness spending `address_type` with `sig` and `pubkey`.
pub fn spend_data(address_type: AddressType, sig: &[u8], pubkey: &[u8]) -> Result<(ScriptBuf, Witness)> {
    match address_type {
        AddressType::Legacy => {
            let script_sig = Builder::new()
                .push_slice(push_bytes(sig)?)
                .push_slice(push_bytes(pubkey)?)
                .into_script();
            Ok((script_sig, Witness::new()))
        }
        AddressType::SegwitNested => {
            let redeem = ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(pubkey));
            let script_sig = Builder::new().push_slice(push_bytes(redeem.as_bytes())?).into_script();
            Ok((script_sig, Witness::from_slice(&[sig, pubkey])))
        }
        AddressType::SegwitNative => Ok((ScriptBuf::new(), Witness::from_slice(&[sig, pubkey]))),
        AddressType::Taproot => Ok((ScriptBuf::new(), Witness::from_slice(&[sig]))),
    }
}

pub fn assemble_input(tx_in: &mut TxIn, address_type: AddressType, sig: &[u8], pubkey: &[u8]) -> Result<()> {
    let (script_sig, witness) = spend_data(address_type, sig, pubkey)?;
    tx_in.script_sig = script_sig;
    tx_in.witness = witness;
    Ok(())
}
