//! Virtual size and fee estimation.
//!
//! Sizes come from probe transactions built by [`TxBuilder`] (signed locally
//! when a key is at hand, placeholder-signed otherwise), so the estimate uses
//! the same script and witness shapes as the final build.

use bitcoin::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGADD, OP_CHECKSIGVERIFY};
use bitcoin::script::Instruction;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Script, Transaction, Witness};
use serde::Serialize;

use crate::address::classify;
use crate::error::{Result, TxError};
use crate::network::NetworkParams;
use crate::transaction::{BuildOptions, SigningMode, TxBuilder};
use crate::types::{total_amount, AddressType, Memo, MemoPosition, Output, UnsignedInput};

/// Bitcoin Core's dust limit for P2PKH outputs.
pub const DEFAULT_DUST_THRESHOLD: u64 = 546;
/// Upper bound on fee/change adjustment passes.
pub const MAX_FEE_PASSES: usize = 5;
/// Bitcoin Core's `-bytespersigop` default.
pub const BYTES_PER_SIGOP: u64 = 20;
const WITNESS_SCALE_FACTOR: u64 = 4;
const TAPROOT_ANNEX_TAG: u8 = 0x50;

#[derive(Debug, Clone)]
pub struct FeeRequest<'a> {
    pub network: &'a NetworkParams,
    pub inputs: Vec<UnsignedInput>,
    pub outputs: Vec<Output>,
    /// Receives whatever is left after outputs and fee, unless it is dust.
    pub change_address: Option<String>,
    pub shared_key: Option<SecretKey>,
    /// Satoshis per virtual byte.
    pub fee_per_byte: f64,
    pub dust_threshold: u64,
    /// Estimate for a hardware signer: never sign locally.
    pub hardware: bool,
    pub memo: Option<Memo>,
    pub memo_position: MemoPosition,
}

impl<'a> FeeRequest<'a> {
    pub fn new(network: &'a NetworkParams, fee_per_byte: f64) -> Self {
        FeeRequest {
            network,
            inputs: Vec::new(),
            outputs: Vec::new(),
            change_address: None,
            shared_key: None,
            fee_per_byte,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            hardware: false,
            memo: None,
            memo_position: MemoPosition::default(),
        }
    }

    fn base_builder(&self) -> TxBuilder<'a> {
        let mut builder = TxBuilder::new(self.network);
        for input in &self.inputs {
            builder.add_input(input.clone());
        }
        for output in &self.outputs {
            builder.add_output(output.clone());
        }
        if let Some(memo) = &self.memo {
            builder.set_memo(memo.clone(), self.memo_position);
        }
        builder
    }

    /// Builder for the final transaction: the requested outputs plus the
    /// change `estimate` settled on.
    pub fn funded_builder(&self, estimate: &FeeEstimate) -> TxBuilder<'a> {
        let mut builder = self.base_builder();
        if let (Some(address), Some(amount)) = (&self.change_address, estimate.change) {
            builder.add_output(Output::new(address.as_str(), amount));
        }
        builder
    }

    fn signing_options(&self) -> BuildOptions {
        let keyed = self.inputs.iter().all(|i| i.private_key.is_some() || self.shared_key.is_some());
        let mode = if self.hardware || !keyed {
            SigningMode::Placeholder
        } else {
            SigningMode::Local
        };
        BuildOptions { mode, shared_key: self.shared_key, sighash_type: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub input_amount: u64,
    /// Sum of the requested outputs, change excluded.
    pub output_amount: u64,
    pub virtual_size: usize,
    pub fee: u64,
    /// `None` when there is no change address or the change would be dust.
    pub change: Option<u64>,
}

pub fn fee_for_vsize(virtual_size: usize, fee_per_byte: f64) -> u64 {
    (virtual_size as f64 * fee_per_byte).ceil() as u64
}

pub fn calculate_tx_size(request: &FeeRequest<'_>) -> Result<FeeEstimate> {
    if !request.fee_per_byte.is_finite() || request.fee_per_byte < 0.0 {
        return Err(TxError::InvalidInput(format!("invalid fee rate {}", request.fee_per_byte)));
    }
    let input_amount = total_amount(request.inputs.iter().map(|i| i.amount))?;
    let output_amount = total_amount(request.outputs.iter().map(|o| o.amount))?;
    if input_amount < output_amount {
        return Err(TxError::InsufficientFunds { available: input_amount, required: output_amount, fee: 0 });
    }

    let base = request.base_builder();
    let options = request.signing_options();
    let probe = |change: Option<u64>| -> Result<usize> {
        let mut builder = base.clone();
        if let (Some(address), Some(amount)) = (&request.change_address, change) {
            builder.add_output(Output::new(address.as_str(), amount));
        }
        Ok(builder.build(&options)?.virtual_size())
    };

    let leftover = input_amount - output_amount;
    let mut change = request.change_address.as_ref().map(|_| leftover);
    let mut virtual_size = probe(change)?;
    let mut fee = fee_for_vsize(virtual_size, request.fee_per_byte);
    for pass in 0..MAX_FEE_PASSES {
        let Some(current) = change else {
            break;
        };
        let next = leftover.checked_sub(fee).filter(|c| *c >= request.dust_threshold);
        log::debug!("fee pass {}: vsize {} fee {} change {:?}", pass, virtual_size, fee, next);
        if next == Some(current) {
            break;
        }
        if next.is_none() {
            log::warn!(
                "change of {} sats is below the dust threshold {}, dropping it",
                leftover.saturating_sub(fee),
                request.dust_threshold
            );
        }
        change = next;
        virtual_size = probe(change)?;
        fee = fee_for_vsize(virtual_size, request.fee_per_byte);
    }

    let required = output_amount.saturating_add(fee);
    if input_amount < required {
        return Err(TxError::InsufficientFunds {
            available: input_amount,
            required,
            fee,
        });
    }
    log::info!("estimated vsize {} vB, fee {} sats at {} sat/vB", virtual_size, fee, request.fee_per_byte);
    Ok(FeeEstimate { input_amount, output_amount, virtual_size, fee, change })
}

/// Leaf script of a taproot script-path witness, annex stripped.
fn taproot_leaf_script(witness: &Witness) -> Option<&Script> {
    let mut elements: Vec<&[u8]> = witness.iter().collect();
    if elements.len() >= 2 && elements.last().and_then(|e| e.first()) == Some(&TAPROOT_ANNEX_TAG) {
        elements.pop();
    }
    if elements.len() < 2 {
        return None;
    }
    Some(Script::from_bytes(elements[elements.len() - 2]))
}

fn count_sigops(script: &Script) -> u64 {
    let mut count = 0;
    for instruction in script.instructions() {
        match instruction {
            Ok(Instruction::Op(op)) if op == OP_CHECKSIG || op == OP_CHECKSIGVERIFY || op == OP_CHECKSIGADD => {
                count += 1
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    count
}

/// Virtual size inflated for taproot script-path spends that carry many
/// signature checks in few bytes. `prevout_addresses[i]` is the address
/// input `i` spends; inputs without one are not adjusted.
pub fn count_adjusted_vsize(tx: &Transaction, prevout_addresses: &[&str], network: &NetworkParams) -> usize {
    let standard = tx.vsize();
    let sigops: u64 = tx
        .input
        .iter()
        .zip(prevout_addresses)
        .filter(|(_, address)| classify(address, network) == AddressType::Taproot)
        .filter_map(|(txin, _)| taproot_leaf_script(&txin.witness))
        .map(count_sigops)
        .sum();
    let weight = tx.weight().to_wu();
    let sigop_weight = sigops * WITNESS_SCALE_FACTOR * BYTES_PER_SIGOP;
    let adjusted = weight.max(sigop_weight).div_ceil(WITNESS_SCALE_FACTOR) as usize;
    standard.max(adjusted)
}
