//! Asynchronous entry points. Every operation is CPU-bound and completes
//! without suspending; the `async` signature keeps callers uniform with the
//! rest of a wallet SDK.

use crate::error::Result;
use crate::fee::{calculate_tx_size, FeeEstimate, FeeRequest};
use crate::message;
use crate::network::NetworkParams;
use crate::transaction::{BuildOptions, BuiltTransaction, TxBuilder};
use crate::types::UnsignedInput;
use crate::validator::valid_signed_transaction;

pub async fn build(builder: &TxBuilder<'_>, options: &BuildOptions) -> Result<BuiltTransaction> {
    builder.build(options)
}

/// Estimates the fee, adds the resulting change output and builds.
pub async fn build_with_change(
    request: &FeeRequest<'_>,
    options: &BuildOptions,
) -> Result<(FeeEstimate, BuiltTransaction)> {
    let estimate = calculate_tx_size(request)?;
    let built = request.funded_builder(&estimate).build(options)?;
    Ok((estimate, built))
}

pub async fn sign_message(
    wif: &str,
    message: &str,
    network: &NetworkParams,
    prefix: Option<&str>,
) -> Result<String> {
    message::sign_message(wif, message, network, prefix)
}

/// Fee in base units.
pub async fn estimate_fee(request: &FeeRequest<'_>) -> Result<u64> {
    Ok(calculate_tx_size(request)?.fee)
}

pub async fn validate(
    signed_tx_hex: &str,
    inputs: Option<&[UnsignedInput]>,
    network: Option<&NetworkParams>,
) -> Result<Vec<bool>> {
    valid_signed_transaction(signed_tx_hex, inputs, network)
}
