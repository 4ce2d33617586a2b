//! Signal validation functions
//!
//! Centralized validation for signals before they enter the registry.
//! Checks run in a fixed order and short-circuit on the first failure:
//! field presence, side, then price ordering.

use rust_decimal::Decimal;

use crate::models::SignalSide;

use super::errors::RelayError;

// ============================================================================
// Individual Validation Functions
// ============================================================================

/// Require a field to be present
///
/// Missing fields are a validation failure, not a malformed request: the
/// payload decoded fine, it just lacks a required value.
pub fn require<T>(value: Option<T>, field: &str) -> Result<T, RelayError> {
    value.ok_or_else(|| RelayError::ValidationFailed(format!("missing field: {}", field)))
}

/// Parse the wire side string into a [`SignalSide`]
///
/// Accepts any casing of `buy`/`sell`, matching what the reference clients
/// send.
pub fn parse_side(raw: &str) -> Result<SignalSide, RelayError> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" => Ok(SignalSide::Buy),
        "sell" => Ok(SignalSide::Sell),
        other => Err(RelayError::ValidationFailed(format!(
            "side must be \"buy\" or \"sell\", got: {}",
            other
        ))),
    }
}

/// Validate price ordering for the given side
///
/// # Rules
/// - Buy: take-profit above entry, stop-loss below entry
/// - Sell: take-profit below entry, stop-loss above entry
///
/// Take-profit must sit in the profitable direction and stop-loss in the
/// loss-limiting direction, so the checks are asymmetric by side.
pub fn validate_price_levels(
    side: SignalSide,
    entry: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> Result<(), RelayError> {
    match side {
        SignalSide::Buy => {
            if take_profit <= entry {
                return Err(RelayError::ValidationFailed(format!(
                    "take profit must be greater than entry price for a buy signal (tp={}, entry={})",
                    take_profit, entry
                )));
            }
            if stop_loss >= entry {
                return Err(RelayError::ValidationFailed(format!(
                    "stop loss must be less than entry price for a buy signal (sl={}, entry={})",
                    stop_loss, entry
                )));
            }
        }
        SignalSide::Sell => {
            if take_profit >= entry {
                return Err(RelayError::ValidationFailed(format!(
                    "take profit must be less than entry price for a sell signal (tp={}, entry={})",
                    take_profit, entry
                )));
            }
            if stop_loss <= entry {
                return Err(RelayError::ValidationFailed(format!(
                    "stop loss must be greater than entry price for a sell signal (sl={}, entry={})",
                    stop_loss, entry
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Composite Validation Function
// ============================================================================

/// A `send_signal` payload that passed every check
#[derive(Debug, Clone)]
pub struct ValidSignalPayload {
    pub symbol: String,
    pub side: SignalSide,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Validate a raw `send_signal` payload
///
/// Single entry point called by the admin handler.
pub fn validate_signal_payload(
    symbol: Option<&str>,
    side: Option<&str>,
    entry: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<ValidSignalPayload, RelayError> {
    let symbol = require(symbol, "symbol")?;
    if symbol.trim().is_empty() {
        return Err(RelayError::ValidationFailed(
            "symbol must not be empty".to_string(),
        ));
    }
    let raw_side = require(side, "side")?;
    let entry = require(entry, "entry")?;
    let stop_loss = require(stop_loss, "sl")?;
    let take_profit = require(take_profit, "tp")?;

    let side = parse_side(raw_side)?;
    validate_price_levels(side, entry, stop_loss, take_profit)?;

    Ok(ValidSignalPayload {
        symbol: symbol.to_string(),
        side,
        entry,
        stop_loss,
        take_profit,
    })
}

// ============================================================================
// Tests
// ============================================================================
