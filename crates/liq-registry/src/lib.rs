//! Symbol precision registry.
//!
//! Loaded once from the venue's exchange-info document, then frozen.
//! Concurrent read-only access afterwards is safe without
//! synchronization; every component snaps prices and quantities through
//! the pure functions here before anything touches the wire.

use liq_core::{Price, Qty};
use liq_rest::model::{ExchangeInfo, SymbolInfo};
use liq_rest::{ExchangeApi, RestError};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("exchange info fetch failed: {0}")]
    Fetch(#[from] RestError),

    #[error("{symbol}: {message}")]
    NotSatisfiable { symbol: String, message: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Trading filters for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
    /// Decimal places implied by the tick size.
    pub price_decimals: u32,
    /// Decimal places implied by the step size.
    pub qty_decimals: u32,
}

impl SymbolFilters {
    /// Fallback for symbols absent from exchange info: price precision
    /// 4, quantity precision 3, no notional floor.
    fn defaults() -> Self {
        Self {
            tick_size: Decimal::new(1, 4),
            step_size: Decimal::new(1, 3),
            min_qty: Decimal::new(1, 3),
            max_qty: Decimal::from(9_000_000),
            min_notional: Decimal::ZERO,
            price_decimals: 4,
            qty_decimals: 3,
        }
    }

    fn from_symbol_info(info: &SymbolInfo) -> Self {
        let mut filters = Self::defaults();
        for raw in &info.filters {
            match raw.filter_type.as_str() {
                "PRICE_FILTER" => {
                    if let Some(tick) = raw.tick_size {
                        if tick > Decimal::ZERO {
                            filters.tick_size = tick;
                            filters.price_decimals = decimals_of(tick);
                        }
                    }
                }
                "LOT_SIZE" => {
                    if let Some(step) = raw.step_size {
                        if step > Decimal::ZERO {
                            filters.step_size = step;
                            filters.qty_decimals = decimals_of(step);
                        }
                    }
                    if let Some(min_qty) = raw.min_qty {
                        filters.min_qty = min_qty;
                    }
                    if let Some(max_qty) = raw.max_qty {
                        filters.max_qty = max_qty;
                    }
                }
                "MIN_NOTIONAL" => {
                    if let Some(min_notional) = raw.min_notional {
                        filters.min_notional = min_notional;
                    }
                }
                _ => {}
            }
        }
        filters
    }
}

/// Result of quantity validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedQty {
    pub qty: Qty,
    pub was_adjusted: bool,
    /// Quantity was clamped down to the symbol's maximum; callers warn.
    pub capped_at_max: bool,
}

/// Decimal places of a unit like `0.010` (-> 2).
fn decimals_of(unit: Decimal) -> u32 {
    unit.normalize().scale()
}

/// Snap a value to a multiple of `unit`, clamped to `decimals` places.
fn snap(value: Decimal, unit: Decimal, decimals: u32) -> Decimal {
    if unit.is_zero() {
        return value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    }
    let steps = (value / unit).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (steps * unit).round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// Frozen per-symbol precision data.
#[derive(Debug)]
pub struct PrecisionRegistry {
    symbols: HashMap<String, SymbolFilters>,
    fallback: SymbolFilters,
}

impl PrecisionRegistry {
    /// Fetch exchange info and build the registry. Called once at
    /// startup.
    pub async fn load(api: &ExchangeApi) -> RegistryResult<Self> {
        let info = api.exchange_info().await?;
        let registry = Self::from_exchange_info(&info);
        info!(symbols = registry.symbols.len(), "precision registry loaded");
        Ok(registry)
    }

    pub fn from_exchange_info(info: &ExchangeInfo) -> Self {
        let mut symbols = HashMap::new();
        for symbol_info in &info.symbols {
            let filters = SymbolFilters::from_symbol_info(symbol_info);
            debug!(symbol = %symbol_info.symbol, ?filters, "symbol filters");
            symbols.insert(symbol_info.symbol.clone(), filters);
        }
        Self {
            symbols,
            fallback: SymbolFilters::defaults(),
        }
    }

    /// Build from explicit filters. Test seam.
    pub fn from_filters(symbols: HashMap<String, SymbolFilters>) -> Self {
        Self {
            symbols,
            fallback: SymbolFilters::defaults(),
        }
    }

    pub fn filters(&self, symbol: &str) -> &SymbolFilters {
        match self.symbols.get(symbol) {
            Some(filters) => filters,
            None => {
                warn!(symbol, "unknown symbol, using default precision");
                &self.fallback
            }
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Snap a price to the symbol's tick grid.
    pub fn format_price(&self, symbol: &str, price: Price) -> Price {
        let filters = self.filters(symbol);
        Price::new(snap(price.inner(), filters.tick_size, filters.price_decimals))
    }

    /// Snap a quantity to the symbol's step grid.
    pub fn format_qty(&self, symbol: &str, qty: Qty) -> Qty {
        let filters = self.filters(symbol);
        Qty::new(snap(qty.inner(), filters.step_size, filters.qty_decimals))
    }

    /// Enforce min/max quantity and the minimum-notional floor.
    ///
    /// Quantities below the notional floor are snapped up to the
    /// smallest step-aligned quantity satisfying it; failure to satisfy
    /// it below `max_qty` is an error.
    pub fn validate_and_adjust_qty(
        &self,
        symbol: &str,
        qty: Qty,
        price: Price,
    ) -> RegistryResult<AdjustedQty> {
        let filters = self.filters(symbol);
        let original = qty.inner();
        let mut value = snap(original, filters.step_size, filters.qty_decimals);
        let mut capped_at_max = false;

        if value < filters.min_qty {
            value = filters.min_qty;
        }
        if value > filters.max_qty {
            value = snap_down(filters.max_qty, filters.step_size, filters.qty_decimals);
            capped_at_max = true;
        }

        if !price.is_zero()
            && filters.min_notional > Decimal::ZERO
            && value * price.inner() < filters.min_notional
        {
            let needed = filters.min_notional / price.inner();
            let snapped = snap_up(needed, filters.step_size, filters.qty_decimals);
            if snapped > filters.max_qty {
                return Err(RegistryError::NotSatisfiable {
                    symbol: symbol.to_string(),
                    message: format!(
                        "min notional {} needs qty {snapped} above max {}",
                        filters.min_notional, filters.max_qty
                    ),
                });
            }
            value = snapped;
        }

        Ok(AdjustedQty {
            qty: Qty::new(value),
            was_adjusted: value != original,
            capped_at_max,
        })
    }
}

fn snap_up(value: Decimal, unit: Decimal, decimals: u32) -> Decimal {
    if unit.is_zero() {
        return value.round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero);
    }
    let steps = (value / unit).ceil();
    (steps * unit).round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
}

fn snap_down(value: Decimal, unit: Decimal, decimals: u32) -> Decimal {
    if unit.is_zero() {
        return value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    }
    let steps = (value / unit).floor();
    (steps * unit).round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}
