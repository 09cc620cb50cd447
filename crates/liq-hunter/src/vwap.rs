//! Rolling VWAP directional guard.

use liq_core::{Price, TradeDirection};
use liq_rest::model::Kline;
use rust_decimal::Decimal;

/// Volume-weighted average price over a kline window, weighting each
/// kline's typical price `(high + low + close) / 3` by its volume.
///
/// Returns `None` for an empty window or zero total volume.
pub fn rolling_vwap(klines: &[Kline]) -> Option<Decimal> {
    let mut weighted = Decimal::ZERO;
    let mut volume = Decimal::ZERO;
    for kline in klines {
        let typical = (kline.high + kline.low + kline.close) / Decimal::from(3);
        weighted += typical * kline.volume;
        volume += kline.volume;
    }
    if volume.is_zero() {
        return None;
    }
    Some(weighted / volume)
}

/// Directional filter around VWAP with a tolerance band in basis
/// points: long intents are rejected below `vwap x (1 - eps)`, short
/// intents above `vwap x (1 + eps)`.
pub fn vwap_allows(
    direction: TradeDirection,
    mark: Price,
    vwap: Decimal,
    band_bps: Decimal,
) -> bool {
    if vwap.is_zero() {
        return true;
    }
    let eps = band_bps / Decimal::from(10_000);
    match direction {
        TradeDirection::Long => mark.inner() >= vwap * (Decimal::ONE - eps),
        TradeDirection::Short => mark.inner() <= vwap * (Decimal::ONE + eps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kline(high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Kline {
        Kline {
            open_time_ms: 0,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        // Typical prices 100 and 200, volumes 1 and 3 -> 175.
        let klines = vec![
            kline(dec!(100), dec!(100), dec!(100), dec!(1)),
            kline(dec!(200), dec!(200), dec!(200), dec!(3)),
        ];
        assert_eq!(rolling_vwap(&klines).unwrap(), dec!(175));
    }

    #[test]
    fn test_vwap_empty_or_zero_volume() {
        assert!(rolling_vwap(&[]).is_none());
        let klines = vec![kline(dec!(100), dec!(100), dec!(100), dec!(0))];
        assert!(rolling_vwap(&klines).is_none());
    }

    #[test]
    fn test_long_rejected_below_band() {
        let vwap = dec!(100);
        let band = dec!(10); // 0.1%
        assert!(vwap_allows(TradeDirection::Long, Price::new(dec!(99.95)), vwap, band));
        assert!(!vwap_allows(TradeDirection::Long, Price::new(dec!(99.80)), vwap, band));
    }

    #[test]
    fn test_short_rejected_above_band() {
        let vwap = dec!(100);
        let band = dec!(10);
        assert!(vwap_allows(TradeDirection::Short, Price::new(dec!(100.05)), vwap, band));
        assert!(!vwap_allows(TradeDirection::Short, Price::new(dec!(100.20)), vwap, band));
    }
}
