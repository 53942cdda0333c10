//! Technical indicators module
//! Implements RSI, MACD, SMA/EMA, Bollinger Bands and ATR over daily bars

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TechnicalIndicators;

/// One OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// MACD indicator components
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdReading {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Compute every indicator the bar history supports. Bars must be sorted oldest first.
pub fn compute_technicals(symbol: &str, bars: &[Bar]) -> TechnicalIndicators {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let mut technicals = TechnicalIndicators {
        symbol: symbol.to_string(),
        timestamp: bars.last().map(|b| b.timestamp),
        ..Default::default()
    };

    if closes.len() >= 15 {
        technicals.rsi_14 = Some(calculate_rsi(&closes, 14));
    }

    if closes.len() >= 12 {
        technicals.ema_12 = Some(calculate_ema(&closes, 12));
    }

    if closes.len() >= 26 {
        let macd = calculate_macd(&closes, 12, 26, 9);
        technicals.ema_26 = Some(calculate_ema(&closes, 26));
        technicals.macd = Some(macd.macd_line);
        technicals.macd_signal = Some(macd.signal_line);
    }

    if closes.len() >= 20 {
        let bands = calculate_bollinger(&closes, 20, 2.0);
        technicals.bollinger_upper = Some(bands.upper);
        technicals.bollinger_middle = Some(bands.middle);
        technicals.bollinger_lower = Some(bands.lower);
        technicals.volume_sma_20 = Some(calculate_sma(&volumes, 20));

        let recent = &bars[bars.len() - 20..];
        technicals.support_level = recent.iter().map(|b| b.low).reduce(f64::min);
        technicals.resistance_level = recent.iter().map(|b| b.high).reduce(f64::max);
    }

    if closes.len() >= 50 {
        technicals.sma_50 = Some(calculate_sma(&closes, 50));
    }

    if closes.len() >= 200 {
        technicals.sma_200 = Some(calculate_sma(&closes, 200));
    }

    if bars.len() >= 15 {
        technicals.atr_14 = Some(calculate_atr(bars, 14));
    }

    technicals
}

/// Calculate RSI (Relative Strength Index) with Wilder smoothing
pub fn calculate_rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0; // Neutral
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    for window in prices.windows(2) {
        let change = window[1] - window[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains.iter().take(period).sum::<f64>() / period as f64;
    let mut avg_loss = losses.iter().take(period).sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Calculate MACD (Moving Average Convergence Divergence)
pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdReading {
    if prices.len() < slow_period {
        return MacdReading {
            macd_line: 0.0,
            signal_line: 0.0,
            histogram: 0.0,
        };
    }

    let macd_values: Vec<f64> = (slow_period..=prices.len())
        .map(|i| {
            let slice = &prices[..i];
            calculate_ema(slice, fast_period) - calculate_ema(slice, slow_period)
        })
        .collect();

    let macd_line = macd_values.last().copied().unwrap_or(0.0);

    let signal_line = if macd_values.len() >= signal_period {
        calculate_ema(&macd_values, signal_period)
    } else {
        macd_values.iter().sum::<f64>() / macd_values.len() as f64
    };

    MacdReading {
        macd_line,
        signal_line,
        histogram: macd_line - signal_line,
    }
}

/// Calculate SMA (Simple Moving Average) over the most recent `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    if period == 0 || prices.len() < period {
        return prices.iter().sum::<f64>() / prices.len() as f64;
    }

    let recent = &prices[prices.len() - period..];
    recent.iter().sum::<f64>() / period as f64
}

/// Calculate EMA (Exponential Moving Average), seeded with the first-period SMA
pub fn calculate_ema(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }

    if period == 0 || prices.len() < period {
        return calculate_sma(prices, prices.len());
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = calculate_sma(&prices[..period], period);

    for &price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
    }

    ema
}

/// Bollinger Bands: SMA ± k population standard deviations
pub fn calculate_bollinger(prices: &[f64], period: usize, k: f64) -> BollingerBands {
    let window = if prices.len() > period {
        &prices[prices.len() - period..]
    } else {
        prices
    };
    let middle = calculate_sma(window, window.len());
    let variance = if window.is_empty() {
        0.0
    } else {
        window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / window.len() as f64
    };
    let std_dev = variance.sqrt();

    BollingerBands {
        upper: middle + k * std_dev,
        middle,
        lower: middle - k * std_dev,
    }
}

/// Average True Range with Wilder smoothing
pub fn calculate_atr(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < 2 {
        return 0.0;
    }

    let true_ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let bar = &w[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect();

    if true_ranges.len() < period {
        return true_ranges.iter().sum::<f64>() / true_ranges.len() as f64;
    }

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
    }
    atr
}
