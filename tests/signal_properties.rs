mod common;

use cryptorag::trading::{RiskLevel, TradeGate};
use cryptorag::{CombinedSignal, SignalStrength};

#[test]
fn test_disagreeing_components_are_neutral_with_low_confidence() {
    // price StrongBuy (+12%), sentiment StrongSell (extreme greed)
    let signal = CombinedSignal::from_components(
        "BTC",
        Some(common::market("BTC", 70_000.0, 12.0)),
        Vec::new(),
        Some(common::sentiment(90)),
        None,
    );

    assert_eq!(signal.price_signal, SignalStrength::StrongBuy);
    assert_eq!(signal.sentiment_signal, SignalStrength::StrongSell);
    // (5 * 0.25 + 1 * 0.20) / 0.45 = 3.22
    assert_eq!(signal.overall_signal, SignalStrength::Neutral);
    assert!(signal.confidence < 0.3);
    assert_eq!(signal.risk_level, RiskLevel::Extreme);
    assert!(signal.warnings.iter().any(|w| w.starts_with("High volatility")));
    assert!(signal.opportunities.iter().any(|o| o.contains("Extreme Greed")));
}

#[test]
fn test_single_component_is_fully_confident() {
    let signal = CombinedSignal::from_components(
        "ETH",
        Some(common::market("ETH", 3_000.0, -5.0)),
        Vec::new(),
        None,
        None,
    );

    assert_eq!(signal.overall_signal, SignalStrength::Sell);
    assert_eq!(signal.confidence, 1.0);
    assert_eq!(signal.risk_level, RiskLevel::Low);
    assert_eq!(signal.reasoning[0], "Bearish signal with 100.0% confidence");
}

#[test]
fn test_no_components_defaults() {
    let signal = CombinedSignal::from_components("SOL", None, Vec::new(), None, None);
    assert_eq!(signal.overall_signal, SignalStrength::Neutral);
    assert_eq!(signal.confidence, 0.0);
    assert_eq!(signal.risk_level, RiskLevel::Medium);
    assert_eq!(signal.reasoning, vec!["Neutral market conditions"]);
}

#[test]
fn test_rounding_is_half_to_even() {
    assert_eq!(SignalStrength::from_average(2.5), SignalStrength::Sell);
    assert_eq!(SignalStrength::from_average(3.5), SignalStrength::Buy);
    assert_eq!(SignalStrength::from_average(4.5), SignalStrength::Buy);
    assert_eq!(SignalStrength::from_average(0.2), SignalStrength::StrongSell);
    assert_eq!(SignalStrength::from_average(9.0), SignalStrength::StrongBuy);
}

#[test]
fn test_gate_on_agreeing_components() {
    let signal = CombinedSignal::from_components(
        "BTC",
        Some(common::market("BTC", 60_000.0, 4.0)),
        Vec::new(),
        Some(common::sentiment(30)),
        None,
    );
    assert_eq!(signal.overall_signal, SignalStrength::Buy);

    let gate = TradeGate::new(0.7, RiskLevel::High);
    assert!(signal.evaluate(&gate).is_actionable());

    let strict = TradeGate::new(1.01, RiskLevel::Low);
    assert!(!signal.evaluate(&strict).is_actionable());
}

#[test]
fn test_report_json_shape() {
    let signal = CombinedSignal::from_components(
        "BTC",
        Some(common::market("BTC", 60_000.0, 4.0)),
        Vec::new(),
        None,
        None,
    );
    let report = signal.to_report();
    assert_eq!(report["symbol"], "BTC");
    assert_eq!(report["overall_signal"], "BUY");
    assert_eq!(signal.unique_id().len(), 16);

    let parsed: serde_json::Value = serde_json::from_str(&signal.to_json().unwrap()).unwrap();
    assert_eq!(parsed, report);

    let full: CombinedSignal = serde_json::from_value(serde_json::to_value(&signal).unwrap()).unwrap();
    assert_eq!(full.overall_signal, SignalStrength::Buy);
    assert_eq!(full.market_data.unwrap().price, 60_000.0);
}
