pub mod risk;
pub mod signals;

// Re-export commonly used types
pub use risk::{RiskLevel, TradeDecision, TradeGate};
pub use signals::CombinedSignal;
