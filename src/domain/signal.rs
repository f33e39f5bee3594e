//! Rule-based buy signal evaluation.
//!
//! Rules form a closed set evaluated in a fixed order:
//!
//! 1. [`SignalRule::DrawdownGate`] denies outright when the maximum drawdown
//!    exceeds its threshold. Nothing after it is evaluated.
//! 2. [`SignalRule::TrendMomentum`] allows or denies by trend and RSI.
//!
//! An allowed signal's base confidence is scaled by trend strength:
//! `base * (0.5 + 0.5 * strength)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::EtfDeskError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::orchestrator::SourceOrchestrator;
use crate::domain::technical::{compute_snapshot, IndicatorConfig, TechnicalSnapshot, TrendStatus};
use crate::ports::clock_port::Clock;

/// Amplification applied to the mean relative MA spacing before clamping.
pub const TREND_STRENGTH_SCALE: f64 = 10.0;

const RISING_BASE: f64 = 0.9;
const RANGING_BASE: f64 = 0.7;
const RISING_OVERBOUGHT_CONFIDENCE: f64 = 0.2;
const RANGING_DENY_CONFIDENCE: f64 = 0.3;
const FALLING_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub max_drawdown_threshold: f64,
    pub default_window_days: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            max_drawdown_threshold: 0.20,
            default_window_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalRule {
    DrawdownGate { threshold: f64 },
    TrendMomentum { overbought: f64, neutral: f64 },
}

#[derive(Debug, Clone, PartialEq)]
enum RuleOutcome {
    Pass { reason: String },
    Allow { reason: String, base: f64 },
    Deny { reason: String, confidence: f64 },
}

impl SignalRule {
    fn evaluate(&self, snapshot: &TechnicalSnapshot) -> RuleOutcome {
        match self {
            SignalRule::DrawdownGate { threshold } => {
                let dd = snapshot.max_drawdown;
                if dd > *threshold {
                    RuleOutcome::Deny {
                        reason: format!(
                            "max drawdown {:.1}% exceeds threshold {:.1}%, buying blocked",
                            dd * 100.0,
                            threshold * 100.0
                        ),
                        confidence: 0.0,
                    }
                } else {
                    RuleOutcome::Pass {
                        reason: format!(
                            "max drawdown {:.1}% within threshold {:.1}%",
                            dd * 100.0,
                            threshold * 100.0
                        ),
                    }
                }
            }
            SignalRule::TrendMomentum {
                overbought,
                neutral,
            } => {
                let rsi = snapshot.rsi_or_neutral();
                match snapshot.trend {
                    TrendStatus::Rising if rsi < *overbought => RuleOutcome::Allow {
                        reason: format!("rising trend and RSI {rsi:.1} < {overbought:.0}, buy conditions met"),
                        base: RISING_BASE,
                    },
                    TrendStatus::Rising => RuleOutcome::Deny {
                        reason: format!("rising trend but RSI {rsi:.1} >= {overbought:.0}, overbought"),
                        confidence: RISING_OVERBOUGHT_CONFIDENCE,
                    },
                    TrendStatus::Ranging if rsi < *neutral => RuleOutcome::Allow {
                        reason: format!("ranging trend and RSI {rsi:.1} < {neutral:.0}, buy conditions met"),
                        base: RANGING_BASE,
                    },
                    TrendStatus::Ranging => RuleOutcome::Deny {
                        reason: format!("ranging trend but RSI {rsi:.1} >= {neutral:.0}, no entry"),
                        confidence: RANGING_DENY_CONFIDENCE,
                    },
                    TrendStatus::Falling => RuleOutcome::Deny {
                        reason: "falling trend, buying blocked".to_string(),
                        confidence: FALLING_CONFIDENCE,
                    },
                }
            }
        }
    }
}

/// Rules in evaluation order.
pub fn default_rules(indicators: &IndicatorConfig, config: &SignalConfig) -> Vec<SignalRule> {
    vec![
        SignalRule::DrawdownGate {
            threshold: config.max_drawdown_threshold,
        },
        SignalRule::TrendMomentum {
            overbought: indicators.rsi_overbought,
            neutral: indicators.rsi_neutral,
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub is_allowed: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Runs `rules` top-down; the first deny wins.
pub fn evaluate_rules(snapshot: &TechnicalSnapshot, rules: &[SignalRule]) -> Decision {
    let mut reasons = Vec::new();
    let mut base: Option<f64> = None;

    for rule in rules {
        match rule.evaluate(snapshot) {
            RuleOutcome::Pass { reason } => reasons.push(reason),
            RuleOutcome::Allow { reason, base: b } => {
                reasons.push(reason);
                base = Some(base.map_or(b, |prev| prev * b));
            }
            RuleOutcome::Deny { reason, confidence } => {
                reasons.push(reason);
                return Decision {
                    is_allowed: false,
                    confidence: confidence.clamp(0.0, 1.0),
                    reasons,
                };
            }
        }
    }

    let strength = trend_strength(snapshot);
    let confidence = (base.unwrap_or(1.0) * (0.5 + 0.5 * strength)).clamp(0.0, 1.0);
    Decision {
        is_allowed: true,
        confidence,
        reasons,
    }
}

/// Mean relative spacing of the short/mid/long MAs, scaled and clamped to [0, 1].
pub fn trend_strength(snapshot: &TechnicalSnapshot) -> f64 {
    let Some((s, m, l)) = snapshot.trend_mas else {
        return 0.0;
    };
    let raw = match snapshot.trend {
        TrendStatus::Rising => ((s - m) / m + (m - l) / l) / 2.0,
        TrendStatus::Falling => ((m - s) / s + (l - m) / m) / 2.0,
        TrendStatus::Ranging => return 0.0,
    };
    if !raw.is_finite() {
        return 0.0;
    }
    (raw * TREND_STRENGTH_SCALE).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuySignal {
    pub symbol: String,
    pub is_allowed: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl BuySignal {
    pub fn explain(&self) -> String {
        let verdict = if self.is_allowed { "ALLOW" } else { "DENY" };
        let mut out = format!(
            "{} buy signal: {}\nconfidence: {:.1}%\nevaluated at: {}\n",
            self.symbol,
            verdict,
            self.confidence * 100.0,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        out.push_str("reasons:\n");
        for (i, reason) in self.reasons.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, reason));
        }
        out
    }
}

pub struct SignalEvaluator {
    orchestrator: Arc<SourceOrchestrator>,
    clock: Arc<dyn Clock>,
    indicators: IndicatorConfig,
    config: SignalConfig,
    rules: Vec<SignalRule>,
}

impl SignalEvaluator {
    pub fn new(
        orchestrator: Arc<SourceOrchestrator>,
        clock: Arc<dyn Clock>,
        indicators: IndicatorConfig,
        config: SignalConfig,
    ) -> Self {
        let rules = default_rules(&indicators, &config);
        SignalEvaluator {
            orchestrator,
            clock,
            indicators,
            config,
            rules,
        }
    }

    pub fn indicators(&self) -> &IndicatorConfig {
        &self.indicators
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn evaluate(&self, snapshot: &TechnicalSnapshot) -> BuySignal {
        let decision = evaluate_rules(snapshot, &self.rules);
        tracing::info!(
            symbol = %snapshot.symbol,
            allowed = decision.is_allowed,
            confidence = decision.confidence,
            "buy signal evaluated"
        );
        BuySignal {
            symbol: snapshot.symbol.clone(),
            is_allowed: decision.is_allowed,
            confidence: decision.confidence,
            reasons: decision.reasons,
            timestamp: self.clock.now(),
        }
    }

    pub fn evaluate_series(&self, series: &PriceSeries) -> Result<BuySignal, EtfDeskError> {
        let snapshot = compute_snapshot(series, &self.indicators)?;
        Ok(self.evaluate(&snapshot))
    }

    /// Evaluates `series`, or the default trailing window fetched through the
    /// orchestrator when none is supplied.
    pub fn generate(
        &self,
        symbol: &str,
        series: Option<&PriceSeries>,
    ) -> Result<BuySignal, EtfDeskError> {
        match series {
            Some(s) => self.evaluate_series(s),
            None => {
                let end = self.clock.today();
                let start = end - chrono::Duration::days(self.config.default_window_days);
                let fetched = self.orchestrator.fetch_series(symbol, start, end)?;
                self.evaluate_series(&fetched)
            }
        }
    }
}
