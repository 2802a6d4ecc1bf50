//! Ratio calculator.
//!
//! Turns raw monetary figures into the five normalized ratios the classifier
//! consumes. Every ratio is zero-guarded on its denominator, so the calculator
//! is total over finite input.
//!
//! | Ratio | Formula | Zero when |
//! |-------|---------|-----------|
//! | Net profit margin | NI / revenue | revenue == 0 |
//! | Current ratio | cash (or total assets) / total liabilities | liabilities == 0 |
//! | Debt to equity | total liabilities / total equity | equity == 0 |
//! | Return on assets | NI / total assets | assets == 0 |
//! | Asset turnover | revenue / total assets | assets == 0 |
//!
//! where NI = revenue - cost of goods sold - operating expenses.

use serde::{Deserialize, Serialize};

/// Names of the feature vector slots, in model order.
pub const FEATURE_ORDER: [&str; 5] = [
    "net_profit_margin",
    "current_ratio",
    "debt_to_equity",
    "roa",
    "asset_turnover",
];

/// Raw financial figures supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialInput {
    pub revenue: f64,
    #[serde(rename = "cogs")]
    pub cost_of_goods_sold: f64,
    pub operating_expenses: f64,
    pub total_assets: f64,
    /// Absent cash falls back to total assets as the liquidity proxy.
    #[serde(default)]
    pub cash: Option<f64>,
    pub total_liabilities: f64,
    pub total_equity: f64,
}

impl FinancialInput {
    /// Net income: revenue minus COGS minus operating expenses.
    pub fn net_income(&self) -> f64 {
        self.revenue - self.cost_of_goods_sold - self.operating_expenses
    }

    /// Numerator of the current ratio.
    pub fn liquid_assets(&self) -> f64 {
        self.cash.unwrap_or(self.total_assets)
    }
}

/// The five derived ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioSet {
    pub net_profit_margin: f64,
    pub current_ratio: f64,
    pub debt_to_equity: f64,
    #[serde(rename = "roa")]
    pub return_on_assets: f64,
    pub asset_turnover: f64,
}

impl RatioSet {
    /// Feature vector in [`FEATURE_ORDER`].
    pub fn features(&self) -> [f64; 5] {
        [
            self.net_profit_margin,
            self.current_ratio,
            self.debt_to_equity,
            self.return_on_assets,
            self.asset_turnover,
        ]
    }
}

fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Compute all five ratios. Never fails.
pub fn compute_ratios(input: &FinancialInput) -> RatioSet {
    let net_income = input.net_income();

    if input.cash.is_none() {
        tracing::debug!("Cash not supplied, current ratio uses total assets");
    }

    RatioSet {
        net_profit_margin: guarded_ratio(net_income, input.revenue),
        current_ratio: guarded_ratio(input.liquid_assets(), input.total_liabilities),
        debt_to_equity: guarded_ratio(input.total_liabilities, input.total_equity),
        return_on_assets: guarded_ratio(net_income, input.total_assets),
        asset_turnover: guarded_ratio(input.revenue, input.total_assets),
    }
}

#[cfg(test)]
pub(crate) fn sample_input() -> FinancialInput {
    FinancialInput {
        revenue: 10_000.0,
        cost_of_goods_sold: 4_000.0,
        operating_expenses: 3_000.0,
        total_assets: 20_000.0,
        cash: Some(6_000.0),
        total_liabilities: 5_000.0,
        total_equity: 15_000.0,
    }
}
