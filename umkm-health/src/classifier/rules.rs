//! Rule-based scorer.
//!
//! Each ratio earns one point against a fixed threshold; the point total maps
//! onto a tier. The comparison operators differ per ratio and are part of the
//! contract: debt-to-equity of exactly 1.00 earns nothing, a current ratio of
//! exactly 1.20 earns a point.
//!
//! | Ratio | Point when |
//! |-------|------------|
//! | Net profit margin | >= 0.10 |
//! | Current ratio | >= 1.20 |
//! | Debt to equity | < 1.00 |
//! | Return on assets | > 0.05 |
//! | Asset turnover | > 0.50 |
//!
//! Score >= 4 is Healthy, 2..=3 ModeratelyHealthy, below 2 AtRisk.

use serde::Serialize;

use super::HealthTier;
use crate::ratios::RatioSet;

/// Threshold values for the scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringThresholds {
    /// Minimum net profit margin (inclusive)
    pub min_net_profit_margin: f64,
    /// Minimum current ratio (inclusive)
    pub min_current_ratio: f64,
    /// Maximum debt to equity (exclusive)
    pub max_debt_to_equity: f64,
    /// Minimum return on assets (exclusive)
    pub min_return_on_assets: f64,
    /// Minimum asset turnover (exclusive)
    pub min_asset_turnover: f64,
    /// Lowest score that is Healthy
    pub healthy_score: u8,
    /// Lowest score that is ModeratelyHealthy
    pub moderate_score: u8,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            min_net_profit_margin: 0.10,
            min_current_ratio: 1.20,
            max_debt_to_equity: 1.00,
            min_return_on_assets: 0.05,
            min_asset_turnover: 0.50,
            healthy_score: 4,
            moderate_score: 2,
        }
    }
}

/// Which checks passed for one ratio set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub net_profit_margin: bool,
    pub current_ratio: bool,
    pub debt_to_equity: bool,
    pub return_on_assets: bool,
    pub asset_turnover: bool,
}

impl ScoreBreakdown {
    /// Number of passed checks (0-5).
    pub fn score(&self) -> u8 {
        [
            self.net_profit_margin,
            self.current_ratio,
            self.debt_to_equity,
            self.return_on_assets,
            self.asset_turnover,
        ]
        .iter()
        .filter(|passed| **passed)
        .count() as u8
    }
}

/// Deterministic threshold-and-sum classifier.
#[derive(Debug, Clone, Default)]
pub struct RuleScorer {
    thresholds: ScoringThresholds,
}

impl RuleScorer {
    /// Create a scorer with the standard thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scorer with custom thresholds.
    pub fn with_thresholds(thresholds: ScoringThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ScoringThresholds {
        &self.thresholds
    }

    /// Evaluate every threshold.
    pub fn breakdown(&self, ratios: &RatioSet) -> ScoreBreakdown {
        let t = &self.thresholds;
        ScoreBreakdown {
            net_profit_margin: ratios.net_profit_margin >= t.min_net_profit_margin,
            current_ratio: ratios.current_ratio >= t.min_current_ratio,
            debt_to_equity: ratios.debt_to_equity < t.max_debt_to_equity,
            return_on_assets: ratios.return_on_assets > t.min_return_on_assets,
            asset_turnover: ratios.asset_turnover > t.min_asset_turnover,
        }
    }

    /// Total points (0-5).
    pub fn score(&self, ratios: &RatioSet) -> u8 {
        self.breakdown(ratios).score()
    }

    /// Map a point total onto a tier.
    pub fn tier_for_score(&self, score: u8) -> HealthTier {
        if score >= self.thresholds.healthy_score {
            HealthTier::Healthy
        } else if score >= self.thresholds.moderate_score {
            HealthTier::ModeratelyHealthy
        } else {
            HealthTier::AtRisk
        }
    }

    /// Classify a ratio set.
    pub fn classify(&self, ratios: &RatioSet) -> HealthTier {
        let breakdown = self.breakdown(ratios);
        let score = breakdown.score();
        let tier = self.tier_for_score(score);

        tracing::debug!(
            score,
            tier = %tier,
            margin = breakdown.net_profit_margin,
            current = breakdown.current_ratio,
            debt = breakdown.debt_to_equity,
            roa = breakdown.return_on_assets,
            turnover = breakdown.asset_turnover,
            "Rule score computed"
        );

        tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratios::{compute_ratios, sample_input, FinancialInput};
    use test_case::test_case;

    fn ratios(npm: f64, cr: f64, der: f64, roa: f64, at: f64) -> RatioSet {
        RatioSet {
            net_profit_margin: npm,
            current_ratio: cr,
            debt_to_equity: der,
            return_on_assets: roa,
            asset_turnover: at,
        }
    }

    #[test]
    fn test_reference_business_is_healthy() {
        let scorer = RuleScorer::new();
        let ratios = compute_ratios(&sample_input());
        let breakdown = scorer.breakdown(&ratios);

        assert!(breakdown.net_profit_margin);
        assert!(breakdown.current_ratio);
        assert!(breakdown.debt_to_equity);
        assert!(breakdown.return_on_assets);
        // 0.50 is not strictly greater than 0.50
        assert!(!breakdown.asset_turnover);
        assert_eq!(breakdown.score(), 4);
        assert_eq!(scorer.classify(&ratios), HealthTier::Healthy);
    }

    #[test]
    fn test_all_zero_business_is_at_risk() {
        let scorer = RuleScorer::new();
        let input = FinancialInput {
            revenue: 0.0,
            cost_of_goods_sold: 0.0,
            operating_expenses: 0.0,
            total_assets: 0.0,
            cash: Some(0.0),
            total_liabilities: 0.0,
            total_equity: 0.0,
        };
        let ratios = compute_ratios(&input);

        // Only the guarded debt-to-equity of 0 passes (< 1.00)
        assert_eq!(scorer.score(&ratios), 1);
        assert_eq!(scorer.classify(&ratios), HealthTier::AtRisk);
    }

    #[test_case(0.99, 1 ; "debt below one scores")]
    #[test_case(1.00, 0 ; "debt exactly one does not score")]
    #[test_case(1.01, 0 ; "debt above one does not score")]
    fn test_debt_to_equity_boundary(der: f64, expected: u8) {
        let scorer = RuleScorer::new();
        assert_eq!(scorer.score(&ratios(0.0, 0.0, der, 0.0, 0.0)), expected);
    }

    #[test_case(1.19, 0 ; "current below threshold")]
    #[test_case(1.20, 1 ; "current exactly threshold scores")]
    fn test_current_ratio_boundary(cr: f64, expected: u8) {
        let scorer = RuleScorer::new();
        // debt of 5.0 keeps the debt check out of the total
        assert_eq!(scorer.score(&ratios(0.0, cr, 5.0, 0.0, 0.0)), expected);
    }

    #[test_case(0.10, 0.05, 0.50, 1 ; "inclusive margin, exclusive roa and turnover")]
    #[test_case(0.10, 0.0501, 0.5001, 3 ; "just above exclusive thresholds")]
    fn test_mixed_boundaries(npm: f64, roa: f64, at: f64, expected: u8) {
        let scorer = RuleScorer::new();
        assert_eq!(scorer.score(&ratios(npm, 0.0, 5.0, roa, at)), expected);
    }

    #[test_case(5, HealthTier::Healthy)]
    #[test_case(4, HealthTier::Healthy)]
    #[test_case(3, HealthTier::ModeratelyHealthy)]
    #[test_case(2, HealthTier::ModeratelyHealthy)]
    #[test_case(1, HealthTier::AtRisk)]
    #[test_case(0, HealthTier::AtRisk)]
    fn test_tier_for_score(score: u8, expected: HealthTier) {
        assert_eq!(RuleScorer::new().tier_for_score(score), expected);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let scorer = RuleScorer::new();
        let ratios = ratios(0.12, 0.8, 1.5, 0.06, 0.7);
        let first = scorer.classify(&ratios);
        for _ in 0..10 {
            assert_eq!(scorer.classify(&ratios), first);
        }
        assert_eq!(first, HealthTier::ModeratelyHealthy);
    }

    #[test]
    fn test_custom_thresholds() {
        let scorer = RuleScorer::with_thresholds(ScoringThresholds {
            min_asset_turnover: 0.40,
            ..ScoringThresholds::default()
        });
        let ratios = compute_ratios(&sample_input());
        assert_eq!(scorer.score(&ratios), 5);
        assert_eq!(scorer.thresholds().min_asset_turnover, 0.40);
    }
}
