//! Result assembly.
//!
//! An [`AssessmentResult`] is built once per request and never mutated. It
//! renders into the HTTP payload ([`PredictResponse`]) and, when persistence is
//! on, into a flat [`AnalysisRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use umkm_common::ResponseShape;
use uuid::Uuid;

use crate::classifier::HealthTier;
use crate::ratios::{FinancialInput, RatioSet};

/// Everything one assessment produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentResult {
    pub input: FinancialInput,
    pub ratios: RatioSet,
    pub tier: HealthTier,
    pub recommendation: String,
    pub user_id: Option<String>,
}

impl AssessmentResult {
    /// Render the response payload in the configured shape.
    pub fn to_response(&self, shape: ResponseShape) -> PredictResponse {
        match shape {
            ResponseShape::Full => PredictResponse::Full(FullResponse {
                prediction_status: self.tier.clone(),
                net_profit_margin: self.ratios.net_profit_margin,
                current_ratio: self.ratios.current_ratio,
                debt_to_equity: self.ratios.debt_to_equity,
                roa: self.ratios.return_on_assets,
                asset_turnover: self.ratios.asset_turnover,
                recommendation: self.recommendation.clone(),
            }),
            ResponseShape::Narrow => PredictResponse::Narrow(NarrowResponse {
                prediction_status: self.tier.clone(),
                recommendation: self.recommendation.clone(),
            }),
        }
    }

    /// Build the persistence record. Returns `None` without a user.
    pub fn to_record(&self) -> Option<AnalysisRecord> {
        let user_id = self.user_id.clone()?;
        Some(AnalysisRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            revenue: self.input.revenue,
            cogs: self.input.cost_of_goods_sold,
            operating_expenses: self.input.operating_expenses,
            total_assets: self.input.total_assets,
            cash: self.input.cash,
            total_liabilities: self.input.total_liabilities,
            total_equity: self.input.total_equity,
            net_profit_margin: self.ratios.net_profit_margin,
            current_ratio: self.ratios.current_ratio,
            debt_to_equity: self.ratios.debt_to_equity,
            roa: self.ratios.return_on_assets,
            asset_turnover: self.ratios.asset_turnover,
            prediction_status: self.tier.to_string(),
            recommendation: self.recommendation.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Status, all five ratios and the recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullResponse {
    pub prediction_status: HealthTier,
    pub net_profit_margin: f64,
    pub current_ratio: f64,
    pub debt_to_equity: f64,
    pub roa: f64,
    pub asset_turnover: f64,
    pub recommendation: String,
}

/// Status and recommendation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowResponse {
    pub prediction_status: HealthTier,
    pub recommendation: String,
}

/// Success payload of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Full(FullResponse),
    Narrow(NarrowResponse),
}

impl PredictResponse {
    pub fn prediction_status(&self) -> &HealthTier {
        match self {
            Self::Full(r) => &r.prediction_status,
            Self::Narrow(r) => &r.prediction_status,
        }
    }
}

/// One stored assessment. Flat, one row per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: String,
    pub revenue: f64,
    pub cogs: f64,
    pub operating_expenses: f64,
    pub total_assets: f64,
    pub cash: Option<f64>,
    pub total_liabilities: f64,
    pub total_equity: f64,
    pub net_profit_margin: f64,
    pub current_ratio: f64,
    pub debt_to_equity: f64,
    pub roa: f64,
    pub asset_turnover: f64,
    pub prediction_status: String,
    pub recommendation: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratios::{compute_ratios, sample_input};

    fn result(user_id: Option<&str>) -> AssessmentResult {
        let input = sample_input();
        AssessmentResult {
            input,
            ratios: compute_ratios(&input),
            tier: HealthTier::Healthy,
            recommendation: "Pertahankan.".into(),
            user_id: user_id.map(String::from),
        }
    }

    #[test]
    fn test_full_response_keys() {
        let json = serde_json::to_value(result(None).to_response(ResponseShape::Full)).unwrap();
        let object = json.as_object().unwrap();

        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "asset_turnover",
                "current_ratio",
                "debt_to_equity",
                "net_profit_margin",
                "prediction_status",
                "recommendation",
                "roa"
            ]
        );
        assert_eq!(json["prediction_status"], "Sehat");
        assert_eq!(json["roa"], 0.15);
    }

    #[test]
    fn test_narrow_response_keys() {
        let json = serde_json::to_value(result(None).to_response(ResponseShape::Narrow)).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["prediction_status"], "Sehat");
        assert_eq!(json["recommendation"], "Pertahankan.");
    }

    #[test]
    fn test_record_requires_user() {
        assert!(result(None).to_record().is_none());

        let record = result(Some("u-1")).to_record().unwrap();
        assert_eq!(record.user_id, "u-1");
        assert_eq!(record.cogs, 4_000.0);
        assert_eq!(record.cash, Some(6_000.0));
        assert_eq!(record.prediction_status, "Sehat");
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_record_ids_are_unique() {
        let r = result(Some("u-1"));
        assert_ne!(r.to_record().unwrap().id, r.to_record().unwrap().id);
    }
}
