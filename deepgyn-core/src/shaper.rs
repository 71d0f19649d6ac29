//! Result shaping: turns a raw probability vector into a [`PredictionResult`].
//!
//! The vector must already be aligned with [`Label::ALL`]. Values are taken
//! as-is; the shaper does not re-normalize.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::{DeepGynError, Result};
use crate::taxonomy::{Label, RiskCategory, TAXONOMY_VERSION};

/// Confidence assigned to one label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelScore {
    #[serde(skip)]
    pub label: Label,
    pub category: RiskCategory,
    pub confidence: f64,
}

/// Structured outcome of one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    pub category: RiskCategory,
    pub confidence: f64,
    /// One entry per canonical label, in canonical order.
    pub breakdown: Vec<LabelScore>,
}

impl PredictionResult {
    pub fn score(&self, label: Label) -> f64 {
        self.breakdown[label.index()].confidence
    }
}

/// Pair each probability with its label and pick the top prediction.
///
/// Exact ties resolve to the earliest label in canonical order.
pub fn shape(probabilities: &[f64]) -> Result<PredictionResult> {
    if probabilities.len() != Label::ALL.len() {
        tracing::error!(
            expected = Label::ALL.len(),
            actual = probabilities.len(),
            "classifier output does not match the label taxonomy"
        );
        return Err(DeepGynError::ShapeMismatch {
            expected: Label::ALL.len(),
            actual: probabilities.len(),
        });
    }
    if let Some((i, v)) = probabilities
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(DeepGynError::InvalidOutput {
            message: format!("value {v} for {} is not finite", Label::ALL[i]),
        });
    }

    let breakdown: Vec<LabelScore> = Label::ALL
        .iter()
        .zip(probabilities)
        .map(|(&label, &confidence)| LabelScore {
            label,
            category: label.category(),
            confidence,
        })
        .collect();

    let mut top = breakdown[0];
    for score in &breakdown[1..] {
        if score.confidence > top.confidence {
            top = *score;
        }
    }

    Ok(PredictionResult {
        label: top.label,
        category: top.category,
        confidence: top.confidence,
        breakdown,
    })
}

/// Convenience wrapper for `f32` model outputs.
pub fn shape_f32(probabilities: &[f32]) -> Result<PredictionResult> {
    let widened: Vec<f64> = probabilities.iter().map(|&p| f64::from(p)).collect();
    shape(&widened)
}

struct Details<'a>(&'a [LabelScore]);

impl Serialize for Details<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for score in self.0 {
            map.serialize_entry(score.label.as_str(), &score.confidence)?;
        }
        map.end()
    }
}

struct MappedDetails<'a>(&'a [LabelScore]);

impl Serialize for MappedDetails<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for score in self.0 {
            map.serialize_entry(score.label.as_str(), score)?;
        }
        map.end()
    }
}

/// Wire format of the analyze endpoint:
/// `{prediction, label, confidence, details, mapped_details, taxonomy_version}`.
impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PredictionResult", 6)?;
        s.serialize_field("prediction", &self.category)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("confidence", &self.confidence)?;
        s.serialize_field("details", &Details(&self.breakdown))?;
        s.serialize_field("mapped_details", &MappedDetails(&self.breakdown))?;
        s.serialize_field("taxonomy_version", TAXONOMY_VERSION)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shape_dyskeratotic_scenario() {
        let result = shape(&[0.7, 0.1, 0.05, 0.1, 0.05]).unwrap();
        assert_eq!(result.label, Label::Dyskeratotic);
        assert_eq!(result.category, RiskCategory::HighRisk);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.breakdown.len(), 5);
    }

    #[test]
    fn test_shape_length_mismatch() {
        let err = shape(&[0.25, 0.25, 0.25, 0.25]).unwrap_err();
        match err {
            DeepGynError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 4);
            }
            other => panic!("Expected ShapeMismatch, got {other:?}"),
        }
        assert!(shape(&[0.1; 6]).is_err());
        assert!(shape(&[]).is_err());
    }

    #[test]
    fn test_shape_tie_first_wins() {
        let result = shape(&[0.1, 0.4, 0.1, 0.4, 0.0]).unwrap();
        assert_eq!(result.label, Label::Koilocytotic);
        assert_eq!(result.category, RiskCategory::PreCancerous);
    }

    #[test]
    fn test_shape_all_equal() {
        let result = shape(&[0.2; 5]).unwrap();
        assert_eq!(result.label, Label::Dyskeratotic);
    }

    #[test]
    fn test_shape_rejects_nan() {
        let err = shape(&[0.2, f64::NAN, 0.2, 0.2, 0.2]).unwrap_err();
        assert!(matches!(err, DeepGynError::InvalidOutput { .. }));
    }

    #[test]
    fn test_shape_breakdown_categories() {
        let result = shape(&[0.05, 0.05, 0.1, 0.6, 0.2]).unwrap();
        assert_eq!(result.label, Label::Parabasal);
        assert_eq!(result.category, RiskCategory::Normal);
        let categories: Vec<RiskCategory> =
            result.breakdown.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![
                RiskCategory::HighRisk,
                RiskCategory::PreCancerous,
                RiskCategory::PreCancerous,
                RiskCategory::Normal,
                RiskCategory::Normal,
            ]
        );
        assert_eq!(result.score(Label::SuperficialIntermediate), 0.2);
        let total: f64 = result.breakdown.iter().map(|s| s.confidence).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shape_f32() {
        let result = shape_f32(&[0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(result.label, Label::Metaplastic);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_serialized_shape() {
        let result = shape(&[0.7, 0.1, 0.05, 0.1, 0.05]).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["prediction"], "High Risk / Cancerous");
        assert_eq!(json["label"], "im_Dyskeratotic");
        assert_eq!(json["confidence"], 0.7);
        assert_eq!(json["details"]["im_Koilocytotic"], 0.1);
        assert_eq!(
            json["mapped_details"]["im_Metaplastic"]["category"],
            "Pre-cancerous"
        );
        assert_eq!(
            json["mapped_details"]["im_Superficial-Intermediate"]["confidence"],
            0.05
        );
        assert_eq!(json["details"].as_object().unwrap().len(), 5);
        assert_eq!(json["taxonomy_version"], TAXONOMY_VERSION);
        assert!(json["mapped_details"]["im_Parabasal"].get("label").is_none());
    }
}
