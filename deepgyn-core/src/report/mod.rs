//! # Report rendering
//!
//! Turns a [`ReportRequest`] into a fixed-layout PDF. Rendering happens in two
//! steps: [`ReportDocument::build`] produces the complete layout (every string
//! and colour that will appear on the page), and [`pdf`] draws that layout
//! with `genpdf`. The renderer returns both, so what was drawn can always be
//! inspected.

pub mod pdf;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ReportConfig;
use crate::error::{DeepGynError, Result};
use crate::taxonomy::{Label, category_of};

pub use pdf::{RenderedReport, ReportRenderer};

pub const REPORT_TITLE: &str = "CERVICAL CYTOLOGY AI ANALYSIS";

pub const DISCLAIMER: &str = "This report is generated by an Artificial Intelligence system \
(DeepGynScan) and serves as a preliminary screening tool. It does not replace a professional \
medical diagnosis. All results must be clinically correlated and verified by a certified \
pathologist.";

/// Input of the report endpoint. Field names follow the browser client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Top risk category, e.g. `High Risk / Cancerous`.
    pub prediction: String,
    pub confidence: f64,
    /// Label -> probability.
    pub details: HashMap<String, f64>,
    pub patient_name: String,
    pub patient_age: u32,
    #[serde(default)]
    pub patient_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
}

fn check_probability(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DeepGynError::invalid_input(format!(
            "{what} {value} is outside [0, 1]"
        )))
    }
}

impl ReportRequest {
    pub fn validate(&self) -> Result<()> {
        if self.prediction.trim().is_empty() {
            return Err(DeepGynError::invalid_input("prediction must not be empty"));
        }
        if self.patient_name.trim().is_empty() {
            return Err(DeepGynError::invalid_input("patientName must not be empty"));
        }
        if self.patient_age == 0 {
            return Err(DeepGynError::invalid_input(
                "patientAge must be a positive integer",
            ));
        }
        check_probability("confidence", self.confidence)?;
        for (label, score) in &self.details {
            check_probability(&format!("details[{label}]"), *score)?;
        }
        Ok(())
    }
}

/// Colour of a category in the clinical impression and breakdown table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpressionColor {
    Red,
    Amber,
    Green,
}

impl ImpressionColor {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            ImpressionColor::Red => (0xd3, 0x2f, 0x2f),
            ImpressionColor::Amber => (0xff, 0xa5, 0x00),
            ImpressionColor::Green => (0x2e, 0x7d, 0x32),
        }
    }
}

/// Case-insensitive substring match: `high` → red, else `pre` → amber, else green.
pub fn impression_color(category: &str) -> ImpressionColor {
    let lower = category.to_lowercase();
    if lower.contains("high") {
        ImpressionColor::Red
    } else if lower.contains("pre") {
        ImpressionColor::Amber
    } else {
        ImpressionColor::Green
    }
}

/// `0.7` → `70.00%`.
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// One row of the probability table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub class_name: String,
    pub category: String,
    pub probability: String,
    pub score: f64,
    pub color: ImpressionColor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Letterhead {
    pub brand: String,
    pub lab_name: String,
    pub address: String,
    pub licence: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Impression {
    pub category: String,
    pub confidence: String,
    pub color: ImpressionColor,
}

/// The complete page content of one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub letterhead: Letterhead,
    pub title: String,
    /// Demographics grid, three rows of two `(label, value)` pairs.
    pub demographics: Vec<[(String, String); 2]>,
    pub impression: Impression,
    pub breakdown: Vec<BreakdownRow>,
    pub signatures: [String; 2],
    pub disclaimer: String,
}

/// Order details by descending score. Ties keep canonical label order;
/// labels outside the taxonomy come after canonical ones, by name.
fn sorted_details(details: &HashMap<String, f64>) -> Vec<(&str, f64)> {
    let mut rows: Vec<(&str, f64)> = details.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    rows.sort_by(|a, b| {
        let rank = |s: &str| Label::parse(s).map_or(usize::MAX, |l| l.index());
        rank(a.0).cmp(&rank(b.0)).then_with(|| a.0.cmp(b.0))
    });
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    rows
}

fn class_name(label: &str) -> String {
    label.strip_prefix("im_").unwrap_or(label).to_string()
}

/// Random identifier in the `DG-1000`..`DG-9999` range.
pub fn generate_patient_id() -> String {
    format!("DG-{}", rand::thread_rng().gen_range(1000..=9999))
}

impl ReportDocument {
    pub fn build(
        request: &ReportRequest,
        config: &ReportConfig,
        issued_on: NaiveDate,
        patient_id: &str,
    ) -> Result<Self> {
        request.validate()?;

        let breakdown = sorted_details(&request.details)
            .into_iter()
            .map(|(label, score)| {
                let category = category_of(label).to_string();
                BreakdownRow {
                    class_name: class_name(label),
                    color: impression_color(&category),
                    category,
                    probability: format_percent(score),
                    score,
                }
            })
            .collect();

        let pair = |a: &str, b: String| (a.to_string(), b);
        Ok(Self {
            letterhead: Letterhead {
                brand: "DEEPGYN SCAN AI".to_string(),
                lab_name: config.lab_name.clone(),
                address: config.lab_address.clone(),
                licence: format!("Licence No: {}", config.licence),
                phone: format!("Phone: {}", config.phone),
            },
            title: REPORT_TITLE.to_string(),
            demographics: vec![
                [
                    pair("Patient Name:", request.patient_name.clone()),
                    pair("Patient ID:", patient_id.to_string()),
                ],
                [
                    pair(
                        "Age / Gender:",
                        format!("{} Years / Female", request.patient_age),
                    ),
                    pair("Date:", issued_on.format("%Y-%m-%d").to_string()),
                ],
                [
                    pair("Referred By:", "DeepGynScan AI".to_string()),
                    pair("Location:", request.patient_location.clone()),
                ],
            ],
            impression: Impression {
                category: request.prediction.clone(),
                confidence: format_percent(request.confidence),
                color: impression_color(&request.prediction),
            },
            breakdown,
            signatures: [
                "AI System Generated".to_string(),
                "Chief Pathologist Signature".to_string(),
            ],
            disclaimer: DISCLAIMER.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn sample_request() -> ReportRequest {
        let details = [
            ("im_Dyskeratotic", 0.7),
            ("im_Koilocytotic", 0.1),
            ("im_Metaplastic", 0.05),
            ("im_Parabasal", 0.1),
            ("im_Superficial-Intermediate", 0.05),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        ReportRequest {
            prediction: "High Risk / Cancerous".into(),
            confidence: 0.7,
            details,
            patient_name: "Jane Doe".into(),
            patient_age: 35,
            patient_location: "Coimbatore".into(),
            patient_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample_request;
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(request: &ReportRequest) -> ReportDocument {
        ReportDocument::build(
            request,
            &ReportConfig::default(),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            "DG-4242",
        )
        .unwrap()
    }

    #[test]
    fn test_impression_color_rule() {
        assert_eq!(impression_color("High Risk / Cancerous"), ImpressionColor::Red);
        assert_eq!(impression_color("HIGH"), ImpressionColor::Red);
        assert_eq!(impression_color("Pre-cancerous"), ImpressionColor::Amber);
        assert_eq!(impression_color("likely PRE-malignant"), ImpressionColor::Amber);
        assert_eq!(impression_color("Normal"), ImpressionColor::Green);
        assert_eq!(impression_color("Unknown"), ImpressionColor::Green);
        // "high" wins over "pre" when both appear
        assert_eq!(impression_color("pre-high"), ImpressionColor::Red);
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.7), "70.00%");
        assert_eq!(format_percent(0.92), "92.00%");
        assert_eq!(format_percent(0.123456), "12.35%");
        assert_eq!(format_percent(1.0), "100.00%");
    }

    #[test]
    fn test_document_impression() {
        let doc = build(&sample_request());
        assert_eq!(doc.title, REPORT_TITLE);
        assert_eq!(doc.impression.category, "High Risk / Cancerous");
        assert_eq!(doc.impression.confidence, "70.00%");
        assert_eq!(doc.impression.color, ImpressionColor::Red);
        assert_eq!(doc.disclaimer, DISCLAIMER);
    }

    #[test]
    fn test_document_demographics() {
        let doc = build(&sample_request());
        assert_eq!(doc.demographics.len(), 3);
        assert_eq!(doc.demographics[0][0].1, "Jane Doe");
        assert_eq!(doc.demographics[0][1].1, "DG-4242");
        assert_eq!(doc.demographics[1][0].1, "35 Years / Female");
        assert_eq!(doc.demographics[1][1].1, "2026-03-14");
        assert_eq!(doc.demographics[2][1].1, "Coimbatore");
    }

    #[test]
    fn test_breakdown_sorted_with_stable_ties() {
        let doc = build(&sample_request());
        let names: Vec<&str> = doc.breakdown.iter().map(|r| r.class_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Dyskeratotic",
                "Koilocytotic",
                "Parabasal",
                "Metaplastic",
                "Superficial-Intermediate",
            ]
        );
        assert_eq!(doc.breakdown[0].category, "High Risk / Cancerous");
        assert_eq!(doc.breakdown[0].probability, "70.00%");
        assert_eq!(doc.breakdown[1].color, ImpressionColor::Amber);
        assert_eq!(doc.breakdown[2].color, ImpressionColor::Green);
    }

    #[test]
    fn test_unknown_detail_labels() {
        let mut request = sample_request();
        request.details.insert("im_Squamous".into(), 0.1);
        let doc = build(&request);
        let row = doc
            .breakdown
            .iter()
            .find(|r| r.class_name == "Squamous")
            .unwrap();
        assert_eq!(row.category, "Unknown");
        assert_eq!(row.color, ImpressionColor::Green);
        // tie at 0.1: canonical labels first
        let names: Vec<&str> = doc.breakdown.iter().map(|r| r.class_name.as_str()).collect();
        assert_eq!(&names[1..4], &["Koilocytotic", "Parabasal", "Squamous"]);
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        let mut request = sample_request();
        request.confidence = 1.2;
        assert!(request.validate().is_err());

        let mut request = sample_request();
        request.patient_age = 0;
        assert!(request.validate().is_err());

        let mut request = sample_request();
        request.details.insert("im_Parabasal".into(), f64::NAN);
        assert!(request.validate().is_err());

        let mut request = sample_request();
        request.patient_name = " ".into();
        assert!(matches!(
            request.validate(),
            Err(DeepGynError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::json!({
            "prediction": "Normal",
            "confidence": 0.92,
            "details": {"im_Parabasal": 0.92, "im_Metaplastic": 0.08},
            "patientName": "Jane Doe",
            "patientAge": 35,
            "patientLocation": "Coimbatore"
        });
        let request: ReportRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.patient_name, "Jane Doe");
        assert_eq!(request.details.len(), 2);
        assert!(request.patient_id.is_none());
    }

    #[test]
    fn test_generate_patient_id() {
        for _ in 0..50 {
            let id = generate_patient_id();
            let n: u32 = id.strip_prefix("DG-").unwrap().parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }
}
