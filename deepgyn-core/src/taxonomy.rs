//! Label taxonomy: the classifier's fixed output labels and their risk
//! categories.
//!
//! The order of [`Label::ALL`] defines the alignment of the classifier's
//! output vector: index `i` is always the `i`-th label.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version of the label → category mapping, returned with every analysis.
pub const TAXONOMY_VERSION: &str = "1";

/// Prefix the training pipeline put in front of every class directory name.
const LABEL_PREFIX: &str = "im_";

/// One of the five cell morphology classes the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Dyskeratotic,
    Koilocytotic,
    Metaplastic,
    Parabasal,
    SuperficialIntermediate,
}

impl Label {
    /// Canonical label order, aligned with the classifier's output vector.
    pub const ALL: [Label; 5] = [
        Label::Dyskeratotic,
        Label::Koilocytotic,
        Label::Metaplastic,
        Label::Parabasal,
        Label::SuperficialIntermediate,
    ];

    /// Identifier as emitted by the classifier, e.g. `im_Dyskeratotic`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dyskeratotic => "im_Dyskeratotic",
            Label::Koilocytotic => "im_Koilocytotic",
            Label::Metaplastic => "im_Metaplastic",
            Label::Parabasal => "im_Parabasal",
            Label::SuperficialIntermediate => "im_Superficial-Intermediate",
        }
    }

    /// Human-readable name without the `im_` prefix.
    pub fn display_name(&self) -> &'static str {
        &self.as_str()[LABEL_PREFIX.len()..]
    }

    /// Position of this label in the classifier output vector.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn category(&self) -> RiskCategory {
        match self {
            Label::Dyskeratotic => RiskCategory::HighRisk,
            Label::Koilocytotic | Label::Metaplastic => RiskCategory::PreCancerous,
            Label::Parabasal | Label::SuperficialIntermediate => RiskCategory::Normal,
        }
    }

    /// Parse either the canonical identifier (`im_Parabasal`) or the display
    /// name (`Parabasal`).
    pub fn parse(s: &str) -> Option<Label> {
        let name = s.strip_prefix(LABEL_PREFIX).unwrap_or(s);
        Label::ALL.into_iter().find(|l| l.display_name() == name)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Label::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown label: {s}")))
    }
}

/// Coarse risk grouping of labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskCategory {
    HighRisk,
    PreCancerous,
    Normal,
    /// Anything that is not one of the canonical labels.
    Unknown,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::HighRisk => "High Risk / Cancerous",
            RiskCategory::PreCancerous => "Pre-cancerous",
            RiskCategory::Normal => "Normal",
            RiskCategory::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> RiskCategory {
        [
            RiskCategory::HighRisk,
            RiskCategory::PreCancerous,
            RiskCategory::Normal,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .unwrap_or(RiskCategory::Unknown)
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RiskCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RiskCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RiskCategory::parse(&s))
    }
}

/// Risk category of an arbitrary label string. Unrecognized labels map to
/// [`RiskCategory::Unknown`].
pub fn category_of(label: &str) -> RiskCategory {
    Label::parse(label)
        .map(|l| l.category())
        .unwrap_or(RiskCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let ids: Vec<&str> = Label::ALL.iter().map(|l| l.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "im_Dyskeratotic",
                "im_Koilocytotic",
                "im_Metaplastic",
                "im_Parabasal",
                "im_Superficial-Intermediate",
            ]
        );
        for (i, label) in Label::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
        }
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_of("im_Dyskeratotic"), RiskCategory::HighRisk);
        assert_eq!(category_of("im_Koilocytotic"), RiskCategory::PreCancerous);
        assert_eq!(category_of("im_Metaplastic"), RiskCategory::PreCancerous);
        assert_eq!(category_of("im_Parabasal"), RiskCategory::Normal);
        assert_eq!(
            category_of("im_Superficial-Intermediate"),
            RiskCategory::Normal
        );
    }

    #[test]
    fn test_unknown_label() {
        assert_eq!(category_of("im_Squamous"), RiskCategory::Unknown);
        assert_eq!(category_of(""), RiskCategory::Unknown);
        assert_eq!(category_of("im_"), RiskCategory::Unknown);
    }

    #[test]
    fn test_parse_display_name() {
        assert_eq!(Label::parse("Parabasal"), Some(Label::Parabasal));
        assert_eq!(
            Label::parse("Superficial-Intermediate"),
            Some(Label::SuperficialIntermediate)
        );
        assert_eq!(Label::parse("parabasal"), None);
    }

    #[test]
    fn test_display_name_strips_prefix() {
        assert_eq!(Label::Dyskeratotic.display_name(), "Dyskeratotic");
        assert_eq!(
            Label::SuperficialIntermediate.display_name(),
            "Superficial-Intermediate"
        );
    }

    #[test]
    fn test_category_strings() {
        assert_eq!(RiskCategory::HighRisk.to_string(), "High Risk / Cancerous");
        assert_eq!(RiskCategory::PreCancerous.to_string(), "Pre-cancerous");
        assert_eq!(RiskCategory::parse("Normal"), RiskCategory::Normal);
        assert_eq!(RiskCategory::parse("normal"), RiskCategory::Unknown);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&Label::Metaplastic).unwrap();
        assert_eq!(json, "\"im_Metaplastic\"");
        let label: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(label, Label::Metaplastic);

        let json = serde_json::to_string(&RiskCategory::HighRisk).unwrap();
        assert_eq!(json, "\"High Risk / Cancerous\"");
        assert!(serde_json::from_str::<Label>("\"im_Other\"").is_err());
    }
}
