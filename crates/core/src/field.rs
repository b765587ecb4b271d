use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The closed set of semantic fields extracted from an identity document.
/// Declaration order is the canonical comparison order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Name,
    DateOfBirth,
    Address,
    Postcode,
    Abn,
    Acn,
}

impl FieldName {
    pub const ALL: [FieldName; 6] = [
        FieldName::Name,
        FieldName::DateOfBirth,
        FieldName::Address,
        FieldName::Postcode,
        FieldName::Abn,
        FieldName::Acn,
    ];

    /// Critical fields escalate straight to rejection on a RED mismatch.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            FieldName::DateOfBirth | FieldName::Abn | FieldName::Acn | FieldName::Postcode
        )
    }

    /// Structured numeric fields compare exactly, never fuzzily.
    pub fn is_exact_match(self) -> bool {
        matches!(self, FieldName::Postcode | FieldName::Abn | FieldName::Acn)
    }

    /// Multi-word free-text fields where token overlap beats edit distance.
    pub fn is_multi_word(self) -> bool {
        matches!(self, FieldName::Name | FieldName::Address)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldName::Name => write!(f, "name"),
            FieldName::DateOfBirth => write!(f, "date_of_birth"),
            FieldName::Address => write!(f, "address"),
            FieldName::Postcode => write!(f, "postcode"),
            FieldName::Abn => write!(f, "abn"),
            FieldName::Acn => write!(f, "acn"),
        }
    }
}

/// A single extracted field value with its OCR confidence and the result of
/// its format/checksum validation. A failed validation is data, not an
/// error: the raw value is kept for downstream risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: FieldName,
    pub value: String,
    /// Confidence in [0, 100].
    pub confidence: f64,
    pub valid: bool,
}

impl ExtractedField {
    pub fn new(name: FieldName, value: impl Into<String>, confidence: f64, valid: bool) -> Self {
        Self { name, value: value.into(), confidence: confidence.clamp(0.0, 100.0), valid }
    }
}

/// All fields extracted from one document plus the aggregate OCR confidence.
/// A document with zero recognized fields carries an empty map and aggregate
/// confidence 0 rather than being an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub fields: BTreeMap<FieldName, ExtractedField>,
    /// Mean of the per-field confidences, in [0, 100].
    pub ocr_confidence: f64,
}

impl ExtractedFields {
    pub fn new(fields: BTreeMap<FieldName, ExtractedField>) -> Self {
        let ocr_confidence = if fields.is_empty() {
            0.0
        } else {
            fields.values().map(|f| f.confidence).sum::<f64>() / fields.len() as f64
        };
        Self { fields, ocr_confidence }
    }

    pub fn empty() -> Self {
        Self { fields: BTreeMap::new(), ocr_confidence: 0.0 }
    }

    pub fn get(&self, name: FieldName) -> Option<&ExtractedField> {
        self.fields.get(&name)
    }
}
