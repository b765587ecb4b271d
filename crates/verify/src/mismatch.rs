use thiserror::Error;

use veridoc_core::{
    ExtractedFields, FieldName, MismatchRecord, MismatchSeverity, SimilarityThresholds,
};

use crate::similarity::field_similarity;

/// The comparison inputs were unusable. Fatal for this comparison only;
/// other documents in the batch are unaffected.
#[derive(Debug, Error)]
pub enum MismatchInputError {
    #[error("Nothing to compare: neither document produced any fields")]
    BothEmpty,
}

/// Pairwise field comparison between two documents' extractions.
pub struct MismatchDetector;

impl MismatchDetector {
    /// One record per field present on at least one side, in canonical
    /// field order. A field present on a single side is a RED discrepancy
    /// with an absence note: an unverifiable field is not a pass.
    pub fn compare(
        a: &ExtractedFields,
        b: &ExtractedFields,
        thresholds: &SimilarityThresholds,
    ) -> Result<Vec<MismatchRecord>, MismatchInputError> {
        if a.fields.is_empty() && b.fields.is_empty() {
            return Err(MismatchInputError::BothEmpty);
        }

        let mut records = Vec::new();
        for name in FieldName::ALL {
            let record = match (a.get(name), b.get(name)) {
                (None, None) => continue,
                (Some(fa), None) => MismatchRecord {
                    field: name,
                    value_a: Some(fa.value.clone()),
                    value_b: None,
                    similarity: 0.0,
                    severity: MismatchSeverity::Red,
                    note: Some("absent on document B".to_string()),
                },
                (None, Some(fb)) => MismatchRecord {
                    field: name,
                    value_a: None,
                    value_b: Some(fb.value.clone()),
                    similarity: 0.0,
                    severity: MismatchSeverity::Red,
                    note: Some("absent on document A".to_string()),
                },
                (Some(fa), Some(fb)) => {
                    let similarity = field_similarity(name, &fa.value, &fb.value);
                    let bands = thresholds.for_field(name);
                    let severity = if similarity >= bands.green {
                        MismatchSeverity::None
                    } else if similarity >= bands.yellow {
                        MismatchSeverity::Yellow
                    } else {
                        MismatchSeverity::Red
                    };
                    MismatchRecord {
                        field: name,
                        value_a: Some(fa.value.clone()),
                        value_b: Some(fb.value.clone()),
                        similarity,
                        severity,
                        note: None,
                    }
                }
            };
            records.push(record);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use veridoc_core::ExtractedField;

    fn doc(entries: &[(FieldName, &str)]) -> ExtractedFields {
        let mut map = BTreeMap::new();
        for (name, value) in entries {
            map.insert(*name, ExtractedField::new(*name, *value, 90.0, true));
        }
        ExtractedFields::new(map)
    }

    fn thresholds() -> SimilarityThresholds {
        SimilarityThresholds::default()
    }

    #[test]
    fn identical_documents_are_all_none() {
        let entries = [
            (FieldName::Name, "JANE CITIZEN"),
            (FieldName::Postcode, "3000"),
            (FieldName::Abn, "51824753556"),
        ];
        let records =
            MismatchDetector::compare(&doc(&entries), &doc(&entries), &thresholds()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.severity == MismatchSeverity::None));
        assert!(records.iter().all(|r| r.similarity == 1.0));
    }

    #[test]
    fn postcode_off_by_one_digit_is_red() {
        let a = doc(&[(FieldName::Postcode, "3000")]);
        let b = doc(&[(FieldName::Postcode, "3001")]);
        let records = MismatchDetector::compare(&a, &b, &thresholds()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, MismatchSeverity::Red);
        assert_eq!(records[0].similarity, 0.0);
    }

    #[test]
    fn minor_address_variation_is_yellow() {
        let a = doc(&[(FieldName::Address, "12 Example Street Melbourne")]);
        let b = doc(&[(FieldName::Address, "12 Exmpl Strt Melbrn")]);
        let records = MismatchDetector::compare(&a, &b, &thresholds()).unwrap();
        assert_eq!(records[0].severity, MismatchSeverity::Yellow);
        let bands = thresholds().address;
        assert!(records[0].similarity < bands.green);
        assert!(records[0].similarity >= bands.yellow);
    }

    #[test]
    fn one_sided_field_is_red_with_note() {
        let a = doc(&[(FieldName::Name, "JANE CITIZEN"), (FieldName::Acn, "123456780")]);
        let b = doc(&[(FieldName::Name, "JANE CITIZEN")]);
        let records = MismatchDetector::compare(&a, &b, &thresholds()).unwrap();

        let acn = records.iter().find(|r| r.field == FieldName::Acn).unwrap();
        assert_eq!(acn.severity, MismatchSeverity::Red);
        assert_eq!(acn.value_b, None);
        assert_eq!(acn.note.as_deref(), Some("absent on document B"));
    }

    #[test]
    fn records_follow_canonical_field_order() {
        let a = doc(&[
            (FieldName::Acn, "123456780"),
            (FieldName::Name, "JANE CITIZEN"),
            (FieldName::Postcode, "3000"),
        ]);
        let records = MismatchDetector::compare(&a, &a.clone(), &thresholds()).unwrap();
        let fields: Vec<FieldName> = records.iter().map(|r| r.field).collect();
        assert_eq!(
            fields,
            vec![FieldName::Name, FieldName::Postcode, FieldName::Acn]
        );
    }

    #[test]
    fn comparison_is_symmetric() {
        let a = doc(&[
            (FieldName::Name, "JANE CITIZEN"),
            (FieldName::Address, "12 Example St"),
        ]);
        let b = doc(&[
            (FieldName::Name, "JANE CITIZN"),
            (FieldName::Address, "21 Example St"),
        ]);
        let ab = MismatchDetector::compare(&a, &b, &thresholds()).unwrap();
        let ba = MismatchDetector::compare(&b, &a, &thresholds()).unwrap();
        for (x, y) in ab.iter().zip(ba.iter()) {
            assert_eq!(x.similarity, y.similarity);
            assert_eq!(x.severity, y.severity);
        }
    }

    #[test]
    fn both_empty_is_an_input_error() {
        let err = MismatchDetector::compare(
            &ExtractedFields::empty(),
            &ExtractedFields::empty(),
            &thresholds(),
        )
        .unwrap_err();
        assert!(matches!(err, MismatchInputError::BothEmpty));
    }

    #[test]
    fn dob_requires_exact_string_for_green() {
        let a = doc(&[(FieldName::DateOfBirth, "1985-03-14")]);
        let b = doc(&[(FieldName::DateOfBirth, "1985-03-15")]);
        let records = MismatchDetector::compare(&a, &b, &thresholds()).unwrap();
        // One character apart is high similarity but below the 1.0 GREEN
        // bar for dates.
        assert_ne!(records[0].severity, MismatchSeverity::None);
    }
}
