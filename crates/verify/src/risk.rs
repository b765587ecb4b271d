use veridoc_core::{
    Decision, MismatchRecord, MismatchSeverity, RiskAssessment, RiskThresholds, RiskTier,
};

/// Tiered decision over the mismatch list and both documents' aggregate
/// OCR confidence. A deterministic rule table, evaluated top-down with the
/// first matching rule winning.
pub struct RiskAssessor;

impl RiskAssessor {
    pub fn assess(
        mismatches: &[MismatchRecord],
        ocr_confidence_a: f64,
        ocr_confidence_b: f64,
        thresholds: &RiskThresholds,
    ) -> RiskAssessment {
        let min_confidence = ocr_confidence_a.min(ocr_confidence_b);

        // Rule 1: RED on a critical field, or unreadable documents.
        let mut factors = Vec::new();
        for m in mismatches {
            if m.severity == MismatchSeverity::Red && m.field.is_critical() {
                factors.push(describe(m, "RED mismatch on critical field"));
            }
        }
        if min_confidence < thresholds.reject_below {
            factors.push(format!(
                "minimum OCR confidence {min_confidence:.0} below {:.0}",
                thresholds.reject_below
            ));
        }
        if !factors.is_empty() {
            return RiskAssessment { tier: RiskTier::High, decision: Decision::Reject, factors };
        }

        // Rule 2: any remaining RED, any YELLOW, or marginal confidence.
        for m in mismatches {
            match m.severity {
                MismatchSeverity::Red => factors.push(describe(m, "RED mismatch")),
                MismatchSeverity::Yellow => factors.push(describe(m, "YELLOW mismatch")),
                MismatchSeverity::None => {}
            }
        }
        if min_confidence < thresholds.escalate_below {
            factors.push(format!(
                "minimum OCR confidence {min_confidence:.0} below {:.0}",
                thresholds.escalate_below
            ));
        }
        if !factors.is_empty() {
            return RiskAssessment {
                tier: RiskTier::Moderate,
                decision: Decision::Escalate,
                factors,
            };
        }

        // Rule 3: clean comparison, confident reads.
        RiskAssessment {
            tier: RiskTier::Low,
            decision: Decision::Approve,
            factors: vec![format!(
                "no field mismatches; minimum OCR confidence {min_confidence:.0}"
            )],
        }
    }
}

fn describe(m: &MismatchRecord, what: &str) -> String {
    match &m.note {
        Some(note) => format!("{}: {what} ({note})", m.field),
        None => format!("{}: {what}", m.field),
    }
}
