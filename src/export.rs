use std::io::Write;

use crate::error::Result;
use crate::models::{Flag, InvoiceMatchOutcome};

const MATCH_HEADER: [&str; 12] = [
    "invoice_id",
    "candidate_kind",
    "candidate_id",
    "rank",
    "candidate_name",
    "confidence",
    "name_score",
    "address_score",
    "vendor_score",
    "amount_score",
    "ai_score",
    "status",
];

const FLAG_HEADER: [&str; 6] = [
    "invoice_id",
    "flag_type",
    "severity",
    "message",
    "details",
    "resolved",
];

/// 导出匹配结果，每个候选一行，状态与写入数据库的一致
pub fn export_matches_csv<W: Write>(outcomes: &[InvoiceMatchOutcome], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(MATCH_HEADER)?;

    for row in outcomes.iter().flat_map(|o| o.stored_rows()) {
        let result = row.result;
        let scores = &result.field_scores;
        writer.write_record(&[
            row.invoice_id.to_string(),
            result.candidate_kind.as_str().to_string(),
            result.candidate_id.to_string(),
            row.rank.to_string(),
            result.candidate_name.clone(),
            result.confidence.to_string(),
            scores.name.to_string(),
            scores.address.to_string(),
            scores.vendor.to_string(),
            scores.amount.to_string(),
            scores.ai.to_string(),
            row.status.as_str().to_string(),
        ])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// 导出异常标记，details 列为 JSON 文本
pub fn export_flags_csv<W: Write>(flags: &[Flag], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(FLAG_HEADER)?;

    for flag in flags {
        let details = serde_json::to_string(&flag.details).unwrap_or_default();
        writer.write_record(&[
            flag.invoice_id.to_string(),
            flag.flag_type.as_str().to_string(),
            flag.severity.as_str().to_string(),
            flag.message.clone(),
            details,
            flag.resolved.to_string(),
        ])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CandidateKind, EntityMatch, FieldScores, FlagType, MatchDecision, MatchResult, Severity,
    };
    use indexmap::IndexMap;
    use serde_json::json;

    fn result(id: i64, confidence: u8, decision: MatchDecision) -> MatchResult {
        MatchResult {
            candidate_id: id,
            candidate_kind: CandidateKind::Project,
            candidate_name: format!("Project, {}", id),
            confidence,
            field_scores: FieldScores {
                name: 90,
                address: 80,
                vendor: 0,
                amount: 100,
                ai: 0,
            },
            reasonings: vec![],
            decision,
        }
    }

    #[test]
    fn writes_one_row_per_candidate() {
        let outcome = InvoiceMatchOutcome {
            invoice_id: 42,
            projects: EntityMatch {
                matches: vec![
                    result(1, 88, MatchDecision::Auto),
                    result(2, 86, MatchDecision::Auto),
                    result(3, 61, MatchDecision::NeedsReview),
                ],
                auto_match: Some(result(1, 88, MatchDecision::Auto)),
                recommendation: String::new(),
            },
            purchase_orders: EntityMatch {
                matches: vec![],
                auto_match: None,
                recommendation: String::new(),
            },
            ai_applied: false,
        };

        let mut buf = Vec::new();
        export_matches_csv(&[outcome], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("invoice_id,candidate_kind,candidate_id,rank"));
        assert_eq!(lines[1], "42,project,1,0,\"Project, 1\",88,90,80,0,100,0,auto_matched");
        // 第二名过了自动阈值也只导出为待复核
        assert!(lines[2].starts_with("42,project,2,1,"));
        assert!(lines[2].ends_with(",needs_review"));
        assert!(lines[3].ends_with(",needs_review"));
    }

    #[test]
    fn flag_details_are_json() {
        let mut details = IndexMap::new();
        details.insert("invoiceAmount".to_string(), json!("1200.00"));
        let flag = Flag::new(9, FlagType::MissingPoMatch, Severity::Medium, "no PO", details);

        let mut buf = Vec::new();
        export_flags_csv(&[flag], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("9,missing_po_match,medium,no PO,"));
        assert!(text.contains(r#""{""invoiceAmount"":""1200.00""}""#));
        assert!(text.trim_end().ends_with(",false"));
    }
}
