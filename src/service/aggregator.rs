//! 匹配聚合：字段评分 + AI 评分 -> 置信度、排序与决策

use std::collections::HashMap;

use super::ai::AiScore;
use super::scorers::{amount_score, currencies_compatible, location_score, vendor_score};
use super::similarity::similarity;
use crate::models::{
    CandidateKind, CandidateRecord, EntityMatch, FieldScores, FieldWeights, InvoiceMetadata,
    MatchDecision, MatchResult, ThresholdConfig,
};

/// 返回的候选数量上限
pub const MAX_MATCHES: usize = 3;

/// 对一批同类候选打分、排序并给出决策
///
/// 纯函数：相同输入和配置总是得到相同输出。排序稳定，置信度相同的候选保持输入顺序。
pub fn match_entity(
    invoice: &InvoiceMetadata,
    candidates: &[CandidateRecord],
    ai_scores: &[AiScore],
    config: &ThresholdConfig,
) -> EntityMatch {
    if candidates.is_empty() {
        return EntityMatch {
            matches: Vec::new(),
            auto_match: None,
            recommendation: no_candidates("record"),
        };
    }

    let ai_by_candidate: HashMap<i64, &AiScore> = ai_scores
        .iter()
        .rev()
        .map(|s| (s.candidate_id, s))
        .collect();

    let mut matches: Vec<MatchResult> = candidates
        .iter()
        .map(|c| {
            score_candidate(invoice, c, ai_by_candidate.get(&c.id).copied(), config)
        })
        .collect();

    matches.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    matches.truncate(MAX_MATCHES);

    let auto_match = matches
        .first()
        .filter(|m| m.decision == MatchDecision::Auto)
        .cloned();
    let recommendation = recommend(&matches, config);

    tracing::debug!(
        "match_entity: {} candidates, top confidence {:?}, auto match {:?}",
        candidates.len(),
        matches.first().map(|m| m.confidence),
        auto_match.as_ref().map(|m| m.candidate_id)
    );

    EntityMatch {
        matches,
        auto_match,
        recommendation,
    }
}

fn score_candidate(
    invoice: &InvoiceMetadata,
    candidate: &CandidateRecord,
    ai: Option<&AiScore>,
    config: &ThresholdConfig,
) -> MatchResult {
    let name = match invoice.project_name_hint.as_deref() {
        Some(hint) => similarity(hint, &candidate.name),
        None => 0,
    };
    let location = location_score(invoice, candidate);
    let vendor = vendor_score(
        invoice.vendor_name.as_deref(),
        candidate.supervisor_or_vendor_text.as_deref(),
    );
    let amount = if currencies_compatible(invoice.currency.as_deref(), &candidate.currency) {
        amount_score(
            invoice.total_amount.as_ref(),
            candidate.budget_or_amount.as_ref(),
        )
    } else {
        0
    };

    let field_scores = FieldScores {
        name,
        address: location.unwrap_or(0),
        vendor,
        amount,
        ai: ai.map(|a| a.score).unwrap_or(0),
    };
    let confidence = weighted_confidence(&field_scores, &config.weights);

    let reasonings = vec![
        ai_reasoning(ai),
        name_reasoning(invoice.project_name_hint.as_deref(), name),
        location_reasoning(location),
    ];

    MatchResult {
        candidate_id: candidate.id,
        candidate_kind: candidate.kind,
        candidate_name: candidate.name.clone(),
        confidence,
        field_scores,
        reasonings,
        decision: decide(confidence, config),
    }
}

/// 加权求和后四舍五入，结果限制在 [0, 100]
pub fn weighted_confidence(scores: &FieldScores, weights: &FieldWeights) -> u8 {
    let total = scores.name as f64 * weights.name
        + scores.address as f64 * weights.address
        + scores.ai as f64 * weights.ai
        + scores.vendor as f64 * weights.vendor
        + scores.amount as f64 * weights.amount;

    if !total.is_finite() {
        return 0;
    }
    total.round().clamp(0.0, 100.0) as u8
}

pub fn decide(confidence: u8, config: &ThresholdConfig) -> MatchDecision {
    if confidence >= config.auto_threshold {
        MatchDecision::Auto
    } else if confidence >= config.review_floor {
        MatchDecision::NeedsReview
    } else {
        MatchDecision::Unmatched
    }
}

fn ai_reasoning(ai: Option<&AiScore>) -> String {
    match ai {
        Some(a) if !a.reasoning.trim().is_empty() => a.reasoning.trim().to_string(),
        Some(a) => format!("AI relevance score {}%", a.score),
        None => "No AI analysis available".to_string(),
    }
}

fn name_reasoning(hint: Option<&str>, score: u8) -> String {
    if hint.map_or(true, |h| h.trim().is_empty()) {
        return "No project name on the invoice".to_string();
    }
    match score {
        90..=100 => format!("Project name matches closely ({}%)", score),
        70..=89 => format!("Project name is similar ({}%)", score),
        40..=69 => format!("Project name partially matches ({}%)", score),
        _ => format!("Project name does not match ({}%)", score),
    }
}

fn location_reasoning(score: Option<u8>) -> String {
    match score {
        None => "No comparable address or city information".to_string(),
        Some(s @ 80..=100) => format!("Location matches ({}%)", s),
        Some(s @ 50..=79) => format!("Location partially matches ({}%)", s),
        Some(s) => format!("Location does not match ({}%)", s),
    }
}

fn no_candidates(record: &str) -> String {
    format!(
        "No candidates were available for matching. Review the extracted invoice data or create a new {}.",
        record
    )
}

/// 推荐语按排名第一的候选的类型措辞
fn recommend(matches: &[MatchResult], config: &ThresholdConfig) -> String {
    let Some(top) = matches.first() else {
        return no_candidates("record");
    };
    let record = match top.candidate_kind {
        CandidateKind::Project => "project",
        CandidateKind::PurchaseOrder => "purchase order",
    };

    match top.decision {
        MatchDecision::Auto => format!(
            "Auto-matched to {} \"{}\" with {}% confidence (threshold {}%).",
            record, top.candidate_name, top.confidence, config.auto_threshold
        ),
        MatchDecision::NeedsReview => format!(
            "Best candidate is {} \"{}\" with {}% confidence, below the auto-match threshold of {}%. Please confirm the match manually.",
            record, top.candidate_name, top.confidence, config.auto_threshold
        ),
        MatchDecision::Unmatched => format!(
            "No candidate reached the review floor of {}% (best: \"{}\" at {}%). Review the invoice data or create a new {}.",
            config.review_floor, top.candidate_name, top.confidence, record
        ),
    }
}
