use serde::{Deserialize, Serialize};

use super::candidate::CandidateKind;
use super::status::MatchStatus;

/// 各字段子评分 (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldScores {
    pub name: u8,
    pub address: u8,
    pub vendor: u8,
    pub amount: u8,
    pub ai: u8,
}

/// 匹配决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Auto,
    NeedsReview,
    Unmatched,
}

impl MatchDecision {
    pub fn status(&self) -> MatchStatus {
        match self {
            MatchDecision::Auto => MatchStatus::AutoMatched,
            MatchDecision::NeedsReview => MatchStatus::NeedsReview,
            MatchDecision::Unmatched => MatchStatus::Unmatched,
        }
    }
}

/// 单个候选的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub candidate_id: i64,
    pub candidate_kind: CandidateKind,
    pub candidate_name: String,
    pub confidence: u8,
    pub field_scores: FieldScores,
    pub reasonings: Vec<String>,
    pub decision: MatchDecision,
}

/// 一次 `match_entity` 调用的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMatch {
    /// 按置信度降序，最多 3 条
    pub matches: Vec<MatchResult>,
    pub auto_match: Option<MatchResult>,
    pub recommendation: String,
}

impl EntityMatch {
    pub fn top(&self) -> Option<&MatchResult> {
        self.matches.first()
    }

    /// 发票层面的状态
    pub fn status(&self) -> MatchStatus {
        self.top()
            .map(|m| m.decision.status())
            .unwrap_or(MatchStatus::NoCandidate)
    }

    /// 第 `rank` 名候选写入存储时的状态
    ///
    /// 只有第一名可以是自动匹配，后面的候选仅供参考，
    /// 即使置信度过了自动阈值也只进入人工复核，复核人仍可确认或驳回。
    pub fn stored_status(&self, rank: usize) -> Option<MatchStatus> {
        let result = self.matches.get(rank)?;
        Some(match (rank, result.decision) {
            (0, decision) => decision.status(),
            (_, MatchDecision::Auto) => MatchStatus::NeedsReview,
            (_, decision) => decision.status(),
        })
    }
}

/// 采购订单匹配行是否代表发票与订单的关联：排名第一的结果，或被人工确认的结果
pub fn links_invoice(rank: usize, status: MatchStatus) -> bool {
    rank == 0 || status == MatchStatus::ManuallyMatched
}

/// 一条待写入的匹配结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredMatch<'a> {
    pub invoice_id: i64,
    pub rank: usize,
    pub status: MatchStatus,
    pub result: &'a MatchResult,
}

impl StoredMatch<'_> {
    pub fn links_invoice(&self) -> bool {
        links_invoice(self.rank, self.status)
    }
}

/// 一张发票对项目和采购订单的完整匹配结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMatchOutcome {
    pub invoice_id: i64,
    pub projects: EntityMatch,
    pub purchase_orders: EntityMatch,
    /// AI 评分是否参与了本次计算
    pub ai_applied: bool,
}

impl InvoiceMatchOutcome {
    /// 展开成逐行写入的匹配结果，项目在前，采购订单在后
    pub fn stored_rows(&self) -> Vec<StoredMatch<'_>> {
        [&self.projects, &self.purchase_orders]
            .into_iter()
            .flat_map(|entity| {
                entity.matches.iter().enumerate().filter_map(move |(rank, result)| {
                    Some(StoredMatch {
                        invoice_id: self.invoice_id,
                        rank,
                        status: entity.stored_status(rank)?,
                        result,
                    })
                })
            })
            .collect()
    }
}
