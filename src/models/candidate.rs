use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::amount::deserialize_lenient;

/// 候选记录类型：项目 / 采购订单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Project,
    PurchaseOrder,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Project => "project",
            CandidateKind::PurchaseOrder => "purchase_order",
        }
    }
}

/// 候选记录 (项目或采购订单)
///
/// `id` 只在同一 `kind` 内唯一。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: i64,
    pub kind: CandidateKind,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// 项目负责人 / 供应商描述文本
    #[serde(default)]
    pub supervisor_or_vendor_text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub budget_or_amount: Option<BigDecimal>,
    /// 空字符串表示币种未知
    #[serde(default)]
    pub currency: String,
}
