use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::amount::deserialize_lenient;
use super::status::MatchStatus;

/// 发票提取元数据 (匹配输入)
///
/// 所有字段可缺失；`None` 表示未提取到，`Some("")` 表示提取到空值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMetadata {
    #[serde(default)]
    pub project_name_hint: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub total_amount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// 已入库的发票
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub total_amount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_name_hint: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Invoice {
    /// 取出匹配所需的元数据
    pub fn metadata(&self) -> InvoiceMetadata {
        InvoiceMetadata {
            project_name_hint: self.project_name_hint.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            vendor_name: self.vendor_name.clone(),
            tax_id: self.tax_id.clone(),
            total_amount: self.total_amount.clone(),
            currency: self.currency.clone(),
        }
    }
}

/// 发票明细行
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: i64,
    pub invoice_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<BigDecimal>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub amount: Option<BigDecimal>,
}

/// 发票与采购订单的关联
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoMatch {
    pub id: i64,
    pub invoice_id: i64,
    pub purchase_order_id: i64,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub po_amount: Option<BigDecimal>,
    pub status: MatchStatus,
}

impl PoMatch {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// 差异检测上下文：调用方从存储层取出的只读历史数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchContext {
    /// 与当前发票同号同供应商的发票（可包含当前发票本身）
    #[serde(default)]
    pub same_number_invoices: Vec<Invoice>,
    #[serde(default)]
    pub po_matches: Vec<PoMatch>,
    /// 同一供应商的近期发票
    #[serde(default)]
    pub recent_vendor_invoices: Vec<Invoice>,
}
