#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use invoice_match_rust::error::{EngineError, Result};
use invoice_match_rust::models::{
    CandidateKind, CandidateRecord, Invoice, LineItem, MatchStatus, PoMatch, ThresholdConfig,
};
use invoice_match_rust::service::{
    AiError, AiScore, CandidateSource, InMemorySource, MatcherService, RelevanceScorer,
};

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn project(id: i64, name: &str, address: &str, city: &str, supervisor: &str, budget: &str) -> CandidateRecord {
    CandidateRecord {
        id,
        kind: CandidateKind::Project,
        name: name.to_string(),
        address: Some(address.to_string()),
        city: Some(city.to_string()),
        supervisor_or_vendor_text: Some(supervisor.to_string()),
        budget_or_amount: Some(dec(budget)),
        currency: "USD".to_string(),
    }
}

/// 两个项目：一个与发票 10 高度一致，一个无关
pub fn projects() -> Vec<CandidateRecord> {
    vec![
        project(1, "Riverside Tower", "100 River Rd", "Austin", "Acme Build LLC", "25000"),
        project(2, "Harbor Bridge Repair", "9 Dock St", "Galveston", "Other Co", "1000000"),
    ]
}

/// 与项目 1 同 ID 的采购订单
pub fn purchase_orders() -> Vec<CandidateRecord> {
    vec![CandidateRecord {
        id: 1,
        kind: CandidateKind::PurchaseOrder,
        name: "Riverside Tower steel package".to_string(),
        address: None,
        city: Some("Austin".to_string()),
        supervisor_or_vendor_text: Some("Acme Build".to_string()),
        budget_or_amount: Some(dec("6000")),
        currency: "USD".to_string(),
    }]
}

pub fn invoice(id: i64, number: &str, vendor: &str, tax_id: &str, total: Option<&str>, day: u32) -> Invoice {
    Invoice {
        id,
        invoice_number: Some(number.to_string()),
        vendor_name: Some(vendor.to_string()),
        tax_id: Some(tax_id.to_string()),
        total_amount: total.map(dec),
        currency: Some("USD".to_string()),
        issued_at: Some(Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()),
        project_name_hint: None,
        address: None,
        city: None,
    }
}

/// 发票 10 指向 Riverside Tower，发票 11 指向 Harbor Bridge
pub fn match_invoices() -> Vec<Invoice> {
    let mut riverside = invoice(10, "INV-100", "Acme Build", "12-3456789", Some("5000"), 10);
    riverside.project_name_hint = Some("Riverside Tower".to_string());
    riverside.address = Some("100 River Rd".to_string());
    riverside.city = Some("Austin".to_string());

    let mut harbor = invoice(11, "INV-101", "Other Co", "98-7654321", Some("200000"), 11);
    harbor.project_name_hint = Some("Harbor Bridge Repair".to_string());
    harbor.address = Some("9 Dock St".to_string());
    harbor.city = Some("Galveston".to_string());

    vec![riverside, harbor]
}

pub fn matching_source() -> InMemorySource {
    InMemorySource::new()
        .with_candidates(projects())
        .with_candidates(purchase_orders())
        .with_invoices(match_invoices())
}

pub fn matcher(source: Arc<dyn CandidateSource>, scorer: Arc<dyn RelevanceScorer>) -> MatcherService {
    MatcherService::new(source, scorer, ThresholdConfig::default(), Duration::from_millis(200))
}

pub fn line_item(id: i64, invoice_id: i64, amount: &str) -> LineItem {
    LineItem {
        id,
        invoice_id,
        description: Some("materials".to_string()),
        quantity: Some(dec("1")),
        amount: Some(dec(amount)),
    }
}

pub fn po_match(id: i64, invoice_id: i64, po_amount: &str, status: MatchStatus) -> PoMatch {
    PoMatch {
        id,
        invoice_id,
        purchase_order_id: 500 + id,
        po_number: Some(format!("PO-{}", 500 + id)),
        po_amount: Some(dec(po_amount)),
        status,
    }
}

/// 对每个候选给出同一分数
pub struct FixedScorer(pub u8);

#[async_trait]
impl RelevanceScorer for FixedScorer {
    async fn score(
        &self,
        _invoice: &invoice_match_rust::models::InvoiceMetadata,
        candidates: &[CandidateRecord],
    ) -> std::result::Result<Vec<AiScore>, AiError> {
        Ok(candidates
            .iter()
            .map(|c| AiScore {
                candidate_id: c.id,
                score: self.0,
                reasoning: format!("mock relevance for {}", c.name),
            })
            .collect())
    }
}

/// 先睡眠再返回固定分数
pub struct SlowScorer(pub Duration);

#[async_trait]
impl RelevanceScorer for SlowScorer {
    async fn score(
        &self,
        invoice: &invoice_match_rust::models::InvoiceMetadata,
        candidates: &[CandidateRecord],
    ) -> std::result::Result<Vec<AiScore>, AiError> {
        tokio::time::sleep(self.0).await;
        FixedScorer(90).score(invoice, candidates).await
    }
}

pub struct FailingScorer;

#[async_trait]
impl RelevanceScorer for FailingScorer {
    async fn score(
        &self,
        _invoice: &invoice_match_rust::models::InvoiceMetadata,
        _candidates: &[CandidateRecord],
    ) -> std::result::Result<Vec<AiScore>, AiError> {
        Err(AiError::Status {
            status: 503,
            body: "upstream unavailable".to_string(),
        })
    }
}

/// 返回不存在的候选 ID
pub struct HallucinatingScorer;

#[async_trait]
impl RelevanceScorer for HallucinatingScorer {
    async fn score(
        &self,
        _invoice: &invoice_match_rust::models::InvoiceMetadata,
        _candidates: &[CandidateRecord],
    ) -> std::result::Result<Vec<AiScore>, AiError> {
        Ok(vec![AiScore {
            candidate_id: 9999,
            score: 100,
            reasoning: "made up".to_string(),
        }])
    }
}

/// 除 get_invoice 外全部失败的数据源
pub struct BrokenSource {
    pub inner: InMemorySource,
}

fn unavailable() -> EngineError {
    EngineError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl CandidateSource for BrokenSource {
    async fn list_projects(&self) -> Result<Vec<CandidateRecord>> {
        Err(unavailable())
    }

    async fn list_purchase_orders(&self) -> Result<Vec<CandidateRecord>> {
        Err(unavailable())
    }

    async fn recent_invoices_for_vendor(&self, _vendor: &str, _limit: usize) -> Result<Vec<Invoice>> {
        Err(unavailable())
    }

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>> {
        self.inner.get_invoice(invoice_id).await
    }

    async fn line_items(&self, _invoice_id: i64) -> Result<Vec<LineItem>> {
        Err(unavailable())
    }

    async fn invoices_with_number(&self, _invoice_number: &str, _vendor: &str) -> Result<Vec<Invoice>> {
        Err(unavailable())
    }

    async fn po_matches(&self, _invoice_id: i64) -> Result<Vec<PoMatch>> {
        Err(unavailable())
    }
}
