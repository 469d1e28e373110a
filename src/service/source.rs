use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    CandidateKind, CandidateRecord, Invoice, InvoiceMatchOutcome, LineItem, PoMatch,
};

/// 引擎读取的只读数据源
///
/// 数据源错误原样返回给调用方，引擎不重试也不吞掉。
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<CandidateRecord>>;

    async fn list_purchase_orders(&self) -> Result<Vec<CandidateRecord>>;

    /// 同一供应商最近的发票，按开票时间倒序
    async fn recent_invoices_for_vendor(&self, vendor: &str, limit: usize) -> Result<Vec<Invoice>>;

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>>;

    async fn line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>>;

    /// 同号同供应商的发票
    async fn invoices_with_number(&self, invoice_number: &str, vendor: &str) -> Result<Vec<Invoice>>;

    async fn po_matches(&self, invoice_id: i64) -> Result<Vec<PoMatch>>;
}

/// 内存数据源，用于预览和测试
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    candidates: Vec<CandidateRecord>,
    invoices: Vec<Invoice>,
    line_items: Vec<LineItem>,
    po_matches: Vec<PoMatch>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidateRecord>) -> Self {
        self.candidates.extend(candidates);
        self
    }

    pub fn with_invoices(mut self, invoices: Vec<Invoice>) -> Self {
        self.invoices.extend(invoices);
        self
    }

    pub fn with_line_items(mut self, items: Vec<LineItem>) -> Self {
        self.line_items.extend(items);
        self
    }

    pub fn with_po_matches(mut self, matches: Vec<PoMatch>) -> Self {
        self.po_matches.extend(matches);
        self
    }

    /// 把匹配结果中代表关联的采购订单行记为发票的订单关联
    ///
    /// 订单金额取自已加入的采购订单候选，需先调用 `with_candidates`。
    pub fn with_outcomes(mut self, outcomes: &[InvoiceMatchOutcome]) -> Self {
        for row in outcomes.iter().flat_map(|o| o.stored_rows()) {
            if row.result.candidate_kind != CandidateKind::PurchaseOrder || !row.links_invoice() {
                continue;
            }
            let order = self.candidates.iter().find(|c| {
                c.kind == CandidateKind::PurchaseOrder && c.id == row.result.candidate_id
            });
            let link = PoMatch {
                id: self.po_matches.len() as i64 + 1,
                invoice_id: row.invoice_id,
                purchase_order_id: row.result.candidate_id,
                po_number: None,
                po_amount: order.and_then(|c| c.budget_or_amount.clone()),
                status: row.status,
            };
            self.po_matches.push(link);
        }
        self
    }

    fn candidates_of(&self, kind: CandidateKind) -> Vec<CandidateRecord> {
        self.candidates
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    fn invoices_where(&self, pred: impl Fn(&Invoice) -> bool) -> Vec<Invoice> {
        self.invoices.iter().filter(|inv| pred(inv)).cloned().collect()
    }
}

fn vendor_eq(a: Option<&str>, b: &str) -> bool {
    a.map_or(false, |a| a.trim().eq_ignore_ascii_case(b.trim()))
}

#[async_trait]
impl CandidateSource for InMemorySource {
    async fn list_projects(&self) -> Result<Vec<CandidateRecord>> {
        Ok(self.candidates_of(CandidateKind::Project))
    }

    async fn list_purchase_orders(&self) -> Result<Vec<CandidateRecord>> {
        Ok(self.candidates_of(CandidateKind::PurchaseOrder))
    }

    async fn recent_invoices_for_vendor(&self, vendor: &str, limit: usize) -> Result<Vec<Invoice>> {
        let mut invoices = self.invoices_where(|inv| vendor_eq(inv.vendor_name.as_deref(), vendor));
        invoices.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        invoices.truncate(limit);
        Ok(invoices)
    }

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>> {
        Ok(self.invoices_where(|inv| inv.id == invoice_id).into_iter().next())
    }

    async fn line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>> {
        Ok(self
            .line_items
            .iter()
            .filter(|li| li.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn invoices_with_number(&self, invoice_number: &str, vendor: &str) -> Result<Vec<Invoice>> {
        Ok(self.invoices_where(|inv| {
            inv.invoice_number.as_deref().map(str::trim) == Some(invoice_number.trim())
                && inv.vendor_name.as_deref().map(str::trim) == Some(vendor.trim())
        }))
    }

    async fn po_matches(&self, invoice_id: i64) -> Result<Vec<PoMatch>> {
        Ok(self
            .po_matches
            .iter()
            .filter(|m| m.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}
