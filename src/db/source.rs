use async_trait::async_trait;
use sqlx::PgPool;

use super::queries;
use crate::error::Result;
use crate::models::{CandidateRecord, Invoice, LineItem, PoMatch};
use crate::service::CandidateSource;

/// PostgreSQL 数据源
#[derive(Clone)]
pub struct PgCandidateSource {
    pool: PgPool,
}

impl PgCandidateSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateSource for PgCandidateSource {
    async fn list_projects(&self) -> Result<Vec<CandidateRecord>> {
        queries::list_projects(&self.pool).await
    }

    async fn list_purchase_orders(&self) -> Result<Vec<CandidateRecord>> {
        queries::list_purchase_orders(&self.pool).await
    }

    async fn recent_invoices_for_vendor(&self, vendor: &str, limit: usize) -> Result<Vec<Invoice>> {
        queries::recent_invoices_for_vendor(&self.pool, vendor, limit).await
    }

    async fn get_invoice(&self, invoice_id: i64) -> Result<Option<Invoice>> {
        queries::get_invoice(&self.pool, invoice_id).await
    }

    async fn line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>> {
        queries::list_line_items(&self.pool, invoice_id).await
    }

    async fn invoices_with_number(&self, invoice_number: &str, vendor: &str) -> Result<Vec<Invoice>> {
        queries::invoices_with_number(&self.pool, invoice_number, vendor).await
    }

    async fn po_matches(&self, invoice_id: i64) -> Result<Vec<PoMatch>> {
        queries::list_po_matches(&self.pool, invoice_id).await
    }
}
