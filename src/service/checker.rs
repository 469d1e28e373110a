use futures::future::try_join_all;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use super::discrepancy::{check_discrepancies, RECENT_INVOICE_LIMIT};
use super::source::CandidateSource;
use crate::error::{EngineError, Result};
use crate::models::{DiscrepancyReport, Invoice, LineItem, MatchContext};

/// 单张发票的异常检测结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDiscrepancies {
    pub invoice_id: i64,
    #[serde(flatten)]
    pub report: DiscrepancyReport,
}

/// 异常检测服务：组装上下文后调用规则检查
pub struct DiscrepancyChecker {
    source: Arc<dyn CandidateSource>,
}

impl DiscrepancyChecker {
    pub fn new(source: Arc<dyn CandidateSource>) -> Self {
        Self { source }
    }

    pub async fn check_invoice(&self, invoice_id: i64) -> Result<DiscrepancyReport> {
        let (invoice, line_items, context) = self.load(invoice_id).await?;
        Ok(check_discrepancies(&invoice, &line_items, &context))
    }

    /// 批量检测：数据并发加载，规则并行计算
    pub async fn check_batch(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceDiscrepancies>> {
        let loaded = try_join_all(invoice_ids.iter().map(|&id| self.load(id))).await?;

        let results: Vec<InvoiceDiscrepancies> = loaded
            .par_iter()
            .map(|(invoice, line_items, context)| InvoiceDiscrepancies {
                invoice_id: invoice.id,
                report: check_discrepancies(invoice, line_items, context),
            })
            .collect();

        let flagged = results.iter().filter(|r| r.report.has_discrepancies).count();
        tracing::info!(
            "[Checker] {} invoices checked, {} with discrepancies",
            results.len(),
            flagged
        );
        Ok(results)
    }

    async fn load(&self, invoice_id: i64) -> Result<(Invoice, Vec<LineItem>, MatchContext)> {
        let invoice = self
            .source
            .get_invoice(invoice_id)
            .await?
            .ok_or(EngineError::InvoiceNotFound(invoice_id))?;

        let (line_items, context) =
            tokio::try_join!(self.source.line_items(invoice_id), self.context_for(&invoice))?;
        Ok((invoice, line_items, context))
    }

    /// 组装检测上下文，缺少发票号或供应商时对应规则拿到空列表
    pub async fn context_for(&self, invoice: &Invoice) -> Result<MatchContext> {
        let vendor = invoice
            .vendor_name
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let number = invoice
            .invoice_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let same_number = async {
            match (number, vendor) {
                (Some(number), Some(vendor)) => {
                    self.source.invoices_with_number(number, vendor).await
                }
                _ => Ok(Vec::new()),
            }
        };
        let recent = async {
            match vendor {
                // 多取一张，排除当前发票后仍有足够样本
                Some(vendor) => {
                    self.source
                        .recent_invoices_for_vendor(vendor, RECENT_INVOICE_LIMIT + 1)
                        .await
                }
                None => Ok(Vec::new()),
            }
        };

        let (same_number_invoices, po_matches, recent_vendor_invoices) =
            tokio::try_join!(same_number, self.source.po_matches(invoice.id), recent)?;

        Ok(MatchContext {
            same_number_invoices,
            po_matches,
            recent_vendor_invoices,
        })
    }
}
