use futures::stream::{self, StreamExt, TryStreamExt};
use rayon::prelude::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::aggregator::match_entity;
use super::ai::{score_with_timeout, RelevanceScorer};
use super::source::CandidateSource;
use crate::error::{EngineError, Result};
use crate::models::{
    CandidateRecord, EntityMatch, Invoice, InvoiceMatchOutcome, InvoiceMetadata, ThresholdConfig,
};

/// 批量匹配时同时进行的 AI 请求数
const AI_CONCURRENCY: usize = 4;

/// 匹配服务
///
/// 从数据源读取发票和候选记录，调用 AI 评分（可选），对项目和采购订单分别做匹配。
/// 结果交给调用方持久化，本服务不写存储。
pub struct MatcherService {
    source: Arc<dyn CandidateSource>,
    scorer: Arc<dyn RelevanceScorer>,
    thresholds: ThresholdConfig,
    ai_timeout: Duration,
}

impl MatcherService {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        scorer: Arc<dyn RelevanceScorer>,
        thresholds: ThresholdConfig,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            source,
            scorer,
            thresholds,
            ai_timeout,
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// 预览匹配：对调用方提供的候选打分，不读写存储
    ///
    /// 候选 ID 需要在本次调用内唯一。
    pub async fn preview(
        &self,
        invoice: &InvoiceMetadata,
        candidates: &[CandidateRecord],
        thresholds: &ThresholdConfig,
    ) -> EntityMatch {
        let ai_scores =
            score_with_timeout(self.scorer.as_ref(), invoice, candidates, self.ai_timeout).await;
        match_entity(invoice, candidates, &ai_scores, thresholds)
    }

    /// 匹配单张已入库发票
    pub async fn match_invoice(&self, invoice_id: i64) -> Result<InvoiceMatchOutcome> {
        self.match_invoice_until(invoice_id, std::future::pending()).await
    }

    /// 匹配单张发票，`cancelled` 完成时放弃尚未返回的 AI 评分
    ///
    /// 取消不会丢弃规则评分，返回的是不含 AI 信号的结果。
    pub async fn match_invoice_until<F>(
        &self,
        invoice_id: i64,
        cancelled: F,
    ) -> Result<InvoiceMatchOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let invoice = self
            .source
            .get_invoice(invoice_id)
            .await?
            .ok_or(EngineError::InvoiceNotFound(invoice_id))?;
        let (projects, purchase_orders) = self.load_candidates().await?;

        Ok(self
            .evaluate(&invoice, &projects, &purchase_orders, cancelled)
            .await)
    }

    /// 批量匹配：候选只加载一次，AI 请求有限并发，结果顺序与输入一致
    pub async fn batch_match(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceMatchOutcome>> {
        let (projects, purchase_orders) = self.load_candidates().await?;
        let invoices = self.load_invoices(invoice_ids).await?;

        tracing::info!(
            "[Matcher] batch of {} invoices against {} projects / {} purchase orders",
            invoices.len(),
            projects.len(),
            purchase_orders.len()
        );

        let pending: Vec<_> = invoices
            .iter()
            .map(|invoice| {
                Box::pin(self.evaluate(
                    invoice,
                    &projects,
                    &purchase_orders,
                    std::future::pending(),
                ))
            })
            .collect();

        let outcomes: Vec<InvoiceMatchOutcome> = stream::iter(pending)
            .buffered(AI_CONCURRENCY)
            .collect()
            .await;

        let auto = outcomes
            .iter()
            .filter(|o| o.projects.auto_match.is_some() || o.purchase_orders.auto_match.is_some())
            .count();
        tracing::info!(
            "[Matcher] batch done: {} invoices, {} with an auto match",
            outcomes.len(),
            auto
        );

        Ok(outcomes)
    }

    /// 只用规则评分重新匹配一批发票（不调用 AI），并行计算
    pub async fn rescore(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceMatchOutcome>> {
        let (projects, purchase_orders) = self.load_candidates().await?;
        let invoices = self.load_invoices(invoice_ids).await?;
        Ok(self.match_many(&invoices, &projects, &purchase_orders))
    }

    /// 纯规则匹配，按发票并行
    pub fn match_many(
        &self,
        invoices: &[Invoice],
        projects: &[CandidateRecord],
        purchase_orders: &[CandidateRecord],
    ) -> Vec<InvoiceMatchOutcome> {
        invoices
            .par_iter()
            .map(|invoice| {
                let metadata = invoice.metadata();
                InvoiceMatchOutcome {
                    invoice_id: invoice.id,
                    projects: match_entity(&metadata, projects, &[], &self.thresholds),
                    purchase_orders: match_entity(&metadata, purchase_orders, &[], &self.thresholds),
                    ai_applied: false,
                }
            })
            .collect()
    }

    async fn load_candidates(&self) -> Result<(Vec<CandidateRecord>, Vec<CandidateRecord>)> {
        tokio::try_join!(
            self.source.list_projects(),
            self.source.list_purchase_orders()
        )
    }

    async fn load_invoices(&self, invoice_ids: &[i64]) -> Result<Vec<Invoice>> {
        stream::iter(invoice_ids.iter().copied())
            .then(|id| async move {
                self.source
                    .get_invoice(id)
                    .await?
                    .ok_or(EngineError::InvoiceNotFound(id))
            })
            .try_collect()
            .await
    }

    async fn evaluate<F>(
        &self,
        invoice: &Invoice,
        projects: &[CandidateRecord],
        purchase_orders: &[CandidateRecord],
        cancelled: F,
    ) -> InvoiceMatchOutcome
    where
        F: Future<Output = ()> + Send,
    {
        let metadata = invoice.metadata();
        let scorer = self.scorer.as_ref();

        let ai = async {
            tokio::join!(
                score_with_timeout(scorer, &metadata, projects, self.ai_timeout),
                score_with_timeout(scorer, &metadata, purchase_orders, self.ai_timeout),
            )
        };
        tokio::pin!(cancelled);

        let (project_ai, po_ai) = tokio::select! {
            biased;
            _ = &mut cancelled => {
                tracing::warn!("[Matcher] invoice {}: cancelled, returning rule-based scores only", invoice.id);
                (Vec::new(), Vec::new())
            }
            scores = ai => scores,
        };

        let outcome = InvoiceMatchOutcome {
            invoice_id: invoice.id,
            projects: match_entity(&metadata, projects, &project_ai, &self.thresholds),
            purchase_orders: match_entity(&metadata, purchase_orders, &po_ai, &self.thresholds),
            ai_applied: !project_ai.is_empty() || !po_ai.is_empty(),
        };

        tracing::info!(
            "[Matcher] invoice {}: project {} ({:?}), purchase order {} ({:?})",
            invoice.id,
            outcome.projects.status(),
            outcome.projects.top().map(|m| m.confidence),
            outcome.purchase_orders.status(),
            outcome.purchase_orders.top().map(|m| m.confidence)
        );

        outcome
    }
}
