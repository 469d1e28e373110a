use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::models::{
    links_invoice, CandidateKind, CandidateRecord, Flag, FlagType, Invoice, InvoiceMatchOutcome,
    LineItem, MatchStatus, PoMatch, Severity, StoredMatch,
};

/// 批量写入超时
const INSERT_TIMEOUT: Duration = Duration::from_secs(30);

const INVOICE_COLUMNS: &str = "id, invoice_number, vendor_name, tax_id, total_amount, currency, \
     issued_at, project_name_hint, address, city";

#[derive(Debug, FromRow)]
struct CandidateRow {
    id: i64,
    name: String,
    address: Option<String>,
    city: Option<String>,
    counterpart: Option<String>,
    amount: Option<BigDecimal>,
    currency: Option<String>,
}

impl CandidateRow {
    fn into_record(self, kind: CandidateKind) -> CandidateRecord {
        CandidateRecord {
            id: self.id,
            kind,
            name: self.name,
            address: self.address,
            city: self.city,
            supervisor_or_vendor_text: self.counterpart,
            budget_or_amount: self.amount,
            currency: self.currency.unwrap_or_default(),
        }
    }
}

#[derive(Debug, FromRow)]
struct PoMatchRow {
    id: i64,
    invoice_id: i64,
    purchase_order_id: i64,
    po_number: Option<String>,
    po_amount: Option<BigDecimal>,
    rank: i16,
    status: String,
}

impl TryFrom<PoMatchRow> for PoMatch {
    type Error = EngineError;

    fn try_from(row: PoMatchRow) -> Result<Self> {
        Ok(PoMatch {
            id: row.id,
            invoice_id: row.invoice_id,
            purchase_order_id: row.purchase_order_id,
            po_number: row.po_number,
            po_amount: row.po_amount,
            status: parse_status(&row.status)?,
        })
    }
}

fn parse_status(raw: &str) -> Result<MatchStatus> {
    MatchStatus::from_str(raw).map_err(|e| EngineError::Database(sqlx::Error::Decode(e.into())))
}

/// 查询全部在建项目
pub async fn list_projects(pool: &PgPool) -> Result<Vec<CandidateRecord>> {
    let rows = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT id, name, address, city,
               supervisor AS counterpart,
               budget AS amount,
               currency
        FROM projects
        WHERE active
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| r.into_record(CandidateKind::Project))
        .collect())
}

/// 查询未关闭的采购订单
pub async fn list_purchase_orders(pool: &PgPool) -> Result<Vec<CandidateRecord>> {
    let rows = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT id,
               coalesce(description, po_number) AS name,
               delivery_address AS address,
               delivery_city AS city,
               vendor_name AS counterpart,
               amount,
               currency
        FROM purchase_orders
        WHERE NOT closed
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| r.into_record(CandidateKind::PurchaseOrder))
        .collect())
}

/// 查询单张发票
pub async fn get_invoice(pool: &PgPool, invoice_id: i64) -> Result<Option<Invoice>> {
    let sql = format!("SELECT {} FROM invoices WHERE id = $1", INVOICE_COLUMNS);
    Ok(sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_id)
        .fetch_optional(pool)
        .await?)
}

/// 查询发票明细
pub async fn list_line_items(pool: &PgPool, invoice_id: i64) -> Result<Vec<LineItem>> {
    Ok(sqlx::query_as::<_, LineItem>(
        r#"
        SELECT id, invoice_id, description, quantity, amount
        FROM invoice_line_items
        WHERE invoice_id = $1
        ORDER BY id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?)
}

/// 同号同供应商的发票（两者都只去掉首尾空白后比较）
pub async fn invoices_with_number(
    pool: &PgPool,
    invoice_number: &str,
    vendor: &str,
) -> Result<Vec<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices \
         WHERE trim(invoice_number) = $1 AND trim(vendor_name) = $2 \
         ORDER BY id",
        INVOICE_COLUMNS
    );
    Ok(sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_number.trim())
        .bind(vendor.trim())
        .fetch_all(pool)
        .await?)
}

/// 同一供应商最近的发票，按开票时间倒序
pub async fn recent_invoices_for_vendor(
    pool: &PgPool,
    vendor: &str,
    limit: usize,
) -> Result<Vec<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices \
         WHERE lower(trim(vendor_name)) = lower($1) \
         ORDER BY issued_at DESC NULLS LAST, id DESC \
         LIMIT $2",
        INVOICE_COLUMNS
    );
    Ok(sqlx::query_as::<_, Invoice>(&sql)
        .bind(vendor.trim())
        .bind(limit as i64)
        .fetch_all(pool)
        .await?)
}

/// 发票关联的采购订单，来自采购订单类的匹配结果
///
/// 每个订单取最新一次写入的结果；排名第一或被人工确认的行才算关联。
pub async fn list_po_matches(pool: &PgPool, invoice_id: i64) -> Result<Vec<PoMatch>> {
    let rows = sqlx::query_as::<_, PoMatchRow>(
        r#"
        SELECT DISTINCT ON (m.candidate_id)
               m.id, m.invoice_id,
               m.candidate_id AS purchase_order_id,
               po.po_number, po.amount AS po_amount,
               m.rank, m.status
        FROM match_results m
        INNER JOIN purchase_orders po ON po.id = m.candidate_id
        WHERE m.invoice_id = $1
          AND m.candidate_kind = 'purchase_order'
        ORDER BY m.candidate_id, m.id DESC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;

    let mut links = Vec::with_capacity(rows.len());
    for row in rows {
        let rank = usize::try_from(row.rank).unwrap_or(usize::MAX);
        let link = PoMatch::try_from(row)?;
        if links_invoice(rank, link.status) {
            links.push(link);
        }
    }
    Ok(links)
}

/// 批量写入匹配结果，每个候选一行
///
/// 状态取自 `InvoiceMatchOutcome::stored_rows`，每类候选最多一行自动匹配。
pub async fn insert_match_results(pool: &PgPool, outcomes: &[InvoiceMatchOutcome]) -> Result<u64> {
    let rows: Vec<StoredMatch<'_>> = outcomes.iter().flat_map(|o| o.stored_rows()).collect();

    if rows.is_empty() {
        return Ok(0);
    }

    tracing::debug!("Building insert for {} match results", rows.len());

    let mut query_builder = QueryBuilder::new(
        "INSERT INTO match_results (
            invoice_id, candidate_kind, candidate_id, rank, confidence,
            name_score, address_score, vendor_score, amount_score, ai_score,
            reasonings, status
        ) ",
    );

    query_builder.push_values(&rows, |mut b, row| {
        let result = row.result;
        b.push_bind(row.invoice_id)
            .push_bind(result.candidate_kind.as_str())
            .push_bind(result.candidate_id)
            .push_bind(i16::try_from(row.rank).unwrap_or(i16::MAX))
            .push_bind(i16::from(result.confidence))
            .push_bind(i16::from(result.field_scores.name))
            .push_bind(i16::from(result.field_scores.address))
            .push_bind(i16::from(result.field_scores.vendor))
            .push_bind(i16::from(result.field_scores.amount))
            .push_bind(i16::from(result.field_scores.ai))
            .push_bind(result.reasonings.clone())
            .push_bind(row.status.as_str());
    });

    execute_with_timeout(query_builder, pool, "match_results").await
}

/// 写入异常标记，返回实际新增的行数
///
/// 同一发票同类标记已存在（未处理或已处理）时跳过，重复检测不会产生重复标记，
/// 也不会让已处理的标记重新打开。
pub async fn insert_flags(pool: &PgPool, flags: &[Flag]) -> Result<u64> {
    if flags.is_empty() {
        return Ok(0);
    }

    let invoice_ids: Vec<i64> = flags.iter().map(|f| f.invoice_id).collect();
    let existing: Vec<(i64, String)> = sqlx::query_as(
        "SELECT DISTINCT invoice_id, flag_type FROM invoice_flags WHERE invoice_id = ANY($1)",
    )
    .bind(&invoice_ids)
    .fetch_all(pool)
    .await?;

    let fresh = fresh_flags(flags, &existing);
    if fresh.is_empty() {
        tracing::debug!("All {} flags already recorded", flags.len());
        return Ok(0);
    }

    let mut query_builder = QueryBuilder::new(
        "INSERT INTO invoice_flags (invoice_id, flag_type, severity, message, details, resolved) ",
    );

    query_builder.push_values(&fresh, |mut b, flag| {
        b.push_bind(flag.invoice_id)
            .push_bind(flag.flag_type.as_str())
            .push_bind(flag.severity.as_str())
            .push_bind(&flag.message)
            .push_bind(Json(&flag.details))
            .push_bind(flag.resolved);
    });
    // 并发检测时由唯一索引兜底
    query_builder.push(" ON CONFLICT (invoice_id, flag_type) WHERE NOT resolved DO NOTHING");

    execute_with_timeout(query_builder, pool, "invoice_flags").await
}

/// 过滤掉已记录过的 (发票, 标记类型)，同一批次内也只保留第一条
fn fresh_flags<'a>(flags: &'a [Flag], existing: &[(i64, String)]) -> Vec<&'a Flag> {
    let mut seen: HashSet<(i64, &str)> = existing
        .iter()
        .map(|(invoice_id, flag_type)| (*invoice_id, flag_type.as_str()))
        .collect();
    flags
        .iter()
        .filter(|f| seen.insert((f.invoice_id, f.flag_type.as_str())))
        .collect()
}

async fn execute_with_timeout(
    mut query_builder: QueryBuilder<'_, sqlx::Postgres>,
    pool: &PgPool,
    table: &str,
) -> Result<u64> {
    let start = Instant::now();
    match tokio::time::timeout(INSERT_TIMEOUT, query_builder.build().execute(pool)).await {
        Ok(Ok(result)) => {
            tracing::info!(
                "✓ INSERT {} ok, {} rows, {:?}",
                table,
                result.rows_affected(),
                start.elapsed()
            );
            Ok(result.rows_affected())
        }
        Ok(Err(e)) => {
            tracing::error!("✗ INSERT {} failed after {:?}: {:?}", table, start.elapsed(), e);
            Err(e.into())
        }
        Err(_) => {
            tracing::error!("✗ INSERT {} timed out (>{:?})", table, INSERT_TIMEOUT);
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }
}

/// 人工更新匹配状态，非法流转返回错误且不修改数据
pub async fn update_match_status(
    pool: &PgPool,
    match_id: i64,
    next: MatchStatus,
) -> Result<MatchStatus> {
    let mut tx = pool.begin().await?;

    let current: Option<String> =
        sqlx::query_scalar("SELECT status FROM match_results WHERE id = $1 FOR UPDATE")
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await?;

    let current = parse_status(&current.ok_or(EngineError::MatchNotFound(match_id))?)?;
    let updated = current.transition(next)?;

    sqlx::query("UPDATE match_results SET status = $2, updated_at = now() WHERE id = $1")
        .bind(match_id)
        .bind(updated.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Match {} status {} -> {}", match_id, current, updated);
    Ok(updated)
}

#[derive(Debug, FromRow)]
struct FlagRow {
    invoice_id: i64,
    flag_type: String,
    severity: String,
    message: String,
    details: Json<IndexMap<String, Value>>,
    resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<FlagRow> for Flag {
    type Error = EngineError;

    fn try_from(row: FlagRow) -> Result<Self> {
        let decode = |e: String| EngineError::Database(sqlx::Error::Decode(e.into()));
        Ok(Flag {
            invoice_id: row.invoice_id,
            flag_type: FlagType::from_str(&row.flag_type).map_err(decode)?,
            severity: Severity::from_str(&row.severity).map_err(decode)?,
            message: row.message,
            details: row.details.0,
            resolved: row.resolved,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
        })
    }
}

/// 标记为已处理，重复处理不改变首次的处理人和时间
///
/// 返回更新后的标记以及本次是否真正做了更新。
pub async fn resolve_flag(pool: &PgPool, flag_id: i64, resolved_by: &str) -> Result<(Flag, bool)> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, FlagRow>(
        r#"
        SELECT invoice_id, flag_type, severity, message, details,
               resolved, resolved_by, resolved_at
        FROM invoice_flags
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(flag_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(EngineError::FlagNotFound(flag_id))?;

    let mut flag = Flag::try_from(row)?;
    let changed = flag.resolve(resolved_by, Utc::now());

    if changed {
        sqlx::query(
            "UPDATE invoice_flags SET resolved = true, resolved_by = $2, resolved_at = $3 WHERE id = $1",
        )
        .bind(flag_id)
        .bind(&flag.resolved_by)
        .bind(flag.resolved_at)
        .execute(&mut *tx)
        .await?;
        tracing::info!("Flag {} ({}) resolved by {}", flag_id, flag.flag_type.as_str(), resolved_by);
    }
    tx.commit().await?;

    Ok((flag, changed))
}
